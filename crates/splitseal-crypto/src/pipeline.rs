//! Security core: `protect`, `unprotect`, and `verify_integrity`
//!
//! ```text
//! protect:   RAW → CANARY_INJECTED → ENCRYPTED → FRAGMENTED → BOUND → COMMITTED
//! unprotect: COMMITTED → FINGERPRINT_CHECKED → AUTHENTICATED → DECANARIED → RAW
//! ```
//!
//! The plaintext handed to the encryption engine is
//! `[32-byte canary verification][canary-marked record]`, or just the record
//! bytes when anti-tampering is off. Sealing the verification digest inside
//! the authenticated ciphertext keeps the persisted metadata free of secrets.
//!
//! Calls share no mutable state and perform no I/O; any failure aborts the
//! whole call without returning a partial fragment.

use std::fmt;

use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

use splitseal_core::config::ProtectionConfig;
use splitseal_core::{
    ProtectOptions, ProtectedRecord, ProtectionFlags, ProtectionMetadata, SealError, SealResult,
};

use crate::canary::CanaryTokenManager;
use crate::cipher::{EncryptionEngine, HashCtrEngine};
use crate::fragment::FragmentB;
use crate::kdf::{derive_cipher_keys, derive_hardware_keys, KeySeed};
use crate::keys::HardwareKeys;
use crate::{binding, fragment, record, FRAGMENT_B_SIZE, SUITE_PREFIX};

const VERIFICATION_SIZE: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtectStage {
    Raw,
    CanaryInjected,
    Encrypted,
    Fragmented,
    Bound,
    Committed,
}

impl fmt::Display for ProtectStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ProtectStage::Raw => "RAW",
            ProtectStage::CanaryInjected => "CANARY_INJECTED",
            ProtectStage::Encrypted => "ENCRYPTED",
            ProtectStage::Fragmented => "FRAGMENTED",
            ProtectStage::Bound => "BOUND",
            ProtectStage::Committed => "COMMITTED",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnprotectStage {
    Committed,
    FingerprintChecked,
    Authenticated,
    Decanaried,
    Raw,
}

impl fmt::Display for UnprotectStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            UnprotectStage::Committed => "COMMITTED",
            UnprotectStage::FingerprintChecked => "FINGERPRINT_CHECKED",
            UnprotectStage::Authenticated => "AUTHENTICATED",
            UnprotectStage::Decanaried => "DECANARIED",
            UnprotectStage::Raw => "RAW",
        })
    }
}

/// Everything `protect` produces. Fragment A goes to bulk storage, fragment B
/// and the commitment to the ledger, metadata alongside fragment A.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtectedFragments {
    pub fragment_a: Vec<u8>,
    pub fragment_b: FragmentB,
    /// 128 hex characters
    pub commitment: String,
    pub metadata: ProtectionMetadata,
}

/// Orchestrates key validation, canaries, encryption, fragmentation, and binding.
#[derive(Debug, Clone)]
pub struct SecurityCore<E = HashCtrEngine> {
    config: ProtectionConfig,
    engine: E,
}

impl Default for SecurityCore<HashCtrEngine> {
    fn default() -> Self {
        Self {
            config: ProtectionConfig::default(),
            engine: HashCtrEngine,
        }
    }
}

impl SecurityCore<HashCtrEngine> {
    /// Fails with [`SealError::Config`] if `config` does not validate.
    pub fn new(config: ProtectionConfig) -> SealResult<Self> {
        Self::with_engine(config, HashCtrEngine)
    }
}

impl<E: EncryptionEngine> SecurityCore<E> {
    /// Use a different authenticated-encryption engine behind the same pipeline.
    pub fn with_engine(config: ProtectionConfig, engine: E) -> SealResult<Self> {
        config.validate()?;
        Ok(Self { config, engine })
    }

    pub fn config(&self) -> &ProtectionConfig {
        &self.config
    }

    /// Algorithm suite identifier written into metadata
    pub fn algorithm(&self) -> String {
        format!("{SUITE_PREFIX}:{}", self.engine.algorithm())
    }

    /// Options seeded from this core's configuration
    pub fn default_options(&self) -> ProtectOptions {
        ProtectOptions {
            anti_tampering: self.config.anti_tampering,
            nonce: None,
        }
    }

    pub fn protect(
        &self,
        record: &ProtectedRecord,
        keys: &HardwareKeys,
        options: &ProtectOptions,
    ) -> SealResult<ProtectedFragments> {
        self.protect_inner(record, keys, options, false)
    }

    /// Derive both hardware keys from raw seed material, then protect.
    pub fn protect_with_seed(
        &self,
        record: &ProtectedRecord,
        seed: &KeySeed,
        options: &ProtectOptions,
    ) -> SealResult<ProtectedFragments> {
        let keys = derive_hardware_keys(seed)?;
        self.protect_inner(record, &keys, options, seed.is_sealed())
    }

    fn protect_inner(
        &self,
        record: &ProtectedRecord,
        keys: &HardwareKeys,
        options: &ProtectOptions,
        sealed_derivation: bool,
    ) -> SealResult<ProtectedFragments> {
        keys.validate(&self.config)?;
        let fingerprint = keys.fingerprint();

        let mut stage = ProtectStage::Raw;
        let serialized = Zeroizing::new(record::encode(record)?);
        tracing::trace!(%stage, bytes = serialized.len(), "record serialized");

        let (plaintext, canary_count) = if options.anti_tampering {
            let canaries = CanaryTokenManager::new(self.config.canary_count as usize);
            let marked = canaries.inject(&serialized);
            let mut plaintext = Zeroizing::new(Vec::with_capacity(VERIFICATION_SIZE + marked.data.len()));
            plaintext.extend_from_slice(&marked.verification);
            plaintext.extend_from_slice(&marked.data);
            (plaintext, canaries.token_count())
        } else {
            (Zeroizing::new(serialized.to_vec()), 0)
        };
        stage = ProtectStage::CanaryInjected;
        tracing::trace!(%stage, canaries = canary_count);

        let cipher_keys = derive_cipher_keys(keys)?;
        let sealed = self.engine.encrypt(
            &plaintext,
            cipher_keys.enc_key(),
            cipher_keys.mac_key(),
            options.nonce,
        )?;
        stage = ProtectStage::Encrypted;
        tracing::trace!(%stage, ciphertext = sealed.ciphertext.len());

        let fragment_a = fragment::split(&sealed);
        stage = ProtectStage::Fragmented;
        tracing::trace!(%stage, fragment_a = fragment_a.len());

        let fragment_b = fragment::bind_fragment_b(&fragment_a, keys);
        stage = ProtectStage::Bound;
        tracing::trace!(%stage);

        let commitment = binding::compute_commitment(&fragment_a, &fragment_b);
        stage = ProtectStage::Committed;
        tracing::trace!(%stage);

        let metadata = ProtectionMetadata {
            algorithm: self.algorithm(),
            fingerprint,
            canary_count: canary_count as u32,
            original_size: serialized.len() as u64,
            fragment_a_size: fragment_a.len() as u64,
            fragment_b_size: FRAGMENT_B_SIZE as u64,
            flags: ProtectionFlags {
                anti_tampering: options.anti_tampering,
                sealed_derivation,
            },
            created_at: unix_now(),
        };

        tracing::debug!(
            fingerprint = %metadata.fingerprint,
            original_size = metadata.original_size,
            fragment_a_size = metadata.fragment_a_size,
            canaries = metadata.canary_count,
            "record protected"
        );

        Ok(ProtectedFragments {
            fragment_a,
            fragment_b,
            commitment,
            metadata,
        })
    }

    pub fn unprotect(
        &self,
        fragment_a: &[u8],
        fragment_b: &[u8],
        keys: &HardwareKeys,
        metadata: &ProtectionMetadata,
    ) -> SealResult<ProtectedRecord> {
        keys.validate(&self.config)?;

        let mut stage = UnprotectStage::Committed;
        tracing::trace!(%stage, fragment_a = fragment_a.len());

        let actual = keys.fingerprint();
        if !bool::from(actual.as_bytes().ct_eq(metadata.fingerprint.as_bytes())) {
            tracing::warn!(expected = %metadata.fingerprint, actual = %actual, "key fingerprint mismatch");
            return Err(SealError::FingerprintMismatch {
                expected: metadata.fingerprint.clone(),
                actual,
            });
        }
        stage = UnprotectStage::FingerprintChecked;
        tracing::trace!(%stage);

        if metadata.algorithm != self.algorithm() {
            return Err(SealError::AuthenticationFailure(format!(
                "metadata algorithm {} does not match engine {}",
                metadata.algorithm,
                self.algorithm()
            )));
        }
        if !fragment::verify_binding(fragment_a, fragment_b, keys) {
            tracing::warn!(fingerprint = %actual, "fragment B does not bind fragment A");
            return Err(SealError::AuthenticationFailure(
                "fragment B is not bound to fragment A under these keys".into(),
            ));
        }

        let sealed = fragment::parse(fragment_a)?;
        let cipher_keys = derive_cipher_keys(keys)?;
        let plaintext = Zeroizing::new(self.engine.decrypt(
            &sealed,
            cipher_keys.enc_key(),
            cipher_keys.mac_key(),
        )?);
        stage = UnprotectStage::Authenticated;
        tracing::trace!(%stage);

        let original_size = usize::try_from(metadata.original_size).map_err(|_| {
            SealError::TamperDetected(format!(
                "original size {} is not addressable",
                metadata.original_size
            ))
        })?;
        let serialized = if metadata.flags.anti_tampering {
            Zeroizing::new(decanary(&plaintext, metadata.canary_count, original_size)?)
        } else if plaintext.len() == original_size {
            plaintext
        } else {
            return Err(SealError::TamperDetected(format!(
                "payload is {} bytes, metadata records {}",
                plaintext.len(),
                original_size
            )));
        };
        stage = UnprotectStage::Decanaried;
        tracing::trace!(%stage);

        let record = record::decode(&serialized)?;
        stage = UnprotectStage::Raw;
        tracing::trace!(%stage);

        tracing::debug!(fingerprint = %actual, fields = record.len(), "record unprotected");
        Ok(record)
    }

    /// Non-destructive health check: recompute the commitment and check the
    /// fragment sizes against metadata. Never decrypts and never errors.
    pub fn verify_integrity(
        &self,
        fragment_a: &[u8],
        fragment_b: &[u8],
        commitment: &str,
        metadata: &ProtectionMetadata,
    ) -> bool {
        let sizes_match = fragment_b.len() == FRAGMENT_B_SIZE
            && metadata.fragment_b_size == fragment_b.len() as u64
            && metadata.fragment_a_size == fragment_a.len() as u64;
        let commitment_ok = binding::verify_commitment(fragment_a, fragment_b, commitment);

        if !(sizes_match && commitment_ok) {
            tracing::warn!(
                fingerprint = %metadata.fingerprint,
                sizes_match,
                commitment_ok,
                "integrity verification failed"
            );
        }
        sizes_match && commitment_ok
    }
}

fn decanary(plaintext: &[u8], canary_count: u32, original_size: usize) -> SealResult<Vec<u8>> {
    if canary_count == 0 || plaintext.len() < VERIFICATION_SIZE {
        return Err(SealError::TamperDetected(
            "payload carries no canary verification".into(),
        ));
    }
    let (verification_bytes, marked) = plaintext.split_at(VERIFICATION_SIZE);
    if original_size > marked.len() {
        return Err(SealError::TamperDetected(format!(
            "metadata records {original_size} bytes but the marked payload is {} bytes",
            marked.len()
        )));
    }
    let mut verification = [0u8; VERIFICATION_SIZE];
    verification.copy_from_slice(verification_bytes);

    CanaryTokenManager::new(canary_count as usize).extract(marked, &verification, original_size)
}

fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::KEY_SIZE;
    use serde_json::json;

    fn record() -> ProtectedRecord {
        json!({"name": "Ahmad", "ic": "123"}).as_object().cloned().unwrap()
    }

    fn keys() -> HardwareKeys {
        HardwareKeys::from_bytes([0x11u8; KEY_SIZE], [0x22u8; KEY_SIZE])
    }

    #[test]
    fn test_roundtrip() {
        let core = SecurityCore::default();
        let out = core.protect(&record(), &keys(), &ProtectOptions::default()).unwrap();
        let back = core
            .unprotect(&out.fragment_a, &out.fragment_b, &keys(), &out.metadata)
            .unwrap();
        assert_eq!(back, record());
    }

    #[test]
    fn test_metadata_contents() {
        let core = SecurityCore::default();
        let out = core.protect(&record(), &keys(), &ProtectOptions::default()).unwrap();
        let meta = &out.metadata;

        assert_eq!(meta.fingerprint, keys().fingerprint());
        assert_eq!(meta.canary_count, 3);
        assert_eq!(meta.original_size, record::encode(&record()).unwrap().len() as u64);
        assert_eq!(meta.fragment_a_size, out.fragment_a.len() as u64);
        assert_eq!(meta.fragment_b_size, 32);
        assert!(meta.flags.anti_tampering);
        assert!(!meta.flags.sealed_derivation);
        assert!(meta.algorithm.starts_with(SUITE_PREFIX));
        assert!(meta.created_at > 0);
    }

    #[test]
    fn test_fragment_a_layout_size() {
        let core = SecurityCore::default();
        let out = core.protect(&record(), &keys(), &ProtectOptions::default()).unwrap();
        let expected = fragment::FRAGMENT_A_HEADER
            + VERIFICATION_SIZE
            + out.metadata.original_size as usize
            + 3 * crate::CANARY_TOKEN_SIZE;
        assert_eq!(out.fragment_a.len(), expected);
    }

    #[test]
    fn test_without_anti_tampering() {
        let core = SecurityCore::default();
        let options = ProtectOptions {
            anti_tampering: false,
            nonce: None,
        };
        let out = core.protect(&record(), &keys(), &options).unwrap();
        assert_eq!(out.metadata.canary_count, 0);
        assert!(!out.metadata.flags.anti_tampering);

        let back = core
            .unprotect(&out.fragment_a, &out.fragment_b, &keys(), &out.metadata)
            .unwrap();
        assert_eq!(back, record());
    }

    #[test]
    fn test_explicit_nonce_lands_in_fragment_a() {
        let core = SecurityCore::default();
        let options = ProtectOptions {
            anti_tampering: true,
            nonce: Some([9u8; crate::NONCE_SIZE]),
        };
        let out = core.protect(&record(), &keys(), &options).unwrap();
        assert_eq!(&out.fragment_a[..crate::NONCE_SIZE], &[9u8; crate::NONCE_SIZE]);
    }

    #[test]
    fn test_invalid_keys_rejected_before_work() {
        let core = SecurityCore::default();
        let zero = HardwareKeys::from_bytes([0u8; KEY_SIZE], [0x22u8; KEY_SIZE]);
        let err = core.protect(&record(), &zero, &ProtectOptions::default()).unwrap_err();
        assert!(matches!(err, SealError::InvalidKeyMaterial(_)));
    }

    #[test]
    fn test_tampered_canary_count_detected() {
        let core = SecurityCore::default();
        let out = core.protect(&record(), &keys(), &ProtectOptions::default()).unwrap();
        let mut meta = out.metadata.clone();
        meta.canary_count = 4;

        let err = core
            .unprotect(&out.fragment_a, &out.fragment_b, &keys(), &meta)
            .unwrap_err();
        assert!(matches!(err, SealError::TamperDetected(_)));
    }

    #[test]
    fn test_algorithm_mismatch() {
        let core = SecurityCore::default();
        let out = core.protect(&record(), &keys(), &ProtectOptions::default()).unwrap();
        let mut meta = out.metadata.clone();
        meta.algorithm = "splitseal-v0:unknown".into();

        let err = core
            .unprotect(&out.fragment_a, &out.fragment_b, &keys(), &meta)
            .unwrap_err();
        assert!(matches!(err, SealError::AuthenticationFailure(_)));
    }

    #[test]
    fn test_verify_integrity() {
        let core = SecurityCore::default();
        let out = core.protect(&record(), &keys(), &ProtectOptions::default()).unwrap();

        assert!(core.verify_integrity(&out.fragment_a, &out.fragment_b, &out.commitment, &out.metadata));

        let mut a = out.fragment_a.clone();
        a[0] ^= 1;
        assert!(!core.verify_integrity(&a, &out.fragment_b, &out.commitment, &out.metadata));
        assert!(!core.verify_integrity(&out.fragment_a, &out.fragment_b[..16], &out.commitment, &out.metadata));
        assert!(!core.verify_integrity(&out.fragment_a, &out.fragment_b, "00", &out.metadata));
    }

    #[test]
    fn test_unaddressable_original_size_detected() {
        let core = SecurityCore::default();
        let out = core.protect(&record(), &keys(), &ProtectOptions::default()).unwrap();
        let mut meta = out.metadata.clone();
        meta.original_size = u64::MAX;

        let err = core
            .unprotect(&out.fragment_a, &out.fragment_b, &keys(), &meta)
            .unwrap_err();
        assert!(matches!(err, SealError::TamperDetected(_)));
    }

    #[test]
    fn test_wrapping_canary_layout_detected() {
        let core = SecurityCore::default();
        let out = core.protect(&record(), &keys(), &ProtectOptions::default()).unwrap();
        let marked_len = out.metadata.original_size as usize + 3 * crate::CANARY_TOKEN_SIZE;
        let mut meta = out.metadata.clone();
        meta.canary_count = 100;
        meta.original_size = marked_len.wrapping_sub(100 * crate::CANARY_TOKEN_SIZE) as u64;

        let err = core
            .unprotect(&out.fragment_a, &out.fragment_b, &keys(), &meta)
            .unwrap_err();
        assert!(matches!(err, SealError::TamperDetected(_)));
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let config = ProtectionConfig {
            min_bit_density: 0.8,
            max_bit_density: 0.2,
            ..ProtectionConfig::default()
        };
        let err = SecurityCore::new(config).unwrap_err();
        assert!(matches!(err, SealError::Config(_)));

        let config = ProtectionConfig {
            canary_count: 0,
            ..ProtectionConfig::default()
        };
        assert!(SecurityCore::with_engine(config, HashCtrEngine).is_err());
        assert!(SecurityCore::new(ProtectionConfig::default()).is_ok());
    }

    #[test]
    fn test_stage_names() {
        assert_eq!(ProtectStage::CanaryInjected.to_string(), "CANARY_INJECTED");
        assert_eq!(UnprotectStage::FingerprintChecked.to_string(), "FINGERPRINT_CHECKED");
    }

    #[test]
    fn test_protect_with_sealed_seed() {
        let core = SecurityCore::default();
        let seed = KeySeed::new(b"card-pub".to_vec(), b"phone-pub".to_vec(), "did:example:42")
            .with_sealed_secret([0x3Cu8; KEY_SIZE]);

        let out = core.protect_with_seed(&record(), &seed, &ProtectOptions::default()).unwrap();
        assert!(out.metadata.flags.sealed_derivation);

        let keys = derive_hardware_keys(&seed).unwrap();
        let back = core
            .unprotect(&out.fragment_a, &out.fragment_b, &keys, &out.metadata)
            .unwrap();
        assert_eq!(back, record());
    }
}
