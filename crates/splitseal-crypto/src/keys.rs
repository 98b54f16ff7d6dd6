//! Hardware key material: validation, fingerprinting, and the derived cipher keys

use sha2::{Digest, Sha256};
use zeroize::{Zeroize, ZeroizeOnDrop};

use splitseal_core::config::ProtectionConfig;
use splitseal_core::{SealError, SealResult};

use crate::{FINGERPRINT_HEX_LEN, KEY_SIZE};

/// The two independently-held 256-bit keys. Zeroized on drop.
///
/// Supplied fresh on every call and never persisted.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct HardwareKeys {
    key_a: [u8; KEY_SIZE],
    key_b: [u8; KEY_SIZE],
}

impl HardwareKeys {
    pub fn from_bytes(key_a: [u8; KEY_SIZE], key_b: [u8; KEY_SIZE]) -> Self {
        Self { key_a, key_b }
    }

    /// Build from untrusted slices, rejecting anything that is not exactly 32 bytes.
    pub fn from_slices(key_a: &[u8], key_b: &[u8]) -> SealResult<Self> {
        let a = to_key("key A", key_a)?;
        let b = to_key("key B", key_b)?;
        Ok(Self::from_bytes(a, b))
    }

    pub fn key_a(&self) -> &[u8; KEY_SIZE] {
        &self.key_a
    }

    pub fn key_b(&self) -> &[u8; KEY_SIZE] {
        &self.key_b
    }

    /// Reject all-zero keys and keys whose set-bit density falls outside the
    /// configured bounds.
    pub fn validate(&self, config: &ProtectionConfig) -> SealResult<()> {
        check_key("key A", &self.key_a, config)?;
        check_key("key B", &self.key_b, config)
    }

    /// 16-hex-character fingerprint: SHA-256(keyA || keyB), truncated.
    pub fn fingerprint(&self) -> String {
        let digest = Sha256::new()
            .chain_update(self.key_a)
            .chain_update(self.key_b)
            .finalize();
        let mut hex = hex::encode(digest);
        hex.truncate(FINGERPRINT_HEX_LEN);
        hex
    }
}

impl std::fmt::Debug for HardwareKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HardwareKeys")
            .field("key_a", &"[REDACTED]")
            .field("key_b", &"[REDACTED]")
            .finish()
    }
}

fn to_key(label: &str, bytes: &[u8]) -> SealResult<[u8; KEY_SIZE]> {
    <[u8; KEY_SIZE]>::try_from(bytes).map_err(|_| {
        SealError::InvalidKeyMaterial(format!(
            "{label} must be {KEY_SIZE} bytes, got {}",
            bytes.len()
        ))
    })
}

fn check_key(label: &str, key: &[u8; KEY_SIZE], config: &ProtectionConfig) -> SealResult<()> {
    if key.iter().all(|&b| b == 0) {
        return Err(SealError::InvalidKeyMaterial(format!(
            "{label} cannot be all zeros"
        )));
    }

    let density = bit_density(key);
    if density < config.min_bit_density || density > config.max_bit_density {
        return Err(SealError::InvalidKeyMaterial(format!(
            "{label} has degenerate bit density {density:.3} (accepted range {:.2}..={:.2})",
            config.min_bit_density, config.max_bit_density
        )));
    }
    Ok(())
}

/// Fraction of set bits in `bytes`, in `0.0..=1.0`.
pub fn bit_density(bytes: &[u8]) -> f64 {
    if bytes.is_empty() {
        return 0.0;
    }
    let ones: u32 = bytes.iter().map(|b| b.count_ones()).sum();
    f64::from(ones) / (bytes.len() as f64 * 8.0)
}

/// Keystream key and MAC key used by the encryption engine. Zeroized on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct CipherKeys {
    enc: [u8; KEY_SIZE],
    mac: [u8; KEY_SIZE],
}

impl CipherKeys {
    pub fn new(enc: [u8; KEY_SIZE], mac: [u8; KEY_SIZE]) -> Self {
        Self { enc, mac }
    }

    pub fn enc_key(&self) -> &[u8; KEY_SIZE] {
        &self.enc
    }

    pub fn mac_key(&self) -> &[u8; KEY_SIZE] {
        &self.mac
    }
}

impl std::fmt::Debug for CipherKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CipherKeys")
            .field("enc", &"[REDACTED]")
            .field("mac", &"[REDACTED]")
            .finish()
    }
}
