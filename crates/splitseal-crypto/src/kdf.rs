//! Key derivation: extract-then-expand over SHA-256
//!
//! ```text
//! prk = SHA-256(salt || seed)
//! okm = SHA-256(prk || context || 0x01)
//! key = okm[..32]
//! ```
//!
//! Every derived key uses its own domain salt, so one derived key gives no
//! advantage in computing another.

use sha2::{Digest, Sha256};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use splitseal_core::{SealError, SealResult};

use crate::keys::{CipherKeys, HardwareKeys};
use crate::KEY_SIZE;

/// Domain salt for key A (card-bound)
pub const CARD_KEY_SALT: &[u8] = b"SPLITSEAL_CARD_KEY_V1";
/// Domain salt for key B (phone-bound)
pub const PHONE_KEY_SALT: &[u8] = b"SPLITSEAL_PHONE_KEY_V1";
/// Domain salt for the keystream key, derived from key A
pub const ENC_KEY_SALT: &[u8] = b"SPLITSEAL_ENC_KEY_V1";
/// Domain salt for the MAC key, derived from key B
pub const MAC_KEY_SALT: &[u8] = b"SPLITSEAL_MAC_KEY_V1";

const ENC_CONTEXT: &str = "splitseal/encrypt";
const MAC_CONTEXT: &str = "splitseal/authenticate";

/// Derive a 256-bit key from seed material, a domain salt, and a context string.
///
/// Deterministic: identical inputs always produce the identical key.
pub fn derive_key(seed: &[u8], domain_salt: &[u8], context: &str) -> SealResult<[u8; KEY_SIZE]> {
    if seed.is_empty() {
        return Err(SealError::InvalidSeedMaterial(
            "seed material must not be empty".into(),
        ));
    }

    let mut prk = Zeroizing::new([0u8; 32]);
    prk.copy_from_slice(
        &Sha256::new()
            .chain_update(domain_salt)
            .chain_update(seed)
            .finalize(),
    );

    let mut okm = Zeroizing::new([0u8; 32]);
    okm.copy_from_slice(
        &Sha256::new()
            .chain_update(prk.as_slice())
            .chain_update(context.as_bytes())
            .chain_update([0x01u8])
            .finalize(),
    );

    let mut key = [0u8; KEY_SIZE];
    key.copy_from_slice(&okm[..KEY_SIZE]);
    Ok(key)
}

/// Raw material from the two hardware factors, plus the identity they are bound to.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct KeySeed {
    /// Public key material read from the identity card
    pub card_material: Vec<u8>,
    /// Public key material read from the phone's secure enclave
    pub phone_material: Vec<u8>,
    /// Identity context (e.g. a decentralized identifier)
    pub identity: String,
    /// Secret released by the hardware after a signed challenge-response.
    /// Mixed into both seeds when present.
    pub sealed_secret: Option<[u8; KEY_SIZE]>,
}

impl KeySeed {
    pub fn new(card_material: Vec<u8>, phone_material: Vec<u8>, identity: impl Into<String>) -> Self {
        Self {
            card_material,
            phone_material,
            identity: identity.into(),
            sealed_secret: None,
        }
    }

    pub fn with_sealed_secret(mut self, secret: [u8; KEY_SIZE]) -> Self {
        self.sealed_secret = Some(secret);
        self
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed_secret.is_some()
    }

    fn seed_for(&self, material: &[u8]) -> Zeroizing<Vec<u8>> {
        let mut seed = Zeroizing::new(Vec::with_capacity(material.len() + KEY_SIZE));
        seed.extend_from_slice(material);
        if let Some(secret) = &self.sealed_secret {
            seed.extend_from_slice(secret);
        }
        seed
    }
}

impl std::fmt::Debug for KeySeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeySeed")
            .field("card_material_len", &self.card_material.len())
            .field("phone_material_len", &self.phone_material.len())
            .field("identity", &self.identity)
            .field("sealed_secret", &self.sealed_secret.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// Derive key A and key B from the two hardware factors.
///
/// Without a sealed secret the inputs are public values, so anyone holding
/// them can recompute the keys. That mode is kept for compatibility and
/// logged at `warn`.
pub fn derive_hardware_keys(seed: &KeySeed) -> SealResult<HardwareKeys> {
    if seed.card_material.is_empty() || seed.phone_material.is_empty() {
        return Err(SealError::InvalidSeedMaterial(
            "card and phone material must both be present".into(),
        ));
    }
    if !seed.is_sealed() {
        tracing::warn!(
            identity = %seed.identity,
            "deriving hardware keys from public material only; supply a sealed secret for confidentiality"
        );
    }

    let key_a = derive_key(&seed.seed_for(&seed.card_material), CARD_KEY_SALT, &seed.identity)?;
    let key_b = derive_key(&seed.seed_for(&seed.phone_material), PHONE_KEY_SALT, &seed.identity)?;

    Ok(HardwareKeys::from_bytes(key_a, key_b))
}

/// Derive the keystream key (from key A) and MAC key (from key B).
pub fn derive_cipher_keys(keys: &HardwareKeys) -> SealResult<CipherKeys> {
    let enc = derive_key(keys.key_a(), ENC_KEY_SALT, ENC_CONTEXT)?;
    let mac = derive_key(keys.key_b(), MAC_KEY_SALT, MAC_CONTEXT)?;
    Ok(CipherKeys::new(enc, mac))
}
