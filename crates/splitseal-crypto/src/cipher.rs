//! Authenticated encryption behind the [`EncryptionEngine`] seam
//!
//! The shipped engine is a keyed-hash counter-mode keystream with an
//! independent encrypt-then-MAC tag:
//! ```text
//! block_i    = HMAC-SHA512(enc_key, nonce || u64_be(i))
//! ciphertext = plaintext XOR (block_0 || block_1 || ...)[..len]
//! tag        = HMAC-SHA512(mac_key, ciphertext)
//! ```
//! Decryption checks the tag in constant time before any keystream is generated.

use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha512;

use splitseal_core::{SealError, SealResult};

use crate::{KEY_SIZE, NONCE_SIZE, TAG_SIZE};

type HmacSha512 = Hmac<Sha512>;

/// Ciphertext plus the values needed to authenticate and decrypt it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sealed {
    pub ciphertext: Vec<u8>,
    pub nonce: [u8; NONCE_SIZE],
    pub tag: [u8; TAG_SIZE],
}

/// Authenticated encryption used by the security core.
///
/// Implementations must verify the tag before producing any plaintext.
pub trait EncryptionEngine: Send + Sync {
    /// Identifier recorded in protection metadata
    fn algorithm(&self) -> &'static str;

    /// Encrypt under `enc_key` and tag under `mac_key`. Draws a random nonce
    /// when `nonce` is `None`.
    fn encrypt(
        &self,
        plaintext: &[u8],
        enc_key: &[u8; KEY_SIZE],
        mac_key: &[u8; KEY_SIZE],
        nonce: Option<[u8; NONCE_SIZE]>,
    ) -> SealResult<Sealed>;

    fn decrypt(
        &self,
        sealed: &Sealed,
        enc_key: &[u8; KEY_SIZE],
        mac_key: &[u8; KEY_SIZE],
    ) -> SealResult<Vec<u8>>;
}

/// HMAC-SHA512 counter-mode keystream with an HMAC-SHA512 tag
#[derive(Debug, Clone, Copy, Default)]
pub struct HashCtrEngine;

impl HashCtrEngine {
    pub const ALGORITHM: &'static str = "hmac-sha512-ctr+hmac-sha512";

    fn apply_keystream(
        data: &[u8],
        enc_key: &[u8; KEY_SIZE],
        nonce: &[u8; NONCE_SIZE],
    ) -> SealResult<Vec<u8>> {
        let mut out = Vec::with_capacity(data.len());
        for (counter, block) in data.chunks(TAG_SIZE).enumerate() {
            let mut prf = new_mac(enc_key)?;
            prf.update(nonce);
            prf.update(&(counter as u64).to_be_bytes());
            let keystream = prf.finalize().into_bytes();
            out.extend(block.iter().zip(keystream.iter()).map(|(p, k)| p ^ k));
        }
        Ok(out)
    }
}

impl EncryptionEngine for HashCtrEngine {
    fn algorithm(&self) -> &'static str {
        Self::ALGORITHM
    }

    fn encrypt(
        &self,
        plaintext: &[u8],
        enc_key: &[u8; KEY_SIZE],
        mac_key: &[u8; KEY_SIZE],
        nonce: Option<[u8; NONCE_SIZE]>,
    ) -> SealResult<Sealed> {
        let nonce = nonce.unwrap_or_else(|| {
            let mut bytes = [0u8; NONCE_SIZE];
            rand::thread_rng().fill_bytes(&mut bytes);
            bytes
        });

        let ciphertext = Self::apply_keystream(plaintext, enc_key, &nonce)?;

        let mut mac = new_mac(mac_key)?;
        mac.update(&ciphertext);
        let mut tag = [0u8; TAG_SIZE];
        tag.copy_from_slice(&mac.finalize().into_bytes());

        Ok(Sealed {
            ciphertext,
            nonce,
            tag,
        })
    }

    fn decrypt(
        &self,
        sealed: &Sealed,
        enc_key: &[u8; KEY_SIZE],
        mac_key: &[u8; KEY_SIZE],
    ) -> SealResult<Vec<u8>> {
        let mut mac = new_mac(mac_key)?;
        mac.update(&sealed.ciphertext);
        mac.verify_slice(&sealed.tag).map_err(|_| {
            SealError::AuthenticationFailure(
                "MAC tag mismatch: ciphertext modified or wrong keys".into(),
            )
        })?;

        Self::apply_keystream(&sealed.ciphertext, enc_key, &sealed.nonce)
    }
}

fn new_mac(key: &[u8]) -> SealResult<HmacSha512> {
    HmacSha512::new_from_slice(key).map_err(|e| SealError::Other(anyhow::anyhow!("HMAC init: {e}")))
}
