//! Fragment A / Fragment B construction
//!
//! Fragment A format (binary, opaque to storage):
//! ```text
//! [16 bytes: nonce][64 bytes: HMAC-SHA512 tag][N bytes: ciphertext]
//! ```
//!
//! Fragment B is a 32-byte binding digest over fragment A and both keys:
//! ```text
//! B = SHA-512( SHA-512(A) || SHA-512(key_a) || SHA-512(key_b) )[..32]
//! ```

use sha2::{Digest, Sha512};
use subtle::ConstantTimeEq;

use splitseal_core::{SealError, SealResult};

use crate::cipher::Sealed;
use crate::keys::HardwareKeys;
use crate::{FRAGMENT_B_SIZE, NONCE_SIZE, TAG_SIZE};

/// Fixed-size binding token anchored on the ledger
pub type FragmentB = [u8; FRAGMENT_B_SIZE];

/// Bytes of framing that precede the ciphertext in fragment A
pub const FRAGMENT_A_HEADER: usize = NONCE_SIZE + TAG_SIZE;

/// Serialize authenticated ciphertext into fragment A.
pub fn split(sealed: &Sealed) -> Vec<u8> {
    let mut fragment = Vec::with_capacity(FRAGMENT_A_HEADER + sealed.ciphertext.len());
    fragment.extend_from_slice(&sealed.nonce);
    fragment.extend_from_slice(&sealed.tag);
    fragment.extend_from_slice(&sealed.ciphertext);
    fragment
}

/// Parse fragment A back into nonce, tag, and ciphertext.
///
/// A fragment too short to carry its framing cannot be authenticated.
pub fn parse(fragment_a: &[u8]) -> SealResult<Sealed> {
    if fragment_a.len() < FRAGMENT_A_HEADER {
        return Err(SealError::AuthenticationFailure(format!(
            "fragment A too short: {} bytes (minimum {})",
            fragment_a.len(),
            FRAGMENT_A_HEADER
        )));
    }

    let (nonce_bytes, rest) = fragment_a.split_at(NONCE_SIZE);
    let (tag_bytes, ciphertext) = rest.split_at(TAG_SIZE);

    let mut nonce = [0u8; NONCE_SIZE];
    nonce.copy_from_slice(nonce_bytes);
    let mut tag = [0u8; TAG_SIZE];
    tag.copy_from_slice(tag_bytes);

    Ok(Sealed {
        ciphertext: ciphertext.to_vec(),
        nonce,
        tag,
    })
}

/// Compute fragment B for `fragment_a` under both keys. Pure.
pub fn bind_fragment_b(fragment_a: &[u8], keys: &HardwareKeys) -> FragmentB {
    let binding = Sha512::new()
        .chain_update(Sha512::digest(fragment_a))
        .chain_update(Sha512::digest(keys.key_a()))
        .chain_update(Sha512::digest(keys.key_b()))
        .finalize();

    let mut fragment_b = [0u8; FRAGMENT_B_SIZE];
    fragment_b.copy_from_slice(&binding[..FRAGMENT_B_SIZE]);
    fragment_b
}

/// Recompute fragment B and compare in constant time.
///
/// Slices of the wrong length never verify.
pub fn verify_binding(fragment_a: &[u8], fragment_b: &[u8], keys: &HardwareKeys) -> bool {
    let expected = bind_fragment_b(fragment_a, keys);
    fragment_b.len() == FRAGMENT_B_SIZE && bool::from(expected[..].ct_eq(fragment_b))
}
