//! Commitment binding fragment A to fragment B
//!
//! ```text
//! commitment = hex( SHA-512( SHA-512( SHA-512(A) || SHA-512(B) ) ) )   // 128 hex chars
//! ```
//!
//! Order-sensitive: swapping A and B yields a different commitment. Used to
//! detect corruption of either fragment without decrypting.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256, Sha512};
use subtle::ConstantTimeEq;

use crate::COMMITMENT_HEX_LEN;

pub fn compute_commitment(fragment_a: &[u8], fragment_b: &[u8]) -> String {
    let combined = Sha512::new()
        .chain_update(Sha512::digest(fragment_a))
        .chain_update(Sha512::digest(fragment_b))
        .finalize();
    hex::encode(Sha512::digest(combined))
}

/// True iff `commitment` equals the recomputed commitment (constant time).
pub fn verify_commitment(fragment_a: &[u8], fragment_b: &[u8], commitment: &str) -> bool {
    let computed = compute_commitment(fragment_a, fragment_b);
    commitment.len() == COMMITMENT_HEX_LEN
        && bool::from(computed.as_bytes().ct_eq(commitment.as_bytes()))
}

/// One fragment pair to check in [`batch_verify`]
#[derive(Debug, Clone, Copy)]
pub struct FragmentPair<'a> {
    pub fragment_a: &'a [u8],
    pub fragment_b: &'a [u8],
    pub commitment: &'a str,
}

/// Verify many fragment pairs; result `i` corresponds to `pairs[i]`.
pub fn batch_verify(pairs: &[FragmentPair<'_>]) -> Vec<bool> {
    let results: Vec<bool> = pairs
        .iter()
        .map(|p| verify_commitment(p.fragment_a, p.fragment_b, p.commitment))
        .collect();

    let failed = results.iter().filter(|ok| !**ok).count();
    tracing::debug!(pairs = pairs.len(), failed, "batch commitment verification");
    results
}

/// Detailed integrity report for health dashboards
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrityReport {
    pub commitment_valid: bool,
    pub expected_commitment: String,
    pub computed_commitment: String,
    /// SHA-256 of fragment A (hex)
    pub fragment_a_digest: String,
    /// SHA-256 of fragment B (hex)
    pub fragment_b_digest: String,
    pub fragment_a_size: u64,
    pub fragment_b_size: u64,
}

pub fn integrity_report(fragment_a: &[u8], fragment_b: &[u8], commitment: &str) -> IntegrityReport {
    let computed = compute_commitment(fragment_a, fragment_b);
    IntegrityReport {
        commitment_valid: verify_commitment(fragment_a, fragment_b, commitment),
        expected_commitment: commitment.to_string(),
        computed_commitment: computed,
        fragment_a_digest: hex::encode(Sha256::digest(fragment_a)),
        fragment_b_digest: hex::encode(Sha256::digest(fragment_b)),
        fragment_a_size: fragment_a.len() as u64,
        fragment_b_size: fragment_b.len() as u64,
    }
}
