//! Canary tokens: random markers interleaved into the plaintext
//!
//! Marked layout for `n` tokens over data of length `L`:
//! ```text
//! [chunk_0][token_0][chunk_1][token_1] ... [chunk_{n-1}][token_{n-1}]
//! chunk_i = L / n bytes, the last chunk absorbs the remainder
//! token_i = 16 random bytes
//! verification = SHA-256(token_0 || token_1 || ... || token_{n-1})
//! ```
//!
//! Any byte change inside a token, or a length mismatch that shifts the
//! token stride, fails verification.

use rand::RngCore;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use splitseal_core::{SealError, SealResult};

use crate::{CANARY_TOKEN_SIZE, DEFAULT_CANARY_COUNT};

/// Output of [`CanaryTokenManager::inject`]
#[derive(Debug, Clone)]
pub struct MarkedPayload {
    pub data: Vec<u8>,
    pub verification: [u8; 32],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CanaryTokenManager {
    token_count: usize,
}

impl Default for CanaryTokenManager {
    fn default() -> Self {
        Self::new(DEFAULT_CANARY_COUNT)
    }
}

impl CanaryTokenManager {
    /// `token_count` of zero is treated as one.
    pub fn new(token_count: usize) -> Self {
        Self {
            token_count: token_count.max(1),
        }
    }

    pub fn token_count(&self) -> usize {
        self.token_count
    }

    /// Length of the marked payload for `original_length` bytes of data,
    /// or `None` if it does not fit in `usize`.
    pub fn marked_len(&self, original_length: usize) -> Option<usize> {
        self.token_count
            .checked_mul(CANARY_TOKEN_SIZE)?
            .checked_add(original_length)
    }

    pub fn inject(&self, data: &[u8]) -> MarkedPayload {
        let mut tokens = vec![0u8; self.token_count * CANARY_TOKEN_SIZE];
        rand::thread_rng().fill_bytes(&mut tokens);

        let mut marked = Vec::with_capacity(tokens.len() + data.len());
        for (i, token) in tokens.chunks_exact(CANARY_TOKEN_SIZE).enumerate() {
            let (start, end) = self.chunk_bounds(data.len(), i);
            marked.extend_from_slice(&data[start..end]);
            marked.extend_from_slice(token);
        }

        MarkedPayload {
            data: marked,
            verification: token_digest(&tokens),
        }
    }

    /// Verify the tokens and strip them, returning the original bytes.
    pub fn extract(
        &self,
        marked: &[u8],
        verification: &[u8; 32],
        original_length: usize,
    ) -> SealResult<Vec<u8>> {
        // allocations below are bounded by `marked.len()` once this holds
        if self.marked_len(original_length) != Some(marked.len()) {
            return Err(SealError::TamperDetected(format!(
                "marked payload is {} bytes, which does not fit {} canaries over {} bytes",
                marked.len(),
                self.token_count,
                original_length
            )));
        }

        let mut data = Vec::with_capacity(original_length);
        let mut tokens = Vec::with_capacity(self.token_count * CANARY_TOKEN_SIZE);
        let mut offset = 0;
        for i in 0..self.token_count {
            let (start, end) = self.chunk_bounds(original_length, i);
            let chunk_len = end - start;
            data.extend_from_slice(&marked[offset..offset + chunk_len]);
            offset += chunk_len;
            tokens.extend_from_slice(&marked[offset..offset + CANARY_TOKEN_SIZE]);
            offset += CANARY_TOKEN_SIZE;
        }

        let computed = token_digest(&tokens);
        if !bool::from(computed[..].ct_eq(&verification[..])) {
            tracing::warn!(canaries = self.token_count, "canary verification failed");
            return Err(SealError::TamperDetected(
                "canary tokens corrupted".into(),
            ));
        }

        Ok(data)
    }

    fn chunk_bounds(&self, len: usize, index: usize) -> (usize, usize) {
        let chunk_size = len / self.token_count;
        let start = index * chunk_size;
        let end = if index + 1 == self.token_count {
            len
        } else {
            start + chunk_size
        };
        (start, end)
    }
}

fn token_digest(tokens: &[u8]) -> [u8; 32] {
    let mut out = [0u8; 32];
    out.copy_from_slice(&Sha256::digest(tokens));
    out
}
