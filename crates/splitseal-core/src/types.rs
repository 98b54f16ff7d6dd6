use serde::{Deserialize, Serialize};

/// A caller-supplied structured document. Keys are kept sorted, which gives
/// the record a canonical serialized form.
pub type ProtectedRecord = serde_json::Map<String, serde_json::Value>;

/// Per-call options for `protect`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProtectOptions {
    /// Interleave canary tokens into the plaintext before encryption
    pub anti_tampering: bool,
    /// Explicit 16-byte nonce. A fresh random nonce is drawn when `None`.
    /// Callers must never reuse a nonce under the same key pair.
    pub nonce: Option<[u8; 16]>,
}

impl Default for ProtectOptions {
    fn default() -> Self {
        Self {
            anti_tampering: true,
            nonce: None,
        }
    }
}

/// Switches recorded at protect time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtectionFlags {
    pub anti_tampering: bool,
    /// Keys were derived with a sealed hardware secret mixed in
    #[serde(default)]
    pub sealed_derivation: bool,
}

impl Default for ProtectionFlags {
    fn default() -> Self {
        Self {
            anti_tampering: true,
            sealed_derivation: false,
        }
    }
}

/// Metadata that travels with the two fragments. Required by `unprotect`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtectionMetadata {
    /// Algorithm suite identifier
    pub algorithm: String,
    /// First 16 hex chars of SHA-256(keyA || keyB)
    pub fingerprint: String,
    /// Number of canary tokens interleaved (0 when anti-tampering is off)
    pub canary_count: u32,
    /// Size of the canonical serialized record in bytes
    pub original_size: u64,
    pub fragment_a_size: u64,
    pub fragment_b_size: u64,
    pub flags: ProtectionFlags,
    /// Unix timestamp (seconds) of the protect call
    pub created_at: u64,
}

impl ProtectionMetadata {
    pub fn to_bytes(&self) -> anyhow::Result<Vec<u8>> {
        serde_json::to_vec_pretty(self).map_err(|e| anyhow::anyhow!("metadata serialization: {e}"))
    }

    pub fn from_bytes(data: &[u8]) -> anyhow::Result<Self> {
        serde_json::from_slice(data).map_err(|e| anyhow::anyhow!("metadata deserialization: {e}"))
    }

    /// Short human-readable protection summary.
    pub fn summary(&self) -> String {
        let tampering = if self.flags.anti_tampering {
            format!("enabled ({} canaries)", self.canary_count)
        } else {
            "disabled".to_string()
        };
        let derivation = if self.flags.sealed_derivation {
            "sealed"
        } else {
            "public-only"
        };
        format!(
            "algorithm:       {}\n\
             fingerprint:     {}\n\
             anti-tampering:  {}\n\
             key derivation:  {}\n\
             original size:   {} bytes\n\
             fragment A:      {} bytes\n\
             fragment B:      {} bytes\n\
             created at:      {}",
            self.algorithm,
            self.fingerprint,
            tampering,
            derivation,
            self.original_size,
            self.fragment_a_size,
            self.fragment_b_size,
            self.created_at,
        )
    }
}
