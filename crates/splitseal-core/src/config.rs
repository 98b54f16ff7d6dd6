use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{SealError, SealResult};

/// Top-level configuration (loaded from splitseal.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SplitsealConfig {
    pub protection: ProtectionConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
}

impl SplitsealConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(content: &str) -> SealResult<Self> {
        let config: Self =
            toml::from_str(content).map_err(|e| SealError::Config(format!("parsing config: {e}")))?;
        config.protection.validate()?;
        Ok(config)
    }

    /// Load from `path`, falling back to defaults when the file does not exist.
    pub fn load(path: &Path) -> SealResult<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "config file not found, using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }
}

/// Immutable pipeline parameters handed to the security core per instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtectionConfig {
    /// Number of canary tokens interleaved into each payload (default: 3)
    pub canary_count: u32,
    /// Lowest accepted fraction of set bits in a hardware key (default: 0.2)
    pub min_bit_density: f64,
    /// Highest accepted fraction of set bits in a hardware key (default: 0.8)
    pub max_bit_density: f64,
    /// Default for `ProtectOptions::anti_tampering` (default: true)
    pub anti_tampering: bool,
}

impl Default for ProtectionConfig {
    fn default() -> Self {
        Self {
            canary_count: 3,
            min_bit_density: 0.2,
            max_bit_density: 0.8,
            anti_tampering: true,
        }
    }
}

impl ProtectionConfig {
    pub fn validate(&self) -> SealResult<()> {
        if self.canary_count == 0 || self.canary_count > 64 {
            return Err(SealError::Config(format!(
                "protection.canary_count must be in 1..=64, got {}",
                self.canary_count
            )));
        }
        let in_unit = |v: f64| (0.0..=1.0).contains(&v);
        if !in_unit(self.min_bit_density)
            || !in_unit(self.max_bit_density)
            || self.min_bit_density >= self.max_bit_density
        {
            return Err(SealError::Config(format!(
                "protection bit density bounds must satisfy 0 <= min < max <= 1, got [{}, {}]",
                self.min_bit_density, self.max_bit_density
            )));
        }
        Ok(())
    }
}

/// Where fragment A, metadata, and the anchor ledger live
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Backend: "memory", "fs", or "s3"
    pub backend: String,
    /// Root directory for the fs backend
    pub root: PathBuf,
    /// S3 endpoint
    pub endpoint: String,
    /// S3 region (default: us-east-1)
    pub region: String,
    /// S3 bucket name
    pub bucket: String,
    /// Key prefix for all objects written by splitseal
    pub prefix: String,
    /// Refuse plaintext HTTP S3 endpoints
    pub enforce_tls: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: "fs".into(),
            root: PathBuf::from("~/.local/share/splitseal"),
            endpoint: "http://localhost:8333".into(),
            region: "us-east-1".into(),
            bucket: "splitseal".into(),
            prefix: "splitseal".into(),
            enforce_tls: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (default: info)
    pub level: String,
    /// Log format: "json" or "text"
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}
