//! OpenDAL Operator factory for splitseal storage backends

use anyhow::{Context, Result};
use opendal::Operator;

use splitseal_core::config::StorageConfig;

/// Credentials for S3-compatible backends, loaded by the caller
#[derive(Clone, Default)]
pub struct S3Credentials {
    pub access_key_id: String,
    pub secret_access_key: String,
}

impl std::fmt::Debug for S3Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"[REDACTED]")
            .finish()
    }
}

/// Build an operator for the configured backend: `memory`, `fs`, or `s3`.
///
/// For `s3`, an HTTP endpoint is an error when `enforce_tls` is set and a
/// warning otherwise.
pub fn build_operator(storage: &StorageConfig, credentials: Option<&S3Credentials>) -> Result<Operator> {
    match storage.backend.as_str() {
        "memory" => memory_operator(),
        "fs" => fs_operator(&storage.root.to_string_lossy()),
        "s3" => {
            let credentials = credentials.cloned().unwrap_or_default();
            s3_operator(storage, &credentials)
        }
        other => anyhow::bail!("unknown storage backend {other:?} (expected memory, fs or s3)"),
    }
}

/// Volatile in-process storage
pub fn memory_operator() -> Result<Operator> {
    let op = Operator::new(opendal::services::Memory::default())
        .context("creating OpenDAL memory operator")?
        .layer(opendal::layers::LoggingLayer::default())
        .finish();
    Ok(op)
}

/// Local directory storage rooted at `root` (created on first write)
pub fn fs_operator(root: &str) -> Result<Operator> {
    let root = expand_home(root);
    let builder = opendal::services::Fs::default().root(&root);
    let op = Operator::new(builder)
        .with_context(|| format!("creating OpenDAL fs operator at {root}"))?
        .layer(opendal::layers::LoggingLayer::default())
        .finish();
    Ok(op)
}

/// S3-compatible storage (SeaweedFS, MinIO, AWS). Path-style addressing.
pub fn s3_operator(storage: &StorageConfig, credentials: &S3Credentials) -> Result<Operator> {
    if storage.endpoint.starts_with("http://") {
        if storage.enforce_tls {
            anyhow::bail!(
                "S3 endpoint uses plaintext HTTP ({}), but enforce_tls is enabled. \
                 Use an HTTPS endpoint or set storage.enforce_tls = false for local development.",
                storage.endpoint
            );
        }
        tracing::warn!(
            endpoint = %storage.endpoint,
            "S3 endpoint uses plaintext HTTP; credentials are transmitted unencrypted"
        );
    }

    // opendal 0.55: S3 builder uses consuming pattern (methods take `self`, return `Self`)
    let builder = opendal::services::S3::default()
        .endpoint(&storage.endpoint)
        .region(&storage.region)
        .bucket(&storage.bucket)
        .access_key_id(&credentials.access_key_id)
        .secret_access_key(&credentials.secret_access_key);

    let op = Operator::new(builder)
        .context("creating OpenDAL S3 operator")?
        .layer(opendal::layers::LoggingLayer::default())
        .layer(
            opendal::layers::RetryLayer::new()
                .with_max_times(5)
                .with_jitter(),
        )
        .finish();

    Ok(op)
}

fn expand_home(path: &str) -> String {
    match (path.strip_prefix("~/"), std::env::var("HOME")) {
        (Some(rest), Ok(home)) => format!("{}/{rest}", home.trim_end_matches('/')),
        _ => path.to_string(),
    }
}
