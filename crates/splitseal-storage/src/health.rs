//! Storage health check

use anyhow::Result;
use opendal::Operator;

/// Verify the backend is reachable by listing the splitseal prefix
pub async fn check_health(op: &Operator, prefix: &str) -> Result<()> {
    let dir = format!("{}/", prefix.trim_end_matches('/'));
    match op.list(&dir).await {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == opendal::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(anyhow::anyhow!("storage health check failed: {e}")),
    }
}

/// Returns true if storage is reachable, false otherwise (non-panicking)
pub async fn is_healthy(op: &Operator, prefix: &str) -> bool {
    check_health(op, prefix).await.is_ok()
}
