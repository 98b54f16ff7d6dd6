//! Bulk storage for fragment A and its protection metadata
//!
//! Every sealed version is kept under its own key, named by the first 32 hex
//! characters of its commitment, so a new write never touches the fragment
//! an existing anchor points at.
//!
//! Layout under the configured prefix:
//! ```text
//! {prefix}/fragments/{owner}/{version}.bin    fragment A (opaque)
//! {prefix}/metadata/{owner}/{version}.json    ProtectionMetadata (camelCase JSON)
//! ```

use opendal::Operator;

use splitseal_core::{ProtectionMetadata, SealError, SealResult};

use crate::storage_error;

const MAX_OWNER_LEN: usize = 128;

/// Hex characters of the commitment used as the version id
pub const VERSION_HEX_LEN: usize = 32;

/// Version id for the fragment committed to by `commitment`.
pub fn version_id(commitment: &str) -> SealResult<&str> {
    match commitment.get(..VERSION_HEX_LEN) {
        Some(v) if v.bytes().all(|b| b.is_ascii_hexdigit()) => Ok(v),
        _ => Err(SealError::Storage(format!(
            "commitment {commitment:?} does not name a fragment version"
        ))),
    }
}

/// Owner ids become path segments: ASCII alphanumerics plus `-_.:@`, no `..`.
pub fn validate_owner_id(owner: &str) -> SealResult<()> {
    if owner.is_empty() || owner.len() > MAX_OWNER_LEN {
        return Err(SealError::Storage(format!(
            "owner id must be 1..={MAX_OWNER_LEN} characters, got {}",
            owner.len()
        )));
    }
    if owner.contains("..")
        || !owner
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ':' | '@'))
    {
        return Err(SealError::Storage(format!("invalid owner id {owner:?}")));
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct FragmentStore {
    op: Operator,
    prefix: String,
}

impl FragmentStore {
    pub fn new(op: Operator, prefix: &str) -> Self {
        Self {
            op,
            prefix: prefix.trim_end_matches('/').to_string(),
        }
    }

    pub fn fragment_key(&self, owner: &str, version: &str) -> String {
        format!("{}/fragments/{owner}/{version}.bin", self.prefix)
    }

    pub fn metadata_key(&self, owner: &str, version: &str) -> String {
        format!("{}/metadata/{owner}/{version}.json", self.prefix)
    }

    /// Store fragment A and its metadata as `version`. Other versions of the
    /// same owner are left untouched.
    pub async fn store(
        &self,
        owner: &str,
        version: &str,
        fragment_a: &[u8],
        metadata: &ProtectionMetadata,
    ) -> SealResult<()> {
        validate_owner_id(owner)?;
        validate_version(version)?;
        let metadata_bytes = metadata
            .to_bytes()
            .map_err(|e| SealError::Storage(format!("encoding metadata: {e}")))?;

        let fragment_key = self.fragment_key(owner, version);
        self.op
            .write(&fragment_key, fragment_a.to_vec())
            .await
            .map_err(|e| storage_error(&fragment_key, e))?;

        let metadata_key = self.metadata_key(owner, version);
        self.op
            .write(&metadata_key, metadata_bytes)
            .await
            .map_err(|e| storage_error(&metadata_key, e))?;

        tracing::debug!(owner, version, bytes = fragment_a.len(), key = %fragment_key, "fragment A stored");
        Ok(())
    }

    pub async fn retrieve(
        &self,
        owner: &str,
        version: &str,
    ) -> SealResult<(Vec<u8>, ProtectionMetadata)> {
        validate_owner_id(owner)?;
        validate_version(version)?;

        let fragment_key = self.fragment_key(owner, version);
        let fragment_a = self
            .op
            .read(&fragment_key)
            .await
            .map_err(|e| storage_error(&fragment_key, e))?
            .to_bytes()
            .to_vec();

        let metadata_key = self.metadata_key(owner, version);
        let metadata_bytes = self
            .op
            .read(&metadata_key)
            .await
            .map_err(|e| storage_error(&metadata_key, e))?
            .to_bytes()
            .to_vec();
        let metadata = ProtectionMetadata::from_bytes(&metadata_bytes)
            .map_err(|e| SealError::Storage(format!("{metadata_key}: {e}")))?;

        tracing::debug!(owner, version, bytes = fragment_a.len(), "fragment A retrieved");
        Ok((fragment_a, metadata))
    }

    pub async fn exists(&self, owner: &str, version: &str) -> SealResult<bool> {
        validate_owner_id(owner)?;
        validate_version(version)?;
        let key = self.fragment_key(owner, version);
        self.op.exists(&key).await.map_err(|e| storage_error(&key, e))
    }

    /// Remove one version's fragment A and metadata. Removing a missing
    /// version is not an error.
    pub async fn remove(&self, owner: &str, version: &str) -> SealResult<()> {
        validate_owner_id(owner)?;
        validate_version(version)?;
        for key in [
            self.fragment_key(owner, version),
            self.metadata_key(owner, version),
        ] {
            self.op.delete(&key).await.map_err(|e| storage_error(&key, e))?;
        }
        tracing::debug!(owner, version, "fragment A removed");
        Ok(())
    }
}

fn validate_version(version: &str) -> SealResult<()> {
    if version.len() != VERSION_HEX_LEN || !version.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(SealError::Storage(format!("invalid fragment version {version:?}")));
    }
    Ok(())
}
