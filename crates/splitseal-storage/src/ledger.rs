//! Append-only anchor ledger for fragment B and the commitment
//!
//! Each protect call appends one anchor per owner. Anchors are never
//! rewritten; readers take the highest sequence number as current.
//!
//! OpenDAL layout:
//! ```text
//! {prefix}/ledger/{owner}/{sequence:020}.json
//! ```

use async_trait::async_trait;
use opendal::Operator;
use serde::{Deserialize, Serialize};

use splitseal_core::{SealError, SealResult};
use splitseal_crypto::{FragmentB, FRAGMENT_B_SIZE};

use crate::fragments::validate_owner_id;
use crate::storage_error;

/// One ledger entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerAnchor {
    pub owner: String,
    /// Position in this owner's chain, starting at 0
    pub sequence: u64,
    /// Fragment B, hex-encoded
    pub fragment_b: String,
    pub commitment: String,
    pub fingerprint: String,
    pub fragment_a_size: u64,
    /// Commitment of the anchor this one supersedes
    #[serde(default)]
    pub previous_commitment: Option<String>,
    pub anchored_at: u64,
}

impl LedgerAnchor {
    /// Decode the hex fragment B back to bytes.
    pub fn fragment_b_bytes(&self) -> SealResult<FragmentB> {
        let bytes = hex::decode(&self.fragment_b)
            .map_err(|e| SealError::Ledger(format!("anchor fragment B is not hex: {e}")))?;
        <FragmentB>::try_from(bytes.as_slice()).map_err(|_| {
            SealError::Ledger(format!(
                "anchor fragment B is {} bytes, expected {FRAGMENT_B_SIZE}",
                bytes.len()
            ))
        })
    }
}

/// What the caller wants anchored; the ledger assigns sequence and chaining.
#[derive(Debug, Clone)]
pub struct AnchorRequest<'a> {
    pub owner: &'a str,
    pub fragment_b: &'a FragmentB,
    pub commitment: &'a str,
    pub fingerprint: &'a str,
    pub fragment_a_size: u64,
}

/// Tamper-evident store for fragment B and commitments
#[async_trait]
pub trait AnchorLedger: Send + Sync {
    /// Append a new anchor and return it as stored.
    async fn anchor(&self, request: AnchorRequest<'_>) -> SealResult<LedgerAnchor>;

    /// Most recent anchor for `owner`, or `None` if nothing was anchored.
    async fn latest(&self, owner: &str) -> SealResult<Option<LedgerAnchor>>;

    /// Every anchor for `owner`, oldest first.
    async fn history(&self, owner: &str) -> SealResult<Vec<LedgerAnchor>>;
}

/// [`AnchorLedger`] backed by an OpenDAL operator
#[derive(Debug, Clone)]
pub struct OpendalLedger {
    op: Operator,
    prefix: String,
}

impl OpendalLedger {
    pub fn new(op: Operator, prefix: &str) -> Self {
        Self {
            op,
            prefix: prefix.trim_end_matches('/').to_string(),
        }
    }

    fn owner_dir(&self, owner: &str) -> String {
        format!("{}/ledger/{owner}/", self.prefix)
    }

    pub fn anchor_key(&self, owner: &str, sequence: u64) -> String {
        format!("{}{sequence:020}.json", self.owner_dir(owner))
    }

    async fn sequences(&self, owner: &str) -> SealResult<Vec<u64>> {
        let dir = self.owner_dir(owner);
        let entries = match self.op.list(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == opendal::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(SealError::Ledger(format!("listing {dir}: {e}"))),
        };

        let mut sequences: Vec<u64> = entries
            .iter()
            .filter_map(|entry| entry.name().strip_suffix(".json")?.parse().ok())
            .collect();
        sequences.sort_unstable();
        Ok(sequences)
    }

    async fn read_anchor(&self, owner: &str, sequence: u64) -> SealResult<LedgerAnchor> {
        let key = self.anchor_key(owner, sequence);
        let bytes = self
            .op
            .read(&key)
            .await
            .map_err(|e| storage_error(&key, e))?
            .to_bytes();
        serde_json::from_slice(&bytes).map_err(|e| SealError::Ledger(format!("{key}: {e}")))
    }
}

#[async_trait]
impl AnchorLedger for OpendalLedger {
    async fn anchor(&self, request: AnchorRequest<'_>) -> SealResult<LedgerAnchor> {
        validate_owner_id(request.owner)?;

        let previous = match self.sequences(request.owner).await?.last() {
            Some(&seq) => Some(self.read_anchor(request.owner, seq).await?),
            None => None,
        };
        let sequence = previous.as_ref().map_or(0, |p| p.sequence + 1);
        let key = self.anchor_key(request.owner, sequence);

        if self.op.exists(&key).await.map_err(|e| storage_error(&key, e))? {
            return Err(SealError::Ledger(format!(
                "anchor {sequence} for {} already exists; ledger entries are immutable",
                request.owner
            )));
        }

        let anchor = LedgerAnchor {
            owner: request.owner.to_string(),
            sequence,
            fragment_b: hex::encode(request.fragment_b),
            commitment: request.commitment.to_string(),
            fingerprint: request.fingerprint.to_string(),
            fragment_a_size: request.fragment_a_size,
            previous_commitment: previous.map(|p| p.commitment),
            anchored_at: unix_now(),
        };
        let body = serde_json::to_vec_pretty(&anchor)
            .map_err(|e| SealError::Ledger(format!("encoding anchor: {e}")))?;
        self.op
            .write(&key, body)
            .await
            .map_err(|e| SealError::Ledger(format!("writing {key}: {e}")))?;

        tracing::info!(owner = %anchor.owner, sequence, "fragment B anchored");
        Ok(anchor)
    }

    async fn latest(&self, owner: &str) -> SealResult<Option<LedgerAnchor>> {
        validate_owner_id(owner)?;
        match self.sequences(owner).await?.last() {
            Some(&seq) => Ok(Some(self.read_anchor(owner, seq).await?)),
            None => Ok(None),
        }
    }

    async fn history(&self, owner: &str) -> SealResult<Vec<LedgerAnchor>> {
        validate_owner_id(owner)?;
        let mut anchors = Vec::new();
        for seq in self.sequences(owner).await? {
            anchors.push(self.read_anchor(owner, seq).await?);
        }
        Ok(anchors)
    }
}

fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
