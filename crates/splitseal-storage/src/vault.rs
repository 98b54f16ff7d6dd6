//! Fragment vault: the security core wired to bulk storage and the ledger
//!
//! `seal` protects a record, writes fragment A and metadata to the
//! [`FragmentStore`] under a version named by the commitment, then anchors
//! fragment B and the commitment. `open` reverses it from the latest anchor,
//! reading the fragment version that anchor commits to. A failed anchor
//! leaves the previously anchored version readable.

use opendal::Operator;

use splitseal_core::config::ProtectionConfig;
use splitseal_core::{ProtectOptions, ProtectedRecord, ProtectionMetadata, SealError, SealResult};
use splitseal_crypto::{integrity_report, HardwareKeys, IntegrityReport, SecurityCore};

use crate::fragments::{version_id, FragmentStore};
use crate::ledger::{AnchorLedger, AnchorRequest, LedgerAnchor, OpendalLedger};

/// Result of a successful `seal`
#[derive(Debug, Clone)]
pub struct SealReceipt {
    pub anchor: LedgerAnchor,
    pub metadata: ProtectionMetadata,
}

pub struct FragmentVault<L = OpendalLedger> {
    core: SecurityCore,
    store: FragmentStore,
    ledger: L,
}

impl FragmentVault<OpendalLedger> {
    /// Fragments and ledger share one operator under `prefix`.
    pub fn from_operator(op: Operator, prefix: &str, config: ProtectionConfig) -> SealResult<Self> {
        Ok(Self::new(
            SecurityCore::new(config)?,
            FragmentStore::new(op.clone(), prefix),
            OpendalLedger::new(op, prefix),
        ))
    }
}

impl<L: AnchorLedger> FragmentVault<L> {
    pub fn new(core: SecurityCore, store: FragmentStore, ledger: L) -> Self {
        Self {
            core,
            store,
            ledger,
        }
    }

    pub fn core(&self) -> &SecurityCore {
        &self.core
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    pub async fn seal(
        &self,
        owner: &str,
        record: &ProtectedRecord,
        keys: &HardwareKeys,
        options: &ProtectOptions,
    ) -> SealResult<SealReceipt> {
        let out = self.core.protect(record, keys, options)?;
        let version = version_id(&out.commitment)?;
        let existed = self.store.exists(owner, version).await?;

        self.store
            .store(owner, version, &out.fragment_a, &out.metadata)
            .await?;
        let anchored = self
            .ledger
            .anchor(AnchorRequest {
                owner,
                fragment_b: &out.fragment_b,
                commitment: &out.commitment,
                fingerprint: &out.metadata.fingerprint,
                fragment_a_size: out.metadata.fragment_a_size,
            })
            .await;
        let anchor = match anchored {
            Ok(anchor) => anchor,
            Err(e) if existed => return Err(e),
            Err(e) => {
                // nothing points at this version
                if let Err(cleanup) = self.store.remove(owner, version).await {
                    tracing::warn!(owner, version, error = %cleanup, "could not remove unanchored fragment");
                }
                return Err(e);
            }
        };

        tracing::info!(owner, sequence = anchor.sequence, "record sealed");
        Ok(SealReceipt {
            anchor,
            metadata: out.metadata,
        })
    }

    /// Recover the record anchored most recently for `owner`.
    pub async fn open(&self, owner: &str, keys: &HardwareKeys) -> SealResult<ProtectedRecord> {
        let anchor = self.latest_anchor(owner).await?;
        let fragment_b = anchor.fragment_b_bytes()?;
        let (fragment_a, metadata) = self
            .store
            .retrieve(owner, version_id(&anchor.commitment)?)
            .await?;

        if !self
            .core
            .verify_integrity(&fragment_a, &fragment_b, &anchor.commitment, &metadata)
        {
            return Err(SealError::TamperDetected(format!(
                "stored fragments for {owner} do not match anchor {}",
                anchor.sequence
            )));
        }

        let record = self.core.unprotect(&fragment_a, &fragment_b, keys, &metadata)?;
        tracing::info!(owner, sequence = anchor.sequence, "record opened");
        Ok(record)
    }

    /// Integrity report for the stored fragments against the latest anchor.
    /// Needs no keys and never decrypts.
    pub async fn check(&self, owner: &str) -> SealResult<IntegrityReport> {
        let anchor = self.latest_anchor(owner).await?;
        let fragment_b = anchor.fragment_b_bytes()?;
        let (fragment_a, metadata) = self
            .store
            .retrieve(owner, version_id(&anchor.commitment)?)
            .await?;

        let mut report = integrity_report(&fragment_a, &fragment_b, &anchor.commitment);
        report.commitment_valid = self
            .core
            .verify_integrity(&fragment_a, &fragment_b, &anchor.commitment, &metadata);
        Ok(report)
    }

    async fn latest_anchor(&self, owner: &str) -> SealResult<LedgerAnchor> {
        self.ledger
            .latest(owner)
            .await?
            .ok_or_else(|| SealError::NotFound(format!("no anchor for {owner}")))
    }
}
