//! splitseal-storage: OpenDAL-backed collaborators for the security core
//!
//! Fragment A and metadata go to bulk storage ([`FragmentStore`]); fragment B
//! and the commitment go to an append-only [`AnchorLedger`]. [`FragmentVault`]
//! ties both to a `SecurityCore`.

pub mod fragments;
pub mod health;
pub mod ledger;
pub mod operator;
pub mod vault;

pub use fragments::{validate_owner_id, version_id, FragmentStore};
pub use health::{check_health, is_healthy};
pub use ledger::{AnchorLedger, AnchorRequest, LedgerAnchor, OpendalLedger};
pub use operator::{build_operator, S3Credentials};
pub use vault::{FragmentVault, SealReceipt};

use splitseal_core::SealError;

/// Map an OpenDAL error on `key` to a storage error, keeping not-found distinct.
pub(crate) fn storage_error(key: &str, e: opendal::Error) -> SealError {
    if e.kind() == opendal::ErrorKind::NotFound {
        SealError::NotFound(key.to_string())
    } else {
        SealError::Storage(format!("{key}: {e}"))
    }
}
