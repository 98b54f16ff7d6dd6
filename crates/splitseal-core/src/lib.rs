//! splitseal-core: types shared by the protection pipeline, its storage
//! adapters, and the CLI.

pub mod config;
pub mod error;
pub mod types;

pub use error::{ErrorKind, SealError, SealResult};
pub use types::{ProtectOptions, ProtectionFlags, ProtectionMetadata, ProtectedRecord};
