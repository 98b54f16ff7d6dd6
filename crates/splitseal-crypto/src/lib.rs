//! splitseal-crypto: split-key protection of structured records
//!
//! Pipeline: record → canonical JSON → canary injection → encrypt-then-MAC → fragment A → fragment B → commitment
//!
//! Key hierarchy:
//! ```text
//! KeySeed (card material, phone material, identity, optional sealed secret)
//!   ├── Key A (SHA-256 KDF, salt="SPLITSEAL_CARD_KEY_V1", context=identity)
//!   │   └── Encryption key (salt="SPLITSEAL_ENC_KEY_V1", context="splitseal/encrypt")
//!   └── Key B (SHA-256 KDF, salt="SPLITSEAL_PHONE_KEY_V1", context=identity)
//!       └── MAC key (salt="SPLITSEAL_MAC_KEY_V1", context="splitseal/authenticate")
//! ```
//!
//! Both keys are required to rebuild fragment B and the cipher sub-keys, so
//! neither device alone can recover a record.

pub mod binding;
pub mod canary;
pub mod cipher;
pub mod fragment;
pub mod kdf;
pub mod keys;
pub mod pipeline;
pub mod record;

pub use binding::{batch_verify, compute_commitment, integrity_report, verify_commitment, FragmentPair, IntegrityReport};
pub use canary::{CanaryTokenManager, MarkedPayload};
pub use cipher::{EncryptionEngine, HashCtrEngine, Sealed};
pub use fragment::{bind_fragment_b, verify_binding, FragmentB};
pub use kdf::{derive_cipher_keys, derive_hardware_keys, derive_key, KeySeed};
pub use keys::{bit_density, CipherKeys, HardwareKeys};
pub use pipeline::{ProtectStage, ProtectedFragments, SecurityCore, UnprotectStage};

/// Size of each hardware key in bytes (256-bit)
pub const KEY_SIZE: usize = 32;

/// Size of the keystream nonce carried at the head of fragment A
pub const NONCE_SIZE: usize = 16;

/// Size of an HMAC-SHA512 authentication tag
pub const TAG_SIZE: usize = 64;

/// Size of the fragment B binding token
pub const FRAGMENT_B_SIZE: usize = 32;

/// Size of a single canary token
pub const CANARY_TOKEN_SIZE: usize = 16;

pub const DEFAULT_CANARY_COUNT: usize = 3;

/// Length of a key fingerprint in hex characters
pub const FINGERPRINT_HEX_LEN: usize = 16;

/// Length of a commitment in hex characters (SHA-512)
pub const COMMITMENT_HEX_LEN: usize = 128;

/// Algorithm suite prefix written into protection metadata
pub const SUITE_PREFIX: &str = "splitseal-v1";
