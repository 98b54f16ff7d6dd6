use thiserror::Error;

pub type SealResult<T> = Result<T, SealError>;

/// Every failure is terminal. The pipeline is a deterministic transform, so
/// retrying `unprotect` with unchanged inputs can never succeed where it
/// previously failed; retries belong to the storage and ledger collaborators.
#[derive(Debug, Error)]
pub enum SealError {
    #[error("invalid key material: {0}")]
    InvalidKeyMaterial(String),

    #[error("invalid seed material: {0}")]
    InvalidSeedMaterial(String),

    #[error("key fingerprint mismatch: expected {expected}, got {actual}")]
    FingerprintMismatch { expected: String, actual: String },

    #[error("authentication failure: {0}")]
    AuthenticationFailure(String),

    #[error("tamper detected: {0}")]
    TamperDetected(String),

    #[error("corrupted payload: {0}")]
    CorruptedPayload(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("ledger error: {0}")]
    Ledger(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Failure class of a [`SealError`], for callers that branch on the kind
/// without caring about the detail message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidKeyMaterial,
    InvalidSeedMaterial,
    FingerprintMismatch,
    AuthenticationFailure,
    TamperDetected,
    CorruptedPayload,
    Storage,
    Ledger,
    NotFound,
    Config,
    Io,
    Other,
}

impl SealError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SealError::InvalidKeyMaterial(_) => ErrorKind::InvalidKeyMaterial,
            SealError::InvalidSeedMaterial(_) => ErrorKind::InvalidSeedMaterial,
            SealError::FingerprintMismatch { .. } => ErrorKind::FingerprintMismatch,
            SealError::AuthenticationFailure(_) => ErrorKind::AuthenticationFailure,
            SealError::TamperDetected(_) => ErrorKind::TamperDetected,
            SealError::CorruptedPayload(_) => ErrorKind::CorruptedPayload,
            SealError::Storage(_) => ErrorKind::Storage,
            SealError::Ledger(_) => ErrorKind::Ledger,
            SealError::NotFound(_) => ErrorKind::NotFound,
            SealError::Config(_) => ErrorKind::Config,
            SealError::Io(_) => ErrorKind::Io,
            SealError::Other(_) => ErrorKind::Other,
        }
    }

    /// True for the kinds raised by the cryptographic pipeline itself, as
    /// opposed to the I/O collaborators around it.
    pub fn is_integrity_failure(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::FingerprintMismatch
                | ErrorKind::AuthenticationFailure
                | ErrorKind::TamperDetected
                | ErrorKind::CorruptedPayload
        )
    }
}
