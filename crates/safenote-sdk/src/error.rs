use thiserror::Error;

pub type Result<T> = std::result::Result<T, SdkError>;

#[derive(Error, Debug)]
pub enum SdkError {
    #[error("No connected account")]
    NotConnected,

    #[error("Encryption session initialization failed: {0}")]
    InitializationFailed(String),

    #[error("Invalid input: {0}")]
    ValidationFailed(String),

    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("Transaction rejected by user")]
    UserRejected,

    #[error("Ledger unavailable: {0}")]
    LedgerUnavailable(String),

    /// Idempotent success signal: the ledger already recorded a verification.
    #[error("Data already verified: {0}")]
    AlreadyVerified(String),

    #[error("Note not found: {0}")]
    NotFound(String),

    #[error("Operation already in progress: {0}")]
    OperationInFlight(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Network error: {0}")]
    Network(#[from] safenote_network::NetworkError),
}

impl SdkError {
    pub fn is_already_verified(&self) -> bool {
        matches!(self, SdkError::AlreadyVerified(_))
    }

    pub fn is_user_rejected(&self) -> bool {
        matches!(self, SdkError::UserRejected)
    }
}
