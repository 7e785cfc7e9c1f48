//! Error taxonomy for the workflow engine

use thiserror::Error;

/// Result type alias for intel operations
pub type Result<T> = std::result::Result<T, IntelError>;

/// Errors produced by the orchestration core
///
/// The taxonomy distinguishes transient failures (retried with backoff)
/// from unrecoverable ones (the failing provider is suppressed for the
/// rest of the session) and from conditions that are fatal to a whole
/// session (`NoEvidenceAvailable`, `Cancelled`).
#[derive(Debug, Error)]
pub enum IntelError {
    /// Provider failed in a way worth retrying (network, timeout)
    #[error("transient provider failure: {0}")]
    TransientProvider(String),

    /// Provider failed structurally (bad credentials, quota exhausted);
    /// not retried, provider suppressed for the session
    #[error("provider {provider} failed unrecoverably: {reason}")]
    UnrecoverableProvider {
        provider: String,
        reason: String,
    },

    /// Every enabled provider failed; fatal to the Collecting state
    #[error("no provider returned usable evidence")]
    NoEvidenceAvailable,

    /// Stage output did not match its expected schema
    #[error("{stage} output violated schema: {detail}")]
    SchemaViolation {
        stage: String,
        detail: String,
    },

    /// The underlying reasoning call failed at the transport level
    #[error("{stage} transport failure: {detail}")]
    StageTransport {
        stage: String,
        detail: String,
    },

    /// Session was cancelled by the user; terminal
    #[error("session cancelled: {0}")]
    Cancelled(String),

    /// Invalid query or market domain
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Session store error
    #[error("store error: {0}")]
    Store(String),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl IntelError {
    /// Whether this error is worth retrying with backoff
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            IntelError::TransientProvider(_) | IntelError::StageTransport { .. }
        )
    }
}
