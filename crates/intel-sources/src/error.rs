//! Error types for data providers

use thiserror::Error;

/// Errors returned by a single provider fetch
///
/// The split between transient and unrecoverable drives the aggregator:
/// transient failures are retried with backoff, unrecoverable ones suppress
/// the provider for the rest of the session.
#[derive(Error, Debug)]
pub enum ProviderError {
    /// Failure that a retry could plausibly fix (timeout, 5xx, rate limit)
    #[error("transient provider failure: {0}")]
    Transient(String),

    /// Failure that retrying cannot fix (bad credentials, exhausted quota)
    #[error("unrecoverable provider failure: {0}")]
    Unrecoverable(String),
}

impl ProviderError {
    /// Whether the aggregator should retry this fetch
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    /// Classify an HTTP status into transient or unrecoverable
    pub fn from_status(status: reqwest::StatusCode, body: String) -> Self {
        match status.as_u16() {
            401 | 403 => Self::Unrecoverable(format!("HTTP {status}: {body}")),
            // 429 means we were rate limited; worth retrying after backoff
            _ => Self::Transient(format!("HTTP {status}: {body}")),
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        // Transport-level failures (timeouts, connection resets) are retryable
        Self::Transient(e.to_string())
    }
}
