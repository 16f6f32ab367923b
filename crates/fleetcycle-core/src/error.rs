//! Provider error taxonomy.

use thiserror::Error;

/// Result type alias for fleet provider operations.
pub type FleetResult<T> = Result<T, FleetError>;

/// Errors surfaced by a fleet provider.
///
/// `NotFound` terminates a run immediately; `Transport` is retried
/// with backoff at poll points; `Rejected` is avoided proactively
/// (capacity pre-checks) and fatal if it happens anyway.
#[derive(Debug, Error)]
pub enum FleetError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("request rejected: {0}")]
    Rejected(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("malformed provider response: {0}")]
    Decode(String),
}

impl FleetError {
    /// Whether this error is worth retrying at a poll point.
    pub fn is_transient(&self) -> bool {
        matches!(self, FleetError::Transport(_))
    }
}
