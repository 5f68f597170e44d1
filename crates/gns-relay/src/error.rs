//! Error types for the relay boundary.

use std::time::Duration;

use thiserror::Error;

/// Errors returned by a relay.
#[derive(Debug, Error)]
pub enum RelayError {
    /// The epoch header or envelope signature did not verify.
    #[error("invalid signature: {0}")]
    InvalidSignature(String),

    /// Epoch index is not the next one the relay expects for the identity.
    #[error("epoch index mismatch: expected {expected}, got {got}")]
    EpochIndex {
        /// Next index the relay would accept.
        expected: u64,
        /// Index that was submitted.
        got: u64,
    },

    /// `prev_epoch_hash` does not point at the relay's latest epoch.
    #[error("epoch does not extend the published chain: {0}")]
    EpochChain(String),

    /// The call did not finish in time.
    #[error("relay call timed out after {0:?}")]
    Timeout(Duration),

    /// The relay could not be reached.
    #[error("relay unavailable: {0}")]
    Unavailable(String),
}

impl RelayError {
    /// Whether the same request may succeed if retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, RelayError::Timeout(_) | RelayError::Unavailable(_))
    }
}

/// Result type for relay operations.
pub type Result<T> = std::result::Result<T, RelayError>;
