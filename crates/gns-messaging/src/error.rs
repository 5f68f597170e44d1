//! Error types for the messaging module.

use thiserror::Error;

/// Errors that can occur while sealing or opening envelopes.
///
/// Every cryptographic failure is terminal for the envelope: no partial
/// plaintext is ever returned.
#[derive(Debug, Error)]
pub enum MessagingError {
    /// The envelope signature does not verify against `from_pk`.
    #[error("envelope signature verification failed")]
    InvalidSignature,

    /// AEAD authentication failed.
    #[error("message decryption failed")]
    Decryption,

    /// Encryption failed.
    #[error("message encryption failed: {0}")]
    Encryption(String),

    /// The envelope is addressed to someone else.
    #[error("envelope is not addressed to this identity")]
    WrongRecipient,

    /// Key agreement produced a low-order (all-zero) shared secret.
    #[error("key agreement was not contributory")]
    NonContributory,

    /// Unknown envelope version.
    #[error("unsupported envelope version: {0}")]
    UnsupportedVersion(u32),

    /// Envelope or payload encoding error.
    #[error("encoding error: {0}")]
    Encoding(String),

    /// The resolver has no keys for this handle or key.
    #[error("peer not found: {0}")]
    PeerNotFound(String),

    /// Core error.
    #[error("core error: {0}")]
    Core(#[from] gns_core::CoreError),
}

impl From<serde_json::Error> for MessagingError {
    fn from(e: serde_json::Error) -> Self {
        MessagingError::Encoding(e.to_string())
    }
}

/// Result type for messaging operations.
pub type Result<T> = std::result::Result<T, MessagingError>;
