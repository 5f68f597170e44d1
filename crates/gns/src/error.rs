//! Error types for the GNS facade.

use gns_core::{CoreError, HandleError, TrustCheck};
use gns_messaging::MessagingError;
use gns_relay::RelayError;
use gns_store::StoreError;
use thiserror::Error;

/// Errors returned by [`GnsEngine`](crate::GnsEngine) operations.
#[derive(Debug, Error)]
pub enum GnsError {
    /// Malformed keys, signature or tag failures. Always fails closed.
    #[error("crypto error: {0}")]
    Crypto(String),

    /// A breadcrumb chain is broken. The prefix before `broken_at` is intact.
    #[error("chain integrity error at index {broken_at}: {reason}")]
    ChainIntegrity { broken_at: usize, reason: String },

    #[error("insufficient breadcrumbs: need {required}, have {available}")]
    InsufficientBreadcrumbs { required: usize, available: usize },

    /// Trust requirements not met. Carries only the failed checks.
    #[error("insufficient trust: {}", failed_names(.checks))]
    InsufficientTrust { checks: Vec<TrustCheck> },

    /// Another epoch publication is in flight for this identity.
    #[error("an epoch publication is already in progress")]
    ConcurrentPublish,

    #[error("storage error: {0}")]
    Storage(#[from] StoreError),

    #[error("identity not found: {0}")]
    IdentityNotFound(String),

    /// Input that is well-formed but not acceptable, e.g. a bad H3 cell.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("handle error: {0}")]
    Handle(HandleError),

    #[error("messaging error: {0}")]
    Messaging(MessagingError),

    #[error("relay error: {0}")]
    Relay(#[from] RelayError),

    #[error("configuration error: {0}")]
    Config(String),
}

fn failed_names(checks: &[TrustCheck]) -> String {
    checks
        .iter()
        .map(|c| c.name.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

impl GnsError {
    /// Whether retrying, or collecting more breadcrumbs, can succeed.
    pub fn is_recoverable(&self) -> bool {
        match self {
            GnsError::InsufficientBreadcrumbs { .. }
            | GnsError::InsufficientTrust { .. }
            | GnsError::ConcurrentPublish
            | GnsError::Storage(_) => true,
            GnsError::Relay(e) => e.is_retryable(),
            _ => false,
        }
    }

    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            GnsError::Crypto(_) => "CRYPTO_ERROR",
            GnsError::ChainIntegrity { .. } => "CHAIN_INTEGRITY",
            GnsError::InsufficientBreadcrumbs { .. } => "INSUFFICIENT_BREADCRUMBS",
            GnsError::InsufficientTrust { .. } => "INSUFFICIENT_TRUST",
            GnsError::ConcurrentPublish => "CONCURRENT_PUBLISH",
            GnsError::Storage(_) => "STORAGE_ERROR",
            GnsError::IdentityNotFound(_) => "IDENTITY_NOT_FOUND",
            GnsError::InvalidInput(_) => "INVALID_INPUT",
            GnsError::Handle(_) => "HANDLE_ERROR",
            GnsError::Messaging(_) => "MESSAGING_ERROR",
            GnsError::Relay(_) => "RELAY_ERROR",
            GnsError::Config(_) => "CONFIG_ERROR",
        }
    }
}

impl From<CoreError> for GnsError {
    fn from(e: CoreError) -> Self {
        match e {
            CoreError::InvalidKeyLength { .. }
            | CoreError::InvalidPublicKey
            | CoreError::InvalidSignature
            | CoreError::KeyDerivation(_)
            | CoreError::BackupDecryption
            | CoreError::UnsupportedBackupVersion(_) => GnsError::Crypto(e.to_string()),
            _ => GnsError::InvalidInput(e.to_string()),
        }
    }
}

impl From<HandleError> for GnsError {
    fn from(e: HandleError) -> Self {
        match e {
            HandleError::RequirementsNotMet(checks) => GnsError::InsufficientTrust { checks },
            other => GnsError::Handle(other),
        }
    }
}

impl From<MessagingError> for GnsError {
    fn from(e: MessagingError) -> Self {
        match e {
            MessagingError::InvalidSignature
            | MessagingError::Decryption
            | MessagingError::Encryption(_)
            | MessagingError::WrongRecipient
            | MessagingError::NonContributory => GnsError::Crypto(e.to_string()),
            MessagingError::Core(core) => core.into(),
            other => GnsError::Messaging(other),
        }
    }
}

/// Result type for facade operations.
pub type Result<T> = std::result::Result<T, GnsError>;
