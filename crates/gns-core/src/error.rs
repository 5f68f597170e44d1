//! Error types for GNS Core.

use thiserror::Error;

use crate::trust::TrustCheck;

/// Errors raised by key handling, encoding, and record construction.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid key length: expected {expected} bytes, got {got}")]
    InvalidKeyLength { expected: usize, got: usize },

    #[error("invalid public key")]
    InvalidPublicKey,

    #[error("invalid signature")]
    InvalidSignature,

    #[error("invalid hex encoding: {0}")]
    InvalidHex(String),

    #[error("invalid H3 cell: {0}")]
    InvalidCell(String),

    #[error("H3 resolution mismatch: declared {declared}, cell has {actual}")]
    ResolutionMismatch { declared: u8, actual: u8 },

    #[error("invalid coordinates: {0}")]
    InvalidCoordinates(String),

    #[error("unknown location source tag: {0}")]
    UnknownSource(u8),

    #[error("key derivation failed: {0}")]
    KeyDerivation(String),

    #[error("backup decryption failed")]
    BackupDecryption,

    #[error("unsupported backup version: {0}")]
    UnsupportedBackupVersion(u8),

    #[error("encoding error: {0}")]
    Encoding(String),

    #[error("epoch contains no breadcrumbs")]
    EmptyEpoch,

    #[error("epoch verification failed: {0}")]
    EpochMismatch(String),
}

/// Errors raised by the handle gate.
#[derive(Debug, Error)]
pub enum HandleError {
    #[error("handle cannot be empty")]
    Empty,

    #[error("handle must be at least {min} characters (got {got})")]
    TooShort { min: usize, got: usize },

    #[error("handle cannot exceed {max} characters (got {got})")]
    TooLong { max: usize, got: usize },

    #[error("handle can only contain lowercase letters, numbers, and underscores")]
    InvalidCharacters,

    #[error("handle {0} is reserved")]
    ReservedWord(String),

    #[error("a handle is already held: {0}")]
    AlreadyHeld(String),

    #[error("no handle reserved")]
    NoReservation,

    #[error("requirements not met: {}", failed_names(.0))]
    RequirementsNotMet(Vec<TrustCheck>),
}

fn failed_names(checks: &[TrustCheck]) -> String {
    checks
        .iter()
        .filter(|c| !c.passed)
        .map(|c| c.name.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
