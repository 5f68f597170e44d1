//! # GNS Core
//!
//! Pure primitives for Proof-of-Trajectory identities: keys, breadcrumb
//! chains, epochs, trust scoring, and the handle gate.
//!
//! This crate contains no I/O, no storage, no networking. Every function
//! that depends on time takes it as an argument.
//!
//! ## Key Types
//!
//! - [`IdentityKeypair`] - Ed25519 identity with a derived X25519 key
//! - [`Breadcrumb`] - A signed, hash-linked proof of presence in an H3 cell
//! - [`EpochHeader`] - A Merkle-rooted, chain-linked batch of breadcrumbs
//! - [`TrustScore`] - Weighted score and tier computed from ledger statistics
//! - [`HandleStatus`] - Handle lifecycle, gated by [`HandleGate`]
//!
//! ## Encoding
//!
//! Hash preimages are fixed-width big-endian. See [`breadcrumb`] and
//! [`epoch`] for exact layouts.

pub mod backup;
pub mod breadcrumb;
pub mod chain;
pub mod crypto;
pub mod epoch;
pub mod error;
pub mod handle;
pub mod merkle;
pub mod trust;

pub use backup::ExportedIdentity;
pub use breadcrumb::{
    Breadcrumb, BreadcrumbBuilder, BreadcrumbFault, BreadcrumbQuery, CollectionStatus, H3Cell,
    LocationSource, GENESIS_HASH,
};
pub use chain::{verify_breadcrumb, verify_chain, verify_segment, ChainVerification};
pub use crypto::{
    EncryptionKeypair, Ed25519PublicKey, Ed25519Signature, IdentityKeypair, Sha256Hash,
    X25519PublicKey,
};
pub use epoch::{verify_epoch, EpochHeader, DEFAULT_BLOCK_SIZE};
pub use error::{CoreError, HandleError, Result};
pub use handle::{validate_handle, ClaimProgress, HandleGate, HandleStatus};
pub use merkle::{MerkleProof, MerkleTree};
pub use trust::{
    EpochStats, LedgerStats, TrustCheck, TrustComponents, TrustConfig, TrustRequirements,
    TrustScore, TrustScorer, TrustTier, TrustVerification,
};
