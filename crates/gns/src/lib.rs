//! # GNS
//!
//! Self-sovereign identities with a verifiable, privacy-preserving proof of
//! physical presence over time (Proof-of-Trajectory).
//!
//! ## Overview
//!
//! - **Identities**: an Ed25519 signing key with a derived X25519 key
//! - **Breadcrumbs**: signed, hash-chained H3 cell observations
//! - **Epochs**: Merkle-rooted, chain-linked batches of breadcrumbs
//! - **Trust**: a 0-100 score and tier computed from the ledger
//! - **Handles**: `@names` gated on trust requirements
//! - **Messaging**: forward-secret encrypted envelopes between identities
//!
//! ## Usage
//!
//! ```rust,no_run
//! use gns::{GnsConfig, GnsEngine};
//! use gns::core::LocationSource;
//! use gns::store::{SqliteStore, StorageKey};
//!
//! async fn example() -> gns::Result<()> {
//!     let store = SqliteStore::open("gns.db", StorageKey::generate())?;
//!     let engine = GnsEngine::new(store, GnsConfig::production())?;
//!
//!     let me = engine.create_identity(Some("me".into())).await?;
//!     engine
//!         .collect_breadcrumb(&me, 37.7749, -122.4194, LocationSource::Gps, Some(8.0))
//!         .await?;
//!
//!     if engine.can_publish(&me).await? {
//!         engine.publish_epoch(&me).await?;
//!     }
//!     let score = engine.trust_score(&me).await?;
//!     println!("{} {}", score.tier.display_name(), score.score);
//!     Ok(())
//! }
//! ```
//!
//! ## Re-exports
//!
//! - `gns::core` - keys, breadcrumbs, epochs, trust, handles
//! - `gns::store` - ledger storage
//! - `gns::messaging` - envelopes and peer resolution
//! - `gns::relay` - relay boundary

pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod logging;
mod locks;

pub use gns_core as core;
pub use gns_messaging as messaging;
pub use gns_relay as relay;
pub use gns_store as store;

pub use config::{GnsConfig, LogFormat, LoggingConfig};
pub use context::IdentityContext;
pub use engine::{BreadcrumbInput, GnsEngine, ReceivedMessage, MAX_CLOCK_SKEW_MS};
pub use error::{GnsError, Result};

pub use gns_core::{
    Breadcrumb, BreadcrumbQuery, ChainVerification, CollectionStatus, Ed25519PublicKey,
    EpochHeader, ExportedIdentity, H3Cell, HandleStatus, LocationSource, TrustRequirements,
    TrustScore, TrustTier, TrustVerification,
};
