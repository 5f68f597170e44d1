//! LedgerStore trait: the abstract interface for ledger persistence.
//!
//! Implementations include encrypted SQLite (primary) and in-memory (for
//! tests). Stores enforce the ledger's structural rules themselves so that a
//! caller bug cannot fork a chain or half-publish an epoch.

use std::collections::HashSet;

use async_trait::async_trait;
use gns_core::{
    Breadcrumb, BreadcrumbQuery, Ed25519PublicKey, EpochHeader, HandleStatus, Sha256Hash,
    X25519PublicKey,
};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Result of appending a breadcrumb.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertResult {
    /// Breadcrumb was appended.
    Inserted,
    /// A breadcrumb with this id already exists (idempotent, not an error).
    AlreadyExists,
    /// The breadcrumb does not link to the current tip.
    Conflict {
        /// Hash of the current tip, or the genesis hash for an empty ledger.
        existing: Sha256Hash,
    },
}

/// Public identity metadata. Secret keys are never stored here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentityRecord {
    pub public_key: Ed25519PublicKey,
    pub encryption_key: X25519PublicKey,
    /// Unix ms.
    pub created_at: i64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub handle: HandleStatus,
}

/// Aggregate counts over one identity's ledger.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LedgerCounts {
    pub total: u64,
    pub pending: u64,
    pub unique_locations: u64,
    pub first_timestamp: Option<i64>,
    pub last_timestamp: Option<i64>,
}

impl LedgerCounts {
    /// Aggregate over breadcrumbs in append order.
    pub fn from_breadcrumbs(breadcrumbs: &[Breadcrumb]) -> Self {
        let cells: HashSet<u64> = breadcrumbs.iter().map(|b| b.h3_index.as_u64()).collect();
        Self {
            total: breadcrumbs.len() as u64,
            pending: breadcrumbs.iter().filter(|b| !b.published).count() as u64,
            unique_locations: cells.len() as u64,
            first_timestamp: breadcrumbs.first().map(|b| b.timestamp),
            last_timestamp: breadcrumbs.last().map(|b| b.timestamp),
        }
    }
}

/// Async interface for ledger persistence.
///
/// Breadcrumbs are keyed by `(identity, id)` and kept in append order, which
/// is also non-decreasing timestamp order. Epochs are keyed by
/// `(identity, epoch_index)`.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    // ─────────────────────────────────────────────────────────────────────────
    // Identity Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Insert or replace an identity record.
    async fn put_identity(&self, record: &IdentityRecord) -> Result<()>;

    async fn get_identity(&self, identity: &Ed25519PublicKey) -> Result<Option<IdentityRecord>>;

    async fn list_identities(&self) -> Result<Vec<Ed25519PublicKey>>;

    /// Remove an identity with all breadcrumbs and epochs it owns.
    ///
    /// Returns `false` if nothing was stored for it.
    async fn delete_identity(&self, identity: &Ed25519PublicKey) -> Result<bool>;

    // ─────────────────────────────────────────────────────────────────────────
    // Breadcrumb Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Append a breadcrumb to the end of an identity's ledger.
    ///
    /// # Returns
    /// - `Inserted` if it was appended.
    /// - `AlreadyExists` if a breadcrumb with the same id is stored.
    /// - `Conflict` if its `prev_hash` is not the current tip.
    async fn append_breadcrumb(
        &self,
        identity: &Ed25519PublicKey,
        breadcrumb: &Breadcrumb,
    ) -> Result<InsertResult>;

    /// The most recently appended breadcrumb.
    async fn last_breadcrumb(&self, identity: &Ed25519PublicKey) -> Result<Option<Breadcrumb>>;

    /// Page through the ledger in append order.
    async fn query_breadcrumbs(
        &self,
        identity: &Ed25519PublicKey,
        query: &BreadcrumbQuery,
    ) -> Result<Vec<Breadcrumb>>;

    /// The whole ledger in append order.
    async fn all_breadcrumbs(&self, identity: &Ed25519PublicKey) -> Result<Vec<Breadcrumb>>;

    /// Unpublished breadcrumbs ordered by timestamp ascending.
    async fn pending_breadcrumbs(
        &self,
        identity: &Ed25519PublicKey,
        limit: Option<usize>,
    ) -> Result<Vec<Breadcrumb>>;

    async fn counts(&self, identity: &Ed25519PublicKey) -> Result<LedgerCounts>;

    // ─────────────────────────────────────────────────────────────────────────
    // Epoch Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Store an epoch header and mark the breadcrumbs it covers as published.
    ///
    /// Both happen atomically. Fails if the index is not `last + 1` (or 0 for
    /// the first epoch), or if any listed breadcrumb is not pending.
    async fn commit_epoch(&self, header: &EpochHeader, breadcrumb_ids: &[String]) -> Result<()>;

    /// All epochs of an identity ordered by index.
    async fn epochs(&self, identity: &Ed25519PublicKey) -> Result<Vec<EpochHeader>>;

    async fn last_epoch(&self, identity: &Ed25519PublicKey) -> Result<Option<EpochHeader>>;

    async fn epoch_count(&self, identity: &Ed25519PublicKey) -> Result<u64>;

    // ─────────────────────────────────────────────────────────────────────────
    // Derived Reads
    // ─────────────────────────────────────────────────────────────────────────

    /// Ordered range read: breadcrumbs strictly after `since`, at most `limit`.
    async fn range(
        &self,
        identity: &Ed25519PublicKey,
        since: Option<i64>,
        limit: usize,
    ) -> Result<Vec<Breadcrumb>> {
        let query = BreadcrumbQuery {
            limit,
            offset: 0,
            after: since,
            before: None,
        };
        self.query_breadcrumbs(identity, &query).await
    }
}
