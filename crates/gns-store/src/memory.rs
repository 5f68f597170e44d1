//! In-memory implementation of the LedgerStore trait.
//!
//! This is primarily for testing. It has the same semantics as SQLite
//! but keeps everything in memory with no persistence and no encryption.

use std::collections::{HashMap, HashSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use gns_core::{Breadcrumb, BreadcrumbQuery, Ed25519PublicKey, EpochHeader, GENESIS_HASH};

use crate::error::{Result, StoreError};
use crate::traits::{IdentityRecord, InsertResult, LedgerCounts, LedgerStore};

/// In-memory store implementation.
///
/// All data is lost when the store is dropped. Thread-safe via RwLock.
pub struct MemoryStore {
    inner: RwLock<MemoryStoreInner>,
}

#[derive(Default)]
struct MemoryStoreInner {
    identities: HashMap<Ed25519PublicKey, IdentityRecord>,
    ledgers: HashMap<Ed25519PublicKey, Ledger>,
}

#[derive(Default)]
struct Ledger {
    /// Append order.
    breadcrumbs: Vec<Breadcrumb>,
    ids: HashSet<String>,
    /// Index order.
    epochs: Vec<EpochHeader>,
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(MemoryStoreInner::default()),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, MemoryStoreInner>> {
        self.inner
            .read()
            .map_err(|e| StoreError::Lock(e.to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, MemoryStoreInner>> {
        self.inner
            .write()
            .map_err(|e| StoreError::Lock(e.to_string()))
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn put_identity(&self, record: &IdentityRecord) -> Result<()> {
        let mut inner = self.write()?;
        inner.identities.insert(record.public_key, record.clone());
        Ok(())
    }

    async fn get_identity(&self, identity: &Ed25519PublicKey) -> Result<Option<IdentityRecord>> {
        Ok(self.read()?.identities.get(identity).cloned())
    }

    async fn list_identities(&self) -> Result<Vec<Ed25519PublicKey>> {
        let mut keys: Vec<_> = self.read()?.identities.keys().copied().collect();
        keys.sort();
        Ok(keys)
    }

    async fn delete_identity(&self, identity: &Ed25519PublicKey) -> Result<bool> {
        let mut inner = self.write()?;
        let had_record = inner.identities.remove(identity).is_some();
        let had_ledger = inner.ledgers.remove(identity).is_some();
        Ok(had_record || had_ledger)
    }

    async fn append_breadcrumb(
        &self,
        identity: &Ed25519PublicKey,
        breadcrumb: &Breadcrumb,
    ) -> Result<InsertResult> {
        let mut inner = self.write()?;
        let ledger = inner.ledgers.entry(*identity).or_default();

        if ledger.ids.contains(&breadcrumb.id) {
            return Ok(InsertResult::AlreadyExists);
        }

        let tip = ledger
            .breadcrumbs
            .last()
            .map(|b| b.hash)
            .unwrap_or(GENESIS_HASH);
        if breadcrumb.prev_hash != tip {
            return Ok(InsertResult::Conflict { existing: tip });
        }

        let mut stored = breadcrumb.clone();
        stored.published = false;
        ledger.ids.insert(stored.id.clone());
        ledger.breadcrumbs.push(stored);
        Ok(InsertResult::Inserted)
    }

    async fn last_breadcrumb(&self, identity: &Ed25519PublicKey) -> Result<Option<Breadcrumb>> {
        let inner = self.read()?;
        Ok(inner
            .ledgers
            .get(identity)
            .and_then(|l| l.breadcrumbs.last().cloned()))
    }

    async fn query_breadcrumbs(
        &self,
        identity: &Ed25519PublicKey,
        query: &BreadcrumbQuery,
    ) -> Result<Vec<Breadcrumb>> {
        let inner = self.read()?;
        let Some(ledger) = inner.ledgers.get(identity) else {
            return Ok(Vec::new());
        };
        Ok(ledger
            .breadcrumbs
            .iter()
            .filter(|b| query.matches(b))
            .skip(query.offset)
            .take(query.limit)
            .cloned()
            .collect())
    }

    async fn all_breadcrumbs(&self, identity: &Ed25519PublicKey) -> Result<Vec<Breadcrumb>> {
        let inner = self.read()?;
        Ok(inner
            .ledgers
            .get(identity)
            .map(|l| l.breadcrumbs.clone())
            .unwrap_or_default())
    }

    async fn pending_breadcrumbs(
        &self,
        identity: &Ed25519PublicKey,
        limit: Option<usize>,
    ) -> Result<Vec<Breadcrumb>> {
        let inner = self.read()?;
        let Some(ledger) = inner.ledgers.get(identity) else {
            return Ok(Vec::new());
        };

        let mut pending: Vec<Breadcrumb> = ledger
            .breadcrumbs
            .iter()
            .filter(|b| !b.published)
            .cloned()
            .collect();
        // Stable, so append order breaks timestamp ties.
        pending.sort_by_key(|b| b.timestamp);
        if let Some(limit) = limit {
            pending.truncate(limit);
        }
        Ok(pending)
    }

    async fn counts(&self, identity: &Ed25519PublicKey) -> Result<LedgerCounts> {
        let inner = self.read()?;
        let Some(ledger) = inner.ledgers.get(identity) else {
            return Ok(LedgerCounts::default());
        };
        Ok(LedgerCounts::from_breadcrumbs(&ledger.breadcrumbs))
    }

    async fn commit_epoch(&self, header: &EpochHeader, breadcrumb_ids: &[String]) -> Result<()> {
        let mut inner = self.write()?;
        let ledger = inner.ledgers.entry(header.identity).or_default();

        let expected = ledger.epochs.len() as u64;
        if header.epoch_index != expected {
            return Err(StoreError::EpochIndex {
                expected,
                got: header.epoch_index,
            });
        }

        if ledger.epochs.iter().any(|e| e.epoch_hash == header.epoch_hash) {
            return Err(StoreError::DuplicateEpoch(header.epoch_hash.to_hex()));
        }

        let positions: HashMap<&str, usize> = ledger
            .breadcrumbs
            .iter()
            .enumerate()
            .filter(|(_, b)| !b.published)
            .map(|(i, b)| (b.id.as_str(), i))
            .collect();

        let mut targets = Vec::with_capacity(breadcrumb_ids.len());
        let mut seen = HashSet::new();
        for id in breadcrumb_ids {
            match positions.get(id.as_str()) {
                Some(&i) if seen.insert(i) => targets.push(i),
                _ => return Err(StoreError::NotPending(id.clone())),
            }
        }

        // All checks passed; nothing below can fail.
        for i in targets {
            ledger.breadcrumbs[i].published = true;
        }
        ledger.epochs.push(header.clone());
        Ok(())
    }

    async fn epochs(&self, identity: &Ed25519PublicKey) -> Result<Vec<EpochHeader>> {
        let inner = self.read()?;
        Ok(inner
            .ledgers
            .get(identity)
            .map(|l| l.epochs.clone())
            .unwrap_or_default())
    }

    async fn last_epoch(&self, identity: &Ed25519PublicKey) -> Result<Option<EpochHeader>> {
        let inner = self.read()?;
        Ok(inner
            .ledgers
            .get(identity)
            .and_then(|l| l.epochs.last().cloned()))
    }

    async fn epoch_count(&self, identity: &Ed25519PublicKey) -> Result<u64> {
        let inner = self.read()?;
        Ok(inner
            .ledgers
            .get(identity)
            .map(|l| l.epochs.len() as u64)
            .unwrap_or(0))
    }
}
