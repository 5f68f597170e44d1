//! Per-identity serialisation.
//!
//! Appends and epoch publication for one identity take the same mutex, so
//! each append sees the true tip and a publication sees a stable pending set.
//! Different identities never contend.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use gns_core::Ed25519PublicKey;
use tokio::sync::{Mutex, MutexGuard};

#[derive(Debug, Default)]
pub(crate) struct IdentityLock {
    writer: Mutex<()>,
    publishing: AtomicBool,
}

impl IdentityLock {
    /// Wait for exclusive write access to the identity's ledger.
    pub(crate) async fn write(&self) -> MutexGuard<'_, ()> {
        self.writer.lock().await
    }

    /// Mark a publication as in flight. `None` if one already is.
    pub(crate) fn try_begin_publish(self: &Arc<Self>) -> Option<PublishGuard> {
        self.publishing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| PublishGuard {
                lock: Arc::clone(self),
            })
    }

    #[cfg(test)]
    pub(crate) fn is_publishing(&self) -> bool {
        self.publishing.load(Ordering::Acquire)
    }
}

/// Clears the publishing flag when dropped, including on error or cancellation.
#[derive(Debug)]
pub(crate) struct PublishGuard {
    lock: Arc<IdentityLock>,
}

impl Drop for PublishGuard {
    fn drop(&mut self) {
        self.lock.publishing.store(false, Ordering::Release);
    }
}

/// Entries live as long as the engine, so every task for an identity meets
/// the same mutex even across a delete.
#[derive(Debug, Default)]
pub(crate) struct LockRegistry {
    locks: DashMap<Ed25519PublicKey, Arc<IdentityLock>>,
}

impl LockRegistry {
    pub(crate) fn get(&self, identity: &Ed25519PublicKey) -> Arc<IdentityLock> {
        Arc::clone(self.locks.entry(*identity).or_default().value())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_identity_same_lock() {
        let registry = LockRegistry::default();
        let a = Ed25519PublicKey::from_bytes([1; 32]);
        let b = Ed25519PublicKey::from_bytes([2; 32]);
        assert!(Arc::ptr_eq(&registry.get(&a), &registry.get(&a)));
        assert!(!Arc::ptr_eq(&registry.get(&a), &registry.get(&b)));
    }

    #[test]
    fn test_publish_flag_is_exclusive_and_released() {
        let lock = Arc::new(IdentityLock::default());
        let guard = lock.try_begin_publish().unwrap();
        assert!(lock.is_publishing());
        assert!(lock.try_begin_publish().is_none());
        drop(guard);
        assert!(!lock.is_publishing());
        assert!(lock.try_begin_publish().is_some());
    }

    #[tokio::test]
    async fn test_writer_mutex_serialises() {
        let lock = Arc::new(IdentityLock::default());
        let held = lock.write().await;
        assert!(lock.writer.try_lock().is_err());
        drop(held);
        assert!(lock.writer.try_lock().is_ok());
    }
}
