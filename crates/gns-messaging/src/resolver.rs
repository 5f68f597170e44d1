//! Peer key resolution.
//!
//! The network side of handle lookup lives outside this crate; senders only
//! need a [`PeerResolver`] that turns a handle or hex key into keys.

use std::collections::HashMap;

use async_trait::async_trait;
use gns_core::{validate_handle, Ed25519PublicKey, X25519PublicKey};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::{MessagingError, Result};

/// Keys needed to address a peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerKeys {
    pub public_key: Ed25519PublicKey,
    pub encryption_key: X25519PublicKey,
    #[serde(default)]
    pub handle: Option<String>,
}

/// Resolves `@handle`, `handle` or a 64-char hex public key to peer keys.
#[async_trait]
pub trait PeerResolver: Send + Sync {
    async fn resolve(&self, handle_or_key: &str) -> Result<PeerKeys>;
}

/// In-memory resolver for tests and local use.
#[derive(Default)]
pub struct MemoryResolver {
    inner: RwLock<ResolverState>,
}

#[derive(Default)]
struct ResolverState {
    by_key: HashMap<Ed25519PublicKey, PeerKeys>,
    by_handle: HashMap<String, Ed25519PublicKey>,
}

impl MemoryResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a peer, replacing any earlier entry for the same key.
    pub async fn register(&self, keys: PeerKeys) {
        let mut state = self.inner.write().await;
        if let Some(previous) = state.by_key.get(&keys.public_key).and_then(|k| k.handle.clone()) {
            state.by_handle.remove(&previous);
        }
        if let Some(handle) = keys.handle.as_deref().and_then(|h| validate_handle(h).ok()) {
            state.by_handle.insert(handle, keys.public_key);
        }
        state.by_key.insert(keys.public_key, keys);
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.by_key.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl PeerResolver for MemoryResolver {
    async fn resolve(&self, handle_or_key: &str) -> Result<PeerKeys> {
        let query = handle_or_key.trim();
        let state = self.inner.read().await;

        let key = if !query.starts_with('@') && query.len() == 64 {
            Ed25519PublicKey::from_hex(query).ok()
        } else {
            None
        };
        let key = match key {
            Some(key) => Some(key),
            None => validate_handle(query)
                .ok()
                .and_then(|h| state.by_handle.get(&h).copied()),
        };

        key.and_then(|k| state.by_key.get(&k).cloned())
            .ok_or_else(|| MessagingError::PeerNotFound(query.to_string()))
    }
}
