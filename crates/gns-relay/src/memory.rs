//! In-memory relay for tests and local use.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use gns_core::{Ed25519PublicKey, EpochHeader, Sha256Hash};
use gns_messaging::Envelope;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{RelayError, Result};
use crate::relay::{PublishOutcome, Relay};

#[derive(Default)]
struct RelayState {
    epochs: HashMap<Ed25519PublicKey, Vec<EpochHeader>>,
    epoch_hashes: HashSet<Sha256Hash>,
    mailboxes: HashMap<Ed25519PublicKey, Vec<Envelope>>,
    message_ids: HashSet<Uuid>,
}

/// A relay that validates and stores everything in process memory.
#[derive(Default)]
pub struct MemoryRelay {
    state: RwLock<RelayState>,
    offline: AtomicBool,
    latency: Option<Duration>,
}

impl MemoryRelay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every call by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Simulate an outage: every call fails with `Unavailable` while set.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    async fn enter(&self) -> Result<()> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if self.offline.load(Ordering::SeqCst) {
            return Err(RelayError::Unavailable("relay offline".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl Relay for MemoryRelay {
    async fn publish_epoch(&self, header: &EpochHeader) -> Result<PublishOutcome> {
        self.enter().await?;

        if !header.verify_signature() {
            return Err(RelayError::InvalidSignature(format!(
                "epoch {} of {}",
                header.epoch_index,
                header.identity.short()
            )));
        }

        let mut state = self.state.write().await;
        if state.epoch_hashes.contains(&header.epoch_hash) {
            tracing::debug!(epoch_hash = %header.epoch_hash.to_hex(), "duplicate epoch");
            return Ok(PublishOutcome::Duplicate);
        }

        let chain = state.epochs.entry(header.identity).or_default();
        let expected = chain.last().map_or(0, |e| e.epoch_index + 1);
        if header.epoch_index != expected {
            return Err(RelayError::EpochIndex {
                expected,
                got: header.epoch_index,
            });
        }
        if !header.follows(chain.last()) {
            return Err(RelayError::EpochChain(format!(
                "epoch {} of {}",
                header.epoch_index,
                header.identity.short()
            )));
        }

        chain.push(header.clone());
        state.epoch_hashes.insert(header.epoch_hash);
        tracing::info!(
            identity = %header.identity.short(),
            epoch_index = header.epoch_index,
            "relay accepted epoch"
        );
        Ok(PublishOutcome::Accepted)
    }

    async fn epochs(&self, identity: &Ed25519PublicKey) -> Result<Vec<EpochHeader>> {
        self.enter().await?;
        let state = self.state.read().await;
        Ok(state.epochs.get(identity).cloned().unwrap_or_default())
    }

    async fn send_envelope(&self, envelope: &Envelope) -> Result<PublishOutcome> {
        self.enter().await?;

        if !envelope.verify_signature() {
            tracing::warn!(
                from = %envelope.from_pk.short(),
                message_id = %envelope.message_id,
                "relay rejected envelope with invalid signature"
            );
            return Err(RelayError::InvalidSignature(format!(
                "envelope {}",
                envelope.message_id
            )));
        }

        let mut state = self.state.write().await;
        if !state.message_ids.insert(envelope.message_id) {
            return Ok(PublishOutcome::Duplicate);
        }
        state
            .mailboxes
            .entry(envelope.to_pk)
            .or_default()
            .push(envelope.clone());
        Ok(PublishOutcome::Accepted)
    }

    async fn fetch_envelopes(&self, recipient: &Ed25519PublicKey) -> Result<Vec<Envelope>> {
        self.enter().await?;
        let state = self.state.read().await;
        Ok(state.mailboxes.get(recipient).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::with_timeout;
    use gns_core::{Breadcrumb, H3Cell, IdentityKeypair, GENESIS_HASH};

    fn crumbs(kp: &IdentityKeypair, n: usize, start: i64) -> Vec<Breadcrumb> {
        let cell = H3Cell::from_lat_lng(37.7749, -122.4194, 7).unwrap();
        let mut prev = GENESIS_HASH;
        (0..n)
            .map(|i| {
                let b = Breadcrumb::builder(cell, start + i as i64 * 60_000)
                    .prev(prev)
                    .sign(kp);
                prev = b.hash;
                b
            })
            .collect()
    }

    fn epoch(kp: &IdentityKeypair, index: u64, prev: Option<&EpochHeader>) -> EpochHeader {
        EpochHeader::build(
            kp,
            index,
            prev.map(|p| p.epoch_hash),
            &crumbs(kp, 12, 1_700_000_000_000 + index as i64 * 10_000_000),
            10,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_publish_dedupes_by_epoch_hash() {
        let relay = MemoryRelay::new();
        let kp = IdentityKeypair::from_seed(&[7; 32]);
        let first = epoch(&kp, 0, None);

        assert_eq!(relay.publish_epoch(&first).await.unwrap(), PublishOutcome::Accepted);
        assert_eq!(relay.publish_epoch(&first).await.unwrap(), PublishOutcome::Duplicate);
        assert_eq!(relay.epochs(&kp.public_key()).await.unwrap(), vec![first]);
    }

    #[tokio::test]
    async fn test_publish_rejects_gap_and_fork() {
        let relay = MemoryRelay::new();
        let kp = IdentityKeypair::from_seed(&[7; 32]);
        let first = epoch(&kp, 0, None);
        relay.publish_epoch(&first).await.unwrap();

        let skipped = epoch(&kp, 2, Some(&first));
        assert!(matches!(
            relay.publish_epoch(&skipped).await,
            Err(RelayError::EpochIndex { expected: 1, got: 2 })
        ));

        let unlinked = epoch(&kp, 1, None);
        assert!(matches!(
            relay.publish_epoch(&unlinked).await,
            Err(RelayError::EpochChain(_))
        ));

        let second = epoch(&kp, 1, Some(&first));
        assert_eq!(relay.publish_epoch(&second).await.unwrap(), PublishOutcome::Accepted);
    }

    #[tokio::test]
    async fn test_publish_rejects_forged_header() {
        let relay = MemoryRelay::new();
        let kp = IdentityKeypair::from_seed(&[7; 32]);
        let mut forged = epoch(&kp, 0, None);
        forged.merkle_root = Sha256Hash::hash(b"other");
        assert!(matches!(
            relay.publish_epoch(&forged).await,
            Err(RelayError::InvalidSignature(_))
        ));
    }

    #[tokio::test]
    async fn test_envelope_delivery_dedupes_by_id() {
        let relay = MemoryRelay::new();
        let alice = IdentityKeypair::from_seed(&[1; 32]);
        let bob = IdentityKeypair::from_seed(&[2; 32]);
        let env = gns_messaging::encrypt(
            &alice,
            &bob.public_key(),
            &bob.encryption_public_key(),
            b"hi",
        )
        .unwrap();

        assert_eq!(relay.send_envelope(&env).await.unwrap(), PublishOutcome::Accepted);
        assert_eq!(relay.send_envelope(&env).await.unwrap(), PublishOutcome::Duplicate);
        assert_eq!(relay.fetch_envelopes(&bob.public_key()).await.unwrap(), vec![env]);
        assert!(relay.fetch_envelopes(&alice.public_key()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_tampered_envelope_rejected() {
        let relay = MemoryRelay::new();
        let alice = IdentityKeypair::from_seed(&[1; 32]);
        let bob = IdentityKeypair::from_seed(&[2; 32]);
        let mut env = gns_messaging::encrypt(
            &alice,
            &bob.public_key(),
            &bob.encryption_public_key(),
            b"hi",
        )
        .unwrap();
        env.ciphertext[0] ^= 0xFF;
        assert!(matches!(
            relay.send_envelope(&env).await,
            Err(RelayError::InvalidSignature(_))
        ));
    }

    #[tokio::test]
    async fn test_offline_is_retryable() {
        let relay = MemoryRelay::new();
        relay.set_offline(true);
        let err = relay
            .epochs(&Ed25519PublicKey::from_bytes([0; 32]))
            .await
            .unwrap_err();
        assert!(err.is_retryable());

        relay.set_offline(false);
        assert!(relay.epochs(&Ed25519PublicKey::from_bytes([0; 32])).await.is_ok());
    }

    #[tokio::test]
    async fn test_timeout() {
        let relay = MemoryRelay::new().with_latency(Duration::from_millis(200));
        let result = with_timeout(
            Duration::from_millis(10),
            relay.epochs(&Ed25519PublicKey::from_bytes([0; 32])),
        )
        .await;
        assert!(matches!(result, Err(RelayError::Timeout(_))));
    }
}
