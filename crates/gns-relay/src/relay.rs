//! Relay trait: hand-off point for signed epochs and envelopes.
//!
//! A relay may be an HTTP service, a peer network or an in-process store.
//! Every submission is idempotent: resubmitting an epoch with the same
//! `epoch_hash`, or an envelope with the same `message_id`, is reported as a
//! duplicate rather than stored twice.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use gns_core::{Ed25519PublicKey, EpochHeader};
use gns_messaging::Envelope;
use serde::{Deserialize, Serialize};

use crate::error::{RelayError, Result};

/// What a relay did with a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PublishOutcome {
    /// Stored for the first time.
    Accepted,
    /// Already held; nothing changed.
    Duplicate,
}

/// Async interface to a relay.
#[async_trait]
pub trait Relay: Send + Sync {
    // ─────────────────────────────────────────────────────────────────────────
    // Epochs
    // ─────────────────────────────────────────────────────────────────────────

    /// Publish a signed epoch header.
    async fn publish_epoch(&self, header: &EpochHeader) -> Result<PublishOutcome>;

    /// Published epochs of an identity ordered by index.
    async fn epochs(&self, identity: &Ed25519PublicKey) -> Result<Vec<EpochHeader>>;

    // ─────────────────────────────────────────────────────────────────────────
    // Envelopes
    // ─────────────────────────────────────────────────────────────────────────

    /// Queue an envelope for its recipient.
    async fn send_envelope(&self, envelope: &Envelope) -> Result<PublishOutcome>;

    /// Envelopes waiting for a recipient, oldest first.
    async fn fetch_envelopes(&self, recipient: &Ed25519PublicKey) -> Result<Vec<Envelope>>;
}

/// Bound a relay call by `timeout`.
///
/// Dropping the returned future cancels the call.
pub async fn with_timeout<T, F>(timeout: Duration, call: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => Err(RelayError::Timeout(timeout)),
    }
}
