//! The engine: unified API over ledger, epochs, trust, handles and messaging.
//!
//! Every operation takes an explicit [`IdentityContext`]. Writes to one
//! identity's ledger are serialised through a per-identity lock; everything
//! else (scoring, encryption, reads) runs freely in parallel.

use std::sync::Arc;

use gns_core::{
    verify_chain, Breadcrumb, BreadcrumbQuery, ChainVerification, CollectionStatus,
    EpochHeader, EpochStats, ExportedIdentity, H3Cell, HandleGate,
    HandleStatus, IdentityKeypair, LocationSource, TrustRequirements, TrustScore, TrustScorer,
    TrustVerification,
};
use gns_messaging::{Envelope, MessagePayload, PeerKeys, PeerResolver};
use gns_relay::{with_timeout, PublishOutcome, Relay};
use gns_store::{IdentityRecord, InsertResult, LedgerStore};

use crate::config::GnsConfig;
use crate::context::IdentityContext;
use crate::error::{GnsError, Result};
use crate::locks::LockRegistry;

/// How far ahead of the local clock an explicit timestamp may be.
pub const MAX_CLOCK_SKEW_MS: i64 = 5 * 60 * 1000;

/// A breadcrumb to append, before hashing and signing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BreadcrumbInput {
    pub h3_index: u64,
    pub h3_resolution: u8,
    /// Unix ms. Must not precede the current tip or lie more than
    /// [`MAX_CLOCK_SKEW_MS`] in the future.
    pub timestamp: i64,
    pub source: LocationSource,
    pub accuracy: Option<f64>,
}

/// A decrypted incoming message.
#[derive(Debug, Clone, PartialEq)]
pub struct ReceivedMessage {
    pub envelope: Envelope,
    pub payload: MessagePayload,
}

/// The main engine.
pub struct GnsEngine<S: LedgerStore> {
    store: Arc<S>,
    config: GnsConfig,
    scorer: TrustScorer,
    gate: HandleGate,
    locks: LockRegistry,
    relay: Option<Arc<dyn Relay>>,
    resolver: Option<Arc<dyn PeerResolver>>,
}

impl<S: LedgerStore> GnsEngine<S> {
    /// Create an engine over `store`. The configuration is validated.
    pub fn new(store: S, config: GnsConfig) -> Result<Self> {
        config.validate()?;
        let scorer = TrustScorer::new(config.trust.clone());
        Ok(Self {
            store: Arc::new(store),
            gate: HandleGate::new(scorer.clone()),
            scorer,
            config,
            locks: LockRegistry::default(),
            relay: None,
            resolver: None,
        })
    }

    pub fn with_relay(mut self, relay: Arc<dyn Relay>) -> Self {
        self.relay = Some(relay);
        self
    }

    pub fn with_resolver(mut self, resolver: Arc<dyn PeerResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn config(&self) -> &GnsConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Identity Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Generate a new identity and register its public record.
    pub async fn create_identity(&self, name: Option<String>) -> Result<IdentityContext> {
        let keypair = IdentityKeypair::generate();
        let created_at = now_millis();
        let record = IdentityRecord {
            public_key: keypair.public_key(),
            encryption_key: keypair.encryption_public_key(),
            created_at,
            name,
            handle: HandleStatus::None,
        };
        self.store.put_identity(&record).await?;

        tracing::info!(identity = %record.public_key.short(), "created identity");
        Ok(IdentityContext::new(keypair, created_at))
    }

    /// Restore an identity from an encrypted backup.
    ///
    /// An existing record for the same key is kept as is, so re-importing
    /// does not reset creation time or handle state.
    pub async fn import_identity(
        &self,
        backup: &ExportedIdentity,
        passphrase: &str,
    ) -> Result<IdentityContext> {
        let name = backup.name.clone();
        let sealed = backup.clone();
        let passphrase = passphrase.to_string();
        let keypair = tokio::task::spawn_blocking(move || sealed.import(&passphrase))
            .await
            .map_err(|e| GnsError::Crypto(format!("import task failed: {e}")))??;

        let public_key = keypair.public_key();
        let record = match self.store.get_identity(&public_key).await? {
            Some(existing) => existing,
            None => {
                let record = IdentityRecord {
                    public_key,
                    encryption_key: keypair.encryption_public_key(),
                    created_at: now_millis(),
                    name,
                    handle: HandleStatus::None,
                };
                self.store.put_identity(&record).await?;
                record
            }
        };

        tracing::info!(identity = %public_key.short(), "imported identity");
        Ok(IdentityContext::new(keypair, record.created_at))
    }

    /// Seal the identity's secret key under `passphrase`.
    pub async fn export_identity(
        &self,
        ctx: &IdentityContext,
        passphrase: &str,
    ) -> Result<ExportedIdentity> {
        let record = self.record(ctx).await?;
        let keypair = ctx.keypair().clone();
        let passphrase = passphrase.to_string();
        let handle = record.handle.handle().map(str::to_string);

        let exported = tokio::task::spawn_blocking(move || {
            ExportedIdentity::export(&keypair, &passphrase, record.name, handle)
        })
        .await
        .map_err(|e| GnsError::Crypto(format!("export task failed: {e}")))??;
        Ok(exported)
    }

    /// Public record of the identity.
    pub async fn identity(&self, ctx: &IdentityContext) -> Result<IdentityRecord> {
        self.record(ctx).await
    }

    /// Delete an identity with its whole ledger and all epochs.
    pub async fn delete_identity(&self, ctx: &IdentityContext) -> Result<bool> {
        let identity = ctx.public_key();
        let lock = self.locks.get(&identity);
        let deleted = {
            let _write = lock.write().await;
            self.store.delete_identity(&identity).await?
        };

        if deleted {
            tracing::info!(identity = %identity.short(), "deleted identity");
        }
        Ok(deleted)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Breadcrumb Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Append a breadcrumb for an already-quantised cell.
    pub async fn append_breadcrumb(
        &self,
        ctx: &IdentityContext,
        input: BreadcrumbInput,
    ) -> Result<Breadcrumb> {
        let cell = H3Cell::from_u64(input.h3_index)?;
        if cell.resolution() != input.h3_resolution {
            return Err(gns_core::CoreError::ResolutionMismatch {
                declared: input.h3_resolution,
                actual: cell.resolution(),
            }
            .into());
        }
        self.append_cell(ctx, cell, Some(input.timestamp), input.source, input.accuracy)
            .await
    }

    /// Quantise coordinates to a cell at the configured resolution and append
    /// it timestamped now. Raw coordinates are not kept.
    pub async fn collect_breadcrumb(
        &self,
        ctx: &IdentityContext,
        lat: f64,
        lng: f64,
        source: LocationSource,
        accuracy: Option<f64>,
    ) -> Result<Breadcrumb> {
        let cell = H3Cell::from_lat_lng(lat, lng, self.config.h3_resolution)?;
        self.append_cell(ctx, cell, None, source, accuracy).await
    }

    /// Sign and append under the identity's write lock.
    ///
    /// With no explicit timestamp the current time is taken inside the lock,
    /// clamped so it never precedes the tip.
    async fn append_cell(
        &self,
        ctx: &IdentityContext,
        cell: H3Cell,
        timestamp: Option<i64>,
        source: LocationSource,
        accuracy: Option<f64>,
    ) -> Result<Breadcrumb> {
        let identity = ctx.public_key();
        let lock = self.locks.get(&identity);
        let _write = lock.write().await;

        // Checked under the lock so a concurrent delete cannot leave orphans.
        self.record(ctx).await?;

        let now = now_millis();
        if let Some(ts) = timestamp {
            if !(0..=now.saturating_add(MAX_CLOCK_SKEW_MS)).contains(&ts) {
                return Err(GnsError::InvalidInput(format!(
                    "timestamp {ts} outside 0..={now} (+{MAX_CLOCK_SKEW_MS} ms skew)"
                )));
            }
        }

        let tip = self.store.last_breadcrumb(&identity).await?;
        let timestamp = match (timestamp, &tip) {
            (Some(ts), Some(tip)) if ts < tip.timestamp => {
                return Err(GnsError::InvalidInput(format!(
                    "timestamp {ts} precedes ledger tip {}",
                    tip.timestamp
                )));
            }
            (Some(ts), _) => ts,
            (None, Some(tip)) => now.max(tip.timestamp),
            (None, None) => now,
        };

        let mut builder = Breadcrumb::builder(cell, timestamp)
            .source(source)
            .accuracy(accuracy);
        if let Some(tip) = &tip {
            builder = builder.prev(tip.hash);
        }
        let breadcrumb = builder.sign(ctx.keypair());

        match self.store.append_breadcrumb(&identity, &breadcrumb).await? {
            InsertResult::Inserted | InsertResult::AlreadyExists => {}
            InsertResult::Conflict { existing } => {
                let counts = self.store.counts(&identity).await?;
                tracing::warn!(
                    identity = %identity.short(),
                    tip = %existing.to_hex(),
                    "append raced with another writer"
                );
                return Err(GnsError::ChainIntegrity {
                    broken_at: counts.total as usize,
                    reason: format!("ledger tip moved to {}", existing.to_hex()),
                });
            }
        }

        tracing::debug!(
            identity = %identity.short(),
            cell = %cell,
            timestamp,
            "appended breadcrumb"
        );
        Ok(breadcrumb)
    }

    pub async fn breadcrumbs(
        &self,
        ctx: &IdentityContext,
        query: &BreadcrumbQuery,
    ) -> Result<Vec<Breadcrumb>> {
        Ok(self.store.query_breadcrumbs(&ctx.public_key(), query).await?)
    }

    /// Breadcrumbs strictly after `since`, at most `limit`.
    pub async fn range(
        &self,
        ctx: &IdentityContext,
        since: Option<i64>,
        limit: usize,
    ) -> Result<Vec<Breadcrumb>> {
        Ok(self.store.range(&ctx.public_key(), since, limit).await?)
    }

    /// Walk the whole ledger once.
    pub async fn verify_chain(&self, ctx: &IdentityContext) -> Result<ChainVerification> {
        let identity = ctx.public_key();
        let breadcrumbs = self.store.all_breadcrumbs(&identity).await?;
        let verification = verify_chain(&identity, &breadcrumbs);
        if let (Some(index), Some(reason)) = (verification.broken_at, verification.reason) {
            tracing::warn!(
                identity = %identity.short(),
                broken_at = index,
                %reason,
                "breadcrumb chain is broken"
            );
        }
        Ok(verification)
    }

    /// Like [`verify_chain`](Self::verify_chain) but a break is an error.
    pub async fn ensure_chain(&self, ctx: &IdentityContext) -> Result<ChainVerification> {
        let verification = self.verify_chain(ctx).await?;
        match (verification.broken_at, verification.reason) {
            (Some(broken_at), Some(reason)) => Err(GnsError::ChainIntegrity {
                broken_at,
                reason: reason.to_string(),
            }),
            _ => Ok(verification),
        }
    }

    /// Unpublished breadcrumbs, oldest first.
    pub async fn pending(
        &self,
        ctx: &IdentityContext,
        limit: Option<usize>,
    ) -> Result<Vec<Breadcrumb>> {
        Ok(self
            .store
            .pending_breadcrumbs(&ctx.public_key(), limit)
            .await?)
    }

    pub async fn collection_status(&self, ctx: &IdentityContext) -> Result<CollectionStatus> {
        let counts = self.store.counts(&ctx.public_key()).await?;
        Ok(CollectionStatus {
            total_breadcrumbs: counts.total,
            pending_breadcrumbs: counts.pending,
            unique_locations: counts.unique_locations,
            last_breadcrumb_at: counts.last_timestamp,
            interval_secs: self.config.breadcrumb_collection_interval_secs,
            can_publish: counts.pending >= self.config.min_breadcrumbs_for_epoch as u64,
        })
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Epoch Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Whether the configured threshold of pending breadcrumbs is reached.
    pub async fn can_publish(&self, ctx: &IdentityContext) -> Result<bool> {
        self.can_publish_with(ctx, self.config.min_breadcrumbs_for_epoch)
            .await
    }

    /// Whether at least `min_breadcrumbs` are pending.
    pub async fn can_publish_with(
        &self,
        ctx: &IdentityContext,
        min_breadcrumbs: usize,
    ) -> Result<bool> {
        let counts = self.store.counts(&ctx.public_key()).await?;
        Ok(counts.pending >= min_breadcrumbs as u64)
    }

    /// Batch every pending breadcrumb into the next epoch.
    ///
    /// The pending set is captured once the write lock is held; breadcrumbs
    /// appended afterwards belong to the next epoch. Fails with
    /// `ConcurrentPublish` if a publication for the identity is in flight.
    /// A configured relay is notified afterwards; relay failures are logged
    /// and can be retried with [`sync_epochs`](Self::sync_epochs).
    pub async fn publish_epoch(&self, ctx: &IdentityContext) -> Result<EpochHeader> {
        let identity = ctx.public_key();
        let lock = self.locks.get(&identity);
        let _publishing = lock
            .try_begin_publish()
            .ok_or(GnsError::ConcurrentPublish)?;

        let header = {
            let _write = lock.write().await;
            self.publish_locked(ctx).await?
        };

        if self.relay.is_some() {
            if let Err(e) = self.push_epoch(&header).await {
                tracing::warn!(
                    identity = %identity.short(),
                    epoch_index = header.epoch_index,
                    error = %e,
                    "relay publication failed; epoch kept locally"
                );
            }
        }
        Ok(header)
    }

    async fn publish_locked(&self, ctx: &IdentityContext) -> Result<EpochHeader> {
        let identity = ctx.public_key();
        self.record(ctx).await?;

        let pending = self.store.pending_breadcrumbs(&identity, None).await?;
        let required = self.config.min_breadcrumbs_for_epoch.max(1);
        if pending.len() < required {
            return Err(GnsError::InsufficientBreadcrumbs {
                required,
                available: pending.len(),
            });
        }

        self.ensure_chain(ctx).await?;

        let previous = self.store.last_epoch(&identity).await?;
        let epoch_index = previous.as_ref().map_or(0, |e| e.epoch_index + 1);
        let header = EpochHeader::build(
            ctx.keypair(),
            epoch_index,
            previous.map(|e| e.epoch_hash),
            &pending,
            self.config.epoch_block_size,
        )?;

        let ids: Vec<String> = pending.iter().map(|b| b.id.clone()).collect();
        self.store.commit_epoch(&header, &ids).await?;

        tracing::info!(
            identity = %identity.short(),
            epoch_index,
            breadcrumbs = ids.len(),
            blocks = header.block_count,
            "published epoch"
        );
        Ok(header)
    }

    pub async fn epochs(&self, ctx: &IdentityContext) -> Result<Vec<EpochHeader>> {
        Ok(self.store.epochs(&ctx.public_key()).await?)
    }

    /// Resubmit every local epoch to the relay in order.
    ///
    /// Safe to repeat: the relay reports already-held epochs as duplicates.
    pub async fn sync_epochs(&self, ctx: &IdentityContext) -> Result<Vec<PublishOutcome>> {
        let mut outcomes = Vec::new();
        for header in self.store.epochs(&ctx.public_key()).await? {
            outcomes.push(self.push_epoch(&header).await?);
        }
        Ok(outcomes)
    }

    async fn push_epoch(&self, header: &EpochHeader) -> Result<PublishOutcome> {
        let relay = self.relay()?;
        Ok(with_timeout(self.config.network_timeout(), relay.publish_epoch(header)).await?)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Trust Operations
    // ─────────────────────────────────────────────────────────────────────────

    pub async fn trust_score(&self, ctx: &IdentityContext) -> Result<TrustScore> {
        self.trust_score_at(ctx, now_millis()).await
    }

    /// Score as of `now` (unix ms). Identical ledger state and `now` always
    /// give an identical score.
    pub async fn trust_score_at(&self, ctx: &IdentityContext, now: i64) -> Result<TrustScore> {
        let identity = ctx.public_key();
        let record = self.record(ctx).await?;
        let breadcrumbs = self.store.all_breadcrumbs(&identity).await?;
        let epochs = EpochStats {
            epoch_count: self.store.epoch_count(&identity).await?,
        };

        let stats = self
            .scorer
            .analyze(&identity, &breadcrumbs, Some(record.created_at));
        Ok(self.scorer.compute_score(&stats, &epochs, now))
    }

    pub async fn verify_identity(
        &self,
        ctx: &IdentityContext,
        requirements: &TrustRequirements,
    ) -> Result<TrustVerification> {
        self.verify_identity_at(ctx, requirements, now_millis())
            .await
    }

    pub async fn verify_identity_at(
        &self,
        ctx: &IdentityContext,
        requirements: &TrustRequirements,
        now: i64,
    ) -> Result<TrustVerification> {
        let score = self.trust_score_at(ctx, now).await?;
        Ok(self
            .scorer
            .verify(&ctx.public_key(), &score, requirements, now))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Handle Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Current handle state with reservation progress refreshed.
    pub async fn handle_status(&self, ctx: &IdentityContext) -> Result<HandleStatus> {
        let lock = self.locks.get(&ctx.public_key());
        let _write = lock.write().await;

        let mut record = self.record(ctx).await?;
        if record.handle.is_reserved() {
            let score = self.trust_score(ctx).await?;
            record.handle = self.gate.refresh_progress(&record.handle, &score);
            self.store.put_identity(&record).await?;
        }
        Ok(record.handle)
    }

    pub async fn reserve_handle(&self, ctx: &IdentityContext, handle: &str) -> Result<HandleStatus> {
        let lock = self.locks.get(&ctx.public_key());
        let _write = lock.write().await;

        let mut record = self.record(ctx).await?;
        let now = now_millis();
        let score = self.trust_score_at(ctx, now).await?;
        record.handle = self.gate.reserve(&record.handle, handle, &score, now)?;
        self.store.put_identity(&record).await?;

        tracing::info!(
            identity = %record.public_key.short(),
            handle = record.handle.handle().unwrap_or_default(),
            "reserved handle"
        );
        Ok(record.handle)
    }

    /// Claim the reserved handle. Failure names the unmet requirements.
    pub async fn claim_handle(&self, ctx: &IdentityContext) -> Result<TrustVerification> {
        let lock = self.locks.get(&ctx.public_key());
        let _write = lock.write().await;

        let mut record = self.record(ctx).await?;
        let now = now_millis();
        let score = self.trust_score_at(ctx, now).await?;
        let (status, verification) =
            self.gate
                .claim(&record.handle, &record.public_key, &score, now)?;
        record.handle = status;
        self.store.put_identity(&record).await?;

        tracing::info!(
            identity = %record.public_key.short(),
            handle = record.handle.handle().unwrap_or_default(),
            "claimed handle"
        );
        Ok(verification)
    }

    /// Check the payment preset.
    pub async fn authorize_payment(&self, ctx: &IdentityContext) -> Result<TrustVerification> {
        let now = now_millis();
        let score = self.trust_score_at(ctx, now).await?;
        Ok(self.gate.authorize_payment(&ctx.public_key(), &score, now)?)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Messaging Operations
    // ─────────────────────────────────────────────────────────────────────────

    pub fn encrypt_message(
        &self,
        ctx: &IdentityContext,
        peer: &PeerKeys,
        payload: &MessagePayload,
    ) -> Result<Envelope> {
        Ok(gns_messaging::encrypt_payload(
            ctx.keypair(),
            &peer.public_key,
            &peer.encryption_key,
            payload,
        )?)
    }

    pub fn decrypt_message(
        &self,
        ctx: &IdentityContext,
        envelope: &Envelope,
    ) -> Result<MessagePayload> {
        Ok(gns_messaging::decrypt_payload(ctx.keypair(), envelope)?)
    }

    /// Resolve `to`, encrypt and hand the envelope to the relay.
    ///
    /// Returns the envelope so a failed send can be retried with the same
    /// `message_id` via [`resend`](Self::resend).
    pub async fn send_message(
        &self,
        ctx: &IdentityContext,
        to: &str,
        payload: &MessagePayload,
    ) -> Result<Envelope> {
        let resolver = self
            .resolver
            .as_ref()
            .ok_or_else(|| GnsError::Config("no peer resolver configured".into()))?;
        let peer = with_resolver_timeout(self.config.network_timeout(), resolver.resolve(to))
            .await?;

        let envelope = self.encrypt_message(ctx, &peer, payload)?;
        self.resend(&envelope).await?;
        tracing::debug!(
            from = %envelope.from_pk.short(),
            to = %envelope.to_pk.short(),
            message_id = %envelope.message_id,
            "sent message"
        );
        Ok(envelope)
    }

    /// Submit an existing envelope again.
    pub async fn resend(&self, envelope: &Envelope) -> Result<PublishOutcome> {
        let relay = self.relay()?;
        Ok(with_timeout(self.config.network_timeout(), relay.send_envelope(envelope)).await?)
    }

    /// Fetch and decrypt waiting envelopes. Envelopes that fail verification
    /// are logged and skipped.
    pub async fn receive_messages(&self, ctx: &IdentityContext) -> Result<Vec<ReceivedMessage>> {
        let relay = self.relay()?;
        let envelopes = with_timeout(
            self.config.network_timeout(),
            relay.fetch_envelopes(&ctx.public_key()),
        )
        .await?;

        let mut received = Vec::with_capacity(envelopes.len());
        for envelope in envelopes {
            match self.decrypt_message(ctx, &envelope) {
                Ok(payload) => received.push(ReceivedMessage { envelope, payload }),
                Err(e) => tracing::warn!(
                    message_id = %envelope.message_id,
                    error = %e,
                    "dropping undecryptable envelope"
                ),
            }
        }
        Ok(received)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Helpers
    // ─────────────────────────────────────────────────────────────────────────

    async fn record(&self, ctx: &IdentityContext) -> Result<IdentityRecord> {
        let identity = ctx.public_key();
        self.store
            .get_identity(&identity)
            .await?
            .ok_or_else(|| GnsError::IdentityNotFound(identity.to_hex()))
    }

    fn relay(&self) -> Result<&Arc<dyn Relay>> {
        self.relay
            .as_ref()
            .ok_or_else(|| GnsError::Config("no relay configured".into()))
    }
}

async fn with_resolver_timeout<F>(timeout: std::time::Duration, lookup: F) -> Result<PeerKeys>
where
    F: std::future::Future<Output = gns_messaging::Result<PeerKeys>>,
{
    match tokio::time::timeout(timeout, lookup).await {
        Ok(result) => Ok(result?),
        Err(_) => Err(gns_relay::RelayError::Timeout(timeout).into()),
    }
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
