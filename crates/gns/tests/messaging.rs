//! Messaging and epoch publication through a relay.

use std::sync::Arc;
use std::time::Duration;

use gns::messaging::{MemoryResolver, MessagePayload, MessageType, PeerKeys};
use gns::relay::{MemoryRelay, PublishOutcome, Relay};
use gns::store::MemoryStore;
use gns::{GnsConfig, GnsEngine, GnsError, IdentityContext, LocationSource};

struct Network {
    engine: GnsEngine<MemoryStore>,
    relay: Arc<MemoryRelay>,
    resolver: Arc<MemoryResolver>,
}

impl Network {
    fn new() -> Self {
        Self::with_relay(MemoryRelay::new())
    }

    fn with_relay(relay: MemoryRelay) -> Self {
        let relay = Arc::new(relay);
        let resolver = Arc::new(MemoryResolver::new());
        let engine = GnsEngine::new(MemoryStore::new(), GnsConfig::development())
            .unwrap()
            .with_relay(relay.clone())
            .with_resolver(resolver.clone());
        Self {
            engine,
            relay,
            resolver,
        }
    }

    async fn join(&self, handle: &str) -> IdentityContext {
        let ctx = self.engine.create_identity(Some(handle.into())).await.unwrap();
        self.resolver
            .register(PeerKeys {
                public_key: ctx.public_key(),
                encryption_key: ctx.encryption_key(),
                handle: Some(handle.into()),
            })
            .await;
        ctx
    }
}

#[tokio::test]
async fn test_send_and_receive_by_handle() {
    let net = Network::new();
    let alice = net.join("alice").await;
    let bob = net.join("bob").await;

    let sent = net
        .engine
        .send_message(&alice, "@bob", &MessagePayload::text("Hello!"))
        .await
        .unwrap();
    assert_eq!(sent.from_pk, alice.public_key());
    assert_eq!(sent.to_pk, bob.public_key());

    let inbox = net.engine.receive_messages(&bob).await.unwrap();
    assert_eq!(inbox.len(), 1);
    assert_eq!(inbox[0].envelope.message_id, sent.message_id);
    assert_eq!(inbox[0].payload.message_type, MessageType::Text);
    assert_eq!(inbox[0].payload.content, "Hello!");

    // Reply addressed by public key.
    let reply = MessagePayload::text("Hi Alice").in_reply_to(sent.message_id);
    net.engine
        .send_message(&bob, &alice.public_key().to_hex(), &reply)
        .await
        .unwrap();
    let inbox = net.engine.receive_messages(&alice).await.unwrap();
    assert_eq!(inbox.len(), 1);
    assert_eq!(inbox[0].payload.reply_to, Some(sent.message_id));
}

#[tokio::test]
async fn test_resend_is_idempotent() {
    let net = Network::new();
    let alice = net.join("alice").await;
    let bob = net.join("bob").await;

    let envelope = net
        .engine
        .send_message(&alice, "bob", &MessagePayload::text("once"))
        .await
        .unwrap();
    assert_eq!(
        net.engine.resend(&envelope).await.unwrap(),
        PublishOutcome::Duplicate
    );
    assert_eq!(net.engine.receive_messages(&bob).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_offline_relay_is_retryable() {
    let net = Network::new();
    let alice = net.join("alice").await;
    let bob = net.join("bob").await;
    let to_bob = PeerKeys {
        public_key: bob.public_key(),
        encryption_key: bob.encryption_key(),
        handle: None,
    };
    let envelope = net
        .engine
        .encrypt_message(&alice, &to_bob, &MessagePayload::text("later"))
        .unwrap();

    net.relay.set_offline(true);
    let err = net.engine.resend(&envelope).await.unwrap_err();
    assert_eq!(err.code(), "RELAY_ERROR");
    assert!(err.is_recoverable());

    net.relay.set_offline(false);
    assert_eq!(
        net.engine.resend(&envelope).await.unwrap(),
        PublishOutcome::Accepted
    );
    let inbox = net.engine.receive_messages(&bob).await.unwrap();
    assert_eq!(inbox[0].payload.content, "later");
}

#[tokio::test]
async fn test_unknown_peer() {
    let net = Network::new();
    let alice = net.join("alice").await;

    let err = net
        .engine
        .send_message(&alice, "@nobody", &MessagePayload::text("?"))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "MESSAGING_ERROR");
}

#[tokio::test]
async fn test_undecryptable_envelopes_are_skipped() {
    let net = Network::new();
    let alice = net.join("alice").await;
    let bob = net.join("bob").await;
    let carol = net.join("carol").await;

    // Addressed to bob but sealed to carol's encryption key.
    let misdirected = PeerKeys {
        public_key: bob.public_key(),
        encryption_key: carol.encryption_key(),
        handle: None,
    };
    let envelope = net
        .engine
        .encrypt_message(&alice, &misdirected, &MessagePayload::text("lost"))
        .unwrap();
    net.engine.resend(&envelope).await.unwrap();
    net.engine
        .send_message(&alice, "bob", &MessagePayload::text("found"))
        .await
        .unwrap();

    let inbox = net.engine.receive_messages(&bob).await.unwrap();
    assert_eq!(inbox.len(), 1);
    assert_eq!(inbox[0].payload.content, "found");
}

#[tokio::test]
async fn test_wrong_recipient_cannot_decrypt() {
    let net = Network::new();
    let alice = net.join("alice").await;
    let bob = net.join("bob").await;
    let eve = net.join("eve").await;

    let envelope = net
        .engine
        .send_message(&alice, "bob", &MessagePayload::text("private"))
        .await
        .unwrap();
    let err = net.engine.decrypt_message(&eve, &envelope).unwrap_err();
    assert_eq!(err.code(), "CRYPTO_ERROR");
    assert!(net.engine.decrypt_message(&bob, &envelope).is_ok());
}

#[tokio::test]
async fn test_epochs_reach_relay_and_sync_is_idempotent() {
    let net = Network::new();
    let alice = net.join("alice").await;

    for round in 0..2 {
        for i in 0..10 {
            let lat = 37.70 + f64::from(i) * 0.015;
            net.engine
                .collect_breadcrumb(&alice, lat, -122.40, LocationSource::Gps, None)
                .await
                .unwrap();
        }
        let header = net.engine.publish_epoch(&alice).await.unwrap();
        assert_eq!(header.epoch_index, round);
    }

    let remote = net.relay.epochs(&alice.public_key()).await.unwrap();
    assert_eq!(remote, net.engine.epochs(&alice).await.unwrap());
    assert!(remote[1].follows(Some(&remote[0])));

    let outcomes = net.engine.sync_epochs(&alice).await.unwrap();
    assert_eq!(
        outcomes,
        vec![PublishOutcome::Duplicate, PublishOutcome::Duplicate]
    );
}

#[tokio::test]
async fn test_publish_survives_relay_outage() {
    let net = Network::new();
    let alice = net.join("alice").await;
    for i in 0..10 {
        net.engine
            .collect_breadcrumb(&alice, 51.5 + f64::from(i) * 0.02, -0.12, LocationSource::Gps, None)
            .await
            .unwrap();
    }

    net.relay.set_offline(true);
    let header = net.engine.publish_epoch(&alice).await.unwrap();
    assert_eq!(net.engine.epochs(&alice).await.unwrap(), vec![header.clone()]);

    net.relay.set_offline(false);
    assert!(net.relay.epochs(&alice.public_key()).await.unwrap().is_empty());
    assert_eq!(
        net.engine.sync_epochs(&alice).await.unwrap(),
        vec![PublishOutcome::Accepted]
    );
    assert_eq!(
        net.relay.epochs(&alice.public_key()).await.unwrap(),
        vec![header]
    );
}

#[tokio::test]
async fn test_slow_relay_times_out() {
    let net = Network::with_relay(MemoryRelay::new().with_latency(Duration::from_millis(200)));
    let config = GnsConfig {
        network_timeout_ms: 20,
        ..GnsConfig::development()
    };
    let engine = GnsEngine::new(MemoryStore::new(), config)
        .unwrap()
        .with_relay(net.relay.clone());
    let alice = engine.create_identity(None).await.unwrap();

    let err = engine.receive_messages(&alice).await.unwrap_err();
    assert!(matches!(
        err,
        GnsError::Relay(gns::relay::RelayError::Timeout(_))
    ));
    assert!(err.is_recoverable());
}
