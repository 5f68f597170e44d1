//! End-to-end scenarios for trust, epochs, messaging and chain tampering.

use gns::core::{verify_breadcrumb, verify_chain, verify_epoch, BreadcrumbFault, H3Cell};
use gns::messaging::{MessagePayload, PeerKeys};
use gns::store::MemoryStore;
use gns::{
    BreadcrumbInput, GnsConfig, GnsEngine, GnsError, IdentityContext, LocationSource,
    TrustRequirements, TrustTier,
};
use gns_testkit::{TestIdentity, TrailSpec};

const DAY_MS: i64 = 86_400_000;

fn engine() -> GnsEngine<MemoryStore> {
    GnsEngine::new(MemoryStore::new(), GnsConfig::default()).unwrap()
}

/// Replay a generated trail's cells and timestamps through the engine.
async fn load_trail(engine: &GnsEngine<MemoryStore>, ctx: &IdentityContext, spec: &TrailSpec) {
    let template = TestIdentity::alice().trail(spec);
    for crumb in template {
        engine
            .append_breadcrumb(
                ctx,
                BreadcrumbInput {
                    h3_index: crumb.h3_index.as_u64(),
                    h3_resolution: crumb.h3_resolution,
                    timestamp: crumb.timestamp,
                    source: LocationSource::Gps,
                    accuracy: Some(12.0),
                },
            )
            .await
            .unwrap();
    }
}

#[tokio::test]
async fn scenario_a_empty_identity_is_seedling() {
    let engine = engine();
    let ctx = engine.create_identity(Some("new".into())).await.unwrap();

    let score = engine.trust_score(&ctx).await.unwrap();
    assert_eq!(score.components.trajectory_quality, 0.0);
    assert_eq!(score.components.temporal_consistency, 0.0);
    assert_eq!(score.components.epoch_reliability, 0.0);
    assert_eq!(score.components.geographic_diversity, 0.0);
    assert_eq!(score.components.chain_integrity, 100.0);
    assert_eq!(score.tier, TrustTier::Seedling);
    assert_eq!(score.breadcrumb_count, 0);

    let verification = engine
        .verify_identity(&ctx, &TrustRequirements::for_handle_claim())
        .await
        .unwrap();
    assert!(!verification.is_verified);
}

#[tokio::test]
async fn scenario_b_trajectory_meets_handle_claim() {
    let engine = engine();
    let ctx = engine.create_identity(None).await.unwrap();
    let spec = TrailSpec::new(150, 12, 10);
    load_trail(&engine, &ctx, &spec).await;

    assert!(engine.can_publish(&ctx).await.unwrap());
    let header = engine.publish_epoch(&ctx).await.unwrap();
    assert_eq!(header.epoch_index, 0);
    assert_eq!(header.block_count, 15);
    assert!(engine.pending(&ctx, None).await.unwrap().is_empty());

    let published = engine.range(&ctx, None, 1_000).await.unwrap();
    assert_eq!(published.len(), 150);
    assert!(published.iter().all(|b| b.published));
    verify_epoch(&header, &published, engine.config().epoch_block_size).unwrap();

    let now = spec.start + 11 * DAY_MS;
    let verification = engine
        .verify_identity_at(&ctx, &TrustRequirements::for_handle_claim(), now)
        .await
        .unwrap();
    assert!(
        verification.is_verified,
        "failed checks: {:?}",
        verification.failed_checks()
    );
    assert_eq!(verification.trust_score.unique_locations, 12);
    assert_eq!(verification.trust_score.epoch_count, 1);
    assert!(verification.trust_score.account_age_days >= 7);

    // A second publish has nothing left to batch.
    assert!(matches!(
        engine.publish_epoch(&ctx).await,
        Err(GnsError::InsufficientBreadcrumbs { available: 0, .. })
    ));

    // Same snapshot, same score.
    let a = engine.trust_score_at(&ctx, now).await.unwrap();
    let b = engine.trust_score_at(&ctx, now).await.unwrap();
    assert_eq!(a, b);
}

#[tokio::test]
async fn scenario_c_flipped_ciphertext_is_a_crypto_error() {
    let engine = engine();
    let alice = engine.create_identity(None).await.unwrap();
    let bob = engine.create_identity(None).await.unwrap();
    let to_bob = PeerKeys {
        public_key: bob.public_key(),
        encryption_key: bob.encryption_key(),
        handle: None,
    };

    let mut envelope = engine
        .encrypt_message(&alice, &to_bob, &MessagePayload::text("Hello!"))
        .unwrap();
    assert_eq!(
        engine.decrypt_message(&bob, &envelope).unwrap().content,
        "Hello!"
    );

    envelope.ciphertext[3] ^= 0x80;
    let err = engine.decrypt_message(&bob, &envelope).unwrap_err();
    assert!(matches!(err, GnsError::Crypto(_)), "got {err:?}");
    assert!(!err.is_recoverable());
}

#[tokio::test]
async fn scenario_d_tampered_cell_breaks_chain_at_index() {
    let engine = engine();
    let ctx = engine.create_identity(None).await.unwrap();
    load_trail(&engine, &ctx, &TrailSpec::new(100, 8, 4)).await;
    assert!(engine.verify_chain(&ctx).await.unwrap().valid);

    let mut crumbs = engine.range(&ctx, None, 1_000).await.unwrap();
    let elsewhere = H3Cell::from_lat_lng(48.8566, 2.3522, crumbs[50].h3_resolution).unwrap();
    crumbs[50].h3_index = elsewhere;

    let verification = verify_chain(&ctx.public_key(), &crumbs);
    assert!(!verification.valid);
    assert_eq!(verification.broken_at, Some(50));
    assert_eq!(verification.reason, Some(BreadcrumbFault::HashMismatch));
    assert_eq!(verification.valid_prefix(), 50);

    for crumb in &crumbs[..50] {
        assert!(verify_breadcrumb(&ctx.public_key(), crumb));
    }
}

#[tokio::test]
async fn test_handle_claim_reports_failed_checks() {
    let engine = engine();
    let ctx = engine.create_identity(None).await.unwrap();
    load_trail(&engine, &ctx, &TrailSpec::new(20, 3, 1)).await;

    let status = engine.reserve_handle(&ctx, "@Alice_01").await.unwrap();
    assert_eq!(status.handle(), Some("alice_01"));
    assert_eq!(status.display_name(), "@alice_01 (pending)");

    let err = engine.claim_handle(&ctx).await.unwrap_err();
    match err {
        GnsError::InsufficientTrust { checks } => {
            let names: Vec<_> = checks.iter().map(|c| c.name.as_str()).collect();
            assert!(names.contains(&"Minimum Breadcrumbs"));
            assert!(names.contains(&"Unique Locations"));
            assert!(checks.iter().all(|c| !c.passed));
        }
        other => panic!("expected InsufficientTrust, got {other:?}"),
    }
    assert!(engine.identity(&ctx).await.unwrap().handle.is_reserved());
}

#[tokio::test]
async fn test_handle_claim_after_trajectory() {
    let engine = engine();
    let ctx = engine.create_identity(None).await.unwrap();
    load_trail(&engine, &ctx, &TrailSpec::new(150, 12, 10)).await;
    engine.publish_epoch(&ctx).await.unwrap();

    engine.reserve_handle(&ctx, "walker").await.unwrap();
    let verification = engine.claim_handle(&ctx).await.unwrap();
    assert!(verification.is_verified);

    let record = engine.identity(&ctx).await.unwrap();
    assert!(record.handle.is_claimed());
    assert_eq!(record.handle.display_name(), "@walker");

    assert!(matches!(
        engine.reserve_handle(&ctx, "another").await,
        Err(GnsError::Handle(_))
    ));

    // 150 breadcrumbs over 12 cells is not enough for payments.
    match engine.authorize_payment(&ctx).await {
        Err(GnsError::InsufficientTrust { checks }) => {
            assert!(checks.iter().any(|c| c.name == "Minimum Breadcrumbs"));
        }
        other => panic!("expected InsufficientTrust, got {other:?}"),
    }
}

#[tokio::test]
async fn test_reserved_words_and_bad_handles() {
    let engine = engine();
    let ctx = engine.create_identity(None).await.unwrap();
    for bad in ["admin", "ab", "has space", "waytoolonghandle_over20"] {
        assert!(
            matches!(engine.reserve_handle(&ctx, bad).await, Err(GnsError::Handle(_))),
            "{bad} should be refused"
        );
    }
    assert!(!engine.identity(&ctx).await.unwrap().handle.is_reserved());
}

#[tokio::test]
async fn test_collection_status_and_queries() {
    let engine = GnsEngine::new(MemoryStore::new(), GnsConfig::development()).unwrap();
    let ctx = engine.create_identity(None).await.unwrap();
    let spec = TrailSpec::new(12, 4, 1);
    load_trail(&engine, &ctx, &spec).await;

    let status = engine.collection_status(&ctx).await.unwrap();
    assert_eq!(status.total_breadcrumbs, 12);
    assert_eq!(status.pending_breadcrumbs, 12);
    assert_eq!(status.unique_locations, 4);
    assert_eq!(status.interval_secs, 300);
    assert!(status.can_publish);

    let page = engine
        .breadcrumbs(
            &ctx,
            &gns::BreadcrumbQuery {
                limit: 5,
                offset: 2,
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(page.len(), 5);
    assert_eq!(page[0].timestamp, spec.start + 2 * spec.interval_ms());

    let after = engine.range(&ctx, Some(page[4].timestamp), 100).await.unwrap();
    assert_eq!(after.len(), 12 - 7);
}

#[tokio::test]
async fn test_collect_quantises_coordinates() {
    let engine = engine();
    let ctx = engine.create_identity(None).await.unwrap();
    let crumb = engine
        .collect_breadcrumb(&ctx, 40.7128, -74.0060, LocationSource::Fused, Some(5.0))
        .await
        .unwrap();
    assert_eq!(crumb.h3_resolution, 7);
    assert_eq!(crumb.h3_index, H3Cell::from_lat_lng(40.7128, -74.0060, 7).unwrap());
    assert_eq!(crumb.source, LocationSource::Fused);

    assert!(engine
        .collect_breadcrumb(&ctx, f64::NAN, 0.0, LocationSource::Gps, None)
        .await
        .is_err());
}

#[tokio::test]
async fn test_delete_identity_purges_everything() {
    let engine = GnsEngine::new(MemoryStore::new(), GnsConfig::development()).unwrap();
    let ctx = engine.create_identity(None).await.unwrap();
    load_trail(&engine, &ctx, &TrailSpec::new(15, 3, 1)).await;
    engine.publish_epoch(&ctx).await.unwrap();

    assert!(engine.delete_identity(&ctx).await.unwrap());
    assert!(engine.range(&ctx, None, 100).await.unwrap().is_empty());
    assert!(engine.epochs(&ctx).await.unwrap().is_empty());
    assert!(matches!(
        engine.identity(&ctx).await,
        Err(GnsError::IdentityNotFound(_))
    ));
    assert!(!engine.delete_identity(&ctx).await.unwrap());
}

#[tokio::test]
async fn test_out_of_range_timestamps_are_rejected() {
    let engine = engine();
    let ctx = engine.create_identity(None).await.unwrap();
    load_trail(&engine, &ctx, &TrailSpec::new(6, 2, 1)).await;
    let before = engine.range(&ctx, None, 100).await.unwrap();

    let cell = H3Cell::from_lat_lng(37.7749, -122.4194, 7).unwrap();
    let century = 100 * 365 * DAY_MS;
    for ts in [
        -1,
        i64::MIN,
        i64::MAX,
        i64::MAX / 2 + 10,
        gns_testkit::BASE_TIME + century,
        gns_testkit::BASE_TIME + century + gns::MAX_CLOCK_SKEW_MS,
    ] {
        let err = engine
            .append_breadcrumb(
                &ctx,
                BreadcrumbInput {
                    h3_index: cell.as_u64(),
                    h3_resolution: cell.resolution(),
                    timestamp: ts,
                    source: LocationSource::Gps,
                    accuracy: None,
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), "INVALID_INPUT", "timestamp {ts}");
    }

    assert_eq!(engine.range(&ctx, None, 100).await.unwrap(), before);
    let score = engine.trust_score(&ctx).await.unwrap();
    assert_eq!(score.breadcrumb_count, 6);
    assert!((0.0..=100.0).contains(&score.score));
}
