//! Per-identity serialisation of appends and epoch publication.

use std::sync::Arc;

use gns::core::verify_epoch;
use gns::store::MemoryStore;
use gns::{GnsConfig, GnsEngine, GnsError, IdentityContext, LocationSource};

type Engine = Arc<GnsEngine<MemoryStore>>;

fn engine() -> Engine {
    Arc::new(GnsEngine::new(MemoryStore::new(), GnsConfig::development()).unwrap())
}

async fn collect_many(engine: &Engine, ctx: &IdentityContext, count: usize) {
    let mut tasks = Vec::with_capacity(count);
    for i in 0..count {
        let engine = Arc::clone(engine);
        let ctx = ctx.clone();
        tasks.push(tokio::spawn(async move {
            let lat = 35.0 + (i % 7) as f64 * 0.03;
            engine
                .collect_breadcrumb(&ctx, lat, 139.7, LocationSource::Network, None)
                .await
        }));
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_appends_keep_one_chain() {
    let engine = engine();
    let ctx = engine.create_identity(None).await.unwrap();

    collect_many(&engine, &ctx, 64).await;

    let crumbs = engine.range(&ctx, None, 1_000).await.unwrap();
    assert_eq!(crumbs.len(), 64);
    let verification = engine.verify_chain(&ctx).await.unwrap();
    assert!(verification.valid, "{verification:?}");
    assert!(crumbs.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_identities_progress_independently() {
    let engine = engine();
    let alice = engine.create_identity(None).await.unwrap();
    let bob = engine.create_identity(None).await.unwrap();

    let a = {
        let engine = Arc::clone(&engine);
        let alice = alice.clone();
        tokio::spawn(async move { collect_many(&engine, &alice, 30).await })
    };
    let b = {
        let engine = Arc::clone(&engine);
        let bob = bob.clone();
        tokio::spawn(async move { collect_many(&engine, &bob, 30).await })
    };
    a.await.unwrap();
    b.await.unwrap();

    for ctx in [&alice, &bob] {
        assert_eq!(engine.range(ctx, None, 100).await.unwrap().len(), 30);
        assert!(engine.verify_chain(ctx).await.unwrap().valid);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_double_publish_yields_one_epoch() {
    let engine = engine();
    let ctx = engine.create_identity(None).await.unwrap();
    collect_many(&engine, &ctx, 25).await;

    let first = {
        let engine = Arc::clone(&engine);
        let ctx = ctx.clone();
        tokio::spawn(async move { engine.publish_epoch(&ctx).await })
    };
    let second = {
        let engine = Arc::clone(&engine);
        let ctx = ctx.clone();
        tokio::spawn(async move { engine.publish_epoch(&ctx).await })
    };
    let results = [first.await.unwrap(), second.await.unwrap()];

    let published: Vec<_> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].epoch_index, 0);
    for result in &results {
        if let Err(e) = result {
            assert!(
                matches!(
                    e,
                    GnsError::ConcurrentPublish
                        | GnsError::InsufficientBreadcrumbs { available: 0, .. }
                ),
                "unexpected error: {e:?}"
            );
        }
    }
    assert_eq!(engine.epochs(&ctx).await.unwrap().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_appends_during_publish_land_in_one_epoch_or_pending() {
    let engine = engine();
    let ctx = engine.create_identity(None).await.unwrap();
    collect_many(&engine, &ctx, 30).await;

    let publish = {
        let engine = Arc::clone(&engine);
        let ctx = ctx.clone();
        tokio::spawn(async move { engine.publish_epoch(&ctx).await })
    };
    collect_many(&engine, &ctx, 20).await;
    let header = publish.await.unwrap().unwrap();

    let all = engine.range(&ctx, None, 1_000).await.unwrap();
    assert_eq!(all.len(), 50);
    assert!(engine.verify_chain(&ctx).await.unwrap().valid);

    let published: Vec<_> = all.iter().filter(|b| b.published).cloned().collect();
    let pending = engine.pending(&ctx, None).await.unwrap();
    assert!(published.len() >= 30);
    assert_eq!(published.len() + pending.len(), 50);
    verify_epoch(&header, &published, engine.config().epoch_block_size).unwrap();

    // Published breadcrumbs form a prefix of the ledger.
    let boundary = published.len();
    assert!(all[..boundary].iter().all(|b| b.published));
    assert!(all[boundary..].iter().all(|b| !b.published));
}

#[tokio::test]
async fn test_publish_flag_released_after_failure() {
    let engine = engine();
    let ctx = engine.create_identity(None).await.unwrap();
    collect_many(&engine, &ctx, 3).await;

    assert!(matches!(
        engine.publish_epoch(&ctx).await,
        Err(GnsError::InsufficientBreadcrumbs { required: 10, available: 3 })
    ));
    collect_many(&engine, &ctx, 7).await;
    assert_eq!(engine.publish_epoch(&ctx).await.unwrap().epoch_index, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_delete_racing_appends_leaves_no_orphans() {
    let engine = engine();
    let ctx = engine.create_identity(None).await.unwrap();

    let mut appends = Vec::new();
    let mut delete = None;
    for i in 0..48 {
        appends.push({
            let engine = Arc::clone(&engine);
            let ctx = ctx.clone();
            tokio::spawn(async move {
                let lat = 51.5 + (i % 5) as f64 * 0.02;
                engine
                    .collect_breadcrumb(&ctx, lat, -0.12, LocationSource::Gps, None)
                    .await
            })
        });
        if i == 24 {
            let engine = Arc::clone(&engine);
            let ctx = ctx.clone();
            delete = Some(tokio::spawn(async move { engine.delete_identity(&ctx).await }));
        }
    }
    assert!(delete.unwrap().await.unwrap().unwrap());
    for task in appends {
        match task.await.unwrap() {
            Ok(_) | Err(GnsError::IdentityNotFound(_)) => {}
            Err(e) => panic!("unexpected error: {e}"),
        }
    }

    assert!(engine.range(&ctx, None, 1_000).await.unwrap().is_empty());
    assert!(matches!(
        engine.identity(&ctx).await,
        Err(GnsError::IdentityNotFound(_))
    ));
    let late = engine
        .collect_breadcrumb(&ctx, 51.5, -0.12, LocationSource::Gps, None)
        .await;
    assert!(matches!(late, Err(GnsError::IdentityNotFound(_))));
}
