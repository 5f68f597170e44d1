//! Golden vectors and layout checks that every GNS implementation must match.
//!
//! Breadcrumb and epoch hashes are recomputed from hand-built preimages, so a
//! change to field order or encoding shows up here before it reaches a peer.

use gns::core::{verify_breadcrumb, IdentityKeypair, MerkleTree};
use gns::store::{LedgerStore, MemoryStore};
use gns::{BreadcrumbInput, GnsConfig, GnsEngine, IdentityContext};
use gns_testkit::generators::{h3_cell, location_source};
use gns_testkit::vectors::reference_epoch_hash;
use gns_testkit::{all_vectors, breadcrumb_from_vector, verify_all_vectors, TestIdentity, BASE_TIME};
use proptest::prelude::*;

#[test]
fn test_golden_breadcrumb_hashes() {
    let results = verify_all_vectors();
    assert_eq!(results.len(), all_vectors().len());
    for (name, matches, hash) in results {
        assert!(matches, "vector '{name}' diverged from reference {hash}");
    }
}

#[test]
fn test_golden_signatures_verify() {
    for vector in all_vectors() {
        let crumb = breadcrumb_from_vector(&vector);
        let author = IdentityKeypair::from_seed(&vector.seed).public_key();
        assert!(verify_breadcrumb(&author, &crumb), "vector '{}'", vector.name);
    }
}

#[tokio::test]
async fn test_engine_epoch_matches_reference_layout() {
    let engine = GnsEngine::new(MemoryStore::new(), GnsConfig::development()).unwrap();
    let alice = TestIdentity::alice();
    store_identity(&engine, &alice).await;
    let ctx = IdentityContext::new(alice.keypair.clone(), alice.created_at);

    for (i, vector) in all_vectors().iter().cycle().take(12).enumerate() {
        let cell = breadcrumb_from_vector(vector).h3_index;
        engine
            .append_breadcrumb(
                &ctx,
                BreadcrumbInput {
                    h3_index: cell.as_u64(),
                    h3_resolution: cell.resolution(),
                    timestamp: BASE_TIME + i as i64 * 60_000,
                    source: vector.source,
                    accuracy: None,
                },
            )
            .await
            .unwrap();
    }

    let first = engine.publish_epoch(&ctx).await.unwrap();
    assert_eq!(first.epoch_hash.0, reference_epoch_hash(&first));
    assert_eq!(first.prev_epoch_hash, None);
    assert_eq!(first.start_time, BASE_TIME);
    assert_eq!(first.end_time, BASE_TIME + 11 * 60_000);
    assert_eq!(first.block_count, 2);

    let crumbs = engine.range(&ctx, None, 100).await.unwrap();
    let hashes: Vec<_> = crumbs.iter().map(|b| b.hash).collect();
    let tree = MerkleTree::from_breadcrumb_hashes(&hashes, 10).unwrap();
    assert_eq!(first.merkle_root, tree.root());
}

/// Register a fixture identity's public record with the engine's store.
async fn store_identity(engine: &GnsEngine<MemoryStore>, identity: &TestIdentity) {
    engine.store().put_identity(&identity.record()).await.unwrap();
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_engine_appends_verify(
        steps in prop::collection::vec((h3_cell(), 0i64..600_000, location_source()), 1..24),
    ) {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        runtime.block_on(async {
            let engine = GnsEngine::new(MemoryStore::new(), GnsConfig::default()).unwrap();
            let ctx = engine.create_identity(None).await.unwrap();

            let mut ts = BASE_TIME;
            for (cell, gap, source) in &steps {
                ts += gap;
                let crumb = engine
                    .append_breadcrumb(
                        &ctx,
                        BreadcrumbInput {
                            h3_index: cell.as_u64(),
                            h3_resolution: cell.resolution(),
                            timestamp: ts,
                            source: *source,
                            accuracy: None,
                        },
                    )
                    .await
                    .unwrap();
                assert!(verify_breadcrumb(&ctx.public_key(), &crumb));
            }

            let verification = engine.verify_chain(&ctx).await.unwrap();
            assert!(verification.valid);
            assert_eq!(verification.checked, steps.len());
        });
    }
}
