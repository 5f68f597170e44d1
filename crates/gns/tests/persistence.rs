//! Encrypted SQLite persistence across engine restarts.

use gns::store::{SqliteStore, StorageKey, StoreError};
use gns::{GnsConfig, GnsEngine, GnsError, LocationSource};
use tempfile::tempdir;

const PASSPHRASE: &str = "correct horse battery staple";

#[tokio::test]
async fn test_ledger_survives_reopen() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("gns.db");
    let key = StorageKey::from_bytes([7u8; 32]);

    let (backup, before, header) = {
        let engine = GnsEngine::new(
            SqliteStore::open(&path, key.clone()).unwrap(),
            GnsConfig::development(),
        )
        .unwrap();
        let ctx = engine.create_identity(Some("traveller".into())).await.unwrap();
        for i in 0..20 {
            let lat = 37.70 + f64::from(i % 5) * 0.02;
            engine
                .collect_breadcrumb(&ctx, lat, -122.45, LocationSource::Gps, Some(8.0))
                .await
                .unwrap();
        }
        let header = engine.publish_epoch(&ctx).await.unwrap();
        engine.reserve_handle(&ctx, "traveller").await.unwrap();

        let backup = engine.export_identity(&ctx, PASSPHRASE).await.unwrap();
        let before = engine.range(&ctx, None, 100).await.unwrap();
        (backup, before, header)
    };

    let engine = GnsEngine::new(
        SqliteStore::open(&path, key).unwrap(),
        GnsConfig::development(),
    )
    .unwrap();
    let ctx = engine.import_identity(&backup, PASSPHRASE).await.unwrap();

    let record = engine.identity(&ctx).await.unwrap();
    assert_eq!(record.name.as_deref(), Some("traveller"));
    assert_eq!(record.handle.handle(), Some("traveller"));

    let after = engine.range(&ctx, None, 100).await.unwrap();
    assert_eq!(after, before);
    assert!(engine.verify_chain(&ctx).await.unwrap().valid);
    assert_eq!(engine.epochs(&ctx).await.unwrap(), vec![header]);
    assert!(engine.pending(&ctx, None).await.unwrap().is_empty());

    // The ledger keeps growing from the persisted tip.
    let next = engine
        .collect_breadcrumb(&ctx, 37.75, -122.45, LocationSource::Wifi, None)
        .await
        .unwrap();
    assert_eq!(next.prev_hash, before.last().unwrap().hash);
}

#[tokio::test]
async fn test_wrong_key_is_rejected() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("gns.db");

    {
        let engine = GnsEngine::new(
            SqliteStore::open(&path, StorageKey::from_bytes([1u8; 32])).unwrap(),
            GnsConfig::development(),
        )
        .unwrap();
        engine.create_identity(None).await.unwrap();
    }

    let result = SqliteStore::open(&path, StorageKey::from_bytes([2u8; 32]));
    assert!(matches!(result, Err(StoreError::WrongKey)));
}

#[tokio::test]
async fn test_wrong_passphrase_is_a_crypto_error() {
    let engine = GnsEngine::new(
        SqliteStore::open_memory(StorageKey::generate()).unwrap(),
        GnsConfig::development(),
    )
    .unwrap();
    let ctx = engine.create_identity(None).await.unwrap();
    let backup = engine.export_identity(&ctx, PASSPHRASE).await.unwrap();

    let err = engine.import_identity(&backup, "guess").await.unwrap_err();
    assert_eq!(err.code(), "CRYPTO_ERROR");

    let restored = engine.import_identity(&backup, PASSPHRASE).await.unwrap();
    assert_eq!(restored.public_key(), ctx.public_key());
    assert_eq!(restored.created_at(), ctx.created_at());
}

#[tokio::test]
async fn test_import_into_fresh_store_registers_identity() {
    let source = GnsEngine::new(
        SqliteStore::open_memory(StorageKey::generate()).unwrap(),
        GnsConfig::development(),
    )
    .unwrap();
    let ctx = source.create_identity(Some("mover".into())).await.unwrap();
    let json = source
        .export_identity(&ctx, PASSPHRASE)
        .await
        .unwrap()
        .to_json()
        .unwrap();

    let target = GnsEngine::new(
        SqliteStore::open_memory(StorageKey::generate()).unwrap(),
        GnsConfig::development(),
    )
    .unwrap();
    let backup = gns::ExportedIdentity::from_json(&json).unwrap();
    let moved = target.import_identity(&backup, PASSPHRASE).await.unwrap();

    assert_eq!(moved.public_key(), ctx.public_key());
    assert_eq!(moved.encryption_key(), ctx.encryption_key());
    let record = target.identity(&moved).await.unwrap();
    assert_eq!(record.name.as_deref(), Some("mover"));
    assert!(target.range(&moved, None, 10).await.unwrap().is_empty());
    assert!(matches!(
        target.publish_epoch(&moved).await,
        Err(GnsError::InsufficientBreadcrumbs { .. })
    ));
}
