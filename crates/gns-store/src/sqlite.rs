//! SQLite implementation of the LedgerStore trait.
//!
//! This is the primary storage backend. It uses rusqlite with bundled SQLite,
//! wrapped in async via tokio::spawn_blocking. Breadcrumbs and identity
//! records are sealed with a [`StorageKey`] before they touch disk.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{de::DeserializeOwned, Serialize};

use gns_core::{Breadcrumb, BreadcrumbQuery, Ed25519PublicKey, EpochHeader, GENESIS_HASH};

use crate::cipher::StorageKey;
use crate::error::{Result, StoreError};
use crate::migration::{self, now_millis};
use crate::traits::{IdentityRecord, InsertResult, LedgerCounts, LedgerStore};

const KEY_CHECK: &str = "key_check";
const KEY_CHECK_PLAINTEXT: &[u8] = b"gns-store-v1";

/// SQLite-based store implementation.
///
/// Thread-safe via internal Mutex. All operations use spawn_blocking
/// to avoid blocking the async runtime.
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
    key: Arc<StorageKey>,
}

impl SqliteStore {
    /// Open a SQLite database at the given path.
    ///
    /// Creates the file and runs migrations if it doesn't exist. An existing
    /// database only opens with the key it was created with.
    pub fn open(path: impl AsRef<Path>, key: StorageKey) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::init(conn, key)
    }

    /// Open an in-memory SQLite database.
    ///
    /// Useful for testing.
    pub fn open_memory(key: StorageKey) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init(conn, key)
    }

    fn init(mut conn: Connection, key: StorageKey) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        migration::migrate(&mut conn)?;
        check_key(&conn, &key)?;
        tracing::debug!("ledger store opened");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            key: Arc::new(key),
        })
    }

    /// Run a blocking operation on the connection off the async runtime.
    async fn run<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection, &StorageKey) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();
        let key = self.key.clone();

        tokio::task::spawn_blocking(move || {
            let mut conn = lock(&conn)?;
            f(&mut conn, &key)
        })
        .await
        .map_err(|e| {
            StoreError::Database(rusqlite::Error::SqliteFailure(
                rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_ERROR),
                Some(format!("spawn_blocking failed: {}", e)),
            ))
        })?
    }
}

fn lock(conn: &Mutex<Connection>) -> Result<MutexGuard<'_, Connection>> {
    conn.lock().map_err(|e| {
        StoreError::Database(rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_LOCKED),
            Some(format!("mutex poisoned: {}", e)),
        ))
    })
}

/// Verify `key` against the stored check value, writing one on first open.
fn check_key(conn: &Connection, key: &StorageKey) -> Result<()> {
    let stored: Option<Vec<u8>> = conn
        .query_row(
            "SELECT value FROM store_meta WHERE key = ?1",
            params![KEY_CHECK],
            |row| row.get(0),
        )
        .optional()?;

    match stored {
        Some(blob) => {
            let plain = key
                .open(&blob, KEY_CHECK.as_bytes())
                .map_err(|_| StoreError::WrongKey)?;
            if plain != KEY_CHECK_PLAINTEXT {
                return Err(StoreError::WrongKey);
            }
        }
        None => {
            let blob = key.seal(KEY_CHECK_PLAINTEXT, KEY_CHECK.as_bytes())?;
            conn.execute(
                "INSERT INTO store_meta (key, value) VALUES (?1, ?2)",
                params![KEY_CHECK, blob],
            )?;
        }
    }
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Record sealing
// ─────────────────────────────────────────────────────────────────────────────

fn identity_aad(identity: &Ed25519PublicKey) -> Vec<u8> {
    let mut aad = Vec::with_capacity(40);
    aad.extend_from_slice(identity.as_bytes());
    aad.extend_from_slice(b"identity");
    aad
}

fn breadcrumb_aad(identity: &Ed25519PublicKey, id: &str) -> Vec<u8> {
    let mut aad = Vec::with_capacity(42 + id.len());
    aad.extend_from_slice(identity.as_bytes());
    aad.extend_from_slice(b"breadcrumb");
    aad.extend_from_slice(id.as_bytes());
    aad
}

fn seal_json<T: Serialize>(key: &StorageKey, value: &T, aad: &[u8]) -> Result<Vec<u8>> {
    let json = serde_json::to_vec(value)?;
    key.seal(&json, aad)
}

fn open_json<T: DeserializeOwned>(key: &StorageKey, blob: &[u8], aad: &[u8]) -> Result<T> {
    let json = key.open(blob, aad)?;
    Ok(serde_json::from_slice(&json)?)
}

fn key_from_blob(bytes: &[u8]) -> Result<Ed25519PublicKey> {
    Ed25519PublicKey::from_slice(bytes).map_err(|e| StoreError::InvalidData(e.to_string()))
}

/// Raw breadcrumb row: `(id, published, sealed record)`.
type BreadcrumbRow = (String, bool, Vec<u8>);

fn row_to_breadcrumb_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<BreadcrumbRow> {
    Ok((row.get("id")?, row.get("published")?, row.get("record")?))
}

fn decode_breadcrumb(
    key: &StorageKey,
    identity: &Ed25519PublicKey,
    (id, published, record): BreadcrumbRow,
) -> Result<Breadcrumb> {
    let mut crumb: Breadcrumb = open_json(key, &record, &breadcrumb_aad(identity, &id))?;
    if crumb.id != id {
        return Err(StoreError::InvalidData(format!(
            "breadcrumb row {id} holds record {}",
            crumb.id
        )));
    }
    crumb.published = published;
    Ok(crumb)
}

fn decode_all(
    key: &StorageKey,
    identity: &Ed25519PublicKey,
    rows: Vec<BreadcrumbRow>,
) -> Result<Vec<Breadcrumb>> {
    rows.into_iter()
        .map(|row| decode_breadcrumb(key, identity, row))
        .collect()
}

fn load_all(
    conn: &Connection,
    key: &StorageKey,
    identity: &Ed25519PublicKey,
) -> Result<Vec<Breadcrumb>> {
    let mut stmt = conn.prepare(
        "SELECT id, published, record FROM breadcrumbs
         WHERE identity = ?1
         ORDER BY seq",
    )?;
    let rows = stmt
        .query_map(params![identity.as_bytes().as_slice()], row_to_breadcrumb_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    decode_all(key, identity, rows)
}

fn load_epochs(conn: &Connection, identity: &Ed25519PublicKey) -> Result<Vec<EpochHeader>> {
    let mut stmt = conn.prepare(
        "SELECT header FROM epochs
         WHERE identity = ?1
         ORDER BY epoch_index",
    )?;
    let headers = stmt
        .query_map(params![identity.as_bytes().as_slice()], |row| {
            row.get::<_, String>(0)
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    headers
        .iter()
        .map(|json| serde_json::from_str(json).map_err(StoreError::from))
        .collect()
}

#[async_trait]
impl LedgerStore for SqliteStore {
    async fn put_identity(&self, record: &IdentityRecord) -> Result<()> {
        let record = record.clone();
        self.run(move |conn, key| {
            let sealed = seal_json(key, &record, &identity_aad(&record.public_key))?;
            conn.execute(
                "INSERT INTO identities (public_key, created_at, record) VALUES (?1, ?2, ?3)
                 ON CONFLICT(public_key) DO UPDATE SET record = excluded.record",
                params![
                    record.public_key.as_bytes().as_slice(),
                    record.created_at,
                    sealed
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn get_identity(&self, identity: &Ed25519PublicKey) -> Result<Option<IdentityRecord>> {
        let identity = *identity;
        self.run(move |conn, key| {
            let sealed: Option<Vec<u8>> = conn
                .query_row(
                    "SELECT record FROM identities WHERE public_key = ?1",
                    params![identity.as_bytes().as_slice()],
                    |row| row.get(0),
                )
                .optional()?;
            sealed
                .map(|blob| open_json(key, &blob, &identity_aad(&identity)))
                .transpose()
        })
        .await
    }

    async fn list_identities(&self) -> Result<Vec<Ed25519PublicKey>> {
        self.run(|conn, _| {
            let mut stmt = conn.prepare("SELECT public_key FROM identities ORDER BY public_key")?;
            let blobs = stmt
                .query_map([], |row| row.get::<_, Vec<u8>>(0))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            blobs.iter().map(|b| key_from_blob(b)).collect()
        })
        .await
    }

    async fn delete_identity(&self, identity: &Ed25519PublicKey) -> Result<bool> {
        let identity = *identity;
        self.run(move |conn, _| {
            let pk = identity.as_bytes().as_slice();
            let tx = conn.transaction()?;
            let mut removed = 0;
            removed += tx.execute("DELETE FROM breadcrumbs WHERE identity = ?1", params![pk])?;
            removed += tx.execute("DELETE FROM epochs WHERE identity = ?1", params![pk])?;
            removed += tx.execute("DELETE FROM identities WHERE public_key = ?1", params![pk])?;
            tx.commit()?;
            Ok(removed > 0)
        })
        .await
    }

    async fn append_breadcrumb(
        &self,
        identity: &Ed25519PublicKey,
        breadcrumb: &Breadcrumb,
    ) -> Result<InsertResult> {
        let identity = *identity;
        let breadcrumb = breadcrumb.clone();

        self.run(move |conn, key| {
            let pk = identity.as_bytes().as_slice();
            let tx = conn.transaction()?;

            let exists: Option<i64> = tx
                .query_row(
                    "SELECT seq FROM breadcrumbs WHERE identity = ?1 AND id = ?2",
                    params![pk, breadcrumb.id],
                    |row| row.get(0),
                )
                .optional()?;
            if exists.is_some() {
                return Ok(InsertResult::AlreadyExists);
            }

            let tip: Option<(i64, BreadcrumbRow)> = tx
                .query_row(
                    "SELECT seq, id, published, record FROM breadcrumbs
                     WHERE identity = ?1
                     ORDER BY seq DESC LIMIT 1",
                    params![pk],
                    |row| Ok((row.get("seq")?, row_to_breadcrumb_row(row)?)),
                )
                .optional()?;

            let (next_seq, tip_hash) = match tip {
                Some((seq, row)) => (seq + 1, decode_breadcrumb(key, &identity, row)?.hash),
                None => (0, GENESIS_HASH),
            };

            if breadcrumb.prev_hash != tip_hash {
                tracing::warn!(
                    identity = %identity.short(),
                    id = %breadcrumb.id,
                    "breadcrumb does not link to ledger tip"
                );
                return Ok(InsertResult::Conflict { existing: tip_hash });
            }

            let mut stored = breadcrumb.clone();
            stored.published = false;
            let sealed = seal_json(key, &stored, &breadcrumb_aad(&identity, &stored.id))?;

            tx.execute(
                "INSERT INTO breadcrumbs (identity, seq, id, timestamp, published, record)
                 VALUES (?1, ?2, ?3, ?4, 0, ?5)",
                params![pk, next_seq, stored.id, stored.timestamp, sealed],
            )?;
            tx.commit()?;

            Ok(InsertResult::Inserted)
        })
        .await
    }

    async fn last_breadcrumb(&self, identity: &Ed25519PublicKey) -> Result<Option<Breadcrumb>> {
        let identity = *identity;
        self.run(move |conn, key| {
            let row: Option<BreadcrumbRow> = conn
                .query_row(
                    "SELECT id, published, record FROM breadcrumbs
                     WHERE identity = ?1
                     ORDER BY seq DESC LIMIT 1",
                    params![identity.as_bytes().as_slice()],
                    row_to_breadcrumb_row,
                )
                .optional()?;
            row.map(|r| decode_breadcrumb(key, &identity, r)).transpose()
        })
        .await
    }

    async fn query_breadcrumbs(
        &self,
        identity: &Ed25519PublicKey,
        query: &BreadcrumbQuery,
    ) -> Result<Vec<Breadcrumb>> {
        let identity = *identity;
        let query = query.clone();

        self.run(move |conn, key| {
            let mut stmt = conn.prepare(
                "SELECT id, published, record FROM breadcrumbs
                 WHERE identity = ?1
                   AND (?2 IS NULL OR timestamp > ?2)
                   AND (?3 IS NULL OR timestamp < ?3)
                 ORDER BY seq
                 LIMIT ?4 OFFSET ?5",
            )?;
            let rows = stmt
                .query_map(
                    params![
                        identity.as_bytes().as_slice(),
                        query.after,
                        query.before,
                        i64::try_from(query.limit).unwrap_or(i64::MAX),
                        i64::try_from(query.offset).unwrap_or(i64::MAX),
                    ],
                    row_to_breadcrumb_row,
                )?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            decode_all(key, &identity, rows)
        })
        .await
    }

    async fn all_breadcrumbs(&self, identity: &Ed25519PublicKey) -> Result<Vec<Breadcrumb>> {
        let identity = *identity;
        self.run(move |conn, key| load_all(conn, key, &identity))
            .await
    }

    async fn pending_breadcrumbs(
        &self,
        identity: &Ed25519PublicKey,
        limit: Option<usize>,
    ) -> Result<Vec<Breadcrumb>> {
        let identity = *identity;
        // SQLite treats a negative LIMIT as unbounded.
        let limit = limit
            .map(|l| i64::try_from(l).unwrap_or(i64::MAX))
            .unwrap_or(-1);

        self.run(move |conn, key| {
            let mut stmt = conn.prepare(
                "SELECT id, published, record FROM breadcrumbs
                 WHERE identity = ?1 AND published = 0
                 ORDER BY timestamp, seq
                 LIMIT ?2",
            )?;
            let rows = stmt
                .query_map(
                    params![identity.as_bytes().as_slice(), limit],
                    row_to_breadcrumb_row,
                )?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            decode_all(key, &identity, rows)
        })
        .await
    }

    async fn counts(&self, identity: &Ed25519PublicKey) -> Result<LedgerCounts> {
        // Cells are sealed, so distinct locations need the decrypted ledger.
        let all = self.all_breadcrumbs(identity).await?;
        Ok(LedgerCounts::from_breadcrumbs(&all))
    }

    async fn commit_epoch(&self, header: &EpochHeader, breadcrumb_ids: &[String]) -> Result<()> {
        let header = header.clone();
        let ids = breadcrumb_ids.to_vec();

        self.run(move |conn, _| {
            let pk = header.identity.as_bytes().as_slice();
            let tx = conn.transaction()?;

            let expected: i64 = tx.query_row(
                "SELECT COALESCE(MAX(epoch_index) + 1, 0) FROM epochs WHERE identity = ?1",
                params![pk],
                |row| row.get(0),
            )?;
            if header.epoch_index != expected as u64 {
                return Err(StoreError::EpochIndex {
                    expected: expected as u64,
                    got: header.epoch_index,
                });
            }

            let duplicate: Option<i64> = tx
                .query_row(
                    "SELECT 1 FROM epochs WHERE epoch_hash = ?1",
                    params![header.epoch_hash.as_bytes().as_slice()],
                    |row| row.get(0),
                )
                .optional()?;
            if duplicate.is_some() {
                return Err(StoreError::DuplicateEpoch(header.epoch_hash.to_hex()));
            }

            for id in &ids {
                let changed = tx.execute(
                    "UPDATE breadcrumbs SET published = 1
                     WHERE identity = ?1 AND id = ?2 AND published = 0",
                    params![pk, id],
                )?;
                if changed == 0 {
                    // Dropping the transaction rolls back earlier updates.
                    return Err(StoreError::NotPending(id.clone()));
                }
            }

            tx.execute(
                "INSERT INTO epochs (identity, epoch_index, epoch_hash, header, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    pk,
                    header.epoch_index as i64,
                    header.epoch_hash.as_bytes().as_slice(),
                    serde_json::to_string(&header)?,
                    now_millis(),
                ],
            )?;
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn epochs(&self, identity: &Ed25519PublicKey) -> Result<Vec<EpochHeader>> {
        let identity = *identity;
        self.run(move |conn, _| load_epochs(conn, &identity)).await
    }

    async fn last_epoch(&self, identity: &Ed25519PublicKey) -> Result<Option<EpochHeader>> {
        let identity = *identity;
        self.run(move |conn, _| {
            let json: Option<String> = conn
                .query_row(
                    "SELECT header FROM epochs
                     WHERE identity = ?1
                     ORDER BY epoch_index DESC LIMIT 1",
                    params![identity.as_bytes().as_slice()],
                    |row| row.get(0),
                )
                .optional()?;
            json.map(|j| serde_json::from_str(&j).map_err(StoreError::from))
                .transpose()
        })
        .await
    }

    async fn epoch_count(&self, identity: &Ed25519PublicKey) -> Result<u64> {
        let identity = *identity;
        self.run(move |conn, _| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM epochs WHERE identity = ?1",
                params![identity.as_bytes().as_slice()],
                |row| row.get(0),
            )?;
            Ok(count as u64)
        })
        .await
    }
}
