//! # GNS Store
//!
//! Storage abstraction for GNS ledgers. Provides a trait-based interface for
//! identity, breadcrumb, and epoch persistence with SQLite and in-memory
//! implementations.
//!
//! ## Key Types
//!
//! - [`LedgerStore`] - The async trait for all storage operations
//! - [`SqliteStore`] - SQLite-based persistent storage, sealed at rest
//! - [`MemoryStore`] - In-memory storage for tests
//! - [`StorageKey`] - Key used to seal records before they reach disk
//! - [`InsertResult`] - Result of appending a breadcrumb
//!
//! ## Usage
//!
//! ```rust,no_run
//! use gns_store::{LedgerStore, SqliteStore, StorageKey};
//!
//! async fn example() {
//!     let store = SqliteStore::open("ledger.db", StorageKey::generate()).unwrap();
//!     let ids = store.list_identities().await.unwrap();
//!     # let _ = ids;
//! }
//! ```
//!
//! ## Design Notes
//!
//! - **Idempotent appends**: Appending the same breadcrumb id twice returns `AlreadyExists`
//! - **Link guard**: A breadcrumb that does not extend the tip returns `Conflict`
//! - **Atomic publication**: `commit_epoch` stores the header and flips `published` together

pub mod cipher;
pub mod error;
pub mod memory;
pub mod migration;
pub mod sqlite;
pub mod traits;

pub use cipher::StorageKey;
pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use traits::{IdentityRecord, InsertResult, LedgerCounts, LedgerStore};
