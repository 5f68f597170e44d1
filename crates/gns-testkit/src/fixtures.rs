//! Test fixtures and helpers.
//!
//! Common setup code for integration tests.

use gns_core::{Breadcrumb, Ed25519PublicKey, IdentityKeypair, X25519PublicKey};
use gns_store::{IdentityRecord, InsertResult, LedgerStore, MemoryStore, StoreError};

use crate::generators::{trail, TrailSpec};

/// 2024-01-01T00:00:00Z in unix ms.
pub const BASE_TIME: i64 = 1_704_067_200_000;

/// A deterministic identity.
#[derive(Debug, Clone)]
pub struct TestIdentity {
    pub keypair: IdentityKeypair,
    /// Unix ms.
    pub created_at: i64,
}

impl TestIdentity {
    pub fn with_seed(seed: [u8; 32]) -> Self {
        Self {
            keypair: IdentityKeypair::from_seed(&seed),
            created_at: BASE_TIME,
        }
    }

    /// Conventional names for multi-party tests.
    pub fn alice() -> Self {
        Self::with_seed([0xA1; 32])
    }

    pub fn bob() -> Self {
        Self::with_seed([0xB0; 32])
    }

    pub fn public_key(&self) -> Ed25519PublicKey {
        self.keypair.public_key()
    }

    pub fn encryption_key(&self) -> X25519PublicKey {
        self.keypair.encryption_public_key()
    }

    pub fn record(&self) -> IdentityRecord {
        IdentityRecord {
            public_key: self.public_key(),
            encryption_key: self.encryption_key(),
            created_at: self.created_at,
            name: None,
            handle: Default::default(),
        }
    }

    /// A linked, signed trail for this identity.
    pub fn trail(&self, spec: &TrailSpec) -> Vec<Breadcrumb> {
        trail(&self.keypair, spec)
    }
}

/// Identities with seeds `[i, 0, 0, ...]`.
pub fn multi_party_identities(count: usize) -> Vec<TestIdentity> {
    (0..count)
        .map(|i| {
            let mut seed = [0u8; 32];
            seed[0] = i as u8;
            seed[1] = 0x5E;
            TestIdentity::with_seed(seed)
        })
        .collect()
}

/// An identity with its ledger loaded into a memory store.
pub struct LedgerFixture {
    pub identity: TestIdentity,
    pub store: MemoryStore,
    pub breadcrumbs: Vec<Breadcrumb>,
}

impl LedgerFixture {
    pub async fn new(identity: TestIdentity, spec: &TrailSpec) -> Result<Self, StoreError> {
        let store = MemoryStore::new();
        store.put_identity(&identity.record()).await?;

        let breadcrumbs = identity.trail(spec);
        for crumb in &breadcrumbs {
            match store.append_breadcrumb(&identity.public_key(), crumb).await? {
                InsertResult::Inserted => {}
                other => {
                    return Err(StoreError::InvalidData(format!(
                        "fixture append returned {other:?}"
                    )))
                }
            }
        }

        Ok(Self {
            identity,
            store,
            breadcrumbs,
        })
    }
}
