//! Explicit identity context threaded through every engine call.

use gns_core::{Ed25519PublicKey, IdentityKeypair, X25519PublicKey};

/// The identity an operation acts as.
///
/// Holds the signing keypair in memory only. Engines never keep an "active"
/// identity of their own, so one engine can serve many identities from many
/// tasks at once.
#[derive(Debug, Clone)]
pub struct IdentityContext {
    keypair: IdentityKeypair,
    created_at: i64,
}

impl IdentityContext {
    pub fn new(keypair: IdentityKeypair, created_at: i64) -> Self {
        Self {
            keypair,
            created_at,
        }
    }

    pub fn public_key(&self) -> Ed25519PublicKey {
        self.keypair.public_key()
    }

    pub fn encryption_key(&self) -> X25519PublicKey {
        self.keypair.encryption_public_key()
    }

    pub fn keypair(&self) -> &IdentityKeypair {
        &self.keypair
    }

    /// Unix ms.
    pub fn created_at(&self) -> i64 {
        self.created_at
    }
}
