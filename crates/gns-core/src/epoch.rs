//! Epoch headers: Merkle-rooted, chain-linked batches of breadcrumbs.

use serde::{Deserialize, Serialize};

use crate::breadcrumb::Breadcrumb;
use crate::crypto::{Ed25519PublicKey, Ed25519Signature, IdentityKeypair, Sha256Hash};
use crate::error::{CoreError, Result};
use crate::merkle::MerkleTree;

/// Breadcrumbs per Merkle leaf block unless configured otherwise.
pub const DEFAULT_BLOCK_SIZE: usize = 10;

/// A signed epoch header. Field names match the relay wire format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpochHeader {
    pub identity: Ed25519PublicKey,
    pub epoch_index: u64,
    /// Timestamp of the first breadcrumb, unix ms.
    pub start_time: i64,
    /// Timestamp of the last breadcrumb, unix ms.
    pub end_time: i64,
    pub merkle_root: Sha256Hash,
    pub block_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prev_epoch_hash: Option<Sha256Hash>,
    pub signature: Ed25519Signature,
    pub epoch_hash: Sha256Hash,
}

/// `SHA-256(identity ‖ epoch_index BE ‖ merkle_root ‖ prev_epoch_hash or zeros)`.
pub fn compute_epoch_hash(
    identity: &Ed25519PublicKey,
    epoch_index: u64,
    merkle_root: &Sha256Hash,
    prev_epoch_hash: Option<&Sha256Hash>,
) -> Sha256Hash {
    let prev = prev_epoch_hash.copied().unwrap_or(Sha256Hash::ZERO);
    Sha256Hash::hash_parts(&[
        &identity.as_bytes()[..],
        &epoch_index.to_be_bytes()[..],
        &merkle_root.as_bytes()[..],
        &prev.as_bytes()[..],
    ])
}

impl EpochHeader {
    /// Build and sign the header for a batch of breadcrumbs.
    ///
    /// `breadcrumbs` must already be in ledger order; the Merkle root and the
    /// time bounds depend on it.
    pub fn build(
        keypair: &IdentityKeypair,
        epoch_index: u64,
        prev_epoch_hash: Option<Sha256Hash>,
        breadcrumbs: &[Breadcrumb],
        block_size: usize,
    ) -> Result<Self> {
        let (first, last) = match (breadcrumbs.first(), breadcrumbs.last()) {
            (Some(f), Some(l)) => (f, l),
            _ => return Err(CoreError::EmptyEpoch),
        };

        let hashes: Vec<Sha256Hash> = breadcrumbs.iter().map(|b| b.hash).collect();
        let tree =
            MerkleTree::from_breadcrumb_hashes(&hashes, block_size).ok_or(CoreError::EmptyEpoch)?;

        let identity = keypair.public_key();
        let merkle_root = tree.root();
        let epoch_hash =
            compute_epoch_hash(&identity, epoch_index, &merkle_root, prev_epoch_hash.as_ref());

        Ok(Self {
            identity,
            epoch_index,
            start_time: first.timestamp,
            end_time: last.timestamp,
            merkle_root,
            block_count: tree.leaf_count() as u32,
            prev_epoch_hash,
            signature: keypair.sign(epoch_hash.as_bytes()),
            epoch_hash,
        })
    }

    /// Recompute `epoch_hash` from the header fields.
    pub fn compute_hash(&self) -> Sha256Hash {
        compute_epoch_hash(
            &self.identity,
            self.epoch_index,
            &self.merkle_root,
            self.prev_epoch_hash.as_ref(),
        )
    }

    /// Check the header's own hash and signature.
    pub fn verify_signature(&self) -> bool {
        self.compute_hash() == self.epoch_hash
            && self
                .identity
                .verify(self.epoch_hash.as_bytes(), &self.signature)
    }

    /// Whether this header directly follows `previous` in the epoch chain.
    pub fn follows(&self, previous: Option<&EpochHeader>) -> bool {
        match previous {
            None => self.epoch_index == 0 && self.prev_epoch_hash.is_none(),
            Some(prev) => {
                prev.identity == self.identity
                    && self.epoch_index == prev.epoch_index + 1
                    && self.prev_epoch_hash == Some(prev.epoch_hash)
            }
        }
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| CoreError::Encoding(e.to_string()))
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| CoreError::Encoding(e.to_string()))
    }
}

/// Verify a header against the breadcrumbs it claims to cover.
///
/// Rebuilds the tree the same way [`EpochHeader::build`] does.
pub fn verify_epoch(header: &EpochHeader, breadcrumbs: &[Breadcrumb], block_size: usize) -> Result<()> {
    if !header.verify_signature() {
        return Err(CoreError::InvalidSignature);
    }

    let (first, last) = match (breadcrumbs.first(), breadcrumbs.last()) {
        (Some(f), Some(l)) => (f, l),
        _ => return Err(CoreError::EmptyEpoch),
    };

    if let Some(bad) = breadcrumbs
        .iter()
        .position(|b| b.verify(&header.identity).is_err())
    {
        return Err(CoreError::EpochMismatch(format!(
            "breadcrumb {bad} does not verify"
        )));
    }

    let hashes: Vec<Sha256Hash> = breadcrumbs.iter().map(|b| b.hash).collect();
    let tree =
        MerkleTree::from_breadcrumb_hashes(&hashes, block_size).ok_or(CoreError::EmptyEpoch)?;

    if tree.root() != header.merkle_root {
        return Err(CoreError::EpochMismatch("merkle root".into()));
    }
    if tree.leaf_count() as u32 != header.block_count {
        return Err(CoreError::EpochMismatch(format!(
            "block count {} != {}",
            tree.leaf_count(),
            header.block_count
        )));
    }
    if first.timestamp != header.start_time || last.timestamp != header.end_time {
        return Err(CoreError::EpochMismatch("time bounds".into()));
    }

    Ok(())
}
