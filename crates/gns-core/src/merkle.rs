//! Merkle tree over breadcrumb blocks.
//!
//! Leaves are `SHA-256(hash_0 ‖ hash_1 ‖ ... )` over the breadcrumb hashes of
//! one block. Internal nodes are `SHA-256(left ‖ right)`. When a level has an
//! odd number of nodes, the last node is paired with itself.

use serde::{Deserialize, Serialize};

use crate::crypto::Sha256Hash;

/// Hash one block of breadcrumb hashes into a leaf.
pub fn block_leaf(hashes: &[Sha256Hash]) -> Sha256Hash {
    let parts: Vec<&[u8]> = hashes.iter().map(|h| &h.0[..]).collect();
    Sha256Hash::hash_parts(&parts)
}

/// Partition hashes into blocks of `block_size` and hash each block.
pub fn block_leaves(hashes: &[Sha256Hash], block_size: usize) -> Vec<Sha256Hash> {
    hashes.chunks(block_size.max(1)).map(block_leaf).collect()
}

fn parent(left: &Sha256Hash, right: &Sha256Hash) -> Sha256Hash {
    Sha256Hash::hash_parts(&[&left.0[..], &right.0[..]])
}

/// A fully materialised Merkle tree.
#[derive(Debug, Clone)]
pub struct MerkleTree {
    /// `levels[0]` are the leaves, the last level holds the root.
    levels: Vec<Vec<Sha256Hash>>,
}

impl MerkleTree {
    /// Build a tree. Returns `None` for an empty leaf set.
    pub fn new(leaves: Vec<Sha256Hash>) -> Option<Self> {
        if leaves.is_empty() {
            return None;
        }

        let mut levels = vec![leaves];
        while levels[levels.len() - 1].len() > 1 {
            let current = &levels[levels.len() - 1];
            let next: Vec<Sha256Hash> = current
                .chunks(2)
                .map(|pair| {
                    let left = &pair[0];
                    let right = pair.get(1).unwrap_or(left);
                    parent(left, right)
                })
                .collect();
            levels.push(next);
        }

        Some(Self { levels })
    }

    /// Build a tree directly from breadcrumb hashes.
    pub fn from_breadcrumb_hashes(hashes: &[Sha256Hash], block_size: usize) -> Option<Self> {
        Self::new(block_leaves(hashes, block_size))
    }

    pub fn root(&self) -> Sha256Hash {
        self.levels[self.levels.len() - 1][0]
    }

    pub fn leaf_count(&self) -> usize {
        self.levels[0].len()
    }

    pub fn depth(&self) -> usize {
        self.levels.len() - 1
    }

    /// Inclusion proof for the leaf at `index`.
    pub fn proof(&self, index: usize) -> Option<MerkleProof> {
        if index >= self.leaf_count() {
            return None;
        }

        let mut siblings = Vec::with_capacity(self.depth());
        let mut i = index;
        for level in &self.levels[..self.levels.len() - 1] {
            let sibling_index = i ^ 1;
            let sibling = level.get(sibling_index).copied().unwrap_or(level[i]);
            let side = if i % 2 == 0 { Side::Right } else { Side::Left };
            siblings.push(ProofStep { hash: sibling, side });
            i /= 2;
        }

        Some(MerkleProof {
            leaf_index: index,
            siblings,
        })
    }
}

/// Which side a sibling sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Left,
    Right,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofStep {
    pub hash: Sha256Hash,
    pub side: Side,
}

/// Proof that a block leaf is included under a root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerkleProof {
    pub leaf_index: usize,
    pub siblings: Vec<ProofStep>,
}

impl MerkleProof {
    pub fn verify(&self, leaf: &Sha256Hash, root: &Sha256Hash) -> bool {
        let computed = self.siblings.iter().fold(*leaf, |acc, step| match step.side {
            Side::Left => parent(&step.hash, &acc),
            Side::Right => parent(&acc, &step.hash),
        });
        &computed == root
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hashes(n: usize) -> Vec<Sha256Hash> {
        (0..n)
            .map(|i| Sha256Hash::hash(&(i as u64).to_be_bytes()))
            .collect()
    }

    #[test]
    fn test_empty_has_no_tree() {
        assert!(MerkleTree::new(vec![]).is_none());
    }

    #[test]
    fn test_single_leaf_is_root() {
        let leaf = Sha256Hash::hash(b"one");
        let tree = MerkleTree::new(vec![leaf]).unwrap();
        assert_eq!(tree.root(), leaf);
        assert_eq!(tree.depth(), 0);
    }

    #[test]
    fn test_odd_node_is_duplicated() {
        let leaves = hashes(3);
        let tree = MerkleTree::new(leaves.clone()).unwrap();

        let left = parent(&leaves[0], &leaves[1]);
        let right = parent(&leaves[2], &leaves[2]);
        assert_eq!(tree.root(), parent(&left, &right));
    }

    #[test]
    fn test_block_leaf_is_concatenation() {
        let hs = hashes(3);
        let mut concat = Vec::new();
        for h in &hs {
            concat.extend_from_slice(h.as_bytes());
        }
        assert_eq!(block_leaf(&hs), Sha256Hash::hash(&concat));
    }

    #[test]
    fn test_block_partitioning() {
        let hs = hashes(25);
        let leaves = block_leaves(&hs, 10);
        assert_eq!(leaves.len(), 3);
        assert_eq!(leaves[2], block_leaf(&hs[20..]));
    }

    #[test]
    fn test_order_matters() {
        let mut hs = hashes(4);
        let a = MerkleTree::new(hs.clone()).unwrap().root();
        hs.swap(0, 1);
        let b = MerkleTree::new(hs).unwrap().root();
        assert_ne!(a, b);
    }

    #[test]
    fn test_proofs_verify_for_every_leaf() {
        for n in 1..=9 {
            let leaves = hashes(n);
            let tree = MerkleTree::new(leaves.clone()).unwrap();
            for (i, leaf) in leaves.iter().enumerate() {
                let proof = tree.proof(i).unwrap();
                assert!(proof.verify(leaf, &tree.root()), "n={n} i={i}");
            }
            assert!(tree.proof(n).is_none());
        }
    }

    #[test]
    fn test_proof_rejects_wrong_leaf() {
        let leaves = hashes(5);
        let tree = MerkleTree::new(leaves.clone()).unwrap();
        let proof = tree.proof(1).unwrap();
        assert!(!proof.verify(&leaves[2], &tree.root()));
    }
}
