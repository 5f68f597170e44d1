//! Breadcrumb chain verification.
//!
//! A chain is checked in a single pass. The first failing breadcrumb marks
//! the break; everything before it remains valid on its own.

use serde::{Deserialize, Serialize};

use crate::breadcrumb::{Breadcrumb, BreadcrumbFault, GENESIS_HASH};
use crate::crypto::{Ed25519PublicKey, Sha256Hash};

/// Outcome of walking a breadcrumb chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainVerification {
    pub valid: bool,
    /// Index of the first invalid breadcrumb.
    pub broken_at: Option<usize>,
    pub reason: Option<BreadcrumbFault>,
    /// Number of breadcrumbs checked, including the broken one.
    pub checked: usize,
}

impl ChainVerification {
    fn ok(checked: usize) -> Self {
        Self {
            valid: true,
            broken_at: None,
            reason: None,
            checked,
        }
    }

    fn broken(index: usize, reason: BreadcrumbFault) -> Self {
        Self {
            valid: false,
            broken_at: Some(index),
            reason: Some(reason),
            checked: index + 1,
        }
    }

    /// Length of the verified prefix.
    pub fn valid_prefix(&self) -> usize {
        self.broken_at.unwrap_or(self.checked)
    }
}

/// Verify one breadcrumb in isolation: hash and signature, no linkage.
pub fn verify_breadcrumb(author: &Ed25519PublicKey, breadcrumb: &Breadcrumb) -> bool {
    breadcrumb.verify(author).is_ok()
}

/// Verify a complete chain starting at genesis.
pub fn verify_chain(author: &Ed25519PublicKey, breadcrumbs: &[Breadcrumb]) -> ChainVerification {
    verify_segment(author, GENESIS_HASH, None, breadcrumbs)
}

/// Verify a chain segment that continues from a known anchor.
///
/// `anchor` is the hash the first breadcrumb must link to, and
/// `anchor_time` the timestamp it must not precede. Indices in the result are
/// relative to `breadcrumbs`.
pub fn verify_segment(
    author: &Ed25519PublicKey,
    anchor: Sha256Hash,
    anchor_time: Option<i64>,
    breadcrumbs: &[Breadcrumb],
) -> ChainVerification {
    let mut expected_prev = anchor;
    let mut last_time = anchor_time;

    for (index, crumb) in breadcrumbs.iter().enumerate() {
        if let Err(fault) = crumb.verify(author) {
            return ChainVerification::broken(index, fault);
        }

        if crumb.prev_hash != expected_prev {
            return ChainVerification::broken(index, BreadcrumbFault::LinkMismatch);
        }

        if let Some(t) = last_time {
            if crumb.timestamp < t {
                return ChainVerification::broken(index, BreadcrumbFault::TimestampRegression);
            }
        }

        expected_prev = crumb.hash;
        last_time = Some(crumb.timestamp);
    }

    ChainVerification::ok(breadcrumbs.len())
}
