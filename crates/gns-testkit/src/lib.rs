//! # GNS Testkit
//!
//! Testing utilities for GNS.
//!
//! ## Overview
//!
//! - **Fixtures**: seeded identities and preloaded ledgers
//! - **Generators**: realistic trails and proptest strategies
//! - **Golden vectors**: hand-built preimages pinning every hash layout
//!
//! ## Trails
//!
//! ```rust
//! use gns_testkit::{TestIdentity, TrailSpec};
//!
//! let alice = TestIdentity::alice();
//! // 150 breadcrumbs over 12 cells across 10 days.
//! let crumbs = alice.trail(&TrailSpec::new(150, 12, 10));
//! assert_eq!(crumbs.len(), 150);
//! ```

pub mod fixtures;
pub mod generators;
pub mod vectors;

pub use fixtures::{multi_party_identities, LedgerFixture, TestIdentity, BASE_TIME};
pub use generators::{nearby_cells, trail, TrailSpec};
pub use vectors::{all_vectors, breadcrumb_from_vector, verify_all_vectors, GoldenVector};
