//! Breadcrumbs: signed, hash-linked proofs of presence in an H3 cell.
//!
//! The hash preimage is fixed-width big-endian:
//!
//! ```text
//! h3_index (u64) ‖ h3_resolution (u8) ‖ timestamp_ms (i64) ‖ prev_hash (32) ‖ source (u8)
//! ```
//!
//! The signature covers the raw 32-byte hash.

use std::fmt;
use std::str::FromStr;

use h3o::{CellIndex, LatLng, Resolution};
use serde::{Deserialize, Serialize};

use crate::crypto::{Ed25519PublicKey, Ed25519Signature, IdentityKeypair, Sha256Hash};
use crate::error::{CoreError, Result};

/// The `prev_hash` of the first breadcrumb in every chain.
pub const GENESIS_HASH: Sha256Hash = Sha256Hash::ZERO;

/// A validated H3 cell index.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct H3Cell(CellIndex);

impl H3Cell {
    /// Validate a raw 64-bit index.
    pub fn from_u64(raw: u64) -> Result<Self> {
        CellIndex::try_from(raw)
            .map(Self)
            .map_err(|e| CoreError::InvalidCell(e.to_string()))
    }

    /// Quantise a coordinate to a cell at the given resolution.
    pub fn from_lat_lng(lat: f64, lng: f64, resolution: u8) -> Result<Self> {
        let resolution = Resolution::try_from(resolution)
            .map_err(|e| CoreError::InvalidCell(e.to_string()))?;
        let ll = LatLng::new(lat, lng).map_err(|e| CoreError::InvalidCoordinates(e.to_string()))?;
        Ok(Self(ll.to_cell(resolution)))
    }

    pub fn as_u64(&self) -> u64 {
        u64::from(self.0)
    }

    pub fn resolution(&self) -> u8 {
        u8::from(self.0.resolution())
    }

    pub fn index(&self) -> CellIndex {
        self.0
    }

    /// Great-circle distance between cell centres.
    pub fn distance_km(&self, other: &H3Cell) -> f64 {
        LatLng::from(self.0).distance_km(LatLng::from(other.0))
    }
}

impl fmt::Display for H3Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for H3Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "H3Cell({})", self.0)
    }
}

impl FromStr for H3Cell {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        CellIndex::from_str(s)
            .map(Self)
            .map_err(|e| CoreError::InvalidCell(e.to_string()))
    }
}

impl Serialize for H3Cell {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for H3Cell {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// How the position behind a breadcrumb was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum LocationSource {
    Gps = 0,
    Wifi = 1,
    Cell = 2,
    Network = 3,
    Manual = 4,
    Fused = 5,
}

impl LocationSource {
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    pub fn from_u8(tag: u8) -> Result<Self> {
        match tag {
            0 => Ok(Self::Gps),
            1 => Ok(Self::Wifi),
            2 => Ok(Self::Cell),
            3 => Ok(Self::Network),
            4 => Ok(Self::Manual),
            5 => Ok(Self::Fused),
            other => Err(CoreError::UnknownSource(other)),
        }
    }
}

impl Default for LocationSource {
    fn default() -> Self {
        Self::Gps
    }
}

/// A signed location proof.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Breadcrumb {
    pub id: String,
    pub h3_index: H3Cell,
    pub h3_resolution: u8,
    /// Unix milliseconds.
    pub timestamp: i64,
    pub prev_hash: Sha256Hash,
    pub hash: Sha256Hash,
    pub signature: Ed25519Signature,
    pub source: LocationSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<f64>,
    #[serde(default)]
    pub published: bool,
}

impl Breadcrumb {
    /// Start building a breadcrumb in the given cell.
    pub fn builder(cell: H3Cell, timestamp: i64) -> BreadcrumbBuilder {
        BreadcrumbBuilder::new(cell, timestamp)
    }

    /// Recompute the hash from the record's fields.
    pub fn compute_hash(&self) -> Sha256Hash {
        compute_hash(
            self.h3_index.as_u64(),
            self.h3_resolution,
            self.timestamp,
            &self.prev_hash,
            self.source,
        )
    }

    /// Check the record in isolation: resolution, hash, and signature.
    pub fn verify(&self, author: &Ed25519PublicKey) -> std::result::Result<(), BreadcrumbFault> {
        if self.h3_index.resolution() != self.h3_resolution {
            return Err(BreadcrumbFault::ResolutionMismatch);
        }
        if !self.compute_hash().ct_eq(&self.hash) {
            return Err(BreadcrumbFault::HashMismatch);
        }
        if !author.verify(self.hash.as_bytes(), &self.signature) {
            return Err(BreadcrumbFault::BadSignature);
        }
        Ok(())
    }
}

/// Why a single breadcrumb failed verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreadcrumbFault {
    HashMismatch,
    LinkMismatch,
    BadSignature,
    TimestampRegression,
    ResolutionMismatch,
}

impl fmt::Display for BreadcrumbFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::HashMismatch => "hash does not match contents",
            Self::LinkMismatch => "prev_hash does not link to previous breadcrumb",
            Self::BadSignature => "signature verification failed",
            Self::TimestampRegression => "timestamp earlier than previous breadcrumb",
            Self::ResolutionMismatch => "declared resolution does not match cell",
        };
        f.write_str(s)
    }
}

/// Compute a breadcrumb hash from its components.
pub fn compute_hash(
    h3_index: u64,
    h3_resolution: u8,
    timestamp: i64,
    prev_hash: &Sha256Hash,
    source: LocationSource,
) -> Sha256Hash {
    Sha256Hash::hash_parts(&[
        &h3_index.to_be_bytes()[..],
        &[h3_resolution][..],
        &timestamp.to_be_bytes()[..],
        &prev_hash.as_bytes()[..],
        &[source.to_u8()][..],
    ])
}

/// Builder for signed breadcrumbs.
#[derive(Debug, Clone)]
pub struct BreadcrumbBuilder {
    id: Option<String>,
    cell: H3Cell,
    timestamp: i64,
    prev_hash: Sha256Hash,
    source: LocationSource,
    accuracy: Option<f64>,
}

impl BreadcrumbBuilder {
    pub fn new(cell: H3Cell, timestamp: i64) -> Self {
        Self {
            id: None,
            cell,
            timestamp,
            prev_hash: GENESIS_HASH,
            source: LocationSource::Gps,
            accuracy: None,
        }
    }

    /// Link to the previous breadcrumb's hash. Defaults to genesis.
    pub fn prev(mut self, prev_hash: Sha256Hash) -> Self {
        self.prev_hash = prev_hash;
        self
    }

    pub fn source(mut self, source: LocationSource) -> Self {
        self.source = source;
        self
    }

    pub fn accuracy(mut self, accuracy: Option<f64>) -> Self {
        self.accuracy = accuracy;
        self
    }

    /// Fix the id instead of generating a random UUID.
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn sign(self, keypair: &IdentityKeypair) -> Breadcrumb {
        let h3_resolution = self.cell.resolution();
        let hash = compute_hash(
            self.cell.as_u64(),
            h3_resolution,
            self.timestamp,
            &self.prev_hash,
            self.source,
        );
        let signature = keypair.sign(hash.as_bytes());

        Breadcrumb {
            id: self
                .id
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            h3_index: self.cell,
            h3_resolution,
            timestamp: self.timestamp,
            prev_hash: self.prev_hash,
            hash,
            signature,
            source: self.source,
            accuracy: self.accuracy,
            published: false,
        }
    }
}

/// Filter for paging through a ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreadcrumbQuery {
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub offset: usize,
    /// Only breadcrumbs strictly after this unix-ms time.
    #[serde(default)]
    pub after: Option<i64>,
    /// Only breadcrumbs strictly before this unix-ms time.
    #[serde(default)]
    pub before: Option<i64>,
}

fn default_limit() -> usize {
    100
}

impl Default for BreadcrumbQuery {
    fn default() -> Self {
        Self {
            limit: default_limit(),
            offset: 0,
            after: None,
            before: None,
        }
    }
}

impl BreadcrumbQuery {
    pub fn matches(&self, breadcrumb: &Breadcrumb) -> bool {
        self.after.map_or(true, |t| breadcrumb.timestamp > t)
            && self.before.map_or(true, |t| breadcrumb.timestamp < t)
    }
}

/// Summary of a ledger's collection state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionStatus {
    pub total_breadcrumbs: u64,
    pub pending_breadcrumbs: u64,
    pub unique_locations: u64,
    pub last_breadcrumb_at: Option<i64>,
    pub interval_secs: u64,
    pub can_publish: bool,
}
