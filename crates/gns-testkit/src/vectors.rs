//! Golden vectors for the hash and signature preimages.
//!
//! Each vector is rebuilt from raw bytes with `sha2` directly and compared to
//! what `gns-core` produces, so a change to any byte layout is caught here.

use gns_core::{
    Breadcrumb, EpochHeader, H3Cell, IdentityKeypair, LocationSource, Sha256Hash, GENESIS_HASH,
};
use sha2::{Digest, Sha256};

/// A breadcrumb vector.
#[derive(Debug, Clone)]
pub struct GoldenVector {
    pub name: &'static str,
    pub seed: [u8; 32],
    pub lat: f64,
    pub lng: f64,
    pub resolution: u8,
    pub timestamp: i64,
    pub source: LocationSource,
    /// Links to genesis when `None`.
    pub prev_hash: Option<[u8; 32]>,
}

pub fn all_vectors() -> Vec<GoldenVector> {
    vec![
        GoldenVector {
            name: "genesis breadcrumb, GPS, resolution 7",
            seed: [0x42; 32],
            lat: 37.7749,
            lng: -122.4194,
            resolution: 7,
            timestamp: 1_704_067_200_000,
            source: LocationSource::Gps,
            prev_hash: None,
        },
        GoldenVector {
            name: "linked breadcrumb, Wi-Fi, resolution 9",
            seed: [0x42; 32],
            lat: 51.5074,
            lng: -0.1278,
            resolution: 9,
            timestamp: 1_704_070_800_000,
            source: LocationSource::Wifi,
            prev_hash: Some([0xAA; 32]),
        },
        GoldenVector {
            name: "zero seed, epoch time, fused",
            seed: [0x00; 32],
            lat: 0.0,
            lng: 0.0,
            resolution: 0,
            timestamp: 0,
            source: LocationSource::Fused,
            prev_hash: None,
        },
    ]
}

pub fn breadcrumb_from_vector(vector: &GoldenVector) -> Breadcrumb {
    let keypair = IdentityKeypair::from_seed(&vector.seed);
    let cell = vector_cell(vector);
    Breadcrumb::builder(cell, vector.timestamp)
        .prev(vector.prev_hash.map(Sha256Hash).unwrap_or(GENESIS_HASH))
        .source(vector.source)
        .id(vector.name)
        .sign(&keypair)
}

fn vector_cell(vector: &GoldenVector) -> H3Cell {
    match H3Cell::from_lat_lng(vector.lat, vector.lng, vector.resolution) {
        Ok(cell) => cell,
        Err(e) => panic!("golden vector {:?} has invalid coordinates: {e}", vector.name),
    }
}

/// `h3_index BE ‖ resolution ‖ timestamp BE ‖ prev_hash ‖ source`, hashed by hand.
pub fn reference_breadcrumb_hash(vector: &GoldenVector) -> [u8; 32] {
    let cell = vector_cell(vector);
    let mut hasher = Sha256::new();
    hasher.update(cell.as_u64().to_be_bytes());
    hasher.update([vector.resolution]);
    hasher.update(vector.timestamp.to_be_bytes());
    hasher.update(vector.prev_hash.unwrap_or([0u8; 32]));
    hasher.update([vector.source.to_u8()]);
    hasher.finalize().into()
}

/// `identity ‖ epoch_index BE ‖ merkle_root ‖ prev_epoch_hash or zeros`, hashed by hand.
pub fn reference_epoch_hash(header: &EpochHeader) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(header.identity.as_bytes());
    hasher.update(header.epoch_index.to_be_bytes());
    hasher.update(header.merkle_root.as_bytes());
    hasher.update(header.prev_epoch_hash.map_or([0u8; 32], |h| h.0));
    hasher.finalize().into()
}

/// `(name, matches, breadcrumb hash hex)` for every vector.
pub fn verify_all_vectors() -> Vec<(String, bool, String)> {
    all_vectors()
        .iter()
        .map(|v| {
            let crumb = breadcrumb_from_vector(v);
            let reference = reference_breadcrumb_hash(v);
            (
                v.name.to_string(),
                crumb.hash.0 == reference,
                hex::encode(reference),
            )
        })
        .collect()
}
