//! Trail generators and proptest strategies.

use std::collections::HashSet;

use proptest::prelude::*;

use gns_core::{Breadcrumb, H3Cell, IdentityKeypair, LocationSource, GENESIS_HASH};

use crate::fixtures::BASE_TIME;

const DAY_MS: i64 = 86_400_000;

/// Shape of a generated trail.
#[derive(Debug, Clone, PartialEq)]
pub struct TrailSpec {
    pub breadcrumbs: usize,
    /// Distinct H3 cells, visited round-robin.
    pub cells: usize,
    /// Days the trail is spread evenly across.
    pub days: u32,
    /// Unix ms of the first breadcrumb.
    pub start: i64,
    pub center: (f64, f64),
    pub resolution: u8,
}

impl TrailSpec {
    /// `breadcrumbs` over `cells` cells near San Francisco across `days` days.
    pub fn new(breadcrumbs: usize, cells: usize, days: u32) -> Self {
        Self {
            breadcrumbs,
            cells,
            days,
            start: BASE_TIME,
            center: (37.7749, -122.4194),
            resolution: 7,
        }
    }

    pub fn starting_at(mut self, start: i64) -> Self {
        self.start = start;
        self
    }

    /// Gap between consecutive breadcrumbs.
    pub fn interval_ms(&self) -> i64 {
        if self.breadcrumbs == 0 {
            return 0;
        }
        (i64::from(self.days.max(1)) * DAY_MS) / self.breadcrumbs as i64
    }
}

/// Up to `count` distinct cells around `center`, walking outward on a grid
/// about one cell wide at resolution 7.
pub fn nearby_cells(center: (f64, f64), resolution: u8, count: usize) -> Vec<H3Cell> {
    const STEP_DEG: f64 = 0.012;
    let mut seen = HashSet::new();
    let mut cells = Vec::with_capacity(count);

    let mut radius: i32 = 0;
    while cells.len() < count && radius < 64 {
        for dy in -radius..=radius {
            for dx in -radius..=radius {
                if dy.abs().max(dx.abs()) != radius {
                    continue;
                }
                let lat = center.0 + f64::from(dy) * STEP_DEG;
                let lng = center.1 + f64::from(dx) * STEP_DEG;
                if let Ok(cell) = H3Cell::from_lat_lng(lat, lng, resolution) {
                    if seen.insert(cell) && cells.len() < count {
                        cells.push(cell);
                    }
                }
            }
        }
        radius += 1;
    }
    cells
}

/// A linked, signed trail matching `spec`.
///
/// Breadcrumb `i` sits in cell `i % cells` at `start + i * interval`, so each
/// cell recurs across days.
pub fn trail(keypair: &IdentityKeypair, spec: &TrailSpec) -> Vec<Breadcrumb> {
    let cells = nearby_cells(spec.center, spec.resolution, spec.cells.max(1));
    let interval = spec.interval_ms();
    let mut prev = GENESIS_HASH;

    (0..spec.breadcrumbs)
        .map(|i| {
            let crumb = Breadcrumb::builder(cells[i % cells.len()], spec.start + i as i64 * interval)
                .prev(prev)
                .accuracy(Some(10.0))
                .id(format!("crumb-{i:05}"))
                .sign(keypair);
            prev = crumb.hash;
            crumb
        })
        .collect()
}

/// Generate a random identity keypair.
pub fn keypair() -> impl Strategy<Value = IdentityKeypair> {
    any::<[u8; 32]>().prop_map(|seed| IdentityKeypair::from_seed(&seed))
}

/// A valid cell anywhere on the globe at any resolution.
pub fn h3_cell() -> impl Strategy<Value = H3Cell> {
    (-85.0f64..85.0, -179.9f64..179.9, 0u8..=15).prop_filter_map(
        "coordinates outside H3",
        |(lat, lng, res)| H3Cell::from_lat_lng(lat, lng, res).ok(),
    )
}

pub fn location_source() -> impl Strategy<Value = LocationSource> {
    prop_oneof![
        Just(LocationSource::Gps),
        Just(LocationSource::Wifi),
        Just(LocationSource::Cell),
        Just(LocationSource::Network),
        Just(LocationSource::Manual),
        Just(LocationSource::Fused),
    ]
}

/// Payload bytes up to `max_len`.
pub fn payload(max_len: usize) -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..=max_len)
}

/// A signed chain of random cells with non-decreasing timestamps.
pub fn chain(max_len: usize) -> impl Strategy<Value = (IdentityKeypair, Vec<Breadcrumb>)> {
    (
        keypair(),
        prop::collection::vec((h3_cell(), 0i64..3_600_000, location_source()), 0..=max_len),
    )
        .prop_map(|(kp, steps)| {
            let mut prev = GENESIS_HASH;
            let mut ts = BASE_TIME;
            let crumbs = steps
                .into_iter()
                .map(|(cell, gap, source)| {
                    ts += gap;
                    let crumb = Breadcrumb::builder(cell, ts)
                        .prev(prev)
                        .source(source)
                        .sign(&kp);
                    prev = crumb.hash;
                    crumb
                })
                .collect();
            (kp, crumbs)
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use gns_core::verify_chain;

    #[test]
    fn test_nearby_cells_distinct() {
        let cells = nearby_cells((37.7749, -122.4194), 7, 12);
        assert_eq!(cells.len(), 12);
        let unique: HashSet<_> = cells.iter().collect();
        assert_eq!(unique.len(), 12);
        assert!(cells.iter().all(|c| c.resolution() == 7));
    }

    #[test]
    fn test_trail_shape() {
        let kp = IdentityKeypair::from_seed(&[1; 32]);
        let spec = TrailSpec::new(150, 12, 10);
        let crumbs = trail(&kp, &spec);

        assert_eq!(crumbs.len(), 150);
        let cells: HashSet<_> = crumbs.iter().map(|b| b.h3_index).collect();
        assert_eq!(cells.len(), 12);
        let span = crumbs[149].timestamp - crumbs[0].timestamp;
        assert!(span > 9 * DAY_MS && span <= 10 * DAY_MS);
        assert!(verify_chain(&kp.public_key(), &crumbs).valid);
    }

    #[test]
    fn test_trail_deterministic() {
        let kp = IdentityKeypair::from_seed(&[2; 32]);
        let spec = TrailSpec::new(20, 4, 2);
        assert_eq!(trail(&kp, &spec), trail(&kp, &spec));
    }

    proptest! {
        #[test]
        fn test_generated_chains_verify((kp, crumbs) in chain(20)) {
            prop_assert!(verify_chain(&kp.public_key(), &crumbs).valid);
        }
    }
}
