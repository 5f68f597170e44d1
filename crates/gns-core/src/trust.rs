//! Proof-of-Trajectory trust scoring.
//!
//! Scoring is a pure function of a ledger snapshot, the published epoch
//! count, and an explicit `now`. Nothing here reads the clock.
//!
//! ## Components
//!
//! | Component | Weight | Heuristic |
//! |---|---|---|
//! | trajectory quality | 0.25 | `70·(1 − teleports/transitions) + 30·recurrence` |
//! | temporal consistency | 0.20 | `50/(1 + cv(gaps)) + 50·min(active_weeks/target, 1)` |
//! | chain integrity | 0.20 | `100` if valid or empty, else `100·broken_at/len` |
//! | epoch reliability | 0.20 | `100·min(epochs/ceiling, 1)` |
//! | geographic diversity | 0.15 | piecewise over distinct cells |
//!
//! An empty ledger scores 0 overall even though its chain integrity is 100.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::breadcrumb::{Breadcrumb, H3Cell};
use crate::chain::{verify_chain, ChainVerification};
use crate::crypto::Ed25519PublicKey;

const HOUR_MS: f64 = 3_600_000.0;
const DAY_MS: i64 = 86_400_000;
const WEEK_MS: i64 = 7 * DAY_MS;

pub const WEIGHT_TRAJECTORY: f64 = 0.25;
pub const WEIGHT_TEMPORAL: f64 = 0.20;
pub const WEIGHT_CHAIN: f64 = 0.20;
pub const WEIGHT_EPOCH: f64 = 0.20;
pub const WEIGHT_GEOGRAPHIC: f64 = 0.15;

/// Tunables for the component heuristics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrustConfig {
    /// Travel faster than this between consecutive breadcrumbs is a teleport.
    #[serde(default = "default_max_speed")]
    pub max_speed_kmh: f64,
    /// Published epochs at which epoch reliability reaches 100.
    #[serde(default = "default_epoch_ceiling")]
    pub epoch_ceiling: u64,
    /// Distinct active weeks at which activity continuity reaches 100%.
    #[serde(default = "default_target_weeks")]
    pub target_active_weeks: u32,
}

fn default_max_speed() -> f64 {
    300.0
}
fn default_epoch_ceiling() -> u64 {
    10
}
fn default_target_weeks() -> u32 {
    4
}

impl Default for TrustConfig {
    fn default() -> Self {
        Self {
            max_speed_kmh: default_max_speed(),
            epoch_ceiling: default_epoch_ceiling(),
            target_active_weeks: default_target_weeks(),
        }
    }
}

/// Trust tiers, ordered from lowest to highest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrustTier {
    Seedling,
    Rooted,
    Established,
    Trusted,
    Verified,
}

impl TrustTier {
    pub fn from_score(score: f64) -> Self {
        if score >= 80.0 {
            Self::Verified
        } else if score >= 60.0 {
            Self::Trusted
        } else if score >= 40.0 {
            Self::Established
        } else if score >= 20.0 {
            Self::Rooted
        } else {
            // NaN lands here too.
            Self::Seedling
        }
    }

    pub fn min_score(&self) -> f64 {
        match self {
            Self::Seedling => 0.0,
            Self::Rooted => 20.0,
            Self::Established => 40.0,
            Self::Trusted => 60.0,
            Self::Verified => 80.0,
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Seedling => "Seedling",
            Self::Rooted => "Rooted",
            Self::Established => "Established",
            Self::Trusted => "Trusted",
            Self::Verified => "Verified",
        }
    }

    pub fn emoji(&self) -> &'static str {
        match self {
            Self::Seedling => "🌱",
            Self::Rooted => "🌿",
            Self::Established => "🌲",
            Self::Trusted => "🏔️",
            Self::Verified => "⭐",
        }
    }
}

/// Per-component scores, each in [0, 100].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrustComponents {
    pub trajectory_quality: f64,
    pub temporal_consistency: f64,
    pub chain_integrity: f64,
    pub epoch_reliability: f64,
    pub geographic_diversity: f64,
}

impl TrustComponents {
    pub fn weighted(&self) -> f64 {
        WEIGHT_TRAJECTORY * self.trajectory_quality
            + WEIGHT_TEMPORAL * self.temporal_consistency
            + WEIGHT_CHAIN * self.chain_integrity
            + WEIGHT_EPOCH * self.epoch_reliability
            + WEIGHT_GEOGRAPHIC * self.geographic_diversity
    }
}

/// A computed trust score. Persisted copies are caches only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrustScore {
    pub score: f64,
    pub tier: TrustTier,
    pub components: TrustComponents,
    pub breadcrumb_count: u64,
    pub account_age_days: u32,
    pub unique_locations: u64,
    pub epoch_count: u64,
    /// The `now` the score was computed for, unix ms.
    pub calculated_at: i64,
}

/// Statistics extracted from a ledger snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerStats {
    pub breadcrumb_count: u64,
    pub unique_locations: u64,
    /// Earliest of identity creation and the first breadcrumb, unix ms.
    pub first_seen: Option<i64>,
    pub chain: ChainVerification,
    /// Consecutive breadcrumb pairs.
    pub transitions: u64,
    /// Pairs implying travel above the speed threshold.
    pub teleports: u64,
    /// Breadcrumbs in a cell already visited on an earlier day.
    pub recurring: u64,
    pub gap_mean_ms: f64,
    pub gap_stddev_ms: f64,
    pub active_weeks: u32,
}

/// Published-epoch statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpochStats {
    pub epoch_count: u64,
}

/// Computes trust scores and verifies requirement sets.
#[derive(Debug, Clone, Default)]
pub struct TrustScorer {
    config: TrustConfig,
}

impl TrustScorer {
    pub fn new(config: TrustConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TrustConfig {
        &self.config
    }

    /// Extract scoring statistics from a ledger in chain order.
    pub fn analyze(
        &self,
        author: &Ed25519PublicKey,
        breadcrumbs: &[Breadcrumb],
        created_at: Option<i64>,
    ) -> LedgerStats {
        let chain = verify_chain(author, breadcrumbs);

        let unique: HashSet<H3Cell> = breadcrumbs.iter().map(|b| b.h3_index).collect();

        let first_seen = match (created_at, breadcrumbs.first().map(|b| b.timestamp)) {
            (Some(c), Some(f)) => Some(c.min(f)),
            (c, f) => c.or(f),
        };

        let mut teleports = 0u64;
        let mut gaps = Vec::with_capacity(breadcrumbs.len().saturating_sub(1));
        for pair in breadcrumbs.windows(2) {
            let elapsed_ms = pair[1].timestamp.saturating_sub(pair[0].timestamp);
            gaps.push(elapsed_ms as f64);

            let distance = pair[0].h3_index.distance_km(&pair[1].h3_index);
            if distance > 0.0 {
                let too_fast = if elapsed_ms <= 0 {
                    true
                } else {
                    distance / (elapsed_ms as f64 / HOUR_MS) > self.config.max_speed_kmh
                };
                if too_fast {
                    teleports += 1;
                }
            }
        }

        // Cell -> first day it was seen.
        let mut first_day: HashMap<H3Cell, i64> = HashMap::new();
        let mut recurring = 0u64;
        for crumb in breadcrumbs {
            let day = crumb.timestamp.div_euclid(DAY_MS);
            let seen = *first_day.entry(crumb.h3_index).or_insert(day);
            if seen < day {
                recurring += 1;
            }
        }

        let weeks: HashSet<i64> = breadcrumbs
            .iter()
            .map(|b| b.timestamp.div_euclid(WEEK_MS))
            .collect();

        let (gap_mean_ms, gap_stddev_ms) = mean_stddev(&gaps);

        LedgerStats {
            breadcrumb_count: breadcrumbs.len() as u64,
            unique_locations: unique.len() as u64,
            first_seen,
            chain,
            transitions: gaps.len() as u64,
            teleports,
            recurring,
            gap_mean_ms,
            gap_stddev_ms,
            active_weeks: weeks.len() as u32,
        }
    }

    pub fn trajectory_quality(&self, stats: &LedgerStats) -> f64 {
        if stats.breadcrumb_count < 2 || stats.transitions == 0 {
            return 0.0;
        }
        let plausibility = 1.0 - stats.teleports as f64 / stats.transitions as f64;
        let recurrence = stats.recurring as f64 / stats.breadcrumb_count as f64;
        clamp_score(70.0 * plausibility + 30.0 * recurrence)
    }

    pub fn temporal_consistency(&self, stats: &LedgerStats) -> f64 {
        if stats.breadcrumb_count < 2 {
            return 0.0;
        }
        let regularity = if stats.gap_mean_ms > 0.0 {
            1.0 / (1.0 + stats.gap_stddev_ms / stats.gap_mean_ms)
        } else {
            0.0
        };
        let target = self.config.target_active_weeks.max(1) as f64;
        let continuity = (stats.active_weeks as f64 / target).min(1.0);
        clamp_score(50.0 * regularity + 50.0 * continuity)
    }

    pub fn chain_integrity(&self, stats: &LedgerStats) -> f64 {
        match stats.chain.broken_at {
            None => 100.0,
            Some(_) if stats.breadcrumb_count == 0 => 100.0,
            Some(at) => clamp_score(100.0 * at as f64 / stats.breadcrumb_count as f64),
        }
    }

    pub fn epoch_reliability(&self, epochs: &EpochStats) -> f64 {
        let ceiling = self.config.epoch_ceiling.max(1) as f64;
        clamp_score(100.0 * (epochs.epoch_count as f64 / ceiling).min(1.0))
    }

    pub fn geographic_diversity(&self, stats: &LedgerStats) -> f64 {
        geographic_diversity(stats.unique_locations)
    }

    pub fn compute_components(&self, stats: &LedgerStats, epochs: &EpochStats) -> TrustComponents {
        TrustComponents {
            trajectory_quality: self.trajectory_quality(stats),
            temporal_consistency: self.temporal_consistency(stats),
            chain_integrity: self.chain_integrity(stats),
            epoch_reliability: self.epoch_reliability(epochs),
            geographic_diversity: self.geographic_diversity(stats),
        }
    }

    /// Compute the overall score. Always returns a value.
    pub fn compute_score(&self, stats: &LedgerStats, epochs: &EpochStats, now: i64) -> TrustScore {
        let components = self.compute_components(stats, epochs);
        let score = if stats.breadcrumb_count == 0 {
            0.0
        } else {
            clamp_score(components.weighted())
        };

        let account_age_days = stats
            .first_seen
            .map(|first| {
                let days = now.saturating_sub(first).max(0) / DAY_MS;
                u32::try_from(days).unwrap_or(u32::MAX)
            })
            .unwrap_or(0);

        TrustScore {
            score,
            tier: TrustTier::from_score(score),
            components,
            breadcrumb_count: stats.breadcrumb_count,
            account_age_days,
            unique_locations: stats.unique_locations,
            epoch_count: epochs.epoch_count,
            calculated_at: now,
        }
    }

    /// Evaluate a requirement set against a score.
    pub fn verify(
        &self,
        identity: &Ed25519PublicKey,
        score: &TrustScore,
        requirements: &TrustRequirements,
        now: i64,
    ) -> TrustVerification {
        let mut checks = Vec::new();

        if let Some(min) = requirements.min_trust_score {
            checks.push(TrustCheck::new(
                CHECK_SCORE,
                score.score >= min,
                format!("Required: {min}%, Actual: {:.1}%", score.score),
                min.to_string(),
                score.score.to_string(),
            ));
        }

        if let Some(min) = requirements.min_breadcrumbs {
            checks.push(TrustCheck::new(
                CHECK_BREADCRUMBS,
                score.breadcrumb_count >= min,
                format!("Required: {min}, Actual: {}", score.breadcrumb_count),
                min.to_string(),
                score.breadcrumb_count.to_string(),
            ));
        }

        if let Some(min) = requirements.min_account_age_days {
            checks.push(TrustCheck::new(
                CHECK_AGE,
                score.account_age_days >= min,
                format!(
                    "Required: {min} days, Actual: {} days",
                    score.account_age_days
                ),
                min.to_string(),
                score.account_age_days.to_string(),
            ));
        }

        if let Some(min) = requirements.min_unique_locations {
            checks.push(TrustCheck::new(
                CHECK_LOCATIONS,
                score.unique_locations >= min,
                format!("Required: {min}, Actual: {}", score.unique_locations),
                min.to_string(),
                score.unique_locations.to_string(),
            ));
        }

        if let Some(tier) = requirements.required_tier {
            checks.push(TrustCheck::new(
                CHECK_TIER,
                score.tier >= tier,
                format!(
                    "Required: {} {}, Actual: {} {}",
                    tier.emoji(),
                    tier.display_name(),
                    score.tier.emoji(),
                    score.tier.display_name()
                ),
                tier.display_name().to_string(),
                score.tier.display_name().to_string(),
            ));
        }

        TrustVerification {
            identity: *identity,
            is_verified: checks.iter().all(|c| c.passed),
            trust_score: score.clone(),
            checks,
            verified_at: now,
        }
    }
}

pub const CHECK_SCORE: &str = "Minimum Trust Score";
pub const CHECK_BREADCRUMBS: &str = "Minimum Breadcrumbs";
pub const CHECK_AGE: &str = "Account Age";
pub const CHECK_LOCATIONS: &str = "Unique Locations";
pub const CHECK_TIER: &str = "Trust Tier";

/// Piecewise diversity curve: steep for the first few cells, flattening out.
pub fn geographic_diversity(unique_locations: u64) -> f64 {
    let n = unique_locations as f64;
    let score = match unique_locations {
        0..=5 => n * 5.0,
        6..=20 => 25.0 + (n - 5.0) * 2.5,
        21..=50 => 62.5 + (n - 20.0),
        51..=100 => 92.5 + (n - 50.0) * 0.15,
        _ => 100.0,
    };
    clamp_score(score)
}

fn clamp_score(v: f64) -> f64 {
    if v.is_nan() {
        0.0
    } else {
        v.clamp(0.0, 100.0)
    }
}

fn mean_stddev(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, variance.sqrt())
}

/// A named set of thresholds. `None` fields are not checked.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrustRequirements {
    #[serde(default)]
    pub min_trust_score: Option<f64>,
    #[serde(default)]
    pub min_breadcrumbs: Option<u64>,
    #[serde(default)]
    pub min_account_age_days: Option<u32>,
    #[serde(default)]
    pub min_unique_locations: Option<u64>,
    #[serde(default)]
    pub required_tier: Option<TrustTier>,
}

impl TrustRequirements {
    pub fn for_handle_claim() -> Self {
        Self {
            min_trust_score: Some(20.0),
            min_breadcrumbs: Some(100),
            min_account_age_days: Some(7),
            min_unique_locations: Some(10),
            required_tier: Some(TrustTier::Rooted),
        }
    }

    pub fn for_payment() -> Self {
        Self {
            min_trust_score: Some(40.0),
            min_breadcrumbs: Some(200),
            min_account_age_days: Some(14),
            min_unique_locations: Some(20),
            required_tier: Some(TrustTier::Established),
        }
    }

    pub fn none() -> Self {
        Self::default()
    }
}

/// One evaluated requirement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustCheck {
    pub name: String,
    pub passed: bool,
    pub details: String,
    pub required: String,
    pub actual: String,
}

impl TrustCheck {
    fn new(name: &str, passed: bool, details: String, required: String, actual: String) -> Self {
        Self {
            name: name.to_string(),
            passed,
            details,
            required,
            actual,
        }
    }
}

/// Result of checking an identity against a requirement set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrustVerification {
    pub identity: Ed25519PublicKey,
    pub is_verified: bool,
    pub trust_score: TrustScore,
    pub checks: Vec<TrustCheck>,
    pub verified_at: i64,
}

impl TrustVerification {
    pub fn failed_checks(&self) -> Vec<TrustCheck> {
        self.checks.iter().filter(|c| !c.passed).cloned().collect()
    }
}
