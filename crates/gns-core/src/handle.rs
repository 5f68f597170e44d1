//! Handle reservation and the trust gate in front of claims and payments.

use serde::{Deserialize, Serialize};

use crate::crypto::Ed25519PublicKey;
use crate::error::HandleError;
use crate::trust::{TrustRequirements, TrustScore, TrustScorer, TrustVerification};

pub const MIN_HANDLE_LEN: usize = 3;
pub const MAX_HANDLE_LEN: usize = 20;

pub const RESERVED_HANDLES: &[&str] = &[
    "admin", "root", "system", "gns", "layer", "browser", "support", "help", "official",
    "verified", "echo", "bot", "api", "www", "app", "mail", "ftp", "ssh", "localhost",
];

/// Normalise and validate a handle. Returns the canonical form without `@`.
pub fn validate_handle(handle: &str) -> Result<String, HandleError> {
    let clean = handle.trim().to_lowercase().replace('@', "");

    if clean.is_empty() {
        return Err(HandleError::Empty);
    }

    let len = clean.chars().count();
    if len < MIN_HANDLE_LEN {
        return Err(HandleError::TooShort {
            min: MIN_HANDLE_LEN,
            got: len,
        });
    }
    if len > MAX_HANDLE_LEN {
        return Err(HandleError::TooLong {
            max: MAX_HANDLE_LEN,
            got: len,
        });
    }

    if !clean
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
    {
        return Err(HandleError::InvalidCharacters);
    }

    if RESERVED_HANDLES.contains(&clean.as_str()) {
        return Err(HandleError::ReservedWord(clean));
    }

    Ok(clean)
}

/// How far a reservation is from being claimable.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClaimProgress {
    pub breadcrumbs_current: u64,
    pub breadcrumbs_required: u64,
    pub trust_current: f64,
    pub trust_required: f64,
}

impl ClaimProgress {
    pub fn from_score(score: &TrustScore, requirements: &TrustRequirements) -> Self {
        Self {
            breadcrumbs_current: score.breadcrumb_count,
            breadcrumbs_required: requirements.min_breadcrumbs.unwrap_or(0),
            trust_current: score.score,
            trust_required: requirements.min_trust_score.unwrap_or(0.0),
        }
    }

    pub fn is_met(&self) -> bool {
        self.breadcrumbs_current >= self.breadcrumbs_required
            && self.trust_current >= self.trust_required
    }
}

/// Handle lifecycle of one identity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandleStatus {
    #[default]
    None,
    Reserved {
        handle: String,
        progress: ClaimProgress,
        reserved_at: i64,
    },
    Claimed {
        handle: String,
        claimed_at: i64,
    },
}

impl HandleStatus {
    pub fn display_name(&self) -> String {
        match self {
            HandleStatus::None => "Anonymous".to_string(),
            HandleStatus::Reserved { handle, .. } => format!("@{handle} (pending)"),
            HandleStatus::Claimed { handle, .. } => format!("@{handle}"),
        }
    }

    pub fn handle(&self) -> Option<&str> {
        match self {
            HandleStatus::None => None,
            HandleStatus::Reserved { handle, .. } => Some(handle),
            HandleStatus::Claimed { handle, .. } => Some(handle),
        }
    }

    pub fn is_claimed(&self) -> bool {
        matches!(self, HandleStatus::Claimed { .. })
    }

    pub fn is_reserved(&self) -> bool {
        matches!(self, HandleStatus::Reserved { .. })
    }
}

/// Applies trust requirement presets to handle and payment operations.
///
/// The gate is pure: it takes the current [`HandleStatus`] and a freshly
/// computed [`TrustScore`] and returns the next status. Persisting it is the
/// caller's job.
#[derive(Debug, Clone)]
pub struct HandleGate {
    scorer: TrustScorer,
    claim: TrustRequirements,
    payment: TrustRequirements,
}

impl Default for HandleGate {
    fn default() -> Self {
        Self::new(TrustScorer::default())
    }
}

impl HandleGate {
    pub fn new(scorer: TrustScorer) -> Self {
        Self {
            scorer,
            claim: TrustRequirements::for_handle_claim(),
            payment: TrustRequirements::for_payment(),
        }
    }

    pub fn with_requirements(mut self, claim: TrustRequirements, payment: TrustRequirements) -> Self {
        self.claim = claim;
        self.payment = payment;
        self
    }

    pub fn claim_requirements(&self) -> &TrustRequirements {
        &self.claim
    }

    /// Reserve a handle. Only allowed when nothing is held.
    pub fn reserve(
        &self,
        current: &HandleStatus,
        handle: &str,
        score: &TrustScore,
        now: i64,
    ) -> Result<HandleStatus, HandleError> {
        match current {
            HandleStatus::None => {}
            HandleStatus::Reserved { handle: held, .. }
            | HandleStatus::Claimed { handle: held, .. } => {
                return Err(HandleError::AlreadyHeld(held.clone()));
            }
        }

        let handle = validate_handle(handle)?;
        Ok(HandleStatus::Reserved {
            handle,
            progress: ClaimProgress::from_score(score, &self.claim),
            reserved_at: now,
        })
    }

    /// Update the progress of a reservation. Other states are returned unchanged.
    pub fn refresh_progress(&self, current: &HandleStatus, score: &TrustScore) -> HandleStatus {
        match current {
            HandleStatus::Reserved {
                handle,
                reserved_at,
                ..
            } => HandleStatus::Reserved {
                handle: handle.clone(),
                progress: ClaimProgress::from_score(score, &self.claim),
                reserved_at: *reserved_at,
            },
            HandleStatus::None | HandleStatus::Claimed { .. } => current.clone(),
        }
    }

    /// Turn a reservation into a claim if the identity meets the claim preset.
    pub fn claim(
        &self,
        current: &HandleStatus,
        identity: &Ed25519PublicKey,
        score: &TrustScore,
        now: i64,
    ) -> Result<(HandleStatus, TrustVerification), HandleError> {
        let handle = match current {
            HandleStatus::Reserved { handle, .. } => handle.clone(),
            HandleStatus::Claimed { handle, .. } => {
                return Err(HandleError::AlreadyHeld(handle.clone()))
            }
            HandleStatus::None => return Err(HandleError::NoReservation),
        };

        let verification = self.scorer.verify(identity, score, &self.claim, now);
        if !verification.is_verified {
            return Err(HandleError::RequirementsNotMet(verification.failed_checks()));
        }

        Ok((
            HandleStatus::Claimed {
                handle,
                claimed_at: now,
            },
            verification,
        ))
    }

    /// Check the payment preset.
    pub fn authorize_payment(
        &self,
        identity: &Ed25519PublicKey,
        score: &TrustScore,
        now: i64,
    ) -> Result<TrustVerification, HandleError> {
        let verification = self.scorer.verify(identity, score, &self.payment, now);
        if !verification.is_verified {
            return Err(HandleError::RequirementsNotMet(verification.failed_checks()));
        }
        Ok(verification)
    }
}
