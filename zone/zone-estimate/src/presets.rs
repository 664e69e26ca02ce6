//! Performance tiers and the `Auto` resolution policy.

use std::fmt;
use std::str::FromStr;

use tracing::info;

use crate::error::EstimateError;
use crate::preflight::PreflightResult;

/// Candidate pairs at or above which `Auto` picks [`PresetTier::Fast`].
pub const FAST_MIN_CANDIDATE_PAIRS: u64 = 20_000_000;

/// Target count at or above which `Auto` picks [`PresetTier::Fast`].
pub const FAST_MIN_TARGETS: usize = 250_000;

/// Candidate pairs at or below which `Auto` may pick [`PresetTier::Accurate`].
pub const ACCURATE_MAX_CANDIDATE_PAIRS: u64 = 2_000_000;

/// Zone count at or below which `Auto` may pick [`PresetTier::Accurate`].
pub const ACCURATE_MAX_ZONES: usize = 5_000;

/// Sampling density and ray count of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PresetTier {
    /// Resolve from preflight density.
    #[default]
    Auto,
    /// One sample per target, one ray.
    Fast,
    /// Anchor plus supplied points, two rays.
    Normal,
    /// Adds inset box corners, two rays.
    Accurate,
}

impl PresetTier {
    /// Whether this is a concrete tier (anything but `Auto`).
    #[must_use]
    pub const fn is_concrete(self) -> bool {
        !matches!(self, Self::Auto)
    }

    /// Name as shown to users.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Auto => "Auto",
            Self::Fast => "Fast",
            Self::Normal => "Normal",
            Self::Accurate => "Accurate",
        }
    }
}

impl fmt::Display for PresetTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PresetTier {
    type Err = EstimateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "fast" => Ok(Self::Fast),
            "normal" => Ok(Self::Normal),
            "accurate" => Ok(Self::Accurate),
            _ => Err(EstimateError::UnknownTier(s.to_string())),
        }
    }
}

/// A concrete tier and why it was chosen.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PresetResolution {
    /// Never [`PresetTier::Auto`].
    pub tier: PresetTier,
    /// Human-readable explanation naming the measured pair count.
    pub reason: String,
}

/// Resolve `requested` against preflight density.
///
/// Explicit tiers pass through. `Auto` picks `Fast` for very dense or very
/// large runs, `Accurate` for small sparse ones, and `Normal` otherwise.
///
/// # Example
///
/// ```
/// use zone_estimate::{PreflightResult, PresetTier, resolve_preset};
///
/// let preflight = PreflightResult {
///     zone_count: 100,
///     target_count: 40_000,
///     candidate_pairs: 25_000_000,
///     ..PreflightResult::default()
/// };
/// let resolved = resolve_preset(PresetTier::Auto, &preflight);
/// assert_eq!(resolved.tier, PresetTier::Fast);
/// assert!(resolved.reason.contains("25000000"));
/// ```
#[must_use]
pub fn resolve_preset(requested: PresetTier, preflight: &PreflightResult) -> PresetResolution {
    let pairs = preflight.candidate_pairs;
    let resolution = match requested {
        PresetTier::Auto => auto_tier(preflight),
        tier => PresetResolution {
            tier,
            reason: format!("{tier} selected by user ({pairs} candidate pairs)"),
        },
    };
    info!(
        requested = %requested,
        resolved = %resolution.tier,
        candidate_pairs = pairs,
        reason = %resolution.reason,
        "Preset resolved"
    );
    resolution
}

fn auto_tier(preflight: &PreflightResult) -> PresetResolution {
    let pairs = preflight.candidate_pairs;
    let targets = preflight.target_count;
    let zones = preflight.zone_count;

    if pairs >= FAST_MIN_CANDIDATE_PAIRS {
        return PresetResolution {
            tier: PresetTier::Fast,
            reason: format!(
                "Auto: {pairs} candidate pairs is at least {FAST_MIN_CANDIDATE_PAIRS}"
            ),
        };
    }
    if targets >= FAST_MIN_TARGETS {
        return PresetResolution {
            tier: PresetTier::Fast,
            reason: format!(
                "Auto: {targets} targets is at least {FAST_MIN_TARGETS} ({pairs} candidate pairs)"
            ),
        };
    }
    if pairs <= ACCURATE_MAX_CANDIDATE_PAIRS && zones <= ACCURATE_MAX_ZONES {
        return PresetResolution {
            tier: PresetTier::Accurate,
            reason: format!(
                "Auto: {pairs} candidate pairs and {zones} zones are small enough for full sampling"
            ),
        };
    }
    PresetResolution {
        tier: PresetTier::Normal,
        reason: format!("Auto: {pairs} candidate pairs across {zones} zones"),
    }
}
