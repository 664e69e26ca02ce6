//! Runtime forecast from a preflight and a calibration entry.

use std::fmt;

use tracing::debug;

use crate::calibration::CalibrationEntry;
use crate::preflight::PreflightResult;

/// Share of targets expected to receive an assignment when the caller has
/// no better guess.
pub const DEFAULT_ASSIGNMENT_RATE: f64 = 0.10;

/// How much to trust an estimate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Confidence {
    /// Score below 0.5.
    Low,
    /// Score from 0.5 up to 0.8.
    Medium,
    /// Score 0.8 and above.
    High,
}

impl Confidence {
    /// Label for a score in `[0, 1]`.
    ///
    /// # Example
    ///
    /// ```
    /// use zone_estimate::Confidence;
    ///
    /// assert_eq!(Confidence::from_score(0.2), Confidence::Low);
    /// assert_eq!(Confidence::from_score(0.5), Confidence::Medium);
    /// assert_eq!(Confidence::from_score(0.8), Confidence::High);
    /// ```
    #[must_use]
    pub fn from_score(score: f64) -> Self {
        if score < 0.5 {
            Self::Low
        } else if score < 0.8 {
            Self::Medium
        } else {
            Self::High
        }
    }
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Low => "Low",
            Self::Medium => "Medium",
            Self::High => "High",
        })
    }
}

/// Predicted run time. Derived on demand and never stored.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RuntimeEstimate {
    /// Fixed overhead plus candidate-pair testing.
    pub compute_seconds: f64,
    /// Writing assignments back.
    pub write_seconds: f64,
    /// `compute_seconds + write_seconds`.
    pub total_seconds: f64,
    /// Assignments the write estimate assumes.
    pub estimated_assignments: f64,
    /// Trust score in `[0.2, 1]`, growing with calibration samples.
    pub confidence: f64,
    /// Label for `confidence`.
    pub label: Confidence,
}

/// Forecast a run.
///
/// `expected_assignment_rate` outside `[0, 1]` (or not finite) falls back to
/// [`DEFAULT_ASSIGNMENT_RATE`].
///
/// # Example
///
/// ```
/// use zone_estimate::{CalibrationEntry, Confidence, PreflightResult, estimate};
///
/// let preflight = PreflightResult {
///     target_count: 10_000,
///     candidate_pairs: 1_000_000,
///     ..PreflightResult::default()
/// };
/// let e = estimate(&preflight, &CalibrationEntry::default(), 2, 0.10);
///
/// // 1.5 + 1e6 * 2e-6
/// assert!((e.compute_seconds - 3.5).abs() < 1e-9);
/// // 1000 assignments * 2 columns * 5e-4
/// assert!((e.write_seconds - 1.0).abs() < 1e-9);
/// assert_eq!(e.label, Confidence::Low);
/// ```
#[must_use]
pub fn estimate(
    preflight: &PreflightResult,
    calibration: &CalibrationEntry,
    mapping_columns: usize,
    expected_assignment_rate: f64,
) -> RuntimeEstimate {
    let rate = if expected_assignment_rate.is_finite()
        && (0.0..=1.0).contains(&expected_assignment_rate)
    {
        expected_assignment_rate
    } else {
        DEFAULT_ASSIGNMENT_RATE
    };

    #[allow(clippy::cast_precision_loss)]
    let (pairs, targets, columns) = (
        preflight.candidate_pairs as f64,
        preflight.target_count as f64,
        mapping_columns as f64,
    );

    let compute_seconds = calibration.fixed_seconds + pairs * calibration.seconds_per_candidate_pair;
    let estimated_assignments = (targets * rate).max(1.0);
    let write_seconds = estimated_assignments * columns * calibration.seconds_per_write;
    let confidence = (0.2 + 0.15 * f64::from(calibration.samples)).min(1.0);

    let result = RuntimeEstimate {
        compute_seconds,
        write_seconds,
        total_seconds: compute_seconds + write_seconds,
        estimated_assignments,
        confidence,
        label: Confidence::from_score(confidence),
    };
    debug!(
        compute_seconds,
        write_seconds,
        confidence,
        label = %result.label,
        "Runtime estimated"
    );
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn preflight(targets: usize, pairs: u64) -> PreflightResult {
        PreflightResult {
            target_count: targets,
            candidate_pairs: pairs,
            ..PreflightResult::default()
        }
    }

    #[test]
    fn linear_model() {
        let entry = CalibrationEntry {
            samples: 3,
            seconds_per_candidate_pair: 1e-5,
            seconds_per_write: 1e-3,
            fixed_seconds: 2.0,
        };
        let e = estimate(&preflight(5000, 100_000), &entry, 3, 0.2);
        assert_relative_eq!(e.compute_seconds, 3.0);
        assert_relative_eq!(e.estimated_assignments, 1000.0);
        assert_relative_eq!(e.write_seconds, 3.0);
        assert_relative_eq!(e.total_seconds, 6.0);
        assert_relative_eq!(e.confidence, 0.65);
        assert_eq!(e.label, Confidence::Medium);
    }

    #[test]
    fn at_least_one_assignment() {
        let e = estimate(&preflight(0, 0), &CalibrationEntry::default(), 1, 0.1);
        assert_relative_eq!(e.estimated_assignments, 1.0);
        assert_relative_eq!(e.write_seconds, 5e-4);
    }

    #[test]
    fn confidence_grows_and_caps() {
        let mut entry = CalibrationEntry::default();
        let labels: Vec<Confidence> = (0..8)
            .map(|samples| {
                entry.samples = samples;
                estimate(&preflight(10, 10), &entry, 1, 0.1).label
            })
            .collect();
        // 0.2, 0.35, 0.5, 0.65, 0.8, 0.95, 1.0, 1.0
        assert_eq!(
            labels,
            vec![
                Confidence::Low,
                Confidence::Low,
                Confidence::Medium,
                Confidence::Medium,
                Confidence::High,
                Confidence::High,
                Confidence::High,
                Confidence::High,
            ]
        );
        entry.samples = 100;
        assert_relative_eq!(estimate(&preflight(1, 1), &entry, 1, 0.1).confidence, 1.0);
    }

    #[test]
    fn bad_rate_uses_default() {
        let a = estimate(&preflight(1000, 0), &CalibrationEntry::default(), 1, f64::NAN);
        let b = estimate(&preflight(1000, 0), &CalibrationEntry::default(), 1, 7.0);
        assert_relative_eq!(a.estimated_assignments, 100.0);
        assert_relative_eq!(b.estimated_assignments, 100.0);
    }
}
