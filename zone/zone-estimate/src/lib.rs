//! Run-time forecasting for zone classification.
//!
//! - [`measure`] - Preflight: build the candidate index and count
//!   zone/target candidate pairs
//! - [`CalibrationStore`] - Per-machine cost model learned from finished
//!   runs
//! - [`estimate`] - Turn a preflight and a calibration entry into an ETA
//! - [`resolve_preset`] - Pick a concrete sampling tier for `Auto`
//!
//! The cost model is deliberately linear. Its job is an honest ETA that
//! improves with every run on the same machine, not scheduling.
//!
//! # Example
//!
//! ```
//! use zone_estimate::{CalibrationKey, CalibrationStore, PresetTier, estimate, measure, resolve_preset};
//! use zone_index::GridSizing;
//! use zone_types::{Aabb, Point3};
//!
//! let zones = [Some(Aabb::new(Point3::new(0.0, 0.0, 0.0), Point3::new(4000.0, 4000.0, 3000.0)))];
//! let targets = [Aabb::new(Point3::new(10.0, 10.0, 10.0), Point3::new(20.0, 20.0, 20.0))];
//! let preflight = measure(&zones, &targets, &GridSizing::default()).unwrap();
//!
//! let resolved = resolve_preset(PresetTier::Auto, &preflight.result);
//! assert_eq!(resolved.tier, PresetTier::Accurate);
//!
//! let mut store = CalibrationStore::new();
//! let key = CalibrationKey::new("cpu", "host", resolved.tier).to_string();
//! let eta = estimate(&preflight.result, &store.entry_or_default(&key), 1, 0.1);
//! assert!(eta.total_seconds > 1.5);
//!
//! store.update(&key, 2.0, preflight.result.candidate_pairs, 1);
//! assert_eq!(store.get(&key).unwrap().samples, 1);
//! ```

#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]

mod calibration;
mod error;
mod estimate;
mod preflight;
mod presets;

pub use calibration::{
    CalibrationEntry, CalibrationKey, CalibrationStore, DEFAULT_FIXED_SECONDS,
    DEFAULT_SECONDS_PER_CANDIDATE_PAIR, DEFAULT_SECONDS_PER_WRITE, FAST_ALPHA, FAST_SAMPLES,
    SLOW_ALPHA,
};
pub use error::{EstimateError, EstimateResult};
pub use estimate::{Confidence, DEFAULT_ASSIGNMENT_RATE, RuntimeEstimate, estimate};
pub use preflight::{Preflight, PreflightResult, measure, world_bounds};
pub use presets::{
    ACCURATE_MAX_CANDIDATE_PAIRS, ACCURATE_MAX_ZONES, FAST_MIN_CANDIDATE_PAIRS, FAST_MIN_TARGETS,
    PresetResolution, PresetTier, resolve_preset,
};
