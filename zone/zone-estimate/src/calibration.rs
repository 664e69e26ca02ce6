//! Per-machine cost model learned from completed runs.
//!
//! Each [`CalibrationEntry`] is a three-term linear model:
//!
//! ```text
//! elapsed ≈ fixed_seconds + pairs × seconds_per_candidate_pair + writes × seconds_per_write
//! ```
//!
//! Only the per-pair cost is learned. After each run the observed elapsed
//! time is solved for it, holding the other two terms constant, and the
//! result is blended into the stored value with exponential smoothing.

use std::fmt;

use hashbrown::HashMap;
use tracing::{debug, warn};

use crate::presets::PresetTier;

/// Per-pair cost before any run has been observed.
pub const DEFAULT_SECONDS_PER_CANDIDATE_PAIR: f64 = 2e-6;

/// Cost of one property write.
pub const DEFAULT_SECONDS_PER_WRITE: f64 = 5e-4;

/// Overhead paid by every run regardless of size.
pub const DEFAULT_FIXED_SECONDS: f64 = 1.5;

/// Samples blended with [`FAST_ALPHA`] before switching to [`SLOW_ALPHA`].
pub const FAST_SAMPLES: u32 = 5;

/// Smoothing factor while the entry is young.
pub const FAST_ALPHA: f64 = 0.35;

/// Smoothing factor once the entry has settled.
pub const SLOW_ALPHA: f64 = 0.15;

/// Learned timing coefficients for one calibration key.
///
/// # Example
///
/// ```
/// use zone_estimate::CalibrationEntry;
///
/// let mut entry = CalibrationEntry::default();
/// assert!(entry.update(10.0, 1_000_000, 100));
/// assert_eq!(entry.samples, 1);
/// assert!(entry.seconds_per_candidate_pair > 2e-6);
///
/// // Garbage timings are ignored.
/// assert!(!entry.update(f64::NAN, 1_000_000, 100));
/// assert_eq!(entry.samples, 1);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CalibrationEntry {
    /// Completed runs blended into this entry.
    pub samples: u32,
    /// Learned cost of testing one zone/target candidate pair.
    pub seconds_per_candidate_pair: f64,
    /// Cost of one property write.
    pub seconds_per_write: f64,
    /// Per-run overhead.
    pub fixed_seconds: f64,
}

impl Default for CalibrationEntry {
    fn default() -> Self {
        Self {
            samples: 0,
            seconds_per_candidate_pair: DEFAULT_SECONDS_PER_CANDIDATE_PAIR,
            seconds_per_write: DEFAULT_SECONDS_PER_WRITE,
            fixed_seconds: DEFAULT_FIXED_SECONDS,
        }
    }
}

impl CalibrationEntry {
    /// Smoothing factor for the next update.
    #[must_use]
    pub const fn alpha(&self) -> f64 {
        if self.samples < FAST_SAMPLES {
            FAST_ALPHA
        } else {
            SLOW_ALPHA
        }
    }

    /// Blend one completed run into the model.
    ///
    /// Returns `false`, leaving the entry untouched, when `elapsed_seconds`
    /// is negative or not finite.
    pub fn update(&mut self, elapsed_seconds: f64, candidate_pairs: u64, writes: u64) -> bool {
        if !elapsed_seconds.is_finite() || elapsed_seconds < 0.0 {
            warn!(elapsed_seconds, "Ignoring calibration sample with invalid elapsed time");
            return false;
        }

        #[allow(clippy::cast_precision_loss)]
        let (pairs, writes) = (candidate_pairs.max(1) as f64, writes as f64);
        let variable = elapsed_seconds - self.fixed_seconds - writes * self.seconds_per_write;
        let observed = variable.max(0.0) / pairs;

        let alpha = self.alpha();
        let previous = self.seconds_per_candidate_pair;
        self.seconds_per_candidate_pair = previous + alpha * (observed - previous);
        self.samples = self.samples.saturating_add(1);

        debug!(
            samples = self.samples,
            observed,
            previous,
            blended = self.seconds_per_candidate_pair,
            alpha,
            "Calibration updated"
        );
        true
    }
}

/// Identity of a calibration entry: which backend, on which device, at
/// which tier.
///
/// The string form (`backend|device|tier`) is the store key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CalibrationKey {
    /// Backend name, e.g. `"wgpu"`.
    pub backend: String,
    /// Device identity reported by the backend.
    pub device: String,
    /// Resolved tier the run used.
    pub tier: PresetTier,
}

impl CalibrationKey {
    /// Build a key.
    #[must_use]
    pub fn new(backend: impl Into<String>, device: impl Into<String>, tier: PresetTier) -> Self {
        Self {
            backend: backend.into(),
            device: device.into(),
            tier,
        }
    }
}

impl fmt::Display for CalibrationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}|{}", self.backend, self.device, self.tier)
    }
}

/// In-memory map from key to entry.
///
/// Persistence is left to the owner; with the `serde` feature the store
/// serializes as a plain string-keyed map.
///
/// # Example
///
/// ```
/// use zone_estimate::{CalibrationKey, CalibrationStore, PresetTier};
///
/// let mut store = CalibrationStore::new();
/// let key = CalibrationKey::new("cpu", "host", PresetTier::Normal).to_string();
///
/// assert!(store.get(&key).is_none());
/// store.update(&key, 12.0, 2_000_000, 50);
/// assert_eq!(store.get(&key).unwrap().samples, 1);
/// assert_eq!(store.len(), 1);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct CalibrationStore {
    entries: HashMap<String, CalibrationEntry>,
}

impl CalibrationStore {
    /// Empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Entry for `key`, if one exists.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&CalibrationEntry> {
        self.entries.get(key)
    }

    /// Entry for `key`, created with defaults if missing.
    pub fn get_or_create(&mut self, key: &str) -> &mut CalibrationEntry {
        self.entries.entry_ref(key).or_default()
    }

    /// Entry for `key` by value, defaults if missing. Does not insert.
    #[must_use]
    pub fn entry_or_default(&self, key: &str) -> CalibrationEntry {
        self.get(key).copied().unwrap_or_default()
    }

    /// Blend a completed run into the entry for `key`.
    ///
    /// Returns whether the sample was applied.
    pub fn update(
        &mut self,
        key: &str,
        elapsed_seconds: f64,
        candidate_pairs: u64,
        writes: u64,
    ) -> bool {
        self.get_or_create(key)
            .update(elapsed_seconds, candidate_pairs, writes)
    }

    /// Number of keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the store holds no keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All `(key, entry)` pairs in unspecified order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &CalibrationEntry)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }
}
