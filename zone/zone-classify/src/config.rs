//! Configuration and presets for classification runs.
//!
//! # Presets
//!
//! - [`ClassifyConfig::default()`] - `Auto` tier, automatic backend, standard grid
//! - [`ClassifyConfig::for_large_models()`] - `Fast` tier, coarse grid, GPU preferred
//! - [`ClassifyConfig::for_precision()`] - `Accurate` tier, CPU recheck of uncertain samples
//!
//! # Example
//!
//! ```
//! use zone_classify::{AssignmentRule, BackendPreference, ClassifyConfig};
//! use zone_estimate::PresetTier;
//!
//! let config = ClassifyConfig::default()
//!     .with_preset(PresetTier::Normal)
//!     .with_backend(BackendPreference::CpuOnly)
//!     .with_assignment_rule(AssignmentRule::Anchor);
//! assert!(config.validate().is_ok());
//! ```

use std::path::PathBuf;

use zone_estimate::{DEFAULT_ASSIGNMENT_RATE, PresetTier};
use zone_gpu::scene::DEFAULT_LEAF_SIZE;
use zone_gpu::wgpu_backend::DEFAULT_MAX_POINTS_PER_DISPATCH;
use zone_index::{Granularity, GridSizing};
use zone_kernel::DEFAULT_JITTER_SEED;

use crate::error::{ClassifyError, ClassifyResult};

/// Which compute backends a run may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum BackendPreference {
    /// Specialized GPU if a native library directory is configured, then
    /// general GPU, then CPU.
    #[default]
    Auto,
    /// Host CPU only.
    CpuOnly,
    /// General-purpose GPU, falling back to CPU.
    GeneralGpu,
    /// Specialized GPU, falling back to general GPU and then CPU.
    /// Requires a native library directory.
    SpecializedGpu,
}

/// How a target's sample tallies become a zone assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum AssignmentRule {
    /// More than half of the target's samples tested against the zone are
    /// inside.
    #[default]
    Majority,
    /// The target's anchor sample is inside.
    Anchor,
}

/// Configuration for a classification run.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ClassifyConfig {
    /// Requested performance tier; `Auto` resolves from preflight density.
    pub preset: PresetTier,

    /// Grid resolution knob.
    pub granularity: Granularity,

    /// Fixed grid cell size, bypassing the automatic policy.
    pub cell_size_override: Option<f64>,

    /// Backends the run may try, in preference order.
    pub backend: BackendPreference,

    /// Directory holding the native scene library.
    pub native_library_dir: Option<PathBuf>,

    /// Leaf size for the native scene's acceleration structure.
    pub scene_leaf_size: u32,

    /// Seed mixed into every ray direction.
    pub jitter_seed: u32,

    /// Most sample points handed to a backend in one call. Cancellation is
    /// checked between calls.
    pub max_points_per_dispatch: usize,

    /// Re-test samples a GPU backend reported uncertain with the `f64` host
    /// kernel.
    pub recheck_uncertain_on_cpu: bool,

    /// How tallies become assignments.
    pub assignment_rule: AssignmentRule,

    /// Properties written per assignment; feeds the write-time estimate.
    pub mapping_columns: usize,

    /// Share of targets expected to get an assignment, in `[0, 1]`.
    pub expected_assignment_rate: f64,
}

impl Default for ClassifyConfig {
    fn default() -> Self {
        Self {
            preset: PresetTier::Auto,
            granularity: Granularity::Standard,
            cell_size_override: None,
            backend: BackendPreference::Auto,
            native_library_dir: None,
            scene_leaf_size: DEFAULT_LEAF_SIZE,
            jitter_seed: DEFAULT_JITTER_SEED,
            max_points_per_dispatch: DEFAULT_MAX_POINTS_PER_DISPATCH,
            recheck_uncertain_on_cpu: false,
            assignment_rule: AssignmentRule::Majority,
            mapping_columns: 1,
            expected_assignment_rate: DEFAULT_ASSIGNMENT_RATE,
        }
    }
}

impl ClassifyConfig {
    /// Configuration for very large models.
    ///
    /// Single-ray sampling on a coarse grid, general GPU preferred.
    ///
    /// # Example
    ///
    /// ```
    /// use zone_classify::ClassifyConfig;
    /// use zone_estimate::PresetTier;
    ///
    /// let config = ClassifyConfig::for_large_models();
    /// assert_eq!(config.preset, PresetTier::Fast);
    /// ```
    #[must_use]
    pub fn for_large_models() -> Self {
        Self {
            preset: PresetTier::Fast,
            granularity: Granularity::Coarse,
            backend: BackendPreference::GeneralGpu,
            max_points_per_dispatch: DEFAULT_MAX_POINTS_PER_DISPATCH * 4,
            ..Self::default()
        }
    }

    /// Configuration for small models where every sample counts.
    ///
    /// Full sampling on a fine grid, with GPU-uncertain samples retested on
    /// the host.
    ///
    /// # Example
    ///
    /// ```
    /// use zone_classify::ClassifyConfig;
    ///
    /// let config = ClassifyConfig::for_precision();
    /// assert!(config.recheck_uncertain_on_cpu);
    /// ```
    #[must_use]
    pub fn for_precision() -> Self {
        Self {
            preset: PresetTier::Accurate,
            granularity: Granularity::Fine,
            recheck_uncertain_on_cpu: true,
            ..Self::default()
        }
    }

    /// Set the requested tier.
    #[must_use]
    pub const fn with_preset(mut self, preset: PresetTier) -> Self {
        self.preset = preset;
        self
    }

    /// Set the grid granularity.
    #[must_use]
    pub const fn with_granularity(mut self, granularity: Granularity) -> Self {
        self.granularity = granularity;
        self
    }

    /// Use a fixed grid cell size.
    #[must_use]
    pub const fn with_cell_size(mut self, cell_size: f64) -> Self {
        self.cell_size_override = Some(cell_size);
        self
    }

    /// Set the backend preference.
    #[must_use]
    pub const fn with_backend(mut self, backend: BackendPreference) -> Self {
        self.backend = backend;
        self
    }

    /// Set the native scene library directory.
    #[must_use]
    pub fn with_native_library_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.native_library_dir = Some(dir.into());
        self
    }

    /// Set the jitter seed.
    #[must_use]
    pub const fn with_jitter_seed(mut self, seed: u32) -> Self {
        self.jitter_seed = seed;
        self
    }

    /// Set the most points per backend call.
    #[must_use]
    pub const fn with_max_points_per_dispatch(mut self, points: usize) -> Self {
        self.max_points_per_dispatch = points;
        self
    }

    /// Enable or disable the host recheck of uncertain samples.
    #[must_use]
    pub const fn with_cpu_recheck(mut self, enabled: bool) -> Self {
        self.recheck_uncertain_on_cpu = enabled;
        self
    }

    /// Set the assignment rule.
    #[must_use]
    pub const fn with_assignment_rule(mut self, rule: AssignmentRule) -> Self {
        self.assignment_rule = rule;
        self
    }

    /// Set the number of properties written per assignment.
    #[must_use]
    pub const fn with_mapping_columns(mut self, columns: usize) -> Self {
        self.mapping_columns = columns;
        self
    }

    /// Grid sizing derived from the granularity and override.
    #[must_use]
    pub fn grid_sizing(&self) -> GridSizing {
        let sizing = GridSizing::new(self.granularity);
        match self.cell_size_override {
            Some(size) => sizing.with_override(size),
            None => sizing,
        }
    }

    /// Check the configuration for inconsistencies.
    ///
    /// # Errors
    ///
    /// Returns [`ClassifyError::InvalidConfig`] naming the first problem
    /// found.
    pub fn validate(&self) -> ClassifyResult<()> {
        if let Some(size) = self.cell_size_override {
            if !size.is_finite() || size <= 0.0 {
                return Err(ClassifyError::InvalidConfig(format!(
                    "cell size override must be positive and finite, got {size}"
                )));
            }
        }
        if !(0.0..=1.0).contains(&self.expected_assignment_rate) {
            return Err(ClassifyError::InvalidConfig(format!(
                "expected assignment rate must be in [0, 1], got {}",
                self.expected_assignment_rate
            )));
        }
        if self.mapping_columns == 0 {
            return Err(ClassifyError::InvalidConfig(
                "at least one mapping column is required".to_string(),
            ));
        }
        if self.max_points_per_dispatch == 0 {
            return Err(ClassifyError::InvalidConfig(
                "max points per dispatch must be at least 1".to_string(),
            ));
        }
        if self.scene_leaf_size == 0 {
            return Err(ClassifyError::InvalidConfig(
                "scene leaf size must be at least 1".to_string(),
            ));
        }
        if self.backend == BackendPreference::SpecializedGpu && self.native_library_dir.is_none() {
            return Err(ClassifyError::InvalidConfig(
                "specialized GPU backend requires a native library directory".to_string(),
            ));
        }
        Ok(())
    }
}
