//! Probes for the two GPU backends.
//!
//! A probe either hands back a ready backend or a reason it cannot, so
//! backend selection can move on to the next candidate.

use std::path::PathBuf;

use tracing::debug;
use zone_kernel::{BackendProbe, ComputeBackend, DEFAULT_JITTER_SEED};

use crate::scene::{DEFAULT_LEAF_SIZE, SceneBackend};
use crate::wgpu_backend::{DEFAULT_MAX_POINTS_PER_DISPATCH, WgpuBackend};

/// Probe for [`WgpuBackend`].
#[derive(Debug, Clone, Copy)]
pub struct WgpuProbe {
    seed: u32,
    max_points_per_dispatch: usize,
}

impl WgpuProbe {
    /// Probe creating a backend with the given seed and dispatch limit.
    #[must_use]
    pub const fn new(seed: u32, max_points_per_dispatch: usize) -> Self {
        Self {
            seed,
            max_points_per_dispatch,
        }
    }
}

impl Default for WgpuProbe {
    fn default() -> Self {
        Self::new(DEFAULT_JITTER_SEED, DEFAULT_MAX_POINTS_PER_DISPATCH)
    }
}

impl BackendProbe for WgpuProbe {
    fn name(&self) -> &str {
        "wgpu"
    }

    fn try_create(&self) -> Result<Box<dyn ComputeBackend>, String> {
        let backend = WgpuBackend::with_seed(self.seed)
            .map_err(|e| e.to_string())?
            .with_max_points_per_dispatch(self.max_points_per_dispatch);
        debug!(device = backend.device(), "wgpu backend created");
        Ok(Box::new(backend))
    }
}

/// Probe for [`SceneBackend`].
///
/// # Example
///
/// ```
/// use zone_gpu::SceneProbe;
/// use zone_kernel::BackendProbe;
///
/// // Without a plugin directory the probe always declines.
/// let probe = SceneProbe::new(None);
/// assert!(probe.try_create().is_err());
/// ```
#[derive(Debug, Clone)]
pub struct SceneProbe {
    library_dir: Option<PathBuf>,
    leaf_size: u32,
    seed: u32,
}

impl SceneProbe {
    /// Probe loading the library from `library_dir`.
    #[must_use]
    pub const fn new(library_dir: Option<PathBuf>) -> Self {
        Self {
            library_dir,
            leaf_size: DEFAULT_LEAF_SIZE,
            seed: DEFAULT_JITTER_SEED,
        }
    }

    /// Set the scene leaf size.
    #[must_use]
    pub const fn with_leaf_size(mut self, leaf_size: u32) -> Self {
        self.leaf_size = leaf_size;
        self
    }

    /// Set the jitter seed.
    #[must_use]
    pub const fn with_seed(mut self, seed: u32) -> Self {
        self.seed = seed;
        self
    }
}

impl BackendProbe for SceneProbe {
    fn name(&self) -> &str {
        "scene"
    }

    fn try_create(&self) -> Result<Box<dyn ComputeBackend>, String> {
        let dir = self
            .library_dir
            .as_deref()
            .ok_or_else(|| "no native library directory configured".to_string())?;
        let backend = SceneBackend::load(dir)
            .map_err(|e| e.to_string())?
            .with_leaf_size(self.leaf_size)
            .with_seed(self.seed);
        Ok(Box::new(backend))
    }
}
