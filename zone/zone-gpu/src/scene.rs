//! Specialized GPU backend backed by a persistent native scene.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info};
use zone_kernel::{
    CancellationToken, ComputeBackend, DEFAULT_JITTER_SEED, KernelError, KernelResult,
    ZoneGeometry, check_batch,
};
use zone_types::{ContainmentFlag, Point3, SamplePoint};

use crate::buffers::{batch_origin, pack_points, pack_triangles};
use crate::error::GpuResult;
use crate::native::{ContainmentScene, NativeLibrary, NativeZoneRange, SceneBuilder};

/// Default number of triangles per acceleration-structure leaf.
pub const DEFAULT_LEAF_SIZE: u32 = 4;

/// Points sent to the library per call.
const POINTS_PER_CALL: usize = 1 << 18;

struct LoadedScene {
    signature: u64,
    origin: Point3<f64>,
    scene: Box<dyn ContainmentScene>,
}

/// Containment backend that builds one native scene per distinct geometry
/// and reuses it across calls.
///
/// The scene is rebuilt only when the geometry signature changes or after
/// [`ComputeBackend::reset`].
pub struct SceneBackend {
    builder: Box<dyn SceneBuilder>,
    loaded: Option<LoadedScene>,
    leaf_size: u32,
    seed: u32,
    device: String,
}

impl SceneBackend {
    /// Load the native library from `dir`.
    ///
    /// # Errors
    ///
    /// Returns [`GpuError::NativeLibrary`](crate::GpuError::NativeLibrary)
    /// when the library is missing or incomplete.
    pub fn load(dir: &Path) -> GpuResult<Self> {
        Ok(Self::from_library(NativeLibrary::load(dir)?))
    }

    /// Wrap an already loaded library.
    #[must_use]
    pub fn from_library(library: Arc<NativeLibrary>) -> Self {
        Self::from_builder(Box::new(library))
    }

    /// Build scenes with `builder`.
    #[must_use]
    pub fn from_builder(builder: Box<dyn SceneBuilder>) -> Self {
        let device = builder.label();
        Self {
            builder,
            loaded: None,
            leaf_size: DEFAULT_LEAF_SIZE,
            seed: DEFAULT_JITTER_SEED,
            device,
        }
    }

    /// Set the acceleration-structure leaf size (at least 1).
    #[must_use]
    pub fn with_leaf_size(mut self, leaf_size: u32) -> Self {
        self.leaf_size = leaf_size.max(1);
        self
    }

    /// Set the jitter seed.
    #[must_use]
    pub const fn with_seed(mut self, seed: u32) -> Self {
        self.seed = seed;
        self
    }

    fn ensure_scene(&mut self, geometry: &ZoneGeometry) -> GpuResult<&mut LoadedScene> {
        let stale = self
            .loaded
            .as_ref()
            .is_none_or(|s| s.signature != geometry.signature());
        if stale {
            // Release the old scene before building the next one.
            self.loaded = None;

            let start = Instant::now();
            let origin = batch_origin(geometry);
            let triangles = pack_triangles(geometry, &origin);
            let ranges: Vec<NativeZoneRange> = geometry
                .ranges()
                .iter()
                .map(|r| NativeZoneRange {
                    start: r.triangle_start,
                    count: r.triangle_count,
                })
                .collect();
            let scene = self.builder.build(&triangles, &ranges, self.leaf_size)?;
            info!(
                triangles = triangles.len(),
                zones = ranges.len(),
                time_ms = start.elapsed().as_secs_f64() * 1000.0,
                "Native scene ready"
            );
            self.loaded = Some(LoadedScene {
                signature: geometry.signature(),
                origin,
                scene,
            });
        }
        self.loaded.as_mut().ok_or_else(|| {
            crate::GpuError::Execution("native scene missing after build".to_string())
        })
    }
}

impl ComputeBackend for SceneBackend {
    fn name(&self) -> &str {
        "scene"
    }

    fn device(&self) -> &str {
        &self.device
    }

    fn jitter_seed(&self) -> u32 {
        self.seed
    }

    fn set_jitter_seed(&mut self, seed: u32) {
        self.seed = seed;
    }

    fn test_points_batched(
        &mut self,
        geometry: &ZoneGeometry,
        points: &[SamplePoint],
        point_zone_ids: &[u32],
        two_rays: bool,
        cancel: &CancellationToken,
    ) -> KernelResult<Vec<ContainmentFlag>> {
        check_batch(points, point_zone_ids)?;
        if points.is_empty() {
            return Ok(Vec::new());
        }
        if cancel.is_cancelled() {
            return Err(KernelError::Cancelled);
        }

        let seed = self.seed;
        let loaded = self.ensure_scene(geometry)?;
        let zone_count = loaded.scene.zone_count();

        let mut flags = Vec::with_capacity(points.len());
        for (chunk_points, chunk_ids) in points
            .chunks(POINTS_PER_CALL)
            .zip(point_zone_ids.chunks(POINTS_PER_CALL))
        {
            if cancel.is_cancelled() {
                return Err(KernelError::Cancelled);
            }
            let packed = pack_points(chunk_points, &loaded.origin);
            let raw = loaded.scene.test_points(&packed, chunk_ids, two_rays, seed)?;
            // Unknown zones are outside whatever the library reports.
            flags.extend(raw.iter().zip(chunk_ids).map(|(&r, &zone)| {
                if zone >= zone_count {
                    ContainmentFlag::Outside
                } else {
                    ContainmentFlag::from_raw(r)
                }
            }));
        }

        debug!(points = points.len(), two_rays, "Native scene batch done");
        Ok(flags)
    }

    fn reset(&mut self) {
        self.loaded = None;
    }
}

impl std::fmt::Debug for SceneBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SceneBackend")
            .field("device", &self.device)
            .field("leaf_size", &self.leaf_size)
            .field("seed", &self.seed)
            .field("scene_loaded", &self.loaded.is_some())
            .finish_non_exhaustive()
    }
}
