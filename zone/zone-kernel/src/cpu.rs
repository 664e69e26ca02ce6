//! Reference backend running the kernel on the host in `f64`.

use tracing::trace;
use zone_types::{ContainmentFlag, SamplePoint};

use crate::backend::{BackendProbe, ComputeBackend};
use crate::batch::{ZoneGeometry, check_batch};
use crate::cancel::CancellationToken;
use crate::error::{KernelError, KernelResult};
use crate::kernel::{DEFAULT_JITTER_SEED, HIT_EPSILON, classify_point};

/// Points processed between cancellation checks.
const CANCEL_CHECK_INTERVAL: usize = 4096;

/// Synchronous host backend.
///
/// Always available, so it terminates every probe list. It is also used to
/// re-check samples a GPU backend reported as uncertain.
///
/// # Example
///
/// ```
/// use zone_kernel::{CancellationToken, ComputeBackend, CpuBackend};
/// use zone_types::{Aabb, ContainmentFlag, Point3, SamplePoint, ZoneMesh};
///
/// let cube = ZoneMesh::from_box("cube", &Aabb::new(Point3::new(0.0, 0.0, 0.0), Point3::new(1.0, 1.0, 1.0)));
/// let points = [
///     SamplePoint::from_coords(0.5, 0.5, 0.5, 0),
///     SamplePoint::from_coords(5.0, 5.0, 5.0, 1),
/// ];
///
/// let mut cpu = CpuBackend::new();
/// let flags = cpu
///     .test_points(&cube.triangles, &points, true, &CancellationToken::new())
///     .unwrap();
/// assert_eq!(flags, vec![ContainmentFlag::Inside, ContainmentFlag::Outside]);
/// ```
#[derive(Debug, Clone)]
pub struct CpuBackend {
    seed: u32,
    device: String,
}

impl CpuBackend {
    /// Create a backend with the default jitter seed.
    #[must_use]
    pub fn new() -> Self {
        Self::with_seed(DEFAULT_JITTER_SEED)
    }

    /// Create a backend with an explicit jitter seed.
    #[must_use]
    pub fn with_seed(seed: u32) -> Self {
        let threads = std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get);
        Self {
            seed,
            device: format!("host CPU ({threads} hardware threads)"),
        }
    }
}

impl Default for CpuBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl ComputeBackend for CpuBackend {
    fn name(&self) -> &str {
        "cpu"
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

        let mut flags = Vec::with_capacity(points.len());
        for (chunk_points, chunk_zones) in points
            .chunks(CANCEL_CHECK_INTERVAL)
            .zip(point_zone_ids.chunks(CANCEL_CHECK_INTERVAL))
        {
            if cancel.is_cancelled() {
                return Err(KernelError::Cancelled);
            }
            for (point, &zone) in chunk_points.iter().zip(chunk_zones) {
                flags.push(self.test_one(geometry, point, zone, two_rays));
            }
        }

        trace!(points = points.len(), two_rays, "CPU containment batch done");
        Ok(flags)
    }
}

impl CpuBackend {
    fn test_one(
        &self,
        geometry: &ZoneGeometry,
        point: &SamplePoint,
        zone: u32,
        two_rays: bool,
    ) -> ContainmentFlag {
        let (Some(triangles), Some(bounds)) =
            (geometry.zone_triangles(zone), geometry.zone_bounds(zone))
        else {
            return ContainmentFlag::Outside;
        };
        if !bounds.inflate(HIT_EPSILON).contains(&point.position) {
            return ContainmentFlag::Outside;
        }
        classify_point(&point.position, point.jitter_key, triangles, two_rays, self.seed)
    }
}

/// Probe that always succeeds with a [`CpuBackend`].
#[derive(Debug, Clone, Copy)]
pub struct CpuProbe {
    seed: u32,
}

impl CpuProbe {
    /// Probe creating a backend with the given jitter seed.
    #[must_use]
    pub const fn new(seed: u32) -> Self {
        Self { seed }
    }
}

impl Default for CpuProbe {
    fn default() -> Self {
        Self::new(DEFAULT_JITTER_SEED)
    }
}

impl BackendProbe for CpuProbe {
    fn name(&self) -> &str {
        "cpu"
    }

    fn try_create(&self) -> Result<Box<dyn ComputeBackend>, String> {
        Ok(Box::new(CpuBackend::with_seed(self.seed)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zone_types::{Aabb, Point3, ZoneMesh};

    fn cube(min: f64, max: f64) -> ZoneMesh {
        ZoneMesh::from_box(
            "cube",
            &Aabb::new(Point3::new(min, min, min), Point3::new(max, max, max)),
        )
    }

    #[test]
    fn unknown_zone_ids_are_outside() {
        let c = cube(0.0, 1.0);
        let geometry = ZoneGeometry::single(&c.triangles).unwrap();
        let points = [
            SamplePoint::from_coords(0.5, 0.5, 0.5, 0),
            SamplePoint::from_coords(0.5, 0.5, 0.5, 1),
        ];
        let flags = CpuBackend::new()
            .test_points_batched(&geometry, &points, &[0, 7], true, &CancellationToken::new())
            .unwrap();
        assert_eq!(flags, vec![ContainmentFlag::Inside, ContainmentFlag::Outside]);
    }

    #[test]
    fn mismatched_batch_is_rejected() {
        let c = cube(0.0, 1.0);
        let geometry = ZoneGeometry::single(&c.triangles).unwrap();
        let points = [SamplePoint::from_coords(0.5, 0.5, 0.5, 0)];
        let err = CpuBackend::new()
            .test_points_batched(&geometry, &points, &[0, 0], false, &CancellationToken::new())
            .unwrap_err();
        assert!(matches!(err, KernelError::InvalidBatch { .. }));
    }

    #[test]
    fn cancelled_before_dispatch() {
        let c = cube(0.0, 1.0);
        let token = CancellationToken::new();
        token.cancel();
        let points = [SamplePoint::from_coords(0.5, 0.5, 0.5, 0)];
        let err = CpuBackend::new()
            .test_points(&c.triangles, &points, false, &token)
            .unwrap_err();
        assert!(matches!(err, KernelError::Cancelled));
    }

    #[test]
    fn empty_batch_is_empty_result() {
        let c = cube(0.0, 1.0);
        let flags = CpuBackend::new()
            .test_points(&c.triangles, &[], true, &CancellationToken::new())
            .unwrap();
        assert!(flags.is_empty());
    }

    #[test]
    fn probe_always_succeeds() {
        let probe = CpuProbe::new(11);
        let backend = probe.try_create().unwrap();
        assert_eq!(backend.name(), "cpu");
        assert_eq!(backend.jitter_seed(), 11);
        assert!(backend.device().contains("CPU"));
    }
}
