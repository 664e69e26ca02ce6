//! Compute backend abstraction.

use zone_types::{ContainmentFlag, SamplePoint, Triangle};

use crate::batch::ZoneGeometry;
use crate::cancel::CancellationToken;
use crate::error::KernelResult;

/// Executes containment tests for batches of sample points.
///
/// Every implementation returns one flag per point, in input order, with
/// identical semantics: a point whose zone id is past the last zone range is
/// [`ContainmentFlag::Outside`], and a point is only
/// [`ContainmentFlag::Inside`] when its parity test is clean (and, with
/// `two_rays`, when both rays agree).
///
/// A backend instance belongs to one run at a time; methods take
/// `&mut self` so uploaded buffers are never shared between runs.
pub trait ComputeBackend: Send {
    /// Short backend name, e.g. `"cpu"` or `"wgpu"`.
    fn name(&self) -> &str;

    /// Human-readable device identity.
    fn device(&self) -> &str;

    /// Seed mixed into every ray direction.
    fn jitter_seed(&self) -> u32;

    /// Change the seed mixed into every ray direction.
    fn set_jitter_seed(&mut self, seed: u32);

    /// Test points against a single zone.
    ///
    /// # Errors
    ///
    /// Same as [`ComputeBackend::test_points_batched`].
    fn test_points(
        &mut self,
        triangles: &[Triangle],
        points: &[SamplePoint],
        two_rays: bool,
        cancel: &CancellationToken,
    ) -> KernelResult<Vec<ContainmentFlag>> {
        let geometry = ZoneGeometry::single(triangles)?;
        let zone_ids = vec![0; points.len()];
        self.test_points_batched(&geometry, points, &zone_ids, two_rays, cancel)
    }

    /// Test each point against the zone named by its entry in
    /// `point_zone_ids`.
    ///
    /// # Errors
    ///
    /// Returns [`KernelError::InvalidBatch`](crate::KernelError::InvalidBatch)
    /// when the two arrays differ in length,
    /// [`KernelError::Cancelled`](crate::KernelError::Cancelled) if
    /// cancellation was observed before a dispatch, and
    /// [`KernelError::Backend`](crate::KernelError::Backend) when the device
    /// fails.
    fn test_points_batched(
        &mut self,
        geometry: &ZoneGeometry,
        points: &[SamplePoint],
        point_zone_ids: &[u32],
        two_rays: bool,
        cancel: &CancellationToken,
    ) -> KernelResult<Vec<ContainmentFlag>>;

    /// Drop per-run caches such as uploaded geometry. Allocated capacity is
    /// kept.
    fn reset(&mut self) {}
}

/// Attempts to create a backend.
///
/// Probing is side-effect free apart from creating the backend itself, so a
/// failing probe simply moves selection on to the next one.
pub trait BackendProbe {
    /// Name of the backend this probe creates.
    fn name(&self) -> &str;

    /// Create the backend, or describe why it is unavailable.
    ///
    /// # Errors
    ///
    /// Returns a human-readable reason when the backend cannot be used on
    /// this machine.
    fn try_create(&self) -> Result<Box<dyn ComputeBackend>, String>;
}
