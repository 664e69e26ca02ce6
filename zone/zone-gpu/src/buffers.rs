//! GPU buffer layouts and growable storage buffers.
//!
//! # Memory Layout
//!
//! - [`GpuTriangle`]: 48 bytes (3 x vec4, fourth components unused)
//! - [`GpuPoint`]: 16 bytes (vec3 position + u32 jitter key)
//! - [`GpuZoneRange`]: 48 bytes (start, count, padding, min vec4, max vec4)
//! - [`GpuParams`]: 32 bytes (uniform)
//!
//! All coordinates are shifted by a batch origin in `f64` before being
//! narrowed to `f32`, so precision depends on the model's extent rather than
//! its distance from the world origin.

#![allow(
    clippy::cast_possible_truncation, // f64 -> f32 after origin shift is intentional
)]

use bytemuck::{Pod, Zeroable};
use wgpu::{Buffer, BufferUsages};
use zone_kernel::ZoneGeometry;
use zone_types::{Aabb, Point3, SamplePoint, Triangle};

use crate::context::GpuContext;
use crate::error::{GpuError, GpuResult};

/// Smallest allocation for any growable buffer.
const MIN_BUFFER_BYTES: u64 = 256;

/// Triangle with origin-relative `f32` vertices.
///
/// # Example
///
/// ```
/// use zone_gpu::buffers::GpuTriangle;
///
/// let tri = GpuTriangle::new([0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.5, 1.0, 0.0]);
/// assert_eq!(std::mem::size_of::<GpuTriangle>(), 48);
/// assert_eq!(tri.v2[1], 1.0);
/// ```
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct GpuTriangle {
    /// First vertex position (xyz) + padding.
    pub v0: [f32; 4],
    /// Second vertex position (xyz) + padding.
    pub v1: [f32; 4],
    /// Third vertex position (xyz) + padding.
    pub v2: [f32; 4],
}

impl GpuTriangle {
    /// Create a GPU triangle from vertex positions.
    #[must_use]
    pub const fn new(v0: [f32; 3], v1: [f32; 3], v2: [f32; 3]) -> Self {
        Self {
            v0: [v0[0], v0[1], v0[2], 0.0],
            v1: [v1[0], v1[1], v1[2], 0.0],
            v2: [v2[0], v2[1], v2[2], 0.0],
        }
    }

    /// Narrow a triangle relative to `origin`.
    #[must_use]
    pub fn from_triangle(tri: &Triangle, origin: &Point3<f64>) -> Self {
        Self::new(
            shift(&tri.v0, origin),
            shift(&tri.v1, origin),
            shift(&tri.v2, origin),
        )
    }
}

/// Sample point with the jitter key in the alignment slot.
///
/// # Example
///
/// ```
/// use zone_gpu::buffers::GpuPoint;
///
/// assert_eq!(std::mem::size_of::<GpuPoint>(), 16);
/// ```
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct GpuPoint {
    /// Origin-relative position.
    pub position: [f32; 3],
    /// Ray jitter key.
    pub jitter_key: u32,
}

impl GpuPoint {
    /// Narrow a sample relative to `origin`.
    #[must_use]
    pub fn from_sample(sample: &SamplePoint, origin: &Point3<f64>) -> Self {
        Self {
            position: shift(&sample.position, origin),
            jitter_key: sample.jitter_key,
        }
    }
}

/// Zone range plus the zone's origin-relative bounds.
///
/// The bounds let the kernel skip the triangle loop for samples outside the
/// zone box. Empty zones have `triangle_count == 0` and zero bounds.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct GpuZoneRange {
    /// Index of the zone's first triangle.
    pub triangle_start: u32,
    /// Number of triangles in the zone.
    pub triangle_count: u32,
    _padding: [u32; 2],
    /// Minimum corner (xyz) + padding.
    pub min: [f32; 4],
    /// Maximum corner (xyz) + padding.
    pub max: [f32; 4],
}

impl GpuZoneRange {
    /// Build the GPU range for zone `zone` of `geometry`.
    #[must_use]
    pub fn from_zone(geometry: &ZoneGeometry, zone: usize, origin: &Point3<f64>) -> Self {
        let range = geometry.ranges()[zone];
        let bounds = geometry.zone_bounds(zone as u32);
        let (min, max) = bounds.map_or(([0.0; 4], [0.0; 4]), |b: &Aabb| {
            // Narrowing must never shrink the box.
            let lo = shift(&b.min, origin).map(|v| v - widen_margin(v));
            let hi = shift(&b.max, origin).map(|v| v + widen_margin(v));
            ([lo[0], lo[1], lo[2], 0.0], [hi[0], hi[1], hi[2], 0.0])
        });
        Self {
            triangle_start: range.triangle_start,
            triangle_count: range.triangle_count,
            _padding: [0; 2],
            min,
            max,
        }
    }
}

/// Uniform parameters, matching the WGSL `Params` struct.
///
/// ```text
/// struct Params {
///     point_count: u32, zone_count: u32, two_rays: u32, seed: u32,
///     row_stride: u32, hit_epsilon: f32, det_epsilon: f32, edge_epsilon: f32,
/// }
/// ```
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct GpuParams {
    /// Points in this dispatch.
    pub point_count: u32,
    /// Zones in the uploaded geometry.
    pub zone_count: u32,
    /// 1 for two-ray mode.
    pub two_rays: u32,
    /// Jitter seed.
    pub seed: u32,
    /// Invocations per dispatch row (`workgroups_x * WORKGROUP_SIZE`).
    pub row_stride: u32,
    /// Hits closer than this are on-surface.
    pub hit_epsilon: f32,
    /// Near-parallel rejection threshold.
    pub det_epsilon: f32,
    /// Barycentric edge-graze threshold.
    pub edge_epsilon: f32,
}

/// Origin used to shift a geometry before narrowing: its bounds center.
#[must_use]
pub fn batch_origin(geometry: &ZoneGeometry) -> Point3<f64> {
    geometry.bounds().map_or_else(Point3::origin, Aabb::center)
}

/// Narrow all triangles of a geometry.
#[must_use]
pub fn pack_triangles(geometry: &ZoneGeometry, origin: &Point3<f64>) -> Vec<GpuTriangle> {
    geometry
        .triangles()
        .iter()
        .map(|t| GpuTriangle::from_triangle(t, origin))
        .collect()
}

/// Narrow all zone ranges of a geometry.
#[must_use]
pub fn pack_ranges(geometry: &ZoneGeometry, origin: &Point3<f64>) -> Vec<GpuZoneRange> {
    (0..geometry.zone_count())
        .map(|z| GpuZoneRange::from_zone(geometry, z, origin))
        .collect()
}

/// Narrow a slice of sample points.
#[must_use]
pub fn pack_points(points: &[SamplePoint], origin: &Point3<f64>) -> Vec<GpuPoint> {
    points
        .iter()
        .map(|p| GpuPoint::from_sample(p, origin))
        .collect()
}

fn widen_margin(v: f32) -> f32 {
    v.abs() * 4.0 * f32::EPSILON + f32::MIN_POSITIVE
}

fn shift(p: &Point3<f64>, origin: &Point3<f64>) -> [f32; 3] {
    [
        (p.x - origin.x) as f32,
        (p.y - origin.y) as f32,
        (p.z - origin.z) as f32,
    ]
}

/// Storage buffer that grows to the next power of two and never shrinks.
pub struct GrowableBuffer {
    label: &'static str,
    usage: BufferUsages,
    buffer: Buffer,
    capacity: u64,
}

impl GrowableBuffer {
    /// Allocate the minimum-size buffer.
    #[must_use]
    pub fn new(ctx: &GpuContext, label: &'static str, usage: BufferUsages) -> Self {
        Self {
            label,
            usage,
            buffer: create_buffer(ctx, label, usage, MIN_BUFFER_BYTES),
            capacity: MIN_BUFFER_BYTES,
        }
    }

    /// Make room for `bytes` bytes, reallocating if needed.
    ///
    /// Returns `true` when the underlying buffer was replaced, in which case
    /// its previous contents are gone and bind groups must be rebuilt.
    ///
    /// # Errors
    ///
    /// Returns [`GpuError::BatchTooLarge`] if `bytes` exceeds the device's
    /// storage binding limit.
    pub fn ensure(&mut self, ctx: &GpuContext, bytes: u64) -> GpuResult<bool> {
        if bytes <= self.capacity {
            return Ok(false);
        }
        let limit = ctx.max_storage_buffer_size();
        if bytes > limit {
            return Err(GpuError::BatchTooLarge {
                what: self.label,
                required: bytes,
                limit,
            });
        }
        let capacity = grown_capacity(bytes, limit);
        tracing::debug!(
            buffer = self.label,
            from = self.capacity,
            to = capacity,
            "Growing GPU buffer"
        );
        self.buffer = create_buffer(ctx, self.label, self.usage, capacity);
        self.capacity = capacity;
        Ok(true)
    }

    /// The current buffer.
    #[must_use]
    pub const fn buffer(&self) -> &Buffer {
        &self.buffer
    }

    /// Current capacity in bytes.
    #[must_use]
    pub const fn capacity(&self) -> u64 {
        self.capacity
    }
}

impl std::fmt::Debug for GrowableBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GrowableBuffer")
            .field("label", &self.label)
            .field("capacity", &self.capacity)
            .finish_non_exhaustive()
    }
}

/// Next power of two of `bytes`, at least [`MIN_BUFFER_BYTES`] and at most
/// `limit`.
#[must_use]
pub fn grown_capacity(bytes: u64, limit: u64) -> u64 {
    bytes
        .max(MIN_BUFFER_BYTES)
        .checked_next_power_of_two()
        .map_or(limit, |c| c.min(limit))
}

fn create_buffer(ctx: &GpuContext, label: &str, usage: BufferUsages, size: u64) -> Buffer {
    ctx.device.create_buffer(&wgpu::BufferDescriptor {
        label: Some(label),
        size,
        usage,
        mapped_at_creation: false,
    })
}
