//! Parity ray-cast point-in-zone test.
//!
//! A sample is inside a closed zone when a ray leaving it crosses the
//! boundary an odd number of times. Rays leave in a jittered direction so
//! that axis-aligned models (boxes, extrusions) do not line rays up with
//! shared edges. A ray that starts on the surface or grazes an edge is
//! reported as degenerate instead of being counted, and the sample becomes
//! [`ContainmentFlag::Uncertain`].
//!
//! The jitter hash is integer-only and is reproduced by the WGSL kernel in
//! `zone-gpu`, so every backend casts rays along the same directions for
//! the same `(seed, jitter_key, slot)`.

use zone_types::{ContainmentFlag, Point3, Triangle, Vector3};

/// Hits closer than this are on-surface; only hits beyond it are counted.
pub const HIT_EPSILON: f64 = 1e-5;

/// Triangles whose determinant is smaller than this are treated as
/// parallel to the ray and skipped.
pub const DET_EPSILON: f64 = 1e-8;

/// Barycentric distance from an edge below which a hit is a graze.
pub const EDGE_EPSILON: f64 = 1e-9;

/// Seed used when the caller does not choose one.
pub const DEFAULT_JITTER_SEED: u32 = 0x9E37_79B9;

/// Largest per-component jitter added to a base direction.
pub const JITTER_AMPLITUDE: f64 = 0.25;

/// Base directions of the two ray slots. Neither is axis-aligned and they
/// are far apart, so a configuration that grazes one rarely grazes both.
pub const BASE_DIRECTIONS: [[f64; 3]; 2] = [[1.0, 0.213, 0.137], [-0.171, 0.329, 1.0]];

/// Outcome of intersecting one ray with one triangle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RayHit {
    /// No intersection in front of the origin.
    Miss,
    /// A clean crossing at distance `t`.
    Crossing(f64),
    /// The origin lies on the triangle or the ray grazes an edge or vertex.
    Degenerate,
}

/// Outcome of casting one ray against a whole zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RayOutcome {
    /// Clean parity result: `true` for an odd crossing count.
    Parity(bool),
    /// At least one hit was degenerate.
    Degenerate,
}

impl RayOutcome {
    /// Convert to a containment flag.
    #[must_use]
    pub const fn to_flag(self) -> ContainmentFlag {
        match self {
            Self::Parity(true) => ContainmentFlag::Inside,
            Self::Parity(false) => ContainmentFlag::Outside,
            Self::Degenerate => ContainmentFlag::Uncertain,
        }
    }
}

/// 32-bit PCG output permutation (RXS-M-XS).
///
/// Pure wrapping integer arithmetic, identical in WGSL.
#[inline]
#[must_use]
pub const fn pcg_hash(input: u32) -> u32 {
    let state = input.wrapping_mul(747_796_405).wrapping_add(2_891_336_453);
    let word = ((state >> ((state >> 28) + 4)) ^ state).wrapping_mul(277_803_737);
    (word >> 22) ^ word
}

/// Three hash words for `(seed, key, slot)`.
#[must_use]
pub const fn jitter_words(seed: u32, key: u32, slot: u32) -> [u32; 3] {
    let h0 = pcg_hash(seed ^ pcg_hash(key ^ pcg_hash(slot)));
    let h1 = pcg_hash(h0);
    let h2 = pcg_hash(h1);
    [h0, h1, h2]
}

/// Map a hash word to `[-JITTER_AMPLITUDE, JITTER_AMPLITUDE)`.
///
/// Uses the top 24 bits so the value is exact in `f32` as well.
#[inline]
fn unit_jitter(word: u32) -> f64 {
    let unit = f64::from(word >> 8) / 16_777_216.0;
    (unit - 0.5) * 2.0 * JITTER_AMPLITUDE
}

/// Normalized jittered direction for a ray slot (0 or 1).
///
/// # Example
///
/// ```
/// use zone_kernel::kernel::ray_direction;
///
/// let a = ray_direction(7, 42, 0);
/// let b = ray_direction(7, 42, 0);
/// assert_eq!(a, b);
/// assert!((a.norm() - 1.0).abs() < 1e-12);
/// assert_ne!(a, ray_direction(7, 42, 1));
/// ```
#[must_use]
pub fn ray_direction(seed: u32, key: u32, slot: u32) -> Vector3<f64> {
    let base = BASE_DIRECTIONS[(slot & 1) as usize];
    let words = jitter_words(seed, key, slot);
    Vector3::new(
        base[0] + unit_jitter(words[0]),
        base[1] + unit_jitter(words[1]),
        base[2] + unit_jitter(words[2]),
    )
    .normalize()
}

/// Moller-Trumbore intersection with degeneracy detection.
#[must_use]
pub fn intersect(origin: &Point3<f64>, dir: &Vector3<f64>, tri: &Triangle) -> RayHit {
    let edge1 = tri.v1 - tri.v0;
    let edge2 = tri.v2 - tri.v0;

    let h = dir.cross(&edge2);
    let det = edge1.dot(&h);
    if det.abs() < DET_EPSILON {
        return RayHit::Miss;
    }

    let inv_det = 1.0 / det;
    let s = origin - tri.v0;
    let u = inv_det * s.dot(&h);
    if !(-EDGE_EPSILON..=1.0 + EDGE_EPSILON).contains(&u) {
        return RayHit::Miss;
    }

    let q = s.cross(&edge1);
    let v = inv_det * dir.dot(&q);
    if v < -EDGE_EPSILON || u + v > 1.0 + EDGE_EPSILON {
        return RayHit::Miss;
    }

    let t = inv_det * edge2.dot(&q);
    if t < -HIT_EPSILON {
        return RayHit::Miss;
    }
    if t <= HIT_EPSILON {
        return RayHit::Degenerate;
    }
    if u < EDGE_EPSILON || v < EDGE_EPSILON || u + v > 1.0 - EDGE_EPSILON {
        return RayHit::Degenerate;
    }
    RayHit::Crossing(t)
}

/// Cast one ray against every triangle of a zone.
#[must_use]
pub fn cast_ray(origin: &Point3<f64>, dir: &Vector3<f64>, triangles: &[Triangle]) -> RayOutcome {
    let mut crossings = 0u32;
    for tri in triangles {
        match intersect(origin, dir, tri) {
            RayHit::Miss => {}
            RayHit::Crossing(_) => crossings += 1,
            RayHit::Degenerate => return RayOutcome::Degenerate,
        }
    }
    RayOutcome::Parity(crossings % 2 == 1)
}

/// Classify one sample against one zone.
///
/// With `two_rays` the sample is only inside or outside when both slots
/// agree.
///
/// # Example
///
/// ```
/// use zone_kernel::kernel::classify_point;
/// use zone_types::{Aabb, ContainmentFlag, Point3, ZoneMesh};
///
/// let cube = ZoneMesh::from_box(
///     "cube",
///     &Aabb::new(Point3::new(0.0, 0.0, 0.0), Point3::new(1.0, 1.0, 1.0)),
/// );
/// let inside = classify_point(&Point3::new(0.5, 0.4, 0.3), 1, &cube.triangles, true, 0);
/// let outside = classify_point(&Point3::new(3.0, 0.5, 0.5), 1, &cube.triangles, true, 0);
/// assert_eq!(inside, ContainmentFlag::Inside);
/// assert_eq!(outside, ContainmentFlag::Outside);
/// ```
#[must_use]
pub fn classify_point(
    point: &Point3<f64>,
    jitter_key: u32,
    triangles: &[Triangle],
    two_rays: bool,
    seed: u32,
) -> ContainmentFlag {
    let first = cast_ray(point, &ray_direction(seed, jitter_key, 0), triangles).to_flag();
    if !two_rays || first == ContainmentFlag::Uncertain {
        return first;
    }
    let second = cast_ray(point, &ray_direction(seed, jitter_key, 1), triangles).to_flag();
    first.agree(second)
}
