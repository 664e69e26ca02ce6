//! Batched zone/target query protocol.
//!
//! All zones of a run are flattened into one triangle buffer addressed by
//! per-zone [`ZoneRange`]s, and all sample points travel with a parallel
//! array naming the zone each point is tested against. One dispatch can then
//! test points against many zones.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use zone_types::{Aabb, SamplePoint, Triangle, ZoneRange};

use crate::error::{KernelError, KernelResult};

/// Flattened triangles of every zone in a run.
///
/// Ranges are validated on construction: each lies within the buffer and no
/// two overlap. Ranges need not cover the whole buffer.
///
/// # Example
///
/// ```
/// use zone_kernel::ZoneGeometry;
/// use zone_types::{Aabb, Point3, ZoneMesh};
///
/// let a = ZoneMesh::from_box("a", &Aabb::new(Point3::new(0.0, 0.0, 0.0), Point3::new(1.0, 1.0, 1.0)));
/// let b = ZoneMesh::from_box("b", &Aabb::new(Point3::new(2.0, 0.0, 0.0), Point3::new(3.0, 1.0, 1.0)));
///
/// let geometry = ZoneGeometry::from_zones([a.triangles.as_slice(), b.triangles.as_slice()]).unwrap();
/// assert_eq!(geometry.zone_count(), 2);
/// assert_eq!(geometry.ranges()[1].triangle_start, 12);
/// ```
#[derive(Debug, Clone)]
pub struct ZoneGeometry {
    triangles: Vec<Triangle>,
    ranges: Vec<ZoneRange>,
    zone_bounds: Vec<Option<Aabb>>,
    bounds: Option<Aabb>,
    signature: u64,
}

impl ZoneGeometry {
    /// Flatten per-zone triangle slices, assigning ranges in order.
    ///
    /// # Errors
    ///
    /// Returns [`KernelError::TooLarge`] if the triangle or zone count does
    /// not fit in `u32`.
    pub fn from_zones<'a, I>(zones: I) -> KernelResult<Self>
    where
        I: IntoIterator<Item = &'a [Triangle]>,
    {
        let mut triangles = Vec::new();
        let mut ranges = Vec::new();
        for zone in zones {
            let start = to_u32("triangles", triangles.len())?;
            let count = to_u32("triangles", zone.len())?;
            triangles.extend_from_slice(zone);
            to_u32("triangles", triangles.len())?;
            ranges.push(ZoneRange::new(start, count));
        }
        Self::from_parts(triangles, ranges)
    }

    /// A single zone covering every triangle.
    ///
    /// # Errors
    ///
    /// Returns [`KernelError::TooLarge`] if the triangle count does not fit
    /// in `u32`.
    pub fn single(triangles: &[Triangle]) -> KernelResult<Self> {
        Self::from_zones([triangles])
    }

    /// Build from an already flattened buffer and explicit ranges.
    ///
    /// # Errors
    ///
    /// Returns [`KernelError::RangeOutOfBounds`] if a range ends past the
    /// buffer, [`KernelError::OverlappingRanges`] if two ranges share a
    /// triangle, and [`KernelError::TooLarge`] if counts exceed `u32`.
    pub fn from_parts(triangles: Vec<Triangle>, ranges: Vec<ZoneRange>) -> KernelResult<Self> {
        to_u32("triangles", triangles.len())?;
        to_u32("zones", ranges.len())?;

        let total = triangles.len() as u64;
        for (zone, range) in ranges.iter().enumerate() {
            if range.end() > total {
                return Err(KernelError::RangeOutOfBounds {
                    zone,
                    end: range.end(),
                    total: triangles.len(),
                });
            }
        }

        let mut order: Vec<usize> = (0..ranges.len())
            .filter(|&z| ranges[z].triangle_count > 0)
            .collect();
        order.sort_by_key(|&z| ranges[z].triangle_start);
        for pair in order.windows(2) {
            if ranges[pair[0]].overlaps(&ranges[pair[1]]) {
                return Err(KernelError::OverlappingRanges {
                    first: pair[0].min(pair[1]),
                    second: pair[0].max(pair[1]),
                });
            }
        }

        let zone_bounds: Vec<Option<Aabb>> = ranges
            .iter()
            .map(|r| bounds_of(&triangles[r.as_range()]))
            .collect();
        let bounds = zone_bounds
            .iter()
            .flatten()
            .copied()
            .reduce(|acc, b| acc.union(&b));
        let signature = signature_of(&triangles, &ranges);

        Ok(Self {
            triangles,
            ranges,
            zone_bounds,
            bounds,
            signature,
        })
    }

    /// The flattened triangle buffer.
    #[must_use]
    pub fn triangles(&self) -> &[Triangle] {
        &self.triangles
    }

    /// Per-zone ranges into [`Self::triangles`].
    #[must_use]
    pub fn ranges(&self) -> &[ZoneRange] {
        &self.ranges
    }

    /// Number of zones.
    #[must_use]
    pub fn zone_count(&self) -> usize {
        self.ranges.len()
    }

    /// Triangles of one zone, `None` for an unknown zone id.
    #[must_use]
    pub fn zone_triangles(&self, zone: u32) -> Option<&[Triangle]> {
        let range = self.ranges.get(zone as usize)?;
        Some(&self.triangles[range.as_range()])
    }

    /// Bounding box of one zone, `None` for an unknown or empty zone.
    #[must_use]
    pub fn zone_bounds(&self, zone: u32) -> Option<&Aabb> {
        self.zone_bounds.get(zone as usize)?.as_ref()
    }

    /// Bounding box of every zone together, `None` without triangles.
    #[must_use]
    pub const fn bounds(&self) -> Option<&Aabb> {
        self.bounds.as_ref()
    }

    /// Content hash over triangle coordinates and ranges.
    ///
    /// Backends compare it with the last upload to skip re-uploading the
    /// same geometry. Only stable within one process.
    #[must_use]
    pub const fn signature(&self) -> u64 {
        self.signature
    }
}

/// Sample points and the zone each one is tested against.
///
/// # Example
///
/// ```
/// use zone_kernel::PointBatch;
/// use zone_types::SamplePoint;
///
/// let mut batch = PointBatch::new();
/// batch.push(SamplePoint::from_coords(0.5, 0.5, 0.5, 0), 0);
/// batch.push(SamplePoint::from_coords(2.5, 0.5, 0.5, 1), 1);
/// assert_eq!(batch.len(), 2);
/// assert_eq!(batch.zone_ids(), &[0, 1]);
///
/// batch.clear();
/// assert!(batch.is_empty());
/// ```
#[derive(Debug, Clone, Default)]
pub struct PointBatch {
    points: Vec<SamplePoint>,
    zone_ids: Vec<u32>,
}

impl PointBatch {
    /// Create an empty batch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty batch with room for `capacity` points.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            points: Vec::with_capacity(capacity),
            zone_ids: Vec::with_capacity(capacity),
        }
    }

    /// Append a point tested against `zone`.
    pub fn push(&mut self, point: SamplePoint, zone: u32) {
        self.points.push(point);
        self.zone_ids.push(zone);
    }

    /// Number of points.
    #[must_use]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Whether the batch holds no points.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Remove all points, keeping the allocation.
    pub fn clear(&mut self) {
        self.points.clear();
        self.zone_ids.clear();
    }

    /// The sample points.
    #[must_use]
    pub fn points(&self) -> &[SamplePoint] {
        &self.points
    }

    /// Zone id per sample point.
    #[must_use]
    pub fn zone_ids(&self) -> &[u32] {
        &self.zone_ids
    }
}

/// Check that the parallel arrays of a batch line up.
///
/// # Errors
///
/// Returns [`KernelError::InvalidBatch`] on a length mismatch.
pub fn check_batch(points: &[SamplePoint], point_zone_ids: &[u32]) -> KernelResult<()> {
    if points.len() == point_zone_ids.len() {
        Ok(())
    } else {
        Err(KernelError::InvalidBatch {
            points: points.len(),
            zone_ids: point_zone_ids.len(),
        })
    }
}

fn to_u32(what: &'static str, count: usize) -> KernelResult<u32> {
    u32::try_from(count).map_err(|_| KernelError::TooLarge {
        what,
        count,
        max: u32::MAX as usize,
    })
}

fn bounds_of(triangles: &[Triangle]) -> Option<Aabb> {
    let mut iter = triangles.iter();
    let first = iter.next()?.bounds();
    Some(iter.fold(first, |acc, t| acc.union(&t.bounds())))
}

fn signature_of(triangles: &[Triangle], ranges: &[ZoneRange]) -> u64 {
    let mut hasher = DefaultHasher::new();
    triangles.len().hash(&mut hasher);
    for tri in triangles {
        for v in [&tri.v0, &tri.v1, &tri.v2] {
            v.x.to_bits().hash(&mut hasher);
            v.y.to_bits().hash(&mut hasher);
            v.z.to_bits().hash(&mut hasher);
        }
    }
    for range in ranges {
        range.triangle_start.hash(&mut hasher);
        range.triangle_count.hash(&mut hasher);
    }
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use zone_types::{Point3, ZoneMesh};

    fn cube_at(x: f64) -> Vec<Triangle> {
        ZoneMesh::from_box(
            "c",
            &Aabb::new(Point3::new(x, 0.0, 0.0), Point3::new(x + 1.0, 1.0, 1.0)),
        )
        .triangles
    }

    #[test]
    fn from_zones_assigns_contiguous_ranges() {
        let a = cube_at(0.0);
        let b = cube_at(5.0);
        let empty: &[Triangle] = &[];
        let geometry = ZoneGeometry::from_zones([a.as_slice(), empty, b.as_slice()]).unwrap();

        assert_eq!(geometry.triangles().len(), 24);
        assert_eq!(
            geometry.ranges(),
            &[
                ZoneRange::new(0, 12),
                ZoneRange::new(12, 0),
                ZoneRange::new(12, 12)
            ]
        );
        assert!(geometry.zone_bounds(1).is_none());
        assert!((geometry.zone_bounds(2).unwrap().min.x - 5.0).abs() < f64::EPSILON);
        assert!((geometry.bounds().unwrap().max.x - 6.0).abs() < f64::EPSILON);
        assert!(geometry.zone_triangles(3).is_none());
    }

    #[test]
    fn rejects_out_of_bounds_range() {
        let err = ZoneGeometry::from_parts(cube_at(0.0), vec![ZoneRange::new(6, 7)]).unwrap_err();
        assert!(matches!(
            err,
            KernelError::RangeOutOfBounds {
                zone: 0,
                end: 13,
                total: 12
            }
        ));
    }

    #[test]
    fn rejects_overlapping_ranges() {
        let ranges = vec![
            ZoneRange::new(8, 4),
            ZoneRange::new(0, 6),
            ZoneRange::new(4, 3),
        ];
        let err = ZoneGeometry::from_parts(cube_at(0.0), ranges).unwrap_err();
        assert!(matches!(
            err,
            KernelError::OverlappingRanges {
                first: 1,
                second: 2
            }
        ));
    }

    #[test]
    fn unordered_disjoint_ranges_are_fine() {
        let ranges = vec![ZoneRange::new(6, 6), ZoneRange::new(0, 6)];
        let geometry = ZoneGeometry::from_parts(cube_at(0.0), ranges).unwrap();
        assert_eq!(geometry.zone_count(), 2);
    }

    #[test]
    fn signature_tracks_content() {
        let a = ZoneGeometry::single(&cube_at(0.0)).unwrap();
        let same = ZoneGeometry::single(&cube_at(0.0)).unwrap();
        let moved = ZoneGeometry::single(&cube_at(0.5)).unwrap();
        assert_eq!(a.signature(), same.signature());
        assert_ne!(a.signature(), moved.signature());
    }

    #[test]
    fn check_batch_lengths() {
        let points = [SamplePoint::from_coords(0.0, 0.0, 0.0, 0)];
        assert!(check_batch(&points, &[0]).is_ok());
        assert!(matches!(
            check_batch(&points, &[]),
            Err(KernelError::InvalidBatch {
                points: 1,
                zone_ids: 0
            })
        ));
    }
}
