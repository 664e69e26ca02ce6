//! Axis-aligned bounding box.

use nalgebra::{Point3, Vector3};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// An axis-aligned bounding box (AABB).
///
/// The box is always normalized: `min <= max` on every axis, so each size
/// component is non-negative. All constructors and the inflate helpers
/// re-normalize their result, which means a negative margin can collapse a
/// box to zero thickness but never invert it.
///
/// # Example
///
/// ```
/// use zone_types::{Aabb, Point3};
///
/// let aabb = Aabb::new(
///     Point3::new(0.0, 0.0, 0.0),
///     Point3::new(10.0, 10.0, 10.0),
/// );
///
/// assert_eq!(aabb.size(), Point3::new(10.0, 10.0, 10.0).coords);
/// assert!(aabb.contains(&Point3::new(5.0, 5.0, 5.0)));
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Aabb {
    /// Minimum corner (smallest x, y, z values).
    pub min: Point3<f64>,
    /// Maximum corner (largest x, y, z values).
    pub max: Point3<f64>,
}

impl Aabb {
    /// Create a new AABB from two opposite corners.
    ///
    /// The corners are swapped per axis where needed so the result is
    /// normalized.
    ///
    /// # Example
    ///
    /// ```
    /// use zone_types::{Aabb, Point3};
    ///
    /// let aabb = Aabb::new(
    ///     Point3::new(1.0, 2.0, 3.0),
    ///     Point3::new(0.0, 0.0, 0.0),
    /// );
    /// assert_eq!(aabb.min, Point3::new(0.0, 0.0, 0.0));
    /// ```
    #[must_use]
    pub fn new(a: Point3<f64>, b: Point3<f64>) -> Self {
        Self {
            min: Point3::new(a.x.min(b.x), a.y.min(b.y), a.z.min(b.z)),
            max: Point3::new(a.x.max(b.x), a.y.max(b.y), a.z.max(b.z)),
        }
    }

    /// Create a box from six scalar bounds.
    #[must_use]
    pub fn from_bounds(min_x: f64, min_y: f64, min_z: f64, max_x: f64, max_y: f64, max_z: f64) -> Self {
        Self::new(
            Point3::new(min_x, min_y, min_z),
            Point3::new(max_x, max_y, max_z),
        )
    }

    /// Create a zero-volume AABB around a single point.
    #[inline]
    #[must_use]
    pub const fn from_point(point: Point3<f64>) -> Self {
        Self {
            min: point,
            max: point,
        }
    }

    /// Create the tightest AABB around a set of points.
    ///
    /// Returns `None` if the iterator is empty.
    ///
    /// # Example
    ///
    /// ```
    /// use zone_types::{Aabb, Point3};
    ///
    /// let points = vec![
    ///     Point3::new(0.0, 0.0, 0.0),
    ///     Point3::new(10.0, 5.0, 3.0),
    ///     Point3::new(-2.0, 8.0, 1.0),
    /// ];
    ///
    /// let aabb = Aabb::from_points(points.iter()).unwrap();
    /// assert_eq!(aabb.min, Point3::new(-2.0, 0.0, 0.0));
    /// assert_eq!(aabb.max, Point3::new(10.0, 8.0, 3.0));
    ///
    /// assert!(Aabb::from_points(std::iter::empty()).is_none());
    /// ```
    #[must_use]
    pub fn from_points<'a>(mut points: impl Iterator<Item = &'a Point3<f64>>) -> Option<Self> {
        let first = points.next()?;
        let mut aabb = Self::from_point(*first);
        for point in points {
            aabb.expand_to_include(point);
        }
        Some(aabb)
    }

    /// Size along X.
    #[inline]
    #[must_use]
    pub fn size_x(&self) -> f64 {
        self.max.x - self.min.x
    }

    /// Size along Y.
    #[inline]
    #[must_use]
    pub fn size_y(&self) -> f64 {
        self.max.y - self.min.y
    }

    /// Size along Z.
    #[inline]
    #[must_use]
    pub fn size_z(&self) -> f64 {
        self.max.z - self.min.z
    }

    /// Get the size (dimensions) of the AABB.
    #[inline]
    #[must_use]
    pub fn size(&self) -> Vector3<f64> {
        self.max - self.min
    }

    /// Get the center of the AABB.
    #[inline]
    #[must_use]
    pub fn center(&self) -> Point3<f64> {
        Point3::new(
            (self.min.x + self.max.x) * 0.5,
            (self.min.y + self.max.y) * 0.5,
            (self.min.z + self.max.z) * 0.5,
        )
    }

    /// Get the volume of the AABB.
    #[inline]
    #[must_use]
    pub fn volume(&self) -> f64 {
        let s = self.size();
        s.x * s.y * s.z
    }

    /// Get the length of the longest edge.
    #[inline]
    #[must_use]
    pub fn max_extent(&self) -> f64 {
        let s = self.size();
        s.x.max(s.y).max(s.z)
    }

    /// Check if the AABB contains a point.
    ///
    /// Points on the boundary are considered inside.
    #[inline]
    #[must_use]
    pub fn contains(&self, point: &Point3<f64>) -> bool {
        point.x >= self.min.x
            && point.x <= self.max.x
            && point.y >= self.min.y
            && point.y <= self.max.y
            && point.z >= self.min.z
            && point.z <= self.max.z
    }

    /// Check if this AABB intersects another AABB.
    ///
    /// Touching AABBs are considered intersecting. The test is symmetric and
    /// a box always intersects itself.
    ///
    /// # Example
    ///
    /// ```
    /// use zone_types::{Aabb, Point3};
    ///
    /// let a = Aabb::new(Point3::new(0.0, 0.0, 0.0), Point3::new(10.0, 10.0, 10.0));
    /// let b = Aabb::new(Point3::new(5.0, 5.0, 5.0), Point3::new(15.0, 15.0, 15.0));
    /// let c = Aabb::new(Point3::new(20.0, 20.0, 20.0), Point3::new(30.0, 30.0, 30.0));
    ///
    /// assert!(a.intersects(&b));
    /// assert!(!a.intersects(&c));
    /// ```
    #[inline]
    #[must_use]
    pub fn intersects(&self, other: &Self) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
            && self.min.z <= other.max.z
            && self.max.z >= other.min.z
    }

    /// Compute the union (enclosing AABB) of two AABBs.
    #[must_use]
    pub fn union(&self, other: &Self) -> Self {
        Self {
            min: Point3::new(
                self.min.x.min(other.min.x),
                self.min.y.min(other.min.y),
                self.min.z.min(other.min.z),
            ),
            max: Point3::new(
                self.max.x.max(other.max.x),
                self.max.y.max(other.max.y),
                self.max.z.max(other.max.z),
            ),
        }
    }

    /// Expand the AABB to include a point.
    pub fn expand_to_include(&mut self, point: &Point3<f64>) {
        self.min.x = self.min.x.min(point.x);
        self.min.y = self.min.y.min(point.y);
        self.min.z = self.min.z.min(point.z);
        self.max.x = self.max.x.max(point.x);
        self.max.y = self.max.y.max(point.y);
        self.max.z = self.max.z.max(point.z);
    }

    /// Inflate the AABB by a uniform margin on all sides.
    ///
    /// Negative margins shrink the box; an axis that would invert collapses
    /// to its midpoint instead.
    ///
    /// # Example
    ///
    /// ```
    /// use zone_types::{Aabb, Point3};
    ///
    /// let aabb = Aabb::new(
    ///     Point3::new(0.0, 0.0, 0.0),
    ///     Point3::new(10.0, 10.0, 10.0),
    /// );
    ///
    /// let inflated = aabb.inflate(1.0);
    /// assert_eq!(inflated.min, Point3::new(-1.0, -1.0, -1.0));
    /// assert_eq!(inflated.max, Point3::new(11.0, 11.0, 11.0));
    /// ```
    #[must_use]
    pub fn inflate(&self, margin: f64) -> Self {
        let margin = Vector3::new(margin, margin, margin);
        Self::collapse_inverted(self.min - margin, self.max + margin)
    }

    /// Inflate the box vertically only, by different amounts below and above.
    ///
    /// Used to give a zone some headroom (for example, a room volume that
    /// should also capture targets resting slightly above its ceiling plane)
    /// without widening it horizontally.
    ///
    /// # Example
    ///
    /// ```
    /// use zone_types::{Aabb, Point3};
    ///
    /// let room = Aabb::new(Point3::new(0.0, 0.0, 0.0), Point3::new(4.0, 4.0, 3.0));
    /// let padded = room.offset_z(0.1, 0.5);
    /// assert_eq!(padded.min.z, -0.1);
    /// assert_eq!(padded.max.z, 3.5);
    /// assert_eq!(padded.min.x, 0.0);
    /// ```
    #[must_use]
    pub fn offset_z(&self, below: f64, above: f64) -> Self {
        Self::collapse_inverted(
            Point3::new(self.min.x, self.min.y, self.min.z - below),
            Point3::new(self.max.x, self.max.y, self.max.z + above),
        )
    }

    /// Get the eight corner points of the AABB.
    #[must_use]
    pub fn corners(&self) -> [Point3<f64>; 8] {
        [
            Point3::new(self.min.x, self.min.y, self.min.z),
            Point3::new(self.max.x, self.min.y, self.min.z),
            Point3::new(self.min.x, self.max.y, self.min.z),
            Point3::new(self.max.x, self.max.y, self.min.z),
            Point3::new(self.min.x, self.min.y, self.max.z),
            Point3::new(self.max.x, self.min.y, self.max.z),
            Point3::new(self.min.x, self.max.y, self.max.z),
            Point3::new(self.max.x, self.max.y, self.max.z),
        ]
    }

    fn collapse_inverted(min: Point3<f64>, max: Point3<f64>) -> Self {
        let fix = |lo: f64, hi: f64| {
            if lo > hi {
                let mid = (lo + hi) * 0.5;
                (mid, mid)
            } else {
                (lo, hi)
            }
        };
        let (min_x, max_x) = fix(min.x, max.x);
        let (min_y, max_y) = fix(min.y, max.y);
        let (min_z, max_z) = fix(min.z, max.z);
        Self {
            min: Point3::new(min_x, min_y, min_z),
            max: Point3::new(max_x, max_y, max_z),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn arb_aabb() -> impl Strategy<Value = Aabb> {
        (
            prop::array::uniform3(-100.0..100.0f64),
            prop::array::uniform3(-100.0..100.0f64),
        )
            .prop_map(|(a, b)| Aabb::new(Point3::from(a), Point3::from(b)))
    }

    #[test]
    fn aabb_new_normalizes() {
        let aabb = Aabb::new(Point3::new(5.0, -1.0, 3.0), Point3::new(1.0, 2.0, -3.0));
        assert!(aabb.size_x() >= 0.0);
        assert!(aabb.size_y() >= 0.0);
        assert!(aabb.size_z() >= 0.0);
        assert!((aabb.min.x - 1.0).abs() < f64::EPSILON);
        assert!((aabb.max.z - 3.0).abs() < f64::EPSILON);
    }

    #[test]
    fn aabb_contains() {
        let aabb = Aabb::new(Point3::new(0.0, 0.0, 0.0), Point3::new(10.0, 10.0, 10.0));

        assert!(aabb.contains(&Point3::new(5.0, 5.0, 5.0)));
        assert!(aabb.contains(&Point3::new(0.0, 0.0, 0.0)));
        assert!(aabb.contains(&Point3::new(10.0, 10.0, 10.0)));
        assert!(!aabb.contains(&Point3::new(-1.0, 5.0, 5.0)));
    }

    #[test]
    fn aabb_intersects_touching() {
        let a = Aabb::new(Point3::new(0.0, 0.0, 0.0), Point3::new(1.0, 1.0, 1.0));
        let b = Aabb::new(Point3::new(1.0, 0.0, 0.0), Point3::new(2.0, 1.0, 1.0));
        assert!(a.intersects(&b));
        assert!(b.intersects(&a));
    }

    #[test]
    fn aabb_inflate_negative_collapses() {
        let aabb = Aabb::new(Point3::new(0.0, 0.0, 0.0), Point3::new(2.0, 10.0, 10.0));
        let shrunk = aabb.inflate(-2.0);
        assert!((shrunk.size_x() - 0.0).abs() < f64::EPSILON);
        assert!((shrunk.min.x - 1.0).abs() < f64::EPSILON);
        assert!((shrunk.size_y() - 6.0).abs() < f64::EPSILON);
    }

    #[test]
    fn aabb_offset_z_only_touches_z() {
        let aabb = Aabb::new(Point3::new(0.0, 0.0, 0.0), Point3::new(1.0, 1.0, 1.0));
        let moved = aabb.offset_z(-0.25, 2.0);
        assert!((moved.min.z - 0.25).abs() < f64::EPSILON);
        assert!((moved.max.z - 3.0).abs() < f64::EPSILON);
        assert!((moved.size_x() - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn aabb_union() {
        let a = Aabb::new(Point3::new(0.0, 0.0, 0.0), Point3::new(5.0, 5.0, 5.0));
        let b = Aabb::new(Point3::new(3.0, 3.0, 3.0), Point3::new(10.0, 10.0, 10.0));
        let u = a.union(&b);
        assert!((u.min.x - 0.0).abs() < f64::EPSILON);
        assert!((u.max.x - 10.0).abs() < f64::EPSILON);
    }

    #[test]
    fn aabb_corners_are_contained() {
        let aabb = Aabb::new(Point3::new(-1.0, 0.0, 2.0), Point3::new(1.0, 3.0, 4.0));
        for corner in aabb.corners() {
            assert!(aabb.contains(&corner));
        }
    }

    proptest! {
        #[test]
        fn intersects_is_symmetric(a in arb_aabb(), b in arb_aabb()) {
            prop_assert_eq!(a.intersects(&b), b.intersects(&a));
        }

        #[test]
        fn intersects_self(a in arb_aabb()) {
            prop_assert!(a.intersects(&a));
        }

        #[test]
        fn inflate_keeps_sizes_non_negative(a in arb_aabb(), margin in -200.0..200.0f64) {
            let inflated = a.inflate(margin);
            prop_assert!(inflated.size_x() >= 0.0);
            prop_assert!(inflated.size_y() >= 0.0);
            prop_assert!(inflated.size_z() >= 0.0);
        }
    }
}
