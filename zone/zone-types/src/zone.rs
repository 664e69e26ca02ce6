//! Zones and targets as handed over by a geometry source.

use nalgebra::Point3;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::{Aabb, Triangle};

/// A closed-volume boundary mesh that targets are classified against.
///
/// # Example
///
/// ```
/// use zone_types::{Aabb, Point3, ZoneMesh};
///
/// let room = ZoneMesh::from_box(
///     "room-101",
///     &Aabb::new(Point3::new(0.0, 0.0, 0.0), Point3::new(4.0, 5.0, 3.0)),
/// );
/// assert_eq!(room.triangles.len(), 12);
/// assert!(room.bounds().is_some());
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ZoneMesh {
    /// Identity of the zone in the host document.
    pub id: String,
    /// Boundary triangles in world coordinates.
    pub triangles: Vec<Triangle>,
}

impl ZoneMesh {
    /// Create a zone from its triangles.
    #[must_use]
    pub fn new(id: impl Into<String>, triangles: Vec<Triangle>) -> Self {
        Self {
            id: id.into(),
            triangles,
        }
    }

    /// Create a closed box-shaped zone (12 triangles, outward CCW winding).
    #[must_use]
    pub fn from_box(id: impl Into<String>, aabb: &Aabb) -> Self {
        let c = aabb.corners();
        // Corner order: 0..4 bottom (z = min), 4..8 top, see `Aabb::corners`.
        let faces: [[usize; 3]; 12] = [
            [0, 2, 3],
            [0, 3, 1], // bottom
            [4, 5, 7],
            [4, 7, 6], // top
            [0, 1, 5],
            [0, 5, 4], // front (y = min)
            [2, 6, 7],
            [2, 7, 3], // back (y = max)
            [0, 4, 6],
            [0, 6, 2], // left (x = min)
            [1, 3, 7],
            [1, 7, 5], // right (x = max)
        ];
        let triangles = faces
            .iter()
            .map(|f| Triangle::new(c[f[0]], c[f[1]], c[f[2]]))
            .collect();
        Self::new(id, triangles)
    }

    /// Bounding box of all triangles, `None` for an empty zone.
    #[must_use]
    pub fn bounds(&self) -> Option<Aabb> {
        let mut iter = self.triangles.iter();
        let first = iter.next()?.bounds();
        Some(iter.fold(first, |acc, tri| acc.union(&tri.bounds())))
    }
}

/// An entity to classify, reduced to a box and optional sample points.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Target {
    /// Identity of the target in the host document.
    pub id: String,
    /// Exact world-space bounding box.
    pub bounds: Aabb,
    /// Representative sample points supplied by the host; may be empty.
    pub points: Vec<Point3<f64>>,
}

impl Target {
    /// Create a target described only by its box.
    #[must_use]
    pub fn from_bounds(id: impl Into<String>, bounds: Aabb) -> Self {
        Self {
            id: id.into(),
            bounds,
            points: Vec::new(),
        }
    }

    /// Create a point-like target: a degenerate box at `point`.
    #[must_use]
    pub fn from_point(id: impl Into<String>, point: Point3<f64>) -> Self {
        Self {
            id: id.into(),
            bounds: Aabb::from_point(point),
            points: vec![point],
        }
    }

    /// Attach host-supplied sample points.
    #[must_use]
    pub fn with_points(mut self, points: Vec<Point3<f64>>) -> Self {
        self.points = points;
        self
    }

    /// The single most representative position of the target.
    ///
    /// This is the first host-supplied point, or the box center when the
    /// host supplied none.
    #[must_use]
    pub fn anchor(&self) -> Point3<f64> {
        self.points
            .first()
            .copied()
            .unwrap_or_else(|| self.bounds.center())
    }
}
