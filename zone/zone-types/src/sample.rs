//! Batch-level value types: zone ranges, sample points and result flags.

use nalgebra::Point3;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A contiguous slice of a flattened triangle buffer belonging to one zone.
///
/// Ranges for different zones never overlap and always end at or before
/// the total triangle count; `zone_kernel::ZoneGeometry` enforces this when
/// it is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ZoneRange {
    /// Index of the first triangle of the zone.
    pub triangle_start: u32,
    /// Number of triangles in the zone.
    pub triangle_count: u32,
}

impl ZoneRange {
    /// Create a new range.
    #[must_use]
    pub const fn new(triangle_start: u32, triangle_count: u32) -> Self {
        Self {
            triangle_start,
            triangle_count,
        }
    }

    /// One past the last triangle index, widened so it cannot overflow.
    #[must_use]
    pub const fn end(&self) -> u64 {
        self.triangle_start as u64 + self.triangle_count as u64
    }

    /// Index range usable for slicing the flattened buffer.
    #[must_use]
    pub const fn as_range(&self) -> std::ops::Range<usize> {
        self.triangle_start as usize..(self.triangle_start as usize + self.triangle_count as usize)
    }

    /// Whether two ranges share any triangle.
    #[must_use]
    pub const fn overlaps(&self, other: &Self) -> bool {
        if self.triangle_count == 0 || other.triangle_count == 0 {
            return false;
        }
        (self.triangle_start as u64) < other.end() && (other.triangle_start as u64) < self.end()
    }
}

/// A position to classify.
///
/// `jitter_key` seeds the deterministic ray directions used for this
/// sample. It is independent of the sample's position in any buffer, so a
/// point keeps the same rays whether it is tested alone or inside a large
/// batch. On the GPU it occupies the otherwise-unused fourth component of
/// the point vector.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SamplePoint {
    /// World-space position.
    pub position: Point3<f64>,
    /// Key from which ray jitter is derived.
    pub jitter_key: u32,
}

impl SamplePoint {
    /// Create a sample point.
    #[must_use]
    pub const fn new(position: Point3<f64>, jitter_key: u32) -> Self {
        Self {
            position,
            jitter_key,
        }
    }

    /// Create a sample point from coordinates.
    #[must_use]
    #[allow(clippy::missing_const_for_fn)] // Point3::new is not const in nalgebra
    pub fn from_coords(x: f64, y: f64, z: f64, jitter_key: u32) -> Self {
        Self {
            position: Point3::new(x, y, z),
            jitter_key,
        }
    }
}

/// Per-sample containment outcome.
///
/// The discriminants are the raw values written by GPU and native kernels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[repr(u32)]
pub enum ContainmentFlag {
    /// The sample lies outside the zone.
    #[default]
    Outside = 0,
    /// The sample lies inside the zone.
    Inside = 1,
    /// The ray grazed a degenerate configuration or two rays disagreed.
    Uncertain = 2,
}

impl ContainmentFlag {
    /// Decode a raw kernel output value.
    ///
    /// Values other than 0 and 1 decode to [`ContainmentFlag::Uncertain`],
    /// so a corrupted readback can never be mistaken for a hit.
    ///
    /// # Example
    ///
    /// ```
    /// use zone_types::ContainmentFlag;
    ///
    /// assert_eq!(ContainmentFlag::from_raw(1), ContainmentFlag::Inside);
    /// assert_eq!(ContainmentFlag::from_raw(7), ContainmentFlag::Uncertain);
    /// ```
    #[must_use]
    pub const fn from_raw(raw: u32) -> Self {
        match raw {
            0 => Self::Outside,
            1 => Self::Inside,
            _ => Self::Uncertain,
        }
    }

    /// Raw value as written by kernels.
    #[must_use]
    pub const fn as_raw(self) -> u32 {
        self as u32
    }

    /// Combine two independent single-ray verdicts.
    ///
    /// Agreement keeps the verdict; any disagreement (or an already
    /// uncertain input) is uncertain.
    #[must_use]
    pub fn agree(self, other: Self) -> Self {
        if self == other { self } else { Self::Uncertain }
    }

    /// `true` only for [`ContainmentFlag::Inside`].
    #[must_use]
    pub const fn is_inside(self) -> bool {
        matches!(self, Self::Inside)
    }
}
