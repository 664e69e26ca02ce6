//! Cell-size policy.

use zone_types::Aabb;

use crate::error::{IndexError, IndexResult};

/// Smallest automatically chosen cell edge (world units, millimeters for
/// building models).
pub const MIN_AUTO_CELL_SIZE: f64 = 1000.0;

/// The world's longest edge is split into this many cells at standard
/// granularity.
pub const AUTO_CELL_DIVISIONS: f64 = 128.0;

/// User-facing grid resolution knob, levels 1 to 4.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Granularity {
    /// Level 1: cells twice the automatic size.
    Coarse,
    /// Level 2: automatic size.
    #[default]
    Standard,
    /// Level 3: half the automatic size.
    Fine,
    /// Level 4: a quarter of the automatic size.
    UltraFine,
}

impl Granularity {
    /// Map a numeric level to a granularity, clamping to 1..=4.
    ///
    /// # Example
    ///
    /// ```
    /// use zone_index::Granularity;
    ///
    /// assert_eq!(Granularity::from_level(0), Granularity::Coarse);
    /// assert_eq!(Granularity::from_level(3), Granularity::Fine);
    /// assert_eq!(Granularity::from_level(99), Granularity::UltraFine);
    /// ```
    #[must_use]
    pub const fn from_level(level: i32) -> Self {
        match level {
            i32::MIN..=1 => Self::Coarse,
            2 => Self::Standard,
            3 => Self::Fine,
            _ => Self::UltraFine,
        }
    }

    /// Numeric level, 1 to 4.
    #[must_use]
    pub const fn level(self) -> i32 {
        match self {
            Self::Coarse => 1,
            Self::Standard => 2,
            Self::Fine => 3,
            Self::UltraFine => 4,
        }
    }

    /// Factor applied to the automatic cell size.
    #[must_use]
    pub const fn multiplier(self) -> f64 {
        match self {
            Self::Coarse => 2.0,
            Self::Standard => 1.0,
            Self::Fine => 0.5,
            Self::UltraFine => 0.25,
        }
    }
}

/// How the grid cell size is chosen for a run.
///
/// # Example
///
/// ```
/// use zone_index::{Granularity, GridSizing};
/// use zone_types::{Aabb, Point3};
///
/// let world = Aabb::new(Point3::new(0.0, 0.0, 0.0), Point3::new(256_000.0, 10_000.0, 3_000.0));
///
/// let auto = GridSizing::new(Granularity::Standard);
/// assert_eq!(auto.cell_size(&world).unwrap(), 2000.0);
///
/// let fine = GridSizing::new(Granularity::Fine);
/// assert_eq!(fine.cell_size(&world).unwrap(), 1000.0);
///
/// let fixed = GridSizing::new(Granularity::Fine).with_override(750.0);
/// assert_eq!(fixed.cell_size(&world).unwrap(), 750.0);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct GridSizing {
    /// Resolution knob applied to the automatic size.
    pub granularity: Granularity,
    /// Explicit cell size that bypasses the policy.
    pub override_cell_size: Option<f64>,
}

impl GridSizing {
    /// Automatic sizing at the given granularity.
    #[must_use]
    pub const fn new(granularity: Granularity) -> Self {
        Self {
            granularity,
            override_cell_size: None,
        }
    }

    /// Use a fixed cell size instead of the automatic policy.
    #[must_use]
    pub const fn with_override(mut self, cell_size: f64) -> Self {
        self.override_cell_size = Some(cell_size);
        self
    }

    /// Resolve the cell size for `world`.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::InvalidCellSize`] if the override is not a
    /// positive finite number.
    pub fn cell_size(&self, world: &Aabb) -> IndexResult<f64> {
        match self.override_cell_size {
            Some(size) if size.is_finite() && size > 0.0 => Ok(size),
            Some(size) => Err(IndexError::InvalidCellSize(size)),
            None => Ok(auto_cell_size(world) * self.granularity.multiplier()),
        }
    }
}

/// `max(MIN_AUTO_CELL_SIZE, longest world edge / AUTO_CELL_DIVISIONS)`.
#[must_use]
pub fn auto_cell_size(world: &Aabb) -> f64 {
    let extent = world.max_extent();
    if extent.is_finite() {
        (extent / AUTO_CELL_DIVISIONS).max(MIN_AUTO_CELL_SIZE)
    } else {
        MIN_AUTO_CELL_SIZE
    }
}
