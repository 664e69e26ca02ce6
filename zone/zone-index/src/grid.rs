//! Uniform spatial hash grid over target bounding boxes.

use hashbrown::HashMap;
use tracing::debug;
use zone_types::{Aabb, Point3};

use crate::error::{IndexError, IndexResult};
use crate::stamps::CandidateStamps;

/// Cells per axis are capped so a cell coordinate fits in 21 bits.
pub const MAX_CELLS_PER_AXIS: u32 = 1 << 21;

/// Inclusive cell-coordinate span of a box.
type CellSpan = ([u32; 3], [u32; 3]);

/// Sparse uniform grid answering "which targets overlap this box".
///
/// Built once per run from the world box, a cell size and every target's
/// bounding box. Each target is inserted into every cell its box overlaps.
/// Cell coordinates are clamped to the world grid, so a target lying
/// outside the world box lands in the nearest edge cells instead of being
/// dropped.
///
/// Queries never report a target twice and always re-check the exact box
/// (or point) test, so the cell layout only affects speed, never results.
///
/// # Example
///
/// ```
/// use zone_index::SpatialHashGrid;
/// use zone_types::{Aabb, Point3};
///
/// let targets = vec![
///     Aabb::new(Point3::new(0.0, 0.0, 0.0), Point3::new(1.0, 1.0, 1.0)),
///     Aabb::new(Point3::new(50.0, 50.0, 0.0), Point3::new(51.0, 51.0, 1.0)),
/// ];
/// let world = Aabb::new(Point3::new(0.0, 0.0, 0.0), Point3::new(100.0, 100.0, 10.0));
/// let grid = SpatialHashGrid::build(world, 10.0, &targets).unwrap();
///
/// let mut stamps = grid.new_stamps();
/// let query = Aabb::new(Point3::new(-1.0, -1.0, -1.0), Point3::new(2.0, 2.0, 2.0));
/// assert_eq!(grid.count_candidates(&query, &mut stamps).unwrap(), 1);
/// ```
#[derive(Debug, Clone)]
pub struct SpatialHashGrid {
    world: Aabb,
    cell_size: f64,
    dims: [u32; 3],
    cells: HashMap<u64, Vec<u32>>,
    targets: Vec<Aabb>,
    entry_count: usize,
}

impl SpatialHashGrid {
    /// Build the grid.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::InvalidCellSize`] if `cell_size` is not a
    /// positive finite number, and [`IndexError::TooManyTargets`] if the
    /// targets cannot be addressed with `u32` indices.
    pub fn build(world: Aabb, cell_size: f64, targets: &[Aabb]) -> IndexResult<Self> {
        if !(cell_size.is_finite() && cell_size > 0.0) {
            return Err(IndexError::InvalidCellSize(cell_size));
        }
        let max_targets = u32::MAX as usize;
        if targets.len() > max_targets {
            return Err(IndexError::TooManyTargets {
                count: targets.len(),
                max: max_targets,
            });
        }

        let size = world.size();
        let dims = [
            cells_along(size.x, cell_size),
            cells_along(size.y, cell_size),
            cells_along(size.z, cell_size),
        ];

        let mut grid = Self {
            world,
            cell_size,
            dims,
            cells: HashMap::new(),
            targets: targets.to_vec(),
            entry_count: 0,
        };

        for (index, bounds) in targets.iter().enumerate() {
            // Bounded by the TooManyTargets check above.
            #[allow(clippy::cast_possible_truncation)]
            let id = index as u32;
            let (lo, hi) = grid.cell_span(bounds);
            for z in lo[2]..=hi[2] {
                for y in lo[1]..=hi[1] {
                    for x in lo[0]..=hi[0] {
                        grid.cells.entry(pack(x, y, z)).or_default().push(id);
                        grid.entry_count += 1;
                    }
                }
            }
        }

        debug!(
            targets = targets.len(),
            cell_size,
            dims = ?grid.dims,
            occupied_cells = grid.cells.len(),
            entries = grid.entry_count,
            "Built spatial hash grid"
        );

        Ok(grid)
    }

    /// World box the grid was built over.
    #[must_use]
    pub const fn world(&self) -> &Aabb {
        &self.world
    }

    /// Edge length of a cell.
    #[must_use]
    pub const fn cell_size(&self) -> f64 {
        self.cell_size
    }

    /// Number of cells along each axis.
    #[must_use]
    pub const fn dims(&self) -> [u32; 3] {
        self.dims
    }

    /// Number of targets indexed.
    #[must_use]
    pub fn target_count(&self) -> usize {
        self.targets.len()
    }

    /// Bounding box of target `index`, if it exists.
    #[must_use]
    pub fn target_bounds(&self, index: usize) -> Option<&Aabb> {
        self.targets.get(index)
    }

    /// Number of non-empty cells.
    #[must_use]
    pub fn occupied_cells(&self) -> usize {
        self.cells.len()
    }

    /// Total (cell, target) entries. Equal to the target count only when
    /// every target fits a single cell.
    #[must_use]
    pub const fn entry_count(&self) -> usize {
        self.entry_count
    }

    /// Stamp array sized for this grid.
    #[must_use]
    pub fn new_stamps(&self) -> CandidateStamps {
        CandidateStamps::new(self.targets.len())
    }

    /// Count targets whose box intersects `query`, each at most once.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::StampSizeMismatch`] if `stamps` was not sized
    /// for this grid.
    pub fn count_candidates(
        &self,
        query: &Aabb,
        stamps: &mut CandidateStamps,
    ) -> IndexResult<usize> {
        self.visit_candidates(query, stamps, |_| {})
    }

    /// Call `visit` once for every target whose box intersects `query`.
    ///
    /// Returns the number of targets visited. Visit order follows the cell
    /// layout and is not sorted.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::StampSizeMismatch`] if `stamps` was not sized
    /// for this grid.
    pub fn visit_candidates<F>(
        &self,
        query: &Aabb,
        stamps: &mut CandidateStamps,
        mut visit: F,
    ) -> IndexResult<usize>
    where
        F: FnMut(usize),
    {
        if stamps.len() != self.targets.len() {
            return Err(IndexError::StampSizeMismatch {
                expected: self.targets.len(),
                actual: stamps.len(),
            });
        }
        stamps.begin_query();

        let mut visited = 0;
        let (lo, hi) = self.cell_span(query);
        for z in lo[2]..=hi[2] {
            for y in lo[1]..=hi[1] {
                for x in lo[0]..=hi[0] {
                    let Some(cell) = self.cells.get(&pack(x, y, z)) else {
                        continue;
                    };
                    for &id in cell {
                        let index = id as usize;
                        if stamps.mark(index) && self.targets[index].intersects(query) {
                            visit(index);
                            visited += 1;
                        }
                    }
                }
            }
        }
        Ok(visited)
    }

    /// Count targets whose box contains `point`.
    ///
    /// Only the single cell holding the point is consulted, and a target
    /// appears at most once per cell, so no stamps are needed.
    #[must_use]
    pub fn count_point_candidates(&self, point: &Point3<f64>) -> usize {
        self.visit_point_candidates(point, |_| {})
    }

    /// Call `visit` for every target whose box contains `point`.
    ///
    /// Returns the number of targets visited.
    pub fn visit_point_candidates<F>(&self, point: &Point3<f64>, mut visit: F) -> usize
    where
        F: FnMut(usize),
    {
        let c = self.cell_of(point);
        let Some(cell) = self.cells.get(&pack(c[0], c[1], c[2])) else {
            return 0;
        };
        let mut visited = 0;
        for &id in cell {
            let index = id as usize;
            if self.targets[index].contains(point) {
                visit(index);
                visited += 1;
            }
        }
        visited
    }

    /// Clamped cell coordinates of a point.
    #[must_use]
    pub fn cell_of(&self, point: &Point3<f64>) -> [u32; 3] {
        [
            self.axis_cell(point.x, self.world.min.x, self.dims[0]),
            self.axis_cell(point.y, self.world.min.y, self.dims[1]),
            self.axis_cell(point.z, self.world.min.z, self.dims[2]),
        ]
    }

    fn cell_span(&self, bounds: &Aabb) -> CellSpan {
        (self.cell_of(&bounds.min), self.cell_of(&bounds.max))
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn axis_cell(&self, value: f64, origin: f64, cells: u32) -> u32 {
        let raw = ((value - origin) / self.cell_size).floor();
        let last = cells - 1;
        // NaN fails both comparisons and falls through to the saturating cast (0).
        if raw >= f64::from(last) {
            last
        } else if raw <= 0.0 {
            0
        } else {
            raw as u32
        }
    }
}

/// Number of cells covering `extent`, at least one.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn cells_along(extent: f64, cell_size: f64) -> u32 {
    let cells = (extent / cell_size).ceil();
    if cells >= f64::from(MAX_CELLS_PER_AXIS) {
        MAX_CELLS_PER_AXIS
    } else if cells >= 1.0 {
        cells as u32
    } else {
        1
    }
}

#[inline]
fn pack(x: u32, y: u32, z: u32) -> u64 {
    u64::from(x) | (u64::from(y) << 21) | (u64::from(z) << 42)
}
