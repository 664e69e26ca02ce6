//! Spatial index for batch "many zones vs many targets" candidate queries.
//!
//! - [`SpatialHashGrid`] - Sparse uniform grid over target bounding boxes
//! - [`CandidateStamps`] - Reusable per-query deduplication marks
//! - [`GridSizing`] and [`Granularity`] - How the cell size is chosen
//!
//! The grid is built once per classification run and then queried once per
//! zone, either to count candidate pairs (preflight) or to enumerate them
//! (the real pass). Counting and visiting share one code path, so the
//! preflight count is exactly the number of pairs the real pass tests.
//!
//! # Layer 0 Crate
//!
//! No GPU or UI dependencies.
//!
//! # Example
//!
//! ```
//! use zone_index::{Granularity, GridSizing, SpatialHashGrid};
//! use zone_types::{Aabb, Point3};
//!
//! let targets: Vec<Aabb> = (0..100)
//!     .map(|i| {
//!         let x = f64::from(i) * 100.0;
//!         Aabb::new(Point3::new(x, 0.0, 0.0), Point3::new(x + 50.0, 50.0, 50.0))
//!     })
//!     .collect();
//! let world = targets
//!     .iter()
//!     .fold(targets[0], |acc, b| acc.union(b));
//!
//! let cell = GridSizing::new(Granularity::Standard).cell_size(&world).unwrap();
//! let grid = SpatialHashGrid::build(world, cell, &targets).unwrap();
//!
//! let zone_box = Aabb::new(Point3::new(0.0, 0.0, 0.0), Point3::new(1000.0, 100.0, 100.0));
//! let mut stamps = grid.new_stamps();
//! assert_eq!(grid.count_candidates(&zone_box, &mut stamps).unwrap(), 11);
//! ```

#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]

mod error;
mod grid;
mod sizing;
mod stamps;

pub use error::{IndexError, IndexResult};
pub use grid::{MAX_CELLS_PER_AXIS, SpatialHashGrid};
pub use sizing::{AUTO_CELL_DIVISIONS, Granularity, GridSizing, MIN_AUTO_CELL_SIZE, auto_cell_size};
pub use stamps::CandidateStamps;
