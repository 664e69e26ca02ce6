//! Point-in-zone kernel and compute backend abstraction.
//!
//! This crate holds everything a backend needs to agree on:
//!
//! - [`kernel`] - Parity ray casting with deterministic jitter and
//!   degeneracy detection
//! - [`ZoneGeometry`] and [`PointBatch`] - The batched query protocol
//! - [`ComputeBackend`] and [`BackendProbe`] - The seam GPU backends plug
//!   into
//! - [`CpuBackend`] - The always-available host implementation
//! - [`CancellationToken`] - Cooperative cancellation between dispatches
//!
//! # Numerical policy
//!
//! The host kernel runs in `f64`. GPU backends run in `f32` after shifting
//! coordinates to the geometry's bounding-box center, and may disagree with
//! the host only for samples within float noise of the boundary.
//!
//! # Example
//!
//! ```
//! use zone_kernel::{CancellationToken, ComputeBackend, CpuBackend, PointBatch, ZoneGeometry};
//! use zone_types::{Aabb, ContainmentFlag, Point3, SamplePoint, ZoneMesh};
//!
//! let left = ZoneMesh::from_box("left", &Aabb::new(Point3::new(0.0, 0.0, 0.0), Point3::new(1.0, 1.0, 1.0)));
//! let right = ZoneMesh::from_box("right", &Aabb::new(Point3::new(2.0, 0.0, 0.0), Point3::new(3.0, 1.0, 1.0)));
//! let geometry = ZoneGeometry::from_zones([left.triangles.as_slice(), right.triangles.as_slice()]).unwrap();
//!
//! let mut batch = PointBatch::new();
//! batch.push(SamplePoint::from_coords(0.5, 0.5, 0.5, 0), 0);
//! batch.push(SamplePoint::from_coords(0.5, 0.5, 0.5, 0), 1);
//!
//! let mut backend = CpuBackend::new();
//! let flags = backend
//!     .test_points_batched(&geometry, batch.points(), batch.zone_ids(), true, &CancellationToken::new())
//!     .unwrap();
//! assert_eq!(flags, vec![ContainmentFlag::Inside, ContainmentFlag::Outside]);
//! ```

#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]

mod backend;
mod batch;
mod cancel;
mod cpu;
mod error;
pub mod kernel;

pub use backend::{BackendProbe, ComputeBackend};
pub use batch::{PointBatch, ZoneGeometry, check_batch};
pub use cancel::CancellationToken;
pub use cpu::{CpuBackend, CpuProbe};
pub use error::{KernelError, KernelResult};
pub use kernel::DEFAULT_JITTER_SEED;
