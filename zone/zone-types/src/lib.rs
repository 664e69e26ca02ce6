//! Core value types for zone containment classification.
//!
//! This crate provides the foundational types shared by every zone crate:
//!
//! - [`Aabb`] - Normalized axis-aligned bounding box
//! - [`Triangle`] - A boundary triangle with `f64` vertices
//! - [`ZoneMesh`] and [`Target`] - What gets classified, and against what
//! - [`ZoneRange`] - A zone's slice of a flattened triangle buffer
//! - [`SamplePoint`] - A position to test plus its ray-jitter key
//! - [`ContainmentFlag`] - Outside / inside / uncertain verdict per sample
//!
//! # Layer 0 Crate
//!
//! This is a Layer 0 crate with **zero Bevy dependencies** and no GPU
//! dependencies.
//!
//! # Units
//!
//! This library is **unit-agnostic**. All coordinates are `f64`. The grid
//! sizing policy in `zone-index` assumes millimeters when it picks its
//! minimum cell size.
//!
//! # Example
//!
//! ```
//! use zone_types::{Aabb, Point3, Target, ZoneMesh};
//!
//! let zone = ZoneMesh::from_box(
//!     "level-1",
//!     &Aabb::new(Point3::new(0.0, 0.0, 0.0), Point3::new(10.0, 10.0, 3.0)),
//! );
//! let chair = Target::from_point("chair", Point3::new(2.0, 3.0, 0.5));
//!
//! let zone_bounds = zone.bounds().unwrap();
//! assert!(zone_bounds.intersects(&chair.bounds));
//! ```

#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]

mod bounds;
mod sample;
mod triangle;
mod zone;

pub use bounds::Aabb;
pub use sample::{ContainmentFlag, SamplePoint, ZoneRange};
pub use triangle::Triangle;
pub use zone::{Target, ZoneMesh};

// Re-export nalgebra types for convenience
pub use nalgebra::{Point3, Vector3};
