//! GPU containment backends.
//!
//! Two interchangeable implementations of
//! [`ComputeBackend`](zone_kernel::ComputeBackend):
//!
//! - [`WgpuBackend`] - a WGSL compute kernel on any wgpu adapter (Vulkan,
//!   Metal, DX12). One invocation per sample point.
//! - [`SceneBackend`] - a native scene library loaded from a plugin
//!   directory, which keeps an acceleration structure over all zones for the
//!   lifetime of the geometry.
//!
//! Both narrow coordinates to `f32` after shifting them by the geometry's
//! bounding-box center, and both agree with
//! [`CpuBackend`](zone_kernel::CpuBackend) away from zone surfaces.
//!
//! # GPU Availability
//!
//! The wgpu device is detected once per process. Use
//! [`GpuContext::is_available()`] to check, or go through the probes
//! ([`WgpuProbe`], [`SceneProbe`]) which turn every failure into a reason
//! string for backend selection.
//!
//! # Example
//!
//! ```no_run
//! use zone_gpu::{SceneProbe, WgpuProbe};
//! use zone_kernel::{BackendProbe, CpuProbe};
//!
//! let probes: Vec<Box<dyn BackendProbe>> = vec![
//!     Box::new(SceneProbe::new(None)),
//!     Box::new(WgpuProbe::default()),
//!     Box::new(CpuProbe::default()),
//! ];
//! for probe in &probes {
//!     match probe.try_create() {
//!         Ok(backend) => {
//!             println!("using {} on {}", backend.name(), backend.device());
//!             break;
//!         }
//!         Err(reason) => println!("{} unavailable: {reason}", probe.name()),
//!     }
//! }
//! ```
//!
//! # Running Benchmarks
//!
//! ```bash
//! cargo bench -p zone-gpu
//! ```

#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]

pub mod buffers;
pub mod context;
pub mod error;
pub mod native;
pub mod probe;
pub mod scene;
pub mod wgpu_backend;

pub use context::{ContainmentLimits, GpuAdapterInfo, GpuContext};
pub use error::{GpuError, GpuResult};
pub use probe::{SceneProbe, WgpuProbe};
pub use scene::SceneBackend;
pub use wgpu_backend::WgpuBackend;

pub use buffers::{GpuParams, GpuPoint, GpuTriangle, GpuZoneRange};
