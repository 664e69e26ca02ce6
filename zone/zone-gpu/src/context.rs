//! The wgpu device shared by every containment backend in the process.
//!
//! Created on first use and never torn down. An adapter that cannot bind
//! the containment pipeline's five storage buffers counts as no adapter, so
//! the decision "this machine runs on the host" is made once.
//!
//! # Example
//!
//! ```no_run
//! use zone_gpu::context::GpuContext;
//!
//! match GpuContext::get() {
//!     Some(ctx) => println!(
//!         "{} can take {} points per dispatch",
//!         ctx.adapter_info.label(),
//!         ctx.limits.max_points_per_dispatch()
//!     ),
//!     None => println!("containment runs on the host"),
//! }
//! ```

use std::sync::OnceLock;

use tracing::{debug, info, warn};
use wgpu::{Device, DeviceDescriptor, Instance, Queue, RequestAdapterOptions};

use crate::buffers::{GpuPoint, GpuTriangle};
use crate::error::{GpuError, GpuResult};
use crate::wgpu_backend::WORKGROUP_SIZE;

/// Storage buffers bound by the containment shader: triangles, zone
/// ranges, points, zone ids and flags.
pub const CONTAINMENT_STORAGE_BUFFERS: u32 = 5;

static GPU_CONTEXT: OnceLock<Option<GpuContext>> = OnceLock::new();

/// The adapter a context runs on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GpuAdapterInfo {
    /// Adapter name as the driver reports it.
    pub name: String,
    /// Graphics API, e.g. `Vulkan`.
    pub backend: String,
    /// `DiscreteGpu`, `IntegratedGpu`, `Cpu` and so on.
    pub device_type: String,
}

impl From<&wgpu::AdapterInfo> for GpuAdapterInfo {
    fn from(info: &wgpu::AdapterInfo) -> Self {
        Self {
            name: info.name.clone(),
            backend: format!("{:?}", info.backend),
            device_type: format!("{:?}", info.device_type),
        }
    }
}

impl GpuAdapterInfo {
    /// `"name (backend)"`. Calibration keys use this, so two drivers on
    /// one card learn separate timings.
    #[must_use]
    pub fn label(&self) -> String {
        format!("{} ({})", self.name, self.backend)
    }
}

/// Device limits that bound a containment dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContainmentLimits {
    /// Largest storage binding, clamped to the largest buffer.
    pub binding_bytes: u64,
    /// Workgroups allowed along one dispatch dimension.
    pub workgroups_per_dimension: u32,
}

impl ContainmentLimits {
    fn from_device(limits: &wgpu::Limits) -> Self {
        Self {
            binding_bytes: u64::from(limits.max_storage_buffer_binding_size)
                .min(limits.max_buffer_size),
            workgroups_per_dimension: limits.max_compute_workgroups_per_dimension,
        }
    }

    /// Points one dispatch can hold. Bounded by the point binding and by a
    /// square grid of workgroups.
    #[must_use]
    pub fn max_points_per_dispatch(&self) -> u64 {
        let by_binding = self.binding_bytes / std::mem::size_of::<GpuPoint>() as u64;
        let per_row = u64::from(self.workgroups_per_dimension) * u64::from(WORKGROUP_SIZE);
        by_binding.min(per_row.saturating_mul(u64::from(self.workgroups_per_dimension)))
    }

    /// Triangles that fit the triangle binding.
    #[must_use]
    pub fn max_triangles(&self) -> u64 {
        self.binding_bytes / std::mem::size_of::<GpuTriangle>() as u64
    }
}

/// Device and queue for containment dispatches.
///
/// Only the device is shared. Each backend owns its buffers, so two runs
/// never read each other's geometry.
pub struct GpuContext {
    /// Device for buffers and pipelines.
    pub device: Device,
    /// Queue for uploads and dispatches.
    pub queue: Queue,
    /// Adapter the device was opened on.
    pub adapter_info: GpuAdapterInfo,
    /// Dispatch bounds of the opened device.
    pub limits: ContainmentLimits,
}

impl GpuContext {
    /// The process context, opened on first call.
    ///
    /// `None` when no adapter can run the containment pipeline.
    #[must_use]
    pub fn get() -> Option<&'static Self> {
        GPU_CONTEXT
            .get_or_init(|| match pollster::block_on(Self::open()) {
                Ok(ctx) => {
                    info!(
                        device = %ctx.adapter_info.label(),
                        kind = %ctx.adapter_info.device_type,
                        max_points = ctx.limits.max_points_per_dispatch(),
                        max_triangles = ctx.limits.max_triangles(),
                        "Containment device ready"
                    );
                    Some(ctx)
                }
                Err(e) => {
                    warn!(error = %e, "No containment device; using the host");
                    None
                }
            })
            .as_ref()
    }

    /// Like [`GpuContext::get`], as a result.
    ///
    /// # Errors
    ///
    /// Returns [`GpuError::NotAvailable`] without a usable adapter.
    pub fn try_get() -> GpuResult<&'static Self> {
        Self::get().ok_or(GpuError::NotAvailable)
    }

    /// Whether a usable adapter exists.
    #[must_use]
    pub fn is_available() -> bool {
        Self::get().is_some()
    }

    async fn open() -> GpuResult<Self> {
        let instance = Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });
        let adapter = instance
            .request_adapter(&RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                force_fallback_adapter: false,
                compatible_surface: None,
            })
            .await
            .ok_or(GpuError::NotAvailable)?;

        let info = GpuAdapterInfo::from(&adapter.get_info());
        let offered = adapter.limits();
        debug!(
            device = %info.label(),
            storage_buffers = offered.max_storage_buffers_per_shader_stage,
            binding_bytes = offered.max_storage_buffer_binding_size,
            "Adapter offered"
        );
        if offered.max_storage_buffers_per_shader_stage < CONTAINMENT_STORAGE_BUFFERS {
            return Err(GpuError::Execution(format!(
                "{} binds {} storage buffers per stage, containment needs {}",
                info.label(),
                offered.max_storage_buffers_per_shader_stage,
                CONTAINMENT_STORAGE_BUFFERS
            )));
        }

        // Whole-model triangle buffers outgrow the default 128 MiB binding.
        let required = wgpu::Limits {
            max_storage_buffer_binding_size: offered.max_storage_buffer_binding_size,
            max_buffer_size: offered.max_buffer_size,
            max_compute_workgroups_per_dimension: offered.max_compute_workgroups_per_dimension,
            max_storage_buffers_per_shader_stage: CONTAINMENT_STORAGE_BUFFERS,
            ..wgpu::Limits::downlevel_defaults()
        };
        let (device, queue) = adapter
            .request_device(
                &DeviceDescriptor {
                    label: Some("zone containment"),
                    required_features: wgpu::Features::empty(),
                    required_limits: required,
                    ..Default::default()
                },
                None,
            )
            .await
            .map_err(|e| GpuError::Execution(format!("{}: {e}", info.label())))?;

        let limits = ContainmentLimits::from_device(&device.limits());
        Ok(Self {
            device,
            queue,
            adapter_info: info,
            limits,
        })
    }

    /// Largest storage binding in bytes.
    #[must_use]
    pub const fn max_storage_buffer_size(&self) -> u64 {
        self.limits.binding_bytes
    }

    /// Workgroups allowed along one dispatch dimension.
    #[must_use]
    pub const fn max_workgroups_per_dimension(&self) -> u32 {
        self.limits.workgroups_per_dimension
    }
}

impl std::fmt::Debug for GpuContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GpuContext")
            .field("adapter_info", &self.adapter_info)
            .field("limits", &self.limits)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_is_decided_once() {
        let first = GpuContext::get();
        assert_eq!(first.is_some(), GpuContext::get().is_some());
        if let Some(ctx) = first {
            assert!(ctx.limits.max_points_per_dispatch() > 0);
            assert!(ctx.limits.max_triangles() > 0);
        }
    }

    #[test]
    fn label_names_device_and_api() {
        let info = GpuAdapterInfo {
            name: "Test GPU".to_string(),
            backend: "Vulkan".to_string(),
            device_type: "DiscreteGpu".to_string(),
        };
        assert_eq!(info.label(), "Test GPU (Vulkan)");
    }

    #[test]
    fn points_bounded_by_binding() {
        let point = std::mem::size_of::<GpuPoint>() as u64;
        let limits = ContainmentLimits {
            binding_bytes: 1000 * point,
            workgroups_per_dimension: 65_535,
        };
        assert_eq!(limits.max_points_per_dispatch(), 1000);
    }

    #[test]
    fn points_bounded_by_workgroup_grid() {
        let limits = ContainmentLimits {
            binding_bytes: u64::MAX,
            workgroups_per_dimension: 4,
        };
        assert_eq!(
            limits.max_points_per_dispatch(),
            4 * 4 * u64::from(WORKGROUP_SIZE)
        );
    }

    #[test]
    fn triangles_bounded_by_binding() {
        let triangle = std::mem::size_of::<GpuTriangle>() as u64;
        let limits = ContainmentLimits {
            binding_bytes: 10 * triangle + 1,
            workgroups_per_dimension: 1,
        };
        assert_eq!(limits.max_triangles(), 10);
    }
}
