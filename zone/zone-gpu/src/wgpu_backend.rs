//! General-purpose GPU backend running the WGSL containment kernel.
//!
//! One invocation tests one sample point against its zone's triangle range.
//! Geometry is uploaded once per distinct [`ZoneGeometry`] (keyed by its
//! content signature); points are streamed in chunks, with a cancellation
//! check before every dispatch.
//!
//! # Example
//!
//! ```no_run
//! use zone_gpu::WgpuBackend;
//! use zone_kernel::{CancellationToken, ComputeBackend};
//! use zone_types::{Aabb, Point3, SamplePoint, ZoneMesh};
//!
//! let cube = ZoneMesh::from_box("cube", &Aabb::new(Point3::new(0.0, 0.0, 0.0), Point3::new(1.0, 1.0, 1.0)));
//! let points = [SamplePoint::from_coords(0.5, 0.5, 0.5, 0)];
//!
//! match WgpuBackend::new() {
//!     Ok(mut gpu) => {
//!         let flags = gpu.test_points(&cube.triangles, &points, true, &CancellationToken::new());
//!         println!("{flags:?}");
//!     }
//!     Err(e) => eprintln!("no GPU: {e}"),
//! }
//! ```

use std::time::Instant;

use tracing::{debug, info, trace};
use wgpu::{BindGroupLayout, Buffer, BufferUsages, ComputePipeline};
use zone_kernel::kernel::{DET_EPSILON, HIT_EPSILON};
use zone_kernel::{
    CancellationToken, ComputeBackend, DEFAULT_JITTER_SEED, KernelError, KernelResult,
    ZoneGeometry, check_batch,
};
use zone_types::{ContainmentFlag, Point3, SamplePoint};

use crate::buffers::{
    GpuParams, GrowableBuffer, batch_origin, pack_points, pack_ranges, pack_triangles,
};
use crate::context::GpuContext;
use crate::error::{GpuError, GpuResult};

/// Shader source for the containment kernel.
const CONTAINMENT_SHADER: &str = include_str!("shaders/containment.wgsl");

/// Invocations per workgroup, matching `@workgroup_size` in the shader.
pub const WORKGROUP_SIZE: u32 = 64;

/// Barycentric edge-graze threshold used on the device.
///
/// The host threshold is far below `f32` resolution, so the device uses one
/// a little above `f32::EPSILON`.
pub const GPU_EDGE_EPSILON: f32 = 1e-6;

/// Default upper bound on points per dispatch.
pub const DEFAULT_MAX_POINTS_PER_DISPATCH: usize = 1 << 20;

/// Workgroup grid for a dispatch of `count` invocations.
///
/// `row_stride` is the number of invocations per grid row; the shader
/// recovers the linear index as `gid.x + gid.y * row_stride`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchDims {
    /// Workgroups along x.
    pub x: u32,
    /// Workgroups along y.
    pub y: u32,
    /// Invocations per row.
    pub row_stride: u32,
}

impl DispatchDims {
    /// Lay out `count` invocations, spilling into a second dimension when
    /// the workgroup count exceeds `max_per_dimension`.
    ///
    /// # Example
    ///
    /// ```
    /// use zone_gpu::wgpu_backend::DispatchDims;
    ///
    /// let dims = DispatchDims::for_count(1000, 65_535);
    /// assert_eq!((dims.x, dims.y), (16, 1));
    ///
    /// let dims = DispatchDims::for_count(64 * 10, 4);
    /// assert_eq!((dims.x, dims.y, dims.row_stride), (4, 3, 256));
    /// ```
    #[must_use]
    pub fn for_count(count: u32, max_per_dimension: u32) -> Self {
        let max = max_per_dimension.max(1);
        let workgroups = count.div_ceil(WORKGROUP_SIZE).max(1);
        if workgroups <= max {
            return Self {
                x: workgroups,
                y: 1,
                row_stride: workgroups * WORKGROUP_SIZE,
            };
        }
        Self {
            x: max,
            y: workgroups.div_ceil(max),
            row_stride: max.saturating_mul(WORKGROUP_SIZE),
        }
    }
}

/// Geometry currently resident on the device.
#[derive(Debug, Clone, Copy)]
struct Upload {
    signature: u64,
    origin: Point3<f64>,
    zone_count: u32,
}

/// Containment backend on a wgpu compute device.
pub struct WgpuBackend {
    ctx: &'static GpuContext,
    pipeline: ComputePipeline,
    bind_group_layout: BindGroupLayout,
    params: Buffer,
    triangles: GrowableBuffer,
    zones: GrowableBuffer,
    points: GrowableBuffer,
    zone_ids: GrowableBuffer,
    flags: GrowableBuffer,
    staging: GrowableBuffer,
    uploaded: Option<Upload>,
    seed: u32,
    device: String,
    max_points_per_dispatch: usize,
}

impl WgpuBackend {
    /// Create a backend on the process-wide device with the default seed.
    ///
    /// # Errors
    ///
    /// Returns [`GpuError::NotAvailable`] when no adapter exists.
    pub fn new() -> GpuResult<Self> {
        Self::with_seed(DEFAULT_JITTER_SEED)
    }

    /// Create a backend with an explicit jitter seed.
    ///
    /// # Errors
    ///
    /// Returns [`GpuError::NotAvailable`] when no adapter exists.
    pub fn with_seed(seed: u32) -> GpuResult<Self> {
        let ctx = GpuContext::try_get()?;
        debug!("Creating containment compute pipeline");

        let shader = ctx
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some("containment"),
                source: wgpu::ShaderSource::Wgsl(CONTAINMENT_SHADER.into()),
            });

        let bind_group_layout =
            ctx.device
                .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                    label: Some("containment_bind_group_layout"),
                    entries: &[
                        layout_entry(0, wgpu::BufferBindingType::Uniform),
                        storage_entry(1, true),
                        storage_entry(2, true),
                        storage_entry(3, true),
                        storage_entry(4, true),
                        storage_entry(5, false),
                    ],
                });

        let pipeline_layout = ctx
            .device
            .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("containment_pipeline_layout"),
                bind_group_layouts: &[&bind_group_layout],
                push_constant_ranges: &[],
            });

        let pipeline = ctx
            .device
            .create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some("containment_pipeline"),
                layout: Some(&pipeline_layout),
                module: &shader,
                entry_point: Some("classify_points"),
                compilation_options: wgpu::PipelineCompilationOptions::default(),
                cache: None,
            });

        let params = ctx.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("containment_params"),
            size: std::mem::size_of::<GpuParams>() as u64,
            usage: BufferUsages::UNIFORM | BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let input = BufferUsages::STORAGE | BufferUsages::COPY_DST;
        Ok(Self {
            ctx,
            pipeline,
            bind_group_layout,
            params,
            triangles: GrowableBuffer::new(ctx, "triangle", input),
            zones: GrowableBuffer::new(ctx, "zone range", input),
            points: GrowableBuffer::new(ctx, "point", input),
            zone_ids: GrowableBuffer::new(ctx, "zone id", input),
            flags: GrowableBuffer::new(
                ctx,
                "flag",
                BufferUsages::STORAGE | BufferUsages::COPY_SRC,
            ),
            staging: GrowableBuffer::new(
                ctx,
                "flag staging",
                BufferUsages::MAP_READ | BufferUsages::COPY_DST,
            ),
            uploaded: None,
            seed,
            device: ctx.adapter_info.label(),
            max_points_per_dispatch: DEFAULT_MAX_POINTS_PER_DISPATCH,
        })
    }

    /// Limit the number of points per dispatch (at least 1).
    #[must_use]
    pub fn with_max_points_per_dispatch(mut self, max: usize) -> Self {
        self.max_points_per_dispatch = max.max(1);
        self
    }

    /// Points per dispatch after applying device limits.
    fn chunk_len(&self) -> usize {
        let by_limit =
            usize::try_from(self.ctx.limits.max_points_per_dispatch()).unwrap_or(usize::MAX);
        self.max_points_per_dispatch.min(by_limit).max(1)
    }

    /// Upload `geometry` unless it is already resident.
    fn upload_geometry(&mut self, geometry: &ZoneGeometry) -> GpuResult<Upload> {
        if let Some(upload) = self.uploaded.filter(|u| u.signature == geometry.signature()) {
            trace!(signature = upload.signature, "Geometry already resident");
            return Ok(upload);
        }

        let origin = batch_origin(geometry);
        let triangles = pack_triangles(geometry, &origin);
        let ranges = pack_ranges(geometry, &origin);
        let triangle_bytes: &[u8] = bytemuck::cast_slice(&triangles);
        let range_bytes: &[u8] = bytemuck::cast_slice(&ranges);

        self.triangles.ensure(self.ctx, triangle_bytes.len() as u64)?;
        self.zones.ensure(self.ctx, range_bytes.len() as u64)?;
        if !triangle_bytes.is_empty() {
            self.ctx
                .queue
                .write_buffer(self.triangles.buffer(), 0, triangle_bytes);
        }
        if !range_bytes.is_empty() {
            self.ctx.queue.write_buffer(self.zones.buffer(), 0, range_bytes);
        }

        let zone_count = u32::try_from(ranges.len()).map_err(|_| GpuError::BatchTooLarge {
            what: "zone range",
            required: ranges.len() as u64,
            limit: u64::from(u32::MAX),
        })?;
        let upload = Upload {
            signature: geometry.signature(),
            origin,
            zone_count,
        };
        info!(
            triangles = triangles.len(),
            zones = zone_count,
            bytes = triangle_bytes.len() + range_bytes.len(),
            "Uploaded zone geometry to GPU"
        );
        self.uploaded = Some(upload);
        Ok(upload)
    }

    /// Run one dispatch over `points` and read the flags back.
    #[allow(clippy::cast_possible_truncation)] // chunk_len bounds the count
    fn dispatch(
        &mut self,
        upload: &Upload,
        points: &[SamplePoint],
        zone_ids: &[u32],
        two_rays: bool,
        out: &mut Vec<ContainmentFlag>,
    ) -> GpuResult<()> {
        let count = points.len() as u32;
        let gpu_points = pack_points(points, &upload.origin);
        let point_bytes: &[u8] = bytemuck::cast_slice(&gpu_points);
        let id_bytes: &[u8] = bytemuck::cast_slice(zone_ids);
        let flag_bytes = u64::from(count) * 4;

        self.points.ensure(self.ctx, point_bytes.len() as u64)?;
        self.zone_ids.ensure(self.ctx, id_bytes.len() as u64)?;
        self.flags.ensure(self.ctx, flag_bytes)?;
        self.staging.ensure(self.ctx, flag_bytes)?;

        let dims = DispatchDims::for_count(count, self.ctx.max_workgroups_per_dimension());
        let params = GpuParams {
            point_count: count,
            zone_count: upload.zone_count,
            two_rays: u32::from(two_rays),
            seed: self.seed,
            row_stride: dims.row_stride,
            hit_epsilon: HIT_EPSILON as f32,
            det_epsilon: DET_EPSILON as f32,
            edge_epsilon: GPU_EDGE_EPSILON,
        };

        let queue = &self.ctx.queue;
        queue.write_buffer(&self.params, 0, bytemuck::bytes_of(&params));
        queue.write_buffer(self.points.buffer(), 0, point_bytes);
        queue.write_buffer(self.zone_ids.buffer(), 0, id_bytes);

        let bind_group = self
            .ctx
            .device
            .create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("containment_bind_group"),
                layout: &self.bind_group_layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: self.params.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: self.triangles.buffer().as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: self.zones.buffer().as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 3,
                        resource: self.points.buffer().as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 4,
                        resource: self.zone_ids.buffer().as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 5,
                        resource: self.flags.buffer().as_entire_binding(),
                    },
                ],
            });

        let mut encoder = self
            .ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("containment_encoder"),
            });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("containment_pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.dispatch_workgroups(dims.x, dims.y, 1);
        }
        encoder.copy_buffer_to_buffer(
            self.flags.buffer(),
            0,
            self.staging.buffer(),
            0,
            flag_bytes,
        );
        queue.submit([encoder.finish()]);

        let slice = self.staging.buffer().slice(..flag_bytes);
        let (sender, receiver) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            drop(sender.send(result));
        });
        self.ctx.device.poll(wgpu::Maintain::Wait);

        receiver
            .recv()
            .map_err(|e| GpuError::BufferMapping(format!("channel recv failed: {e}")))?
            .map_err(|e| GpuError::BufferMapping(format!("{e:?}")))?;

        {
            let data = slice.get_mapped_range();
            let raw: &[u32] = bytemuck::cast_slice(&data);
            out.extend(raw.iter().map(|&r| ContainmentFlag::from_raw(r)));
        }
        self.staging.buffer().unmap();

        trace!(
            points = count,
            workgroups_x = dims.x,
            workgroups_y = dims.y,
            "GPU containment dispatch done"
        );
        Ok(())
    }
}

impl ComputeBackend for WgpuBackend {
    fn name(&self) -> &str {
        "wgpu"
    }

    fn device(&self) -> &str {
        &self.device
    }

    fn jitter_seed(&self) -> u32 {
        self.seed
    }

    fn set_jitter_seed(&mut self, seed: u32) {
        self.seed = seed;
    }

    fn test_points_batched(
        &mut self,
        geometry: &ZoneGeometry,
        points: &[SamplePoint],
        point_zone_ids: &[u32],
        two_rays: bool,
        cancel: &CancellationToken,
    ) -> KernelResult<Vec<ContainmentFlag>> {
        check_batch(points, point_zone_ids)?;
        if points.is_empty() {
            return Ok(Vec::new());
        }
        if cancel.is_cancelled() {
            return Err(KernelError::Cancelled);
        }

        let start = Instant::now();
        let upload = self.upload_geometry(geometry)?;
        let chunk = self.chunk_len();

        let mut flags = Vec::with_capacity(points.len());
        for (chunk_points, chunk_ids) in points.chunks(chunk).zip(point_zone_ids.chunks(chunk)) {
            if cancel.is_cancelled() {
                return Err(KernelError::Cancelled);
            }
            self.dispatch(&upload, chunk_points, chunk_ids, two_rays, &mut flags)?;
        }

        debug!(
            points = points.len(),
            two_rays,
            time_ms = start.elapsed().as_secs_f64() * 1000.0,
            "GPU containment batch done"
        );
        Ok(flags)
    }

    fn reset(&mut self) {
        self.uploaded = None;
    }
}

impl std::fmt::Debug for WgpuBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WgpuBackend")
            .field("device", &self.device)
            .field("seed", &self.seed)
            .field("triangles", &self.triangles)
            .field("points", &self.points)
            .finish_non_exhaustive()
    }
}

fn layout_entry(binding: u32, ty: wgpu::BufferBindingType) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

fn storage_entry(binding: u32, read_only: bool) -> wgpu::BindGroupLayoutEntry {
    layout_entry(binding, wgpu::BufferBindingType::Storage { read_only })
}
