//! GPU error types for containment backends.
//!
//! Errors from both the wgpu backend and the native scene library end up
//! here. They convert into [`KernelError::Backend`] at the backend seam,
//! where they fail the run.

use thiserror::Error;
use zone_kernel::KernelError;

/// Errors that can occur during GPU operations.
///
/// # Example
///
/// ```
/// use zone_gpu::error::{GpuError, GpuResult};
///
/// fn check_gpu() -> GpuResult<()> {
///     Err(GpuError::NotAvailable)
/// }
/// assert!(check_gpu().is_err());
/// ```
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum GpuError {
    /// No compatible wgpu adapter was found.
    #[error("GPU not available: no compatible device found")]
    NotAvailable,

    /// A buffer would exceed `limits.max_storage_buffer_binding_size`.
    ///
    /// wgpu has no "free memory" query, so this is the only capacity
    /// failure that can be detected before allocating. It is fatal for the
    /// run.
    #[error("{what} buffer needs {required}B, device limit: {limit}B")]
    BatchTooLarge {
        /// Which buffer overflowed.
        what: &'static str,
        /// Required buffer size in bytes.
        required: u64,
        /// Device maximum storage buffer binding size in bytes.
        limit: u64,
    },

    /// GPU command submission or execution failed.
    #[error("GPU execution failed: {0}")]
    Execution(String),

    /// Reading results back from the GPU failed.
    #[error("buffer mapping failed: {0}")]
    BufferMapping(String),

    /// The native scene library could not be loaded or lacks a symbol.
    #[error("native scene library unavailable: {0}")]
    NativeLibrary(String),

    /// A native scene call returned a non-zero status.
    #[error("native scene call failed with status {status}: {message}")]
    Native {
        /// Status code returned by the library.
        status: i32,
        /// Text the library wrote into the error buffer.
        message: String,
    },
}

/// Result type for GPU operations.
pub type GpuResult<T> = Result<T, GpuError>;

impl From<GpuError> for KernelError {
    fn from(err: GpuError) -> Self {
        let backend = match &err {
            GpuError::NativeLibrary(_) | GpuError::Native { .. } => "scene",
            _ => "wgpu",
        };
        Self::backend(backend, err)
    }
}
