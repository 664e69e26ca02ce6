//! Error types for classification runs.

use zone_estimate::EstimateError;
use zone_index::IndexError;
use zone_kernel::KernelError;

/// Errors that fail a classification run.
///
/// Cancellation is not an error: it is reported as
/// [`RunOutcome::Cancelled`](crate::RunOutcome::Cancelled).
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ClassifyError {
    /// The configuration is inconsistent.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The geometry source speaks an API version this engine cannot read.
    #[error("unsupported geometry source API version {found} (supported {min}..={max})")]
    UnsupportedApiVersion {
        /// Version reported by the source.
        found: u32,
        /// Oldest supported version.
        min: u32,
        /// Newest supported version.
        max: u32,
    },

    /// The geometry source failed to supply zones or targets.
    #[error("geometry source failed: {0}")]
    Source(String),

    /// The assignment sink rejected a write.
    #[error("assignment write failed for target {target}: {message}")]
    Sink {
        /// Id of the target being written.
        target: String,
        /// Message from the sink.
        message: String,
    },

    /// Every backend probe failed. The CPU probe never fails, so this only
    /// happens with a custom probe list.
    #[error("no compute backend available: {0}")]
    NoBackend(String),

    /// Candidate index failure.
    #[error(transparent)]
    Index(#[from] IndexError),

    /// Kernel or backend failure.
    #[error(transparent)]
    Kernel(#[from] KernelError),

    /// Preflight failure.
    #[error(transparent)]
    Estimate(#[from] EstimateError),
}

/// Result type for classification runs.
pub type ClassifyResult<T> = Result<T, ClassifyError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_api_version() {
        let err = ClassifyError::UnsupportedApiVersion {
            found: 9,
            min: 1,
            max: 1,
        };
        let msg = format!("{err}");
        assert!(msg.contains('9'));
        assert!(msg.contains("1..=1"));
    }

    #[test]
    fn test_kernel_errors_are_transparent() {
        let err: ClassifyError = KernelError::backend("wgpu", "device lost").into();
        let msg = format!("{err}");
        assert!(msg.contains("wgpu"));
        assert!(msg.contains("device lost"));
    }

    #[test]
    fn test_error_display_sink() {
        let err = ClassifyError::Sink {
            target: "duct-7".to_string(),
            message: "read-only".to_string(),
        };
        let msg = format!("{err}");
        assert!(msg.contains("duct-7"));
        assert!(msg.contains("read-only"));
    }
}
