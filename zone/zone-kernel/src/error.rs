//! Error types for kernel and backend operations.

/// Errors from building batches or running a compute backend.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum KernelError {
    /// `point_zone_ids` must have one entry per sample point.
    #[error("batch has {points} points but {zone_ids} zone ids")]
    InvalidBatch {
        /// Number of sample points.
        points: usize,
        /// Number of zone ids.
        zone_ids: usize,
    },

    /// A zone range reaches past the end of the triangle buffer.
    #[error("zone {zone} ends at triangle {end}, buffer holds {total}")]
    RangeOutOfBounds {
        /// Index of the offending zone.
        zone: usize,
        /// One past the zone's last triangle.
        end: u64,
        /// Triangles in the flattened buffer.
        total: usize,
    },

    /// Two zones claim the same triangles.
    #[error("zones {first} and {second} have overlapping triangle ranges")]
    OverlappingRanges {
        /// Index of the first zone.
        first: usize,
        /// Index of the second zone.
        second: usize,
    },

    /// Triangle and point indices are 32-bit on every backend.
    #[error("too many {what} for one batch: {count}, max supported: {max}")]
    TooLarge {
        /// What overflowed ("triangles", "zones" or "points").
        what: &'static str,
        /// Requested count.
        count: usize,
        /// Maximum supported count.
        max: usize,
    },

    /// The run was cancelled before the dispatch was issued.
    #[error("cancelled")]
    Cancelled,

    /// A backend failed while executing a dispatch.
    ///
    /// Backend failures are not retried; they fail the run.
    #[error("{backend} backend failed: {message}")]
    Backend {
        /// Name of the backend that failed.
        backend: String,
        /// Backend-specific description.
        message: String,
    },
}

impl KernelError {
    /// Wrap a backend-specific failure.
    #[must_use]
    pub fn backend(backend: impl Into<String>, message: impl ToString) -> Self {
        Self::Backend {
            backend: backend.into(),
            message: message.to_string(),
        }
    }
}

/// Result type for kernel operations.
pub type KernelResult<T> = Result<T, KernelError>;
