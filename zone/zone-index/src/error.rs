//! Error types for spatial index operations.

/// Errors that can occur while building or querying the spatial index.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum IndexError {
    /// The cell size must be positive and finite.
    #[error("cell size must be positive and finite, got {0}")]
    InvalidCellSize(f64),

    /// A stamp array was created for a different grid.
    ///
    /// [`CandidateStamps`](crate::CandidateStamps) must be sized to the
    /// number of targets the grid was built from.
    #[error("candidate stamps sized for {actual} targets, grid holds {expected}")]
    StampSizeMismatch {
        /// Number of targets in the grid.
        expected: usize,
        /// Number of slots in the stamp array.
        actual: usize,
    },

    /// The grid can only address `u32::MAX` targets.
    #[error("too many targets for the spatial index: {count}, max supported: {max}")]
    TooManyTargets {
        /// Number of targets supplied.
        count: usize,
        /// Maximum supported targets.
        max: usize,
    },
}

/// Result type for spatial index operations.
pub type IndexResult<T> = Result<T, IndexError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_invalid_cell_size() {
        let err = IndexError::InvalidCellSize(-2.5);
        let msg = format!("{err}");
        assert!(msg.contains("-2.5"));
    }

    #[test]
    fn test_error_display_stamp_mismatch() {
        let err = IndexError::StampSizeMismatch {
            expected: 10,
            actual: 4,
        };
        let msg = format!("{err}");
        assert!(msg.contains("10"));
        assert!(msg.contains('4'));
    }
}
