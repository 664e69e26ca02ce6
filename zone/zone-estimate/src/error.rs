//! Error types for preflight measurement and preset parsing.

use zone_index::IndexError;

/// Errors that can occur while measuring or estimating a run.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum EstimateError {
    /// Building or querying the candidate index failed.
    #[error("preflight index failed: {0}")]
    Index(#[from] IndexError),

    /// A preset name did not match any tier.
    #[error("unknown preset tier: {0:?}")]
    UnknownTier(String),
}

/// Result type for estimation operations.
pub type EstimateResult<T> = Result<T, EstimateError>;
