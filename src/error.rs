use thiserror::Error;

/// Errors surfaced across the `stack()` boundary.
///
/// Per-frame failures inside a strategy or the warp stage are *not* reported
/// through this type — they exclude the offending frame and are recorded on
/// the [`crate::progress::Observer`] log channel instead. A `StackError` only
/// ever crosses the boundary when the whole call cannot produce a raster.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum StackError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("alignment failed ({strategy}): {reason}")]
    AlignmentFailed { strategy: &'static str, reason: String },

    #[error("degenerate point configuration")]
    Degenerate,

    #[error("operation cancelled")]
    Cancelled,

    #[error("no valid input frames to reduce")]
    NoValidInput,
}

pub type StackResult<T> = Result<T, StackError>;
