//! Unified error type for the greyc-engine public API.
//!
//! [`EngineError`] covers the two failure classes of a run: arguments that
//! are rejected before any worker starts, and kernel failures that abort a
//! run in flight. Cooperative cancellation is not an error; it is reported
//! as [`RunResult::Cancelled`](crate::RunResult::Cancelled).

use thiserror::Error;

/// Unified error type for the greyc-engine public API.
///
/// # Example
///
/// ```
/// use greyc_engine::{plan, EngineError};
///
/// let err = plan(0, 10, 256, 4).unwrap_err();
/// assert!(matches!(err, EngineError::InvalidArgument(_)));
/// ```
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    /// Malformed tiling, run or algorithm parameters. Detected synchronously
    /// before any worker thread is spawned.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The regularization kernel could not process a tile. Fatal to the run.
    #[error("kernel failure on tile {tile}: {reason}")]
    KernelFailure {
        /// Index of the tile in its plan
        tile: usize,
        /// Human readable cause
        reason: String,
    },
}

impl EngineError {
    /// Shorthand for building an [`EngineError::InvalidArgument`].
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        EngineError::InvalidArgument(msg.into())
    }
}
