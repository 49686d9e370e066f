//! Run control: shared state, the worker pool and the controller that ties
//! them together.
//!
//! Lifecycle of one run:
//!
//! ```text
//! Idle -> Planning -> Dispatching -> Polling --+--> Completed
//!            ^                                 |--> Cancelled
//!            +----- next iteration ------------+--> Failed
//! ```

mod controller;
mod scheduler;
mod state;

pub use controller::{
    NoProgress, ProgressSink, RunConfig, RunController, RunResult, MAX_TILE_BORDER,
};
pub use scheduler::MAX_WORKERS;
pub use state::{RunPhase, StopHandle};
