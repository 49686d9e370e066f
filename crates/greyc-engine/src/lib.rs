//! greyc-engine: tiled, multithreaded anisotropic regularization
//!
//! This library denoises, smooths and inpaints 8-bit images with
//! tensor-directed diffusion (GREYCstoration style) or non-local patch
//! averaging. Large images are split into bordered tiles that a pool of
//! worker threads processes independently; a run controller repeats the pass
//! for the requested number of iterations, reports progress and honours
//! cooperative cancellation.
//!
//! # Quick Start
//!
//! The [`Restorer`] builder is the primary entry point:
//!
//! ```
//! use greyc_engine::{ImageBuffer, Restorer, RunResult};
//!
//! let mut image = ImageBuffer::filled(64, 64, 3, 120).unwrap();
//! let result = Restorer::new()
//!     .tile_size(32)
//!     .workers(2)
//!     .restore(&mut image)
//!     .unwrap();
//! assert_eq!(result, RunResult::Completed);
//! ```
//!
//! # Progress and cancellation
//!
//! A [`RunController`] runs on the calling thread. It forwards overall
//! progress (0 to 100, never decreasing) to a [`ProgressSink`], which any
//! `FnMut(u8)` closure implements. A [`StopHandle`] obtained before the run
//! stops it from another thread:
//!
//! ```
//! use greyc_engine::{ImageBuffer, Parameters, RunConfig, RunController};
//!
//! let controller = RunController::new(RunConfig::new().tile_size(16)).unwrap();
//! let stop = controller.stop_handle();
//!
//! let mut image = ImageBuffer::filled(32, 32, 1, 0).unwrap();
//! let mut seen = Vec::new();
//! controller
//!     .run(&mut image, &Parameters::default(), None, |p| seen.push(p))
//!     .unwrap();
//! assert!(!stop.is_running());
//! assert_eq!(seen.last(), Some(&100));
//! ```
//!
//! # Pipeline
//!
//! For every iteration:
//!
//! 1. the image is snapshotted so every tile reads the same source,
//! 2. [`plan()`] splits it into tiles (one tile when `tile_size` is 0),
//! 3. workers copy each tile with its border into a [`TileBuffer`],
//! 4. the [`TileKernel`] smooths the copy,
//! 5. the [`TileWriter`] commits the core back into the image.
//!
//! # Algorithms
//!
//! [`Parameters`] selects the variant:
//!
//! - [`DiffusionParams`]: structure-tensor guided line integral convolution,
//!   smoothing along contours and little across them
//! - [`PatchParams`]: non-local means over a search window
//!
//! With an [`InpaintMask`] only masked pixels change, which turns the
//! diffusion variant into an inpainting tool.

pub mod api;
pub mod image;
pub mod kernel;
pub mod run;
pub mod tile;

#[cfg(test)]
mod domain_tests;

pub use api::{EngineError, Restorer};
pub use image::{ImageBuffer, InpaintInit, InpaintMask, ResizeInit};
pub use kernel::{
    DiffusionParams, Interpolation, KernelContext, KernelError, Parameters, PatchParams,
    Regularizer, TileKernel, TileProgress, TileStatus,
};
pub use run::{
    NoProgress, ProgressSink, RunConfig, RunController, RunPhase, RunResult, StopHandle,
};
pub use tile::{plan, Rect, Tile, TileBuffer, TilePlan, TileWriter};
