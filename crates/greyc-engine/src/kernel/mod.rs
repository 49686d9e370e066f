//! Regularization kernels.
//!
//! A kernel smooths one [`TileBuffer`] in place. It sees nothing but its own
//! tile, so the scheduler may run it on many tiles at once. Two variants are
//! built in and selected by [`Parameters`]:
//!
//! - **Diffusion**: tensor-directed smoothing. A structure tensor is built
//!   from the pre-blurred tile, turned into a diffusion tensor that favours
//!   smoothing along contours, and the tile is averaged along streamlines of
//!   that tensor field for a fan of directions (line integral convolution).
//! - **Patch-based**: non-local means. Each pixel becomes a weighted mean of
//!   the pixels in a search window whose surrounding patches look alike.
//!
//! # Calling contract
//!
//! - Only data inside the tile's bordered rectangle is read.
//! - Progress for the tile is reported through [`KernelContext::report()`]
//!   as a percentage in `0.0..=100.0`.
//! - [`KernelContext::should_stop()`] is polled at least once per tile; on a
//!   stop request the kernel returns [`TileStatus::Cancelled`] and the tile
//!   is discarded without being merged.
//! - With an inpainting mask only masked pixels change.

mod diffusion;
mod field;
mod params;
mod patch;
mod tensor;

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use thiserror::Error;

use crate::tile::TileBuffer;

pub use params::{DiffusionParams, Interpolation, Parameters, PatchParams};

/// Outcome of a kernel invocation that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileStatus {
    /// The tile buffer holds the regularized result.
    Done,
    /// A stop was requested; the buffer content is unspecified.
    Cancelled,
}

/// Errors a kernel can raise for one tile.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum KernelError {
    /// The computation diverged.
    #[error("non-finite value at ({x}, {y}) in channel {channel}")]
    NonFinite { x: usize, y: usize, channel: usize },

    /// A working buffer could not be allocated.
    #[error("cannot allocate {0} working samples")]
    Allocation(usize),

    #[error("{0}")]
    Failed(String),
}

/// Per-tile progress slot, in hundredths of a percent.
#[derive(Debug, Default)]
pub struct TileProgress(AtomicU32);

impl TileProgress {
    /// Record progress; values only move forward.
    pub fn set(&self, percent: f32) {
        let basis = (percent.clamp(0.0, 100.0) * 100.0).round() as u32;
        self.0.fetch_max(basis, Ordering::Relaxed);
    }

    /// Current progress in percent.
    pub fn get(&self) -> f32 {
        self.0.load(Ordering::Relaxed) as f32 / 100.0
    }

    pub(crate) fn basis_points(&self) -> u32 {
        self.0.load(Ordering::Relaxed)
    }

    pub(crate) fn reset(&self) {
        self.0.store(0, Ordering::Relaxed);
    }
}

/// Everything a kernel may consult besides its tile.
pub struct KernelContext<'a> {
    params: &'a Parameters,
    iteration: usize,
    progress: &'a TileProgress,
    halt: &'a AtomicBool,
}

impl<'a> KernelContext<'a> {
    pub fn new(
        params: &'a Parameters,
        iteration: usize,
        progress: &'a TileProgress,
        halt: &'a AtomicBool,
    ) -> Self {
        Self {
            params,
            iteration,
            progress,
            halt,
        }
    }

    #[inline]
    pub fn params(&self) -> &Parameters {
        self.params
    }

    /// Zero-based pass index within the run.
    #[inline]
    pub fn iteration(&self) -> usize {
        self.iteration
    }

    /// Report progress through this tile.
    #[inline]
    pub fn report(&self, percent: f32) {
        self.progress.set(percent);
    }

    /// Whether the run asked kernels to return early.
    #[inline]
    pub fn should_stop(&self) -> bool {
        self.halt.load(Ordering::Relaxed)
    }
}

/// A tile-local smoothing step.
///
/// Implementations must hold no shared mutable state of their own: the
/// scheduler calls `apply` concurrently on disjoint tile buffers.
pub trait TileKernel: Send + Sync {
    fn apply(&self, tile: &mut TileBuffer, ctx: &KernelContext<'_>)
        -> Result<TileStatus, KernelError>;
}

/// The built-in kernel, dispatching on the [`Parameters`] variant.
#[derive(Debug, Clone, Copy, Default)]
pub struct Regularizer;

impl TileKernel for Regularizer {
    fn apply(
        &self,
        tile: &mut TileBuffer,
        ctx: &KernelContext<'_>,
    ) -> Result<TileStatus, KernelError> {
        if ctx.should_stop() {
            return Ok(TileStatus::Cancelled);
        }
        if tile.is_fully_masked_out() {
            ctx.report(100.0);
            return Ok(TileStatus::Done);
        }
        let status = match ctx.params() {
            Parameters::Diffusion(p) => diffusion::regularize(tile, p, ctx)?,
            Parameters::PatchBased(p) => patch::denoise(tile, p, ctx)?,
        };
        if status == TileStatus::Done {
            ctx.report(100.0);
        }
        Ok(status)
    }
}
