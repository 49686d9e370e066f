//! Worker pool for one pass over the tiles.
//!
//! Workers are scoped threads pulling tiles from a shared queue (the plan's
//! lazy iterator behind a mutex). Each worker extracts its tile, runs the
//! kernel on the private copy and commits the core through the
//! [`TileWriter`]. An empty queue ends a worker; a halt request ends it at the
//! next tile boundary.

use std::any::Any;
use std::cell::Cell;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Mutex, PoisonError};
use std::thread::{Scope, ScopedJoinHandle};

use tracing::{debug, trace};

use super::state::RunState;
use crate::api::EngineError;
use crate::image::{ImageBuffer, InpaintMask};
use crate::kernel::{KernelContext, Parameters, TileKernel, TileStatus};
use crate::tile::{Tile, TileBuffer, TilePlan, TileWriter, Tiles};

/// Upper bound on the worker count.
pub const MAX_WORKERS: usize = 16;

/// Everything the workers of one pass share.
pub(crate) struct IterationJob<'a, 'w> {
    source: &'a ImageBuffer,
    mask: Option<&'a InpaintMask>,
    writer: &'a TileWriter<'w>,
    kernel: &'a dyn TileKernel,
    params: &'a Parameters,
    state: &'a RunState,
    iteration: usize,
    queue: Mutex<Tiles>,
    failure: Mutex<Option<EngineError>>,
}

impl<'a, 'w> IterationJob<'a, 'w> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        source: &'a ImageBuffer,
        mask: Option<&'a InpaintMask>,
        writer: &'a TileWriter<'w>,
        kernel: &'a dyn TileKernel,
        params: &'a Parameters,
        state: &'a RunState,
        iteration: usize,
    ) -> Self {
        Self {
            source,
            mask,
            writer,
            kernel,
            params,
            state,
            iteration,
            queue: Mutex::new(writer.plan().iter()),
            failure: Mutex::new(None),
        }
    }

    fn next_tile(&self) -> Option<Tile> {
        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .next()
    }

    /// Keep the first failure; later ones are consequences of the abort.
    fn fail(&self, error: EngineError) {
        self.state.abort();
        let mut slot = self.failure.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_none() {
            *slot = Some(error);
        }
    }

    fn take_failure(&self) -> Option<EngineError> {
        self.failure
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

/// Fixed-size pool configuration.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Scheduler {
    workers: usize,
}

impl Scheduler {
    pub fn new(workers: usize) -> Result<Self, EngineError> {
        if !(1..=MAX_WORKERS).contains(&workers) {
            return Err(EngineError::invalid(format!(
                "workers must be in 1..={}, got {}",
                MAX_WORKERS, workers
            )));
        }
        Ok(Self { workers })
    }

    /// Threads used for `plan`: never more than there are tiles, and a
    /// single one when tiling is disabled.
    pub fn workers_for(&self, plan: &TilePlan) -> usize {
        if plan.is_untiled() {
            1
        } else {
            self.workers.min(plan.len()).max(1)
        }
    }

    /// Spawn the pool for `job` on `scope` and return without waiting.
    pub fn dispatch<'scope, 'env, 'w>(
        &self,
        scope: &'scope Scope<'scope, 'env>,
        job: &'env IterationJob<'env, 'w>,
    ) -> DispatchHandle<'scope, 'env, 'w> {
        let workers = self.workers_for(job.writer.plan());
        job.state.begin_pass(job.writer.plan().len());
        debug!(
            iteration = job.iteration,
            workers,
            tiles = job.writer.plan().len(),
            "dispatching"
        );
        let handles = (0..workers)
            .map(|id| {
                job.state.worker_started();
                scope.spawn(move || {
                    let _guard = ActiveGuard(job.state);
                    work(id, job);
                })
            })
            .collect();
        DispatchHandle { handles, job }
    }
}

/// Running pass; [`join`](Self::join) waits for every worker.
pub(crate) struct DispatchHandle<'scope, 'env, 'w> {
    handles: Vec<ScopedJoinHandle<'scope, ()>>,
    job: &'env IterationJob<'env, 'w>,
}

impl DispatchHandle<'_, '_, '_> {
    pub fn join(self) -> Result<(), EngineError> {
        for handle in self.handles {
            if let Err(payload) = handle.join() {
                self.job.fail(EngineError::KernelFailure {
                    tile: 0,
                    reason: panic_message(payload.as_ref()),
                });
            }
        }
        match self.job.take_failure() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

/// Marks a worker finished however it exits.
struct ActiveGuard<'a>(&'a RunState);

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.0.worker_finished();
    }
}

fn work(id: usize, job: &IterationJob<'_, '_>) {
    let current = Cell::new(0usize);
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| -> Result<(), EngineError> {
        while !job.state.is_halted() {
            let Some(tile) = job.next_tile() else {
                break;
            };
            current.set(tile.index);
            if !process(id, tile, job)? {
                break;
            }
            job.state.tile_completed();
        }
        Ok(())
    }));
    match outcome {
        Ok(Ok(())) => {}
        Ok(Err(error)) => job.fail(error),
        Err(payload) => job.fail(EngineError::KernelFailure {
            tile: current.get(),
            reason: panic_message(payload.as_ref()),
        }),
    }
}

/// Run one tile end to end. `Ok(false)` means the kernel was cancelled.
fn process(id: usize, tile: Tile, job: &IterationJob<'_, '_>) -> Result<bool, EngineError> {
    let failure = |reason: String| EngineError::KernelFailure {
        tile: tile.index,
        reason,
    };
    let slot = job.state.slot(id);
    slot.reset();

    let mut buffer = TileBuffer::extract(job.source, job.mask, tile)
        .map_err(|e| failure(e.to_string()))?;
    let ctx = KernelContext::new(job.params, job.iteration, slot, job.state.halt_flag());
    let status = job
        .kernel
        .apply(&mut buffer, &ctx)
        .map_err(|e| failure(e.to_string()))?;
    if status == TileStatus::Cancelled {
        trace!(worker = id, tile = tile.index, "tile cancelled");
        return Ok(false);
    }
    job.writer
        .commit(&buffer)
        .map_err(|e| failure(e.to_string()))?;
    slot.reset();
    trace!(worker = id, tile = tile.index, "tile committed");
    Ok(true)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("worker panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("worker panicked: {s}")
    } else {
        "worker panicked".to_string()
    }
}
