//! Run orchestration.
//!
//! A [`RunController`] owns the run state and drives the passes: for every
//! iteration it snapshots the image, plans the tiles, hands them to the
//! worker pool and polls the shared state until the pool drains, forwarding
//! overall progress to a [`ProgressSink`].

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use super::scheduler::{IterationJob, Scheduler, MAX_WORKERS};
use super::state::{RunPhase, RunState, StopHandle};
use crate::api::EngineError;
use crate::image::{ImageBuffer, InpaintMask};
use crate::kernel::{Parameters, Regularizer, TileKernel};
use crate::tile::{plan, TileWriter};

/// Largest accepted tile border.
pub const MAX_TILE_BORDER: usize = 16;

/// Receives overall progress in percent, from the controller's thread.
pub trait ProgressSink {
    fn report(&mut self, percent: u8);

    /// Called after iteration `iteration` (0-based) has been merged, with the
    /// image as it now stands. Not called for a cancelled or failed pass.
    fn iteration_done(&mut self, _iteration: usize, _image: &ImageBuffer) {}
}

impl<F: FnMut(u8)> ProgressSink for F {
    fn report(&mut self, percent: u8) {
        self(percent)
    }
}

/// Sink that drops every report.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn report(&mut self, _percent: u8) {}
}

/// How a run ended once it started.
#[derive(Debug, Clone, PartialEq)]
pub enum RunResult {
    /// Every iteration finished; the image holds the result.
    Completed,
    /// A stop was requested. Tiles merged before the stop remain.
    Cancelled,
    /// A tile failed; remaining tiles were not processed.
    Failed(EngineError),
}

impl RunResult {
    pub fn is_completed(&self) -> bool {
        matches!(self, RunResult::Completed)
    }
}

/// Tiling and scheduling settings of a run.
///
/// # Example
///
/// ```
/// use greyc_engine::RunConfig;
///
/// let config = RunConfig::new().tile_size(512).workers(4).iterations(2);
/// assert!(config.validate().is_ok());
/// assert!(RunConfig::new().tile_border(17).validate().is_err());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    /// Core tile side length; 0 disables tiling.
    pub tile_size: usize,
    /// Context margin read around each tile, `0..=16`.
    pub tile_border: usize,
    /// Worker threads, `1..=16`.
    pub workers: usize,
    /// Passes over the image, at least 1.
    pub iterations: usize,
    /// How long the controller sleeps between progress checks.
    pub poll_interval: Duration,
    /// Progress is forwarded every this many polls.
    pub report_every: u32,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            tile_size: 256,
            tile_border: 4,
            workers: 1,
            iterations: 1,
            poll_interval: Duration::from_millis(100),
            report_every: 10,
        }
    }
}

impl RunConfig {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn tile_size(mut self, size: usize) -> Self {
        self.tile_size = size;
        self
    }

    #[inline]
    pub fn tile_border(mut self, border: usize) -> Self {
        self.tile_border = border;
        self
    }

    #[inline]
    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    #[inline]
    pub fn iterations(mut self, iterations: usize) -> Self {
        self.iterations = iterations;
        self
    }

    #[inline]
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    #[inline]
    pub fn report_every(mut self, ticks: u32) -> Self {
        self.report_every = ticks;
        self
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        if self.tile_border > MAX_TILE_BORDER {
            return Err(EngineError::invalid(format!(
                "tile_border must be in 0..={}, got {}",
                MAX_TILE_BORDER, self.tile_border
            )));
        }
        if !(1..=MAX_WORKERS).contains(&self.workers) {
            return Err(EngineError::invalid(format!(
                "workers must be in 1..={}, got {}",
                MAX_WORKERS, self.workers
            )));
        }
        if self.iterations == 0 {
            return Err(EngineError::invalid("iterations must be at least 1"));
        }
        if self.poll_interval.is_zero() {
            return Err(EngineError::invalid("poll_interval must be positive"));
        }
        if self.report_every == 0 {
            return Err(EngineError::invalid("report_every must be at least 1"));
        }
        Ok(())
    }
}

/// Drives runs over images, one at a time.
///
/// # Example
///
/// ```
/// use greyc_engine::{ImageBuffer, Parameters, RunConfig, RunController, RunResult};
///
/// let mut image = ImageBuffer::filled(64, 48, 3, 128).unwrap();
/// let controller = RunController::new(RunConfig::new().tile_size(32).workers(2)).unwrap();
///
/// let mut last = 0;
/// let result = controller
///     .run(&mut image, &Parameters::default(), None, |p| last = p)
///     .unwrap();
/// assert_eq!(result, RunResult::Completed);
/// assert_eq!(last, 100);
/// ```
#[derive(Debug)]
pub struct RunController {
    config: RunConfig,
    scheduler: Scheduler,
    state: Arc<RunState>,
}

impl RunController {
    pub fn new(config: RunConfig) -> Result<Self, EngineError> {
        config.validate()?;
        let scheduler = Scheduler::new(config.workers)?;
        let state = Arc::new(RunState::new(config.workers));
        Ok(Self {
            config,
            scheduler,
            state,
        })
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Regularize `image` in place with the built-in kernel.
    ///
    /// `Err` is returned only for invalid input, before any work starts.
    pub fn run<S: ProgressSink>(
        &self,
        image: &mut ImageBuffer,
        params: &Parameters,
        mask: Option<&InpaintMask>,
        sink: S,
    ) -> Result<RunResult, EngineError> {
        self.run_with_kernel(image, params, mask, &Regularizer, sink)
    }

    /// Like [`run`](Self::run) with a caller-supplied kernel.
    pub fn run_with_kernel<S: ProgressSink>(
        &self,
        image: &mut ImageBuffer,
        params: &Parameters,
        mask: Option<&InpaintMask>,
        kernel: &dyn TileKernel,
        mut sink: S,
    ) -> Result<RunResult, EngineError> {
        params.validate()?;
        if let Some(mask) = mask {
            mask.check_matches(image)?;
        }
        let plan = plan(
            image.width(),
            image.height(),
            self.config.tile_size,
            self.config.tile_border,
        )?;
        if !self.state.begin() {
            return Err(EngineError::invalid("a run is already in progress"));
        }

        let started = Instant::now();
        info!(
            method = params.method_name(),
            width = image.width(),
            height = image.height(),
            channels = image.channels(),
            tiles = plan.len(),
            workers = self.scheduler.workers_for(&plan),
            iterations = self.config.iterations,
            masked = mask.is_some(),
            "run started"
        );

        let iterations = self.config.iterations;
        let mut result = RunResult::Completed;
        for iteration in 0..iterations {
            if self.state.stop_requested() {
                result = RunResult::Cancelled;
                break;
            }
            self.state.set_phase(RunPhase::Planning);
            let source = image.clone();
            let pass = match TileWriter::new(image, plan) {
                Ok(writer) => {
                    let job = IterationJob::new(
                        &source,
                        mask,
                        &writer,
                        kernel,
                        params,
                        &self.state,
                        iteration,
                    );
                    self.state.set_phase(RunPhase::Dispatching);
                    std::thread::scope(|scope| {
                        let handle = self.scheduler.dispatch(scope, &job);
                        self.state.set_phase(RunPhase::Polling);
                        self.poll(iteration, &mut sink);
                        handle.join()
                    })
                }
                Err(error) => Err(error),
            };

            if let Err(error) = pass {
                warn!(iteration, error = %error, "run failed");
                result = RunResult::Failed(error);
                break;
            }
            if self.state.stop_requested() {
                result = RunResult::Cancelled;
                break;
            }
            let percent = self.state.publish(overall(iteration + 1, 0, iterations));
            sink.report(percent);
            sink.iteration_done(iteration, image);
            info!(
                iteration = iteration + 1,
                of = iterations,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "iteration finished"
            );
        }

        let phase = match &result {
            RunResult::Completed => RunPhase::Completed,
            RunResult::Cancelled => {
                warn!(
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "run cancelled"
                );
                RunPhase::Cancelled
            }
            RunResult::Failed(_) => RunPhase::Failed,
        };
        self.state.finish(phase);
        info!(
            outcome = ?phase,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "run finished"
        );
        Ok(result)
    }

    /// Wait for the pool to drain, reporting every `report_every` ticks.
    fn poll<S: ProgressSink>(&self, iteration: usize, sink: &mut S) {
        let mut ticks: u32 = 0;
        while !self.state.wait_idle(self.config.poll_interval) {
            ticks = ticks.wrapping_add(1);
            if ticks % self.config.report_every == 0 {
                let pass = self.state.pass_percent() as usize;
                let percent = self
                    .state
                    .publish(overall(iteration, pass, self.config.iterations));
                debug!(iteration, percent, "progress");
                sink.report(percent);
            }
        }
    }

    /// Request the running run to stop. No effect when idle.
    pub fn stop(&self) {
        StopHandle::new(self.state.clone()).stop();
    }

    /// A handle other threads can use to stop runs of this controller.
    pub fn stop_handle(&self) -> StopHandle {
        StopHandle::new(self.state.clone())
    }

    pub fn phase(&self) -> RunPhase {
        self.state.phase()
    }

    /// Highest overall percentage reported for the current or last run.
    pub fn progress(&self) -> u8 {
        self.state.reported()
    }
}

/// Overall percentage after `iteration` full passes plus `pass` percent of
/// the next one.
fn overall(iteration: usize, pass: usize, iterations: usize) -> u8 {
    ((iteration * 100 + pass.min(100)) / iterations).min(100) as u8
}
