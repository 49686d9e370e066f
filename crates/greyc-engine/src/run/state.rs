//! State shared between the controller and its workers.

use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::kernel::TileProgress;

/// Lifecycle of a run controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RunPhase {
    Idle = 0,
    Planning = 1,
    Dispatching = 2,
    Polling = 3,
    Completed = 4,
    Cancelled = 5,
    Failed = 6,
}

impl RunPhase {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => RunPhase::Planning,
            2 => RunPhase::Dispatching,
            3 => RunPhase::Polling,
            4 => RunPhase::Completed,
            5 => RunPhase::Cancelled,
            6 => RunPhase::Failed,
            _ => RunPhase::Idle,
        }
    }

    /// Whether no run is in flight.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RunPhase::Idle | RunPhase::Completed | RunPhase::Cancelled | RunPhase::Failed
        )
    }
}

/// Counters, flags and progress of one controller.
///
/// Every field is an atomic or guarded by its own lock so the controller
/// thread can poll while workers update.
#[derive(Debug)]
pub(crate) struct RunState {
    phase: AtomicU8,
    /// Held from `begin` until `finish`.
    busy: AtomicBool,
    stop_requested: AtomicBool,
    /// Set on a stop request or a failed tile; this is what kernels poll.
    halt: AtomicBool,
    tiles_total: AtomicUsize,
    tiles_completed: AtomicUsize,
    slots: Vec<TileProgress>,
    /// Highest overall percentage ever reported for the current run.
    reported: AtomicU8,
    active: Mutex<usize>,
    finished: Condvar,
}

impl RunState {
    pub fn new(max_workers: usize) -> Self {
        Self {
            phase: AtomicU8::new(RunPhase::Idle as u8),
            busy: AtomicBool::new(false),
            stop_requested: AtomicBool::new(false),
            halt: AtomicBool::new(false),
            tiles_total: AtomicUsize::new(0),
            tiles_completed: AtomicUsize::new(0),
            slots: (0..max_workers).map(|_| TileProgress::default()).collect(),
            reported: AtomicU8::new(0),
            active: Mutex::new(0),
            finished: Condvar::new(),
        }
    }

    /// Claim the state for a new run.
    ///
    /// Fails when a run is already in flight. On success everything left
    /// over from the previous run is cleared *before* the phase becomes
    /// `Planning`, so a stop accepted from then on sticks.
    pub fn begin(&self) -> bool {
        if self
            .busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return false;
        }
        self.reset();
        self.set_phase(RunPhase::Planning);
        true
    }

    /// Publish the terminal `phase` and release the state for the next run.
    pub fn finish(&self, phase: RunPhase) {
        self.set_phase(phase);
        self.busy.store(false, Ordering::SeqCst);
    }

    /// Clear flags, counters and progress. The phase is left alone.
    pub fn reset(&self) {
        self.stop_requested.store(false, Ordering::SeqCst);
        self.halt.store(false, Ordering::SeqCst);
        self.tiles_total.store(0, Ordering::SeqCst);
        self.tiles_completed.store(0, Ordering::SeqCst);
        self.reported.store(0, Ordering::SeqCst);
        self.slots.iter().for_each(TileProgress::reset);
    }

    pub fn phase(&self) -> RunPhase {
        RunPhase::from_u8(self.phase.load(Ordering::SeqCst))
    }

    pub fn set_phase(&self, phase: RunPhase) {
        self.phase.store(phase as u8, Ordering::SeqCst);
    }

    pub fn request_stop(&self) {
        self.stop_requested.store(true, Ordering::SeqCst);
        self.halt.store(true, Ordering::SeqCst);
    }

    pub fn stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::SeqCst)
    }

    /// Stop the remaining workers after a failure.
    pub fn abort(&self) {
        self.halt.store(true, Ordering::SeqCst);
    }

    pub fn halt_flag(&self) -> &AtomicBool {
        &self.halt
    }

    pub fn is_halted(&self) -> bool {
        self.halt.load(Ordering::SeqCst)
    }

    pub fn slot(&self, worker: usize) -> &TileProgress {
        &self.slots[worker]
    }

    /// Prepare counters for a pass over `tiles` tiles.
    pub fn begin_pass(&self, tiles: usize) {
        self.tiles_total.store(tiles, Ordering::SeqCst);
        self.tiles_completed.store(0, Ordering::SeqCst);
        self.slots.iter().for_each(TileProgress::reset);
    }

    pub fn tile_completed(&self) {
        self.tiles_completed.fetch_add(1, Ordering::SeqCst);
    }

    pub fn tiles_completed(&self) -> usize {
        self.tiles_completed.load(Ordering::SeqCst)
    }

    /// Completion of the current pass in percent.
    ///
    /// Finished tiles count fully; tiles in flight count by their slot.
    pub fn pass_percent(&self) -> f32 {
        let total = self.tiles_total.load(Ordering::SeqCst);
        if total == 0 {
            return 0.0;
        }
        let done = self.tiles_completed() as f32;
        let partial: f32 = self
            .slots
            .iter()
            .map(|slot| slot.basis_points() as f32 / 10_000.0)
            .sum();
        (100.0 * (done + partial) / total as f32).min(100.0)
    }

    /// Raise the reported percentage to at least `percent` and return the
    /// value to report. The result never decreases within a run.
    pub fn publish(&self, percent: u8) -> u8 {
        let percent = percent.min(100);
        let previous = self.reported.fetch_max(percent, Ordering::SeqCst);
        previous.max(percent)
    }

    pub fn reported(&self) -> u8 {
        self.reported.load(Ordering::SeqCst)
    }

    fn active(&self) -> MutexGuard<'_, usize> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn worker_started(&self) {
        *self.active() += 1;
    }

    pub fn worker_finished(&self) {
        let mut active = self.active();
        *active = active.saturating_sub(1);
        self.finished.notify_all();
    }

    pub fn active_workers(&self) -> usize {
        *self.active()
    }

    /// Block until every worker finished or `timeout` elapsed.
    ///
    /// Returns `true` when no worker is active.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let guard = self.active();
        let (guard, _) = self
            .finished
            .wait_timeout_while(guard, timeout, |active| *active > 0)
            .unwrap_or_else(PoisonError::into_inner);
        *guard == 0
    }
}

/// Cloneable handle that requests a stop of a running controller from any
/// thread, such as a signal handler or a watchdog.
#[derive(Debug, Clone)]
pub struct StopHandle {
    state: Arc<RunState>,
}

impl StopHandle {
    pub(crate) fn new(state: Arc<RunState>) -> Self {
        Self { state }
    }

    /// Ask the current run to stop. Has no effect when nothing is running.
    pub fn stop(&self) {
        if !self.state.phase().is_terminal() {
            self.state.request_stop();
        }
    }

    /// Whether a run is in flight.
    pub fn is_running(&self) -> bool {
        !self.state.phase().is_terminal()
    }
}
