//! Run control state machine and status tracking (§3, §4.4)
//!
//! Mirrors `picodaqa.BufferMan`'s `start`/`pause`/`resume`/`stop`/`end`
//! methods and its periodic `reportStatus`, rewritten around explicit atomic
//! flags and a command channel instead of a shared multiprocessing
//! `Value`/`Queue` pair (§5.1).

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver, Sender};
use parking_lot::Mutex;
use tracing::{info, warn};

use crate::constants::{END_TEARDOWN_WAIT_MS, RATE_UPDATE_PERIOD, STATUS_REPORT_DIVISOR, STOP_PROPAGATION_WAIT_MS};
use crate::error::{DaqError, Result};

/// Lifecycle states (§4.4), in the order the reference program visits them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Init,
    Started,
    Running,
    Paused,
    Stopped,
    Ended,
}

/// External run-control commands, named after the single-letter commands
/// `picodaqa.BufferMan.readCommands` accepts on its command queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunCommand {
    /// `P`: suspend acquisition without tearing down threads.
    Pause,
    /// `R`: resume acquisition after a pause.
    Resume,
    /// `S`: stop acquisition and flush the run summary.
    Stop,
    /// `E`: tear down worker threads and end the run.
    End,
}

/// The two flags producer and dispatcher threads poll on every iteration
/// (§5.1). `active` gates whether threads should keep running at all;
/// `running` additionally gates whether the producer should be acquiring.
#[derive(Default)]
pub struct RunFlags {
    active: AtomicBool,
    running: AtomicBool,
}

impl RunFlags {
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn set_active(&self, value: bool) {
        self.active.store(value, Ordering::Release);
    }

    pub fn set_running(&self, value: bool) {
        self.running.store(value, Ordering::Release);
    }
}

/// A point-in-time view of run progress (`getStatus`/`reportStatus`).
#[derive(Debug, Clone, Copy)]
pub struct RunStatsSnapshot {
    pub n_triggers: u64,
    pub trigger_rate_hz: f64,
    pub life_fraction: f64,
    pub elapsed_secs: f64,
    /// Run-relative timestamp of the most recent trigger (`tTrig`).
    pub t_trig_secs: f64,
    /// Cumulative live time, seconds (`tLife`).
    pub t_life_secs: f64,
    /// Ring-buffer occupancy at the last sample, percent.
    pub buffer_fill_percent: f64,
}

/// The full status tuple the periodic status reporter publishes (§4.4),
/// matching `picodaqa.BufferMan.reportStatus`'s `(running, runDuration,
/// nTrig, tTrig, tLife, readRate, lifeFrac, bufferFillPercent)`.
#[derive(Debug, Clone, Copy)]
pub struct RunStatusInfo {
    pub running: bool,
    pub run_duration_secs: f64,
    pub n_triggers: u64,
    pub t_trig_secs: f64,
    pub t_life_secs: f64,
    pub read_rate_hz: f64,
    pub life_fraction: f64,
    pub buffer_fill_percent: f64,
}

struct RateWindow {
    triggers_at_mark: u64,
    instant_at_mark: Instant,
    live_secs_at_mark: f64,
    last_rate_hz: f64,
    last_life_fraction: f64,
}

/// Running counters updated by the producer on every trigger and read back
/// by the status reporter and the final summary (`lifeFrac`/`readRate`).
pub struct RunStats {
    n_triggers: AtomicU64,
    accumulated_live_secs: Mutex<f64>,
    start: Mutex<Option<Instant>>,
    rate: Mutex<RateWindow>,
    last_trigger_secs: Mutex<f64>,
    buffer_fill_percent: Mutex<f64>,
}

impl Default for RunStats {
    fn default() -> Self {
        Self {
            n_triggers: AtomicU64::new(0),
            accumulated_live_secs: Mutex::new(0.0),
            start: Mutex::new(None),
            rate: Mutex::new(RateWindow {
                triggers_at_mark: 0,
                instant_at_mark: Instant::now(),
                live_secs_at_mark: 0.0,
                last_rate_hz: 0.0,
                last_life_fraction: 0.0,
            }),
            last_trigger_secs: Mutex::new(0.0),
            buffer_fill_percent: Mutex::new(0.0),
        }
    }
}

impl RunStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the run's start instant (`BMT0`).
    pub fn mark_started(&self) {
        *self.start.lock() = Some(Instant::now());
    }

    /// Record one trigger's worth of live time, recomputing the rolling
    /// rate and live fraction every [`RATE_UPDATE_PERIOD`] triggers, the way
    /// the reference program recomputes `readRate` periodically rather than
    /// on every event.
    pub fn record_trigger(&self, live_time_delta: f64) {
        let n = self.n_triggers.fetch_add(1, Ordering::Relaxed) + 1;
        let accumulated = {
            let mut guard = self.accumulated_live_secs.lock();
            *guard += live_time_delta;
            *guard
        };
        *self.last_trigger_secs.lock() = self.start.lock().map(|t| t.elapsed().as_secs_f64()).unwrap_or(0.0);
        if n % RATE_UPDATE_PERIOD != 0 {
            return;
        }
        let now = Instant::now();
        let mut window = self.rate.lock();
        let elapsed = now.duration_since(window.instant_at_mark).as_secs_f64();
        if elapsed > 0.0 {
            let delta_triggers = n - window.triggers_at_mark;
            window.last_rate_hz = delta_triggers as f64 / elapsed;
            let delta_live = accumulated - window.live_secs_at_mark;
            window.last_life_fraction = (delta_live / elapsed).clamp(0.0, 1.0);
        }
        window.triggers_at_mark = n;
        window.instant_at_mark = now;
        window.live_secs_at_mark = accumulated;
    }

    /// Record the ring buffer's occupancy, as a percentage, at the moment a
    /// slot was just published (`bufferFillPercent`).
    pub fn update_buffer_fill_percent(&self, percent: f64) {
        *self.buffer_fill_percent.lock() = percent;
    }

    /// Current snapshot, for the status reporter and the final summary.
    pub fn snapshot(&self) -> RunStatsSnapshot {
        let elapsed_secs = self.start.lock().map(|t| t.elapsed().as_secs_f64()).unwrap_or(0.0);
        let window = self.rate.lock();
        RunStatsSnapshot {
            n_triggers: self.n_triggers.load(Ordering::Relaxed),
            trigger_rate_hz: window.last_rate_hz,
            life_fraction: window.last_life_fraction,
            elapsed_secs,
            t_trig_secs: *self.last_trigger_secs.lock(),
            t_life_secs: *self.accumulated_live_secs.lock(),
            buffer_fill_percent: *self.buffer_fill_percent.lock(),
        }
    }
}

/// The run-control state machine (§4.4): `Init -> Started -> Running`, then
/// `Running <-> Paused` any number of times, then `Stopped -> Ended`.
pub struct RunController {
    state: Mutex<RunState>,
    flags: Arc<RunFlags>,
    stats: Arc<RunStats>,
    command_tx: Sender<RunCommand>,
    command_rx: Receiver<RunCommand>,
    pause_started_at: Mutex<Option<Instant>>,
    accumulated_pause_secs: Mutex<f64>,
}

impl Default for RunController {
    fn default() -> Self {
        let (command_tx, command_rx) = bounded(8);
        Self {
            state: Mutex::new(RunState::Init),
            flags: Arc::new(RunFlags::default()),
            stats: Arc::new(RunStats::new()),
            command_tx,
            command_rx,
            pause_started_at: Mutex::new(None),
            accumulated_pause_secs: Mutex::new(0.0),
        }
    }
}

impl RunController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flags producer and dispatcher threads poll.
    pub fn flags(&self) -> Arc<RunFlags> {
        self.flags.clone()
    }

    /// Trigger counters, shared with the producer.
    pub fn stats(&self) -> Arc<RunStats> {
        self.stats.clone()
    }

    /// A sender external controllers (CLI, signal handler, ...) use to post
    /// `P`/`R`/`S`/`E` commands.
    pub fn command_sender(&self) -> Sender<RunCommand> {
        self.command_tx.clone()
    }

    pub fn state(&self) -> RunState {
        *self.state.lock()
    }

    /// `INIT -> STARTED -> RUNNING`: arm the flags and mark the clock.
    pub fn start(&self) -> Result<()> {
        let mut state = self.state.lock();
        if *state != RunState::Init {
            return Err(DaqError::run_control("start() called outside INIT"));
        }
        *state = RunState::Started;
        self.stats.mark_started();
        self.flags.set_active(true);
        self.flags.set_running(true);
        *state = RunState::Running;
        info!("run started");
        Ok(())
    }

    /// `RUNNING -> PAUSED`.
    pub fn pause(&self) -> Result<()> {
        let mut state = self.state.lock();
        if *state != RunState::Running {
            return Err(DaqError::run_control("pause() called outside RUNNING"));
        }
        self.flags.set_running(false);
        *self.pause_started_at.lock() = Some(Instant::now());
        *state = RunState::Paused;
        info!("run paused");
        Ok(())
    }

    /// `PAUSED -> RUNNING`, accumulating the elapsed pause time (`dTPause`).
    pub fn resume(&self) -> Result<()> {
        let mut state = self.state.lock();
        if *state != RunState::Paused {
            return Err(DaqError::run_control("resume() called outside PAUSED"));
        }
        if let Some(paused_at) = self.pause_started_at.lock().take() {
            *self.accumulated_pause_secs.lock() += paused_at.elapsed().as_secs_f64();
        }
        self.flags.set_running(true);
        *state = RunState::Running;
        info!("run resumed");
        Ok(())
    }

    /// `RUNNING`/`PAUSED -> STOPPED`: stop acquiring, wait for in-flight
    /// events to propagate through the dispatcher, then flush the summary.
    pub fn stop(&self) -> Result<()> {
        let mut state = self.state.lock();
        if !matches!(*state, RunState::Running | RunState::Paused) {
            return Err(DaqError::run_control("stop() called outside RUNNING/PAUSED"));
        }
        self.flags.set_running(false);
        thread::sleep(Duration::from_millis(STOP_PROPAGATION_WAIT_MS));
        self.print_summary();
        *state = RunState::Stopped;
        info!("run stopped");
        Ok(())
    }

    /// Tear down worker threads and end the run. Idempotent: calling `end()`
    /// from `ENDED` is a no-op, matching the reference program's defensive
    /// `if self.flagActive.value:` guard.
    pub fn end(&self) -> Result<()> {
        let mut state = self.state.lock();
        if *state == RunState::Ended {
            return Ok(());
        }
        self.flags.set_running(false);
        self.flags.set_active(false);
        thread::sleep(Duration::from_millis(END_TEARDOWN_WAIT_MS));
        *state = RunState::Ended;
        info!("run ended");
        Ok(())
    }

    /// Apply one externally posted command.
    pub fn apply(&self, command: RunCommand) -> Result<()> {
        match command {
            RunCommand::Pause => self.pause(),
            RunCommand::Resume => self.resume(),
            RunCommand::Stop => self.stop(),
            RunCommand::End => self.end(),
        }
    }

    /// Drain and apply every command currently queued, without blocking.
    /// Polled from the status-reporter thread spawned by
    /// [`RunController::spawn_status_reporter`] alongside
    /// [`RunController::status_info`].
    pub fn drain_commands(&self) {
        while let Ok(command) = self.command_rx.try_recv() {
            if let Err(err) = self.apply(command) {
                warn!(%err, "run command rejected in current state");
            }
        }
    }

    /// Point-in-time `(running, runDuration, nTrig, tTrig, tLife, readRate,
    /// lifeFrac, bufferFillPercent)` tuple (`reportStatus`).
    pub fn status_info(&self) -> RunStatusInfo {
        let snapshot = self.stats.snapshot();
        let pause_secs = *self.accumulated_pause_secs.lock();
        RunStatusInfo {
            running: self.flags.is_running(),
            run_duration_secs: (snapshot.elapsed_secs - pause_secs).max(0.0),
            n_triggers: snapshot.n_triggers,
            t_trig_secs: snapshot.t_trig_secs,
            t_life_secs: snapshot.t_life_secs,
            read_rate_hz: snapshot.trigger_rate_hz,
            life_fraction: snapshot.life_fraction,
            buffer_fill_percent: snapshot.buffer_fill_percent,
        }
    }

    /// Spawn the status-reporter thread (§4.4): drains posted commands and
    /// refreshes a depth-1 info queue at [`STATUS_REPORT_DIVISOR`] times the
    /// display cadence, overwriting whatever status was there before so a
    /// slow consumer always reads the latest value instead of a backlog.
    /// Exits once `ACTIVE` goes false.
    pub fn spawn_status_reporter(self: &Arc<Self>, display_interval_secs: u64) -> Result<Receiver<RunStatusInfo>> {
        let (tx, rx) = bounded(1);
        let controller = self.clone();
        let period = Duration::from_secs_f64(display_interval_secs.max(1) as f64 / STATUS_REPORT_DIVISOR as f64);
        thread::Builder::new()
            .name("status-reporter".into())
            .spawn(move || {
                while controller.flags.is_active() {
                    controller.drain_commands();
                    let info = controller.status_info();
                    if tx.is_full() {
                        let _ = tx.try_recv();
                    }
                    let _ = tx.try_send(info);
                    thread::sleep(period);
                }
            })
            .map_err(|err| DaqError::RunControl { message: err.to_string() })?;
        Ok(rx)
    }

    fn print_summary(&self) {
        let snapshot = self.stats.snapshot();
        info!(
            n_triggers = snapshot.n_triggers,
            elapsed_secs = snapshot.elapsed_secs,
            trigger_rate_hz = snapshot.trigger_rate_hz,
            life_fraction = snapshot.life_fraction,
            "run summary"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle_transitions() {
        let rc = RunController::new();
        assert_eq!(rc.state(), RunState::Init);
        rc.start().unwrap();
        assert_eq!(rc.state(), RunState::Running);
        assert!(rc.flags().is_running());
        rc.pause().unwrap();
        assert_eq!(rc.state(), RunState::Paused);
        assert!(!rc.flags().is_running());
        rc.resume().unwrap();
        assert_eq!(rc.state(), RunState::Running);
        rc.stop().unwrap();
        assert_eq!(rc.state(), RunState::Stopped);
        rc.end().unwrap();
        assert_eq!(rc.state(), RunState::Ended);
    }

    #[test]
    fn test_end_is_idempotent() {
        let rc = RunController::new();
        rc.start().unwrap();
        rc.end().unwrap();
        assert!(rc.end().is_ok());
        assert_eq!(rc.state(), RunState::Ended);
    }

    #[test]
    fn test_pause_outside_running_rejected() {
        let rc = RunController::new();
        assert!(rc.pause().is_err());
    }

    #[test]
    fn test_stats_record_trigger_rate() {
        let stats = RunStats::new();
        stats.mark_started();
        for _ in 0..RATE_UPDATE_PERIOD {
            stats.record_trigger(1e-3);
        }
        let snapshot = stats.snapshot();
        assert_eq!(snapshot.n_triggers, RATE_UPDATE_PERIOD);
    }

    #[test]
    fn test_apply_via_command_channel() {
        let rc = RunController::new();
        rc.start().unwrap();
        let tx = rc.command_sender();
        tx.send(RunCommand::Pause).unwrap();
        rc.drain_commands();
        assert_eq!(rc.state(), RunState::Paused);
    }

    #[test]
    fn test_status_info_reflects_running_state_and_triggers() {
        let rc = RunController::new();
        rc.start().unwrap();
        rc.stats().record_trigger(2e-3);
        rc.stats().update_buffer_fill_percent(37.5);
        let info = rc.status_info();
        assert!(info.running);
        assert_eq!(info.n_triggers, 1);
        assert_eq!(info.buffer_fill_percent, 37.5);
    }

    #[test]
    fn test_spawn_status_reporter_publishes_info() {
        let rc = Arc::new(RunController::new());
        rc.start().unwrap();
        let rx = rc.spawn_status_reporter(1).unwrap();
        let info = rx.recv_timeout(Duration::from_secs(2)).expect("reporter should publish at least once");
        assert!(info.running);
        rc.end().unwrap();
    }
}
