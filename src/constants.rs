//! Acquisition pipeline tuning constants
//!
//! Mirrors the magic numbers used throughout the reference `picoDAQ`
//! implementation, named and typed instead of sprinkled through the code.

/// Default number of ring-buffer slots (`NBuffers` in the reference program).
pub const DEFAULT_N_BUFFERS: usize = 16;

/// Poll cadence used while the producer waits for the dispatcher to free the
/// next write slot, or for the producer queue to drain.
pub const PRODUCER_POLL_INTERVAL_MS: u64 = 1;

/// Poll cadence used while the producer is idling because RUNNING is false.
pub const PRODUCER_IDLE_POLL_INTERVAL_MS: u64 = 10;

/// Poll cadence used by the dispatcher while waiting for the next slot, or
/// for obligatory consumers to acknowledge completion.
pub const DISPATCHER_POLL_INTERVAL_US: u64 = 500;

/// Number of acquisitions between `readRate`/`lifeFrac` recomputations.
pub const RATE_UPDATE_PERIOD: u64 = 10;

/// Status-reporter update interval divisor: the info queue is refreshed at
/// twice the display cadence named in the Buffer Manager configuration.
pub const STATUS_REPORT_DIVISOR: u32 = 2;

/// Bounded wait observed by `stop()` from the `PAUSED` state before the
/// summary is flushed, letting in-flight events propagate (§4.4).
pub const STOP_PROPAGATION_WAIT_MS: u64 = 1_000;

/// Bounded wait observed by `end()` for worker threads to notice `ACTIVE`
/// going false before the run controller returns.
pub const END_TEARDOWN_WAIT_MS: u64 = 300;

/// Pulse-search time precision, expressed as a number of sample periods
/// (`idTprec` in the reference program).
pub const TRIGGER_SEARCH_PRECISION_SAMPLES: usize = 2;

/// Default trapezoidal-pulse rise time, in seconds.
pub const DEFAULT_RISE_TIME_SECS: f64 = 20e-9;

/// Default trapezoidal-pulse plateau ("on") time, in seconds.
pub const DEFAULT_ON_TIME_SECS: f64 = 12e-9;

/// Default trapezoidal-pulse fall time, in seconds.
pub const DEFAULT_FALL_TIME_SECS: f64 = 128e-9;

/// Default pulse height, in volts (negative: falling pulse).
pub const DEFAULT_PULSE_HEIGHT_VOLTS: f32 = -0.035;

static_assertions::const_assert!(DEFAULT_N_BUFFERS >= 2);
static_assertions::const_assert!(PRODUCER_POLL_INTERVAL_MS > 0);
static_assertions::const_assert!(RATE_UPDATE_PERIOD > 0);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_sane() {
        assert!(DEFAULT_N_BUFFERS > 0);
        assert!(PRODUCER_POLL_INTERVAL_MS <= PRODUCER_IDLE_POLL_INTERVAL_MS);
        assert!(DEFAULT_RISE_TIME_SECS > 0.0);
    }
}
