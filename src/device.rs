//! The digitizer collaborator contract (§6)
//!
//! `AcquireDevice` is the seam at which real hardware I/O would be plugged
//! in; this crate only ships a synthetic implementation used by tests and
//! the demo binary. Driving an actual oscilloscope is out of scope.

use crate::config::{DeviceConfig, TriggerType};

/// Outcome of a single call to [`AcquireDevice::acquire`].
pub enum AcquireOutcome {
    /// A trigger was captured. `trigger_wall_time` is seconds since the Unix
    /// epoch; `live_time_delta` is the amount of live (armed) time consumed
    /// acquiring this block, in seconds.
    Triggered {
        /// Wall-clock time the trigger fired, in seconds since the epoch.
        trigger_wall_time: f64,
        /// Live time spent armed for this acquisition, in seconds.
        live_time_delta: f64,
    },
    /// The device has no more data to offer; the producer should exit.
    End,
}

/// The device collaborator the Buffer Manager depends on (§6).
///
/// Implementations fill `block` (a `[channels × samples]` row-major buffer)
/// synchronously and report back when the trigger fired.
pub trait AcquireDevice: Send + Sync {
    /// Read-only device configuration (channel count, sampling interval,
    /// trigger channel, ...).
    fn config(&self) -> &DeviceConfig;

    /// Fill `block` with one freshly acquired set of channel waveforms.
    ///
    /// `block.len()` is always `config().n_channels() * config().n_samples`.
    fn acquire(&mut self, block: &mut [f32]) -> AcquireOutcome;
}

/// An in-memory device used for tests and the demo binary: replays a fixed
/// waveform a bounded number of times, or forever if `max_triggers` is
/// `None`.
pub struct SyntheticDevice {
    config: DeviceConfig,
    waveform: Vec<f32>,
    max_triggers: Option<u64>,
    emitted: u64,
    live_time_per_trigger: f64,
}

impl SyntheticDevice {
    /// Build a synthetic device that replays `waveform` (row-major,
    /// `channels × samples`) each time it is triggered.
    pub fn new(config: DeviceConfig, waveform: Vec<f32>, max_triggers: Option<u64>) -> Self {
        let expected_len = config.n_channels() * config.n_samples;
        assert_eq!(
            waveform.len(),
            expected_len,
            "synthetic waveform length must match channels * samples"
        );
        let live_time_per_trigger = config.sample_time_secs;
        Self { config, waveform, max_triggers, emitted: 0, live_time_per_trigger }
    }
}

impl AcquireDevice for SyntheticDevice {
    fn config(&self) -> &DeviceConfig {
        &self.config
    }

    fn acquire(&mut self, block: &mut [f32]) -> AcquireOutcome {
        if let Some(max) = self.max_triggers {
            if self.emitted >= max {
                return AcquireOutcome::End;
            }
        }
        block.copy_from_slice(&self.waveform);
        self.emitted += 1;
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs_f64();
        AcquireOutcome::Triggered {
            trigger_wall_time: now,
            live_time_delta: self.live_time_per_trigger,
        }
    }
}

/// Resolve the index of the trigger channel named in `config` within
/// `config.channels`, mirroring the reference program's linear scan over
/// `picoChannels`.
pub fn trigger_channel_index(config: &DeviceConfig) -> Option<usize> {
    config.channels.iter().position(|c| c == &config.trigger_channel)
}

/// Whether a trigger crossing counts as valid for the given trigger type.
/// Not used by the matched filter itself (which works purely on shape
/// correlation) but kept as part of the device contract for completeness,
/// mirroring `trgTyp` in the reference configuration.
pub fn crosses(trigger_type: TriggerType, sample: f32, threshold: f32) -> bool {
    match trigger_type {
        TriggerType::Rising => sample >= threshold,
        TriggerType::Falling => sample <= threshold,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DeviceConfig;

    #[test]
    fn test_trigger_channel_index() {
        let cfg = DeviceConfig {
            channels: vec!["A".into(), "B".into()],
            trigger_channel: "B".into(),
            ..DeviceConfig::default()
        };
        assert_eq!(trigger_channel_index(&cfg), Some(1));
    }

    #[test]
    fn test_synthetic_device_ends() {
        let cfg = DeviceConfig { channels: vec!["A".into()], n_samples: 4, ..DeviceConfig::default() };
        let mut dev = SyntheticDevice::new(cfg, vec![0.0; 4], Some(1));
        let mut block = vec![0.0; 4];
        assert!(matches!(dev.acquire(&mut block), AcquireOutcome::Triggered { .. }));
        assert!(matches!(dev.acquire(&mut block), AcquireOutcome::End));
    }
}
