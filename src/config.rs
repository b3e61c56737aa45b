//! Configuration data model (§3.1, §6)
//!
//! These structs describe the three configuration documents named in §6.
//! Reading them from a JSON or YAML file is an external collaborator's job
//! (Non-goal, §1); this module only defines shapes, defaults, and
//! validation, the way the reference crate's `RingBufferConfig` validates
//! itself in a `with_*` builder chain.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::constants::{
    DEFAULT_FALL_TIME_SECS, DEFAULT_N_BUFFERS, DEFAULT_ON_TIME_SECS, DEFAULT_PULSE_HEIGHT_VOLTS,
    DEFAULT_RISE_TIME_SECS,
};
use crate::error::{DaqError, Result};

/// Trigger edge polarity (`trgTyp` in the reference configuration).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TriggerType {
    /// Trigger on a rising edge crossing the threshold.
    Rising,
    /// Trigger on a falling edge crossing the threshold.
    Falling,
}

impl Default for TriggerType {
    fn default() -> Self {
        Self::Rising
    }
}

/// Device configuration (§3.1 `DeviceConfig`), modeled on
/// `picoConfig.PSconfig`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Active channel names, e.g. `["A", "B"]`.
    pub channels: Vec<String>,
    /// Voltage range per channel, in volts.
    pub channel_ranges: Vec<f32>,
    /// Per-channel voltage offsets.
    pub channel_offsets: Vec<f32>,
    /// Per-channel display colors (opaque to this crate; passed through to
    /// display collaborators).
    pub channel_colors: Vec<String>,
    /// Number of samples per channel per block.
    pub n_samples: usize,
    /// Total duration of one sample block, in seconds.
    pub sample_time_secs: f64,
    /// Name of the trigger channel; must be one of `channels`.
    pub trigger_channel: String,
    /// Trigger threshold, in volts.
    pub trigger_threshold: f32,
    /// Trigger edge polarity.
    pub trigger_type: TriggerType,
    /// Whether the trigger is active; a false value disables triggering.
    pub trigger_active: bool,
    /// Fraction of samples captured before the trigger point (`pretrig`).
    pub pretrig_fraction: f64,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            channels: vec!["A".to_string(), "B".to_string()],
            channel_ranges: vec![30e-3, 0.35],
            channel_offsets: vec![0.0, 0.0],
            channel_colors: vec!["darkblue".to_string(), "darkslategrey".to_string()],
            n_samples: 200,
            sample_time_secs: 10e-6,
            trigger_channel: "A".to_string(),
            trigger_threshold: 15e-3,
            trigger_type: TriggerType::Rising,
            trigger_active: true,
            pretrig_fraction: 0.05,
        }
    }
}

impl DeviceConfig {
    /// Number of active channels.
    pub fn n_channels(&self) -> usize {
        self.channels.len()
    }

    /// Sampling interval, in seconds (`TSampling` in the reference program).
    pub fn t_sampling(&self) -> f64 {
        self.sample_time_secs / (self.n_samples as f64)
    }

    /// Sample index nearest the trigger point (`idT0`).
    pub fn pretrig_sample(&self) -> usize {
        ((self.n_samples as f64) * self.pretrig_fraction) as usize
    }

    /// Validate the document, mirroring the field checks `picoConfig`
    /// performs implicitly through its constructor defaults.
    pub fn validate(&self) -> Result<()> {
        if self.channels.is_empty() {
            return Err(DaqError::config("DeviceConfig.channels must not be empty"));
        }
        if self.channel_ranges.len() != self.channels.len() {
            return Err(DaqError::config("channel_ranges must have one entry per channel"));
        }
        if self.n_samples == 0 {
            return Err(DaqError::config("n_samples must be greater than 0"));
        }
        if self.sample_time_secs <= 0.0 {
            return Err(DaqError::config("sample_time_secs must be positive"));
        }
        if !self.channels.iter().any(|c| c == &self.trigger_channel) {
            return Err(DaqError::config(format!(
                "trigger_channel {:?} is not among configured channels",
                self.trigger_channel
            )));
        }
        if !(0.0..1.0).contains(&self.pretrig_fraction) {
            return Err(DaqError::config("pretrig_fraction must be in [0, 1)"));
        }
        Ok(())
    }
}

/// Buffer Manager configuration (§3.1, §6 document 2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BufferManagerConfig {
    /// Ring-buffer capacity (`NBuffers`).
    pub n_buffers: usize,
    /// Names of out-of-process display modules to register an IPC queue
    /// for; spawning the matching subprocess is an external collaborator's
    /// job.
    pub display_modules: Vec<String>,
    /// Optional prefix for the run log file.
    pub log_file: Option<PathBuf>,
    /// Verbose progress logging.
    pub verbose: bool,
    /// Seconds between periodic progress log lines (`logTime`).
    pub log_interval_secs: u64,
}

impl Default for BufferManagerConfig {
    fn default() -> Self {
        Self {
            n_buffers: DEFAULT_N_BUFFERS,
            display_modules: Vec::new(),
            log_file: None,
            verbose: true,
            log_interval_secs: 60,
        }
    }
}

impl BufferManagerConfig {
    /// Validate the document.
    pub fn validate(&self) -> Result<()> {
        if self.n_buffers == 0 {
            return Err(DaqError::config("n_buffers must be greater than 0"));
        }
        if self.log_interval_secs == 0 {
            return Err(DaqError::config("log_interval_secs must be greater than 0"));
        }
        Ok(())
    }

    /// Builder-style setter, mirroring the reference crate's `with_*` chain.
    pub fn with_n_buffers(mut self, n_buffers: usize) -> Self {
        self.n_buffers = n_buffers;
        self
    }
}

/// Matched-filter pulse-shape parameters (§3.1 `PulseShapeConfig`).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub enum PulseMode {
    /// Single trapezoidal lobe.
    Unipolar,
    /// Trapezoidal lobe followed by an opposite-polarity tail of equal
    /// integral.
    Bipolar,
}

impl Default for PulseMode {
    fn default() -> Self {
        Self::Unipolar
    }
}

/// Shape parameters for one matched-filter template.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PulseShapeConfig {
    /// Rise time, in seconds.
    pub rise_time_secs: f64,
    /// Plateau ("on") time, in seconds.
    pub on_time_secs: f64,
    /// Fall time, in seconds.
    pub fall_time_secs: f64,
    /// Unipolar or bipolar template.
    pub mode: PulseMode,
    /// Pulse height, in volts.
    pub pulse_height_volts: f32,
}

impl Default for PulseShapeConfig {
    fn default() -> Self {
        Self {
            rise_time_secs: DEFAULT_RISE_TIME_SECS,
            on_time_secs: DEFAULT_ON_TIME_SECS,
            fall_time_secs: DEFAULT_FALL_TIME_SECS,
            mode: PulseMode::Unipolar,
            pulse_height_volts: DEFAULT_PULSE_HEIGHT_VOLTS,
        }
    }
}

/// Pulse Filter configuration (§3.1, §6 document 3).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PulseFilterConfig {
    /// Matched-filter templates to evaluate; the reference program only
    /// ever configures one.
    pub pulse_shapes: Vec<PulseShapeConfig>,
    /// Per-event record output-file prefix (`logFile`).
    pub log_file: Option<PathBuf>,
    /// Double-pulse record output-file prefix (`logFile2`).
    pub log_file2: Option<PathBuf>,
    /// Raw-waveform dump output-file prefix (`rawFile`).
    pub raw_file: Option<PathBuf>,
    /// Reserved for the external plotting collaborator (`pictFile`); this
    /// crate accepts but does not interpret it.
    pub pict_file: Option<PathBuf>,
}

impl PulseFilterConfig {
    /// Validate the document.
    pub fn validate(&self) -> Result<()> {
        if self.pulse_shapes.is_empty() {
            return Err(DaqError::config("pulse_shapes must contain at least one entry"));
        }
        for shape in &self.pulse_shapes {
            if shape.rise_time_secs <= 0.0 || shape.on_time_secs < 0.0 || shape.fall_time_secs <= 0.0 {
                return Err(DaqError::config("pulse shape times must be positive"));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_config_defaults_validate() {
        assert!(DeviceConfig::default().validate().is_ok());
    }

    #[test]
    fn test_device_config_rejects_unknown_trigger_channel() {
        let cfg = DeviceConfig { trigger_channel: "Z".to_string(), ..DeviceConfig::default() };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_buffer_manager_config_builder() {
        let cfg = BufferManagerConfig::default().with_n_buffers(4);
        assert_eq!(cfg.n_buffers, 4);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_pulse_filter_config_requires_a_shape() {
        assert!(PulseFilterConfig::default().validate().is_err());
        let cfg = PulseFilterConfig { pulse_shapes: vec![PulseShapeConfig::default()], ..Default::default() };
        assert!(cfg.validate().is_ok());
    }
}
