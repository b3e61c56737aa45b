//! daqcore - ring-buffered acquisition pipeline with a matched-filter pulse
//! detector for triggering waveform digitizers

pub mod buffer;
pub mod config;
pub mod constants;
pub mod device;
pub mod error;
pub mod pulse_filter;

pub use buffer::{BufferManager, ClientHandle, ClientMode, RunCommand, RunController, RunState};
pub use config::{BufferManagerConfig, DeviceConfig, PulseFilterConfig, PulseShapeConfig};
pub use device::{AcquireDevice, AcquireOutcome, SyntheticDevice};
pub use error::{DaqError, Result};
pub use pulse_filter::{EventRecord, FilterStats, PulseFilter};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
