//! The Pulse Filter (§3, §4.5): a matched-filter pulse detector that runs as
//! an obligatory in-process consumer of the Buffer Manager's ring buffer.

pub mod event;
pub mod filter;
pub mod output;
pub mod template;

pub use event::{ChannelPulseRecord, DoublePulseRecord, EventRecord, FilterStats, HistogramBlock};
pub use filter::PulseFilter;
