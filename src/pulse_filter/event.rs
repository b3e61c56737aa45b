//! Per-event and double-pulse result records (§3, §4.5)
//!
//! Field layout mirrors the columns `pulseFilter` writes to `pFilt_*.dat`
//! and `dpFilt_*.dat`: a primary pulse per channel, an optional secondary
//! pulse per channel for double-pulse events, and at most one further
//! "extra" pulse beyond that, matching the Python original's
//! `VSig[ic][2]`/`TSig[ic][2]` cap.

/// One channel's pulse findings for a single event.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChannelPulseRecord {
    /// Primary pulse height, in volts; `0.0` if no pulse was found on this
    /// channel.
    pub primary_voltage: f32,
    /// Primary pulse time, in microseconds, relative to the event centroid
    /// once a primary pulse was found (`TSig[ic][0]`, `id*dT*1E6`).
    pub primary_time_micros: f64,
    /// Secondary ("double") pulse height, in volts; `0.0` if none.
    pub secondary_voltage: f32,
    /// Secondary pulse time, in microseconds, relative to the event
    /// centroid.
    pub secondary_time_micros: f64,
    /// A third pulse on this channel, if the search found one.
    pub extra: Option<(f32, f64)>,
}

/// Double-pulse statistics accumulated across channels for one event
/// (`dpFilt_` line).
#[derive(Debug, Clone)]
pub struct DoublePulseRecord {
    /// Running count of accepted events at the time this record was built.
    pub n_accepted: u64,
    /// Running count of double-pulse events at the time this record was
    /// built.
    pub n_double: u64,
    /// Mean time-to-second-pulse across channels with a second pulse
    /// (`Tau`), in microseconds.
    pub tau_micros: f64,
    /// `(delta_t_micros, voltage)` per channel, aligned to the channel
    /// index.
    pub per_channel: Vec<(f64, f32)>,
}

/// One accumulation window's peak-voltage samples for the external
/// histogram consumer (§4.5, §4.6), mirroring `pulseFilter`'s
/// `hnTrSigs`/`hvTrSigs`/`hVSigs`/`hTaus` accumulators. Grows across calls
/// to [`super::filter::PulseFilter::process`] until it is drained by a
/// successful send on the histogram queue, then is cleared, the way the
/// reference program resets its lists only once `histQ.put` succeeds.
#[derive(Debug, Clone, Default)]
pub struct HistogramBlock {
    /// Trigger-channel peak of every event whose trigger pulse failed Stage
    /// 1 (`hnTrSigs`): `0.0` for a window reject, the candidate's peak
    /// voltage for a shape-match reject.
    pub noise_trigger_peaks: Vec<f64>,
    /// Trigger-channel peak voltage of every validated trigger (`hvTrSigs`).
    pub valid_trigger_peaks: Vec<f64>,
    /// Peak voltage of every validated non-trigger coincidence pulse
    /// (`hVSigs`).
    pub non_trigger_peaks: Vec<f64>,
    /// `Tau` of every double-pulse event (`hTaus`).
    pub taus: Vec<f64>,
}

/// Result of processing one block through the matched filter (§4.5).
#[derive(Debug, Clone)]
pub struct EventRecord {
    /// Sequence number carried over from the ring-buffer slot.
    pub event_number: u64,
    /// Trigger time carried over from the ring-buffer slot, in seconds.
    pub event_time: f64,
    /// Event centroid time (`tevt`), the coincidence-weighted mean of the
    /// validated pulse times, in seconds.
    pub event_centroid_secs: f64,
    /// Number of channels whose pulse contributed to the centroid
    /// (`Ncoinc`).
    pub coincidence_count: usize,
    /// Per-channel pulse findings, indexed the same as the device's
    /// channel list.
    pub channels: Vec<ChannelPulseRecord>,
    /// Present when a second pulse was found on at least one channel.
    pub double_pulse: Option<DoublePulseRecord>,
}

/// Running totals the filter reports alongside each processed event
/// (§4.5, reference program's `Nval`/`Nacc`/`Nacc2`/`Nacc3`/`Ndble`).
#[derive(Debug, Clone, Copy, Default)]
pub struct FilterStats {
    pub n_events_seen: u64,
    pub n_validated: u64,
    pub n_accepted: u64,
    pub n_double_coincidence: u64,
    pub n_triple_coincidence: u64,
    pub n_double_pulse: u64,
}
