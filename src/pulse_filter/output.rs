//! Textual output formats for filter results (§4.5, §6)
//!
//! Column layouts mirror `pulseFilter`'s `pFilt_*.dat` and `dpFilt_*.dat`
//! files; callers own the `Write` destination (a file, a pipe, a buffer in
//! a test) instead of this crate opening files itself, per the
//! configuration-loading Non-goal.

use std::io::{self, Write};

use super::event::EventRecord;

/// Write the header line for the per-event log (`pFilt_*.dat`).
pub fn write_event_header(writer: &mut impl Write) -> io::Result<()> {
    writeln!(writer, "# EvNr, EvT, Vs ...., Ts ...T")
}

/// Write one accepted event's record line. Columns are, in order: event
/// number, event time, then `(voltage, time)` pairs for every channel's
/// primary pulse, followed by the same for the secondary pulse and any
/// extra pulse if this event had a double pulse.
pub fn write_event_record(writer: &mut impl Write, record: &EventRecord) -> io::Result<()> {
    write!(writer, "{}, {:.2}", record.event_number, record.event_time)?;
    for channel in &record.channels {
        write!(writer, ", {:.3}, {:.3}", channel.primary_voltage, channel.primary_time_micros)?;
    }
    if record.double_pulse.is_some() {
        for channel in &record.channels {
            write!(writer, ", {:.3}, {:.3}", channel.secondary_voltage, channel.secondary_time_micros)?;
        }
        for (index, channel) in record.channels.iter().enumerate() {
            if let Some((voltage, time_micros)) = channel.extra {
                write!(writer, ", {}, {:.3}, {:.3}", index, voltage, time_micros)?;
            }
        }
    }
    writeln!(writer)
}

/// Write the header line for the double-pulse log (`dpFilt_*.dat`).
pub fn write_double_pulse_header(writer: &mut impl Write) -> io::Result<()> {
    writeln!(writer, "# Nacc, Ndble, Tau, delT(iChan), ... V(iChan)")
}

/// Write one double-pulse record line, if `record` carries one.
pub fn write_double_pulse_record(writer: &mut impl Write, record: &EventRecord) -> io::Result<()> {
    let Some(double_pulse) = &record.double_pulse else {
        return Ok(());
    };
    write!(writer, "{}, {}, {:.4}", double_pulse.n_accepted, double_pulse.n_double, double_pulse.tau_micros)?;
    for (delta, _) in &double_pulse.per_channel {
        write!(writer, ", {:.4}", delta)?;
    }
    for (_, voltage) in &double_pulse.per_channel {
        write!(writer, ", {:.3}", voltage)?;
    }
    writeln!(writer)
}

/// Write the reference program's run-summary trailer to both logs.
pub fn write_summary(
    writer: &mut impl Write,
    n_events_seen: u64,
    n_validated: u64,
    n_accepted: u64,
    n_double_coincidence: u64,
    n_triple_coincidence: u64,
) -> io::Result<()> {
    writeln!(
        writer,
        "# pulseFilter Summary: last evNR {}, Nval, Nacc, Nacc2, Nacc3: {}, {}, {}, {}",
        n_events_seen, n_validated, n_accepted, n_double_coincidence, n_triple_coincidence
    )
}

/// Dump one sample block's channels as CSV rows, one row per sample, for
/// offline inspection (`PulseFilterConfig::raw_file`).
pub fn write_raw_block(writer: &mut impl Write, block: &crate::buffer::SampleBlock) -> io::Result<()> {
    for sample in 0..block.samples() {
        for channel in 0..block.channels() {
            if channel > 0 {
                write!(writer, ",")?;
            }
            write!(writer, "{:.6}", block.channel(channel)[sample])?;
        }
        writeln!(writer)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pulse_filter::event::ChannelPulseRecord;

    #[test]
    fn test_write_event_record_without_double_pulse() {
        let record = EventRecord {
            event_number: 42,
            event_time: 1.5,
            event_centroid_secs: 0.0,
            coincidence_count: 1,
            channels: vec![ChannelPulseRecord { primary_voltage: 0.1, primary_time_micros: 0.0, ..Default::default() }],
            double_pulse: None,
        };
        let mut buf = Vec::new();
        write_event_record(&mut buf, &record).unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), "42, 1.50, 0.100, 0.000\n");
    }

    #[test]
    fn test_write_raw_block_one_row_per_sample() {
        let mut block = crate::buffer::SampleBlock::new(2, 2);
        block.as_mut_slice().copy_from_slice(&[1.0, 2.0, 3.0, 4.0]);
        let mut buf = Vec::new();
        write_raw_block(&mut buf, &block).unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), "1.000000,3.000000\n2.000000,4.000000\n");
    }
}
