//! Demo entry point wiring a synthetic device through the Buffer Manager
//! into the Pulse Filter.
//!
//! Installs the process-wide `tracing` subscriber (the library crate never
//! does this itself) and runs a short acquisition using a signal generator
//! in place of real hardware.

use std::thread;
use std::time::Duration;

use daqcore::buffer::{BufferManager, ClientMode, SampleBlock};
use daqcore::config::{BufferManagerConfig, DeviceConfig, PulseFilterConfig, PulseShapeConfig};
use daqcore::device::SyntheticDevice;
use daqcore::pulse_filter::{template, PulseFilter};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    tracing::info!(available_parallelism = num_cpus::get(), "starting demo run");

    let device_config = DeviceConfig::default();
    let filter_config = PulseFilterConfig {
        pulse_shapes: vec![PulseShapeConfig::default()],
        ..PulseFilterConfig::default()
    };

    let reference = template::reference_pulse(&filter_config.pulse_shapes[0], device_config.t_sampling());
    let pretrig = device_config.pretrig_sample();
    let mut waveform = vec![0.0f32; device_config.n_channels() * device_config.n_samples];
    for channel in 0..device_config.n_channels() {
        let row = channel * device_config.n_samples;
        for (j, &v) in reference.iter().enumerate() {
            if pretrig + j < device_config.n_samples {
                waveform[row + pretrig + j] = v;
            }
        }
    }

    let manager = BufferManager::new(BufferManagerConfig::default().with_n_buffers(16), device_config.n_channels(), device_config.n_samples)?;
    let pulse_client = manager.register_in_process(ClientMode::PointerOblig);
    let monitor_client = manager.register_in_process(ClientMode::CopyRand);

    let mut filter = PulseFilter::new(device_config.clone(), &filter_config)?;

    let device = SyntheticDevice::new(device_config.clone(), waveform, Some(200));
    manager.start(device)?;

    let monitor_handle = thread::spawn(move || {
        let mut seen = 0u64;
        while let Some(message) = monitor_client.next() {
            seen += 1;
            tracing::debug!(seen, sequence = message.sequence_number(), "monitor observed a block");
        }
        seen
    });

    let mut accepted = 0u64;
    let channels = device_config.n_channels();
    let samples = device_config.n_samples;
    while let Some(message) = pulse_client.next() {
        let mut block = SampleBlock::new(channels, samples);
        for channel in 0..channels {
            block.as_mut_slice()[channel * samples..(channel + 1) * samples].copy_from_slice(message.channel(channel));
        }
        if filter.process(&block, message.sequence_number(), message.trigger_time()).is_some() {
            accepted += 1;
        }
    }

    manager.controller().end()?;
    let monitored = monitor_handle.join().unwrap_or(0);

    let stats = filter.stats();
    println!("daqcore demo run complete");
    println!("  events seen:       {}", stats.n_events_seen);
    println!("  validated triggers: {}", stats.n_validated);
    println!("  accepted events:   {}", stats.n_accepted);
    println!("  double pulses:     {}", stats.n_double_pulse);
    println!("  pulse filter accepted (local count): {}", accepted);
    println!("  monitor-side blocks observed: {}", monitored);

    thread::sleep(Duration::from_millis(50));
    Ok(())
}
