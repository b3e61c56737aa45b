//! Throughput under a slow obligatory consumer (S1).
//!
//! Grounded on the reference crate's own bench layout (a standalone
//! `benches/` binary) but driven through `criterion`, the way the
//! `aws-s2n-quic` pack benchmarks its codecs, since this crate's dev
//! dependencies carry `criterion` rather than the reference crate's
//! hand-rolled timing loops.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use crossbeam_channel::unbounded;

use daqcore::buffer::client_registry::ClientMode;
use daqcore::buffer::dispatcher::Dispatcher;
use daqcore::buffer::producer::Producer;
use daqcore::buffer::ring_buffer::RingBuffer;
use daqcore::buffer::run_control::{RunFlags, RunStats};
use daqcore::buffer::ClientRegistry;
use daqcore::config::DeviceConfig;
use daqcore::device::SyntheticDevice;

fn drive_n_triggers(n: u64, n_buffers: usize) -> u64 {
    let device_config = DeviceConfig { channels: vec!["A".into()], n_samples: 64, ..DeviceConfig::default() };
    let waveform = vec![0.0f32; 64];
    let device = SyntheticDevice::new(device_config, waveform, Some(n));

    let ring = Arc::new(RingBuffer::new(n_buffers, 1, 64));
    let registry = Arc::new(ClientRegistry::new());
    let client = registry.register_in_process(ClientMode::CopyOblig);

    let (producer_tx, producer_rx) = unbounded();
    let flags = Arc::new(RunFlags::default());
    flags.set_active(true);
    flags.set_running(true);
    let stats = Arc::new(RunStats::new());
    stats.mark_started();

    let producer = Producer::new(device, ring.clone(), producer_tx, flags.clone(), stats);
    let dispatcher = Dispatcher::new(ring, registry, producer_rx, flags.clone(), 3600);

    let producer_handle = thread::spawn(move || producer.run());
    let dispatcher_handle = thread::spawn(move || dispatcher.run());

    let mut delivered = 0u64;
    // A slow consumer: simulate per-event processing cost, exercising the
    // backpressure path (producer blocks once every slot is checked out).
    while let Some(message) = client.next() {
        black_box(message.channel(0).len());
        delivered += 1;
        thread::sleep(Duration::from_micros(5));
    }

    flags.set_active(false);
    let _ = producer_handle.join();
    let _ = dispatcher_handle.join();
    delivered
}

fn bench_slow_consumer_throughput(c: &mut Criterion) {
    let mut group = c.benchmark_group("ring_buffer_slow_consumer");
    for n_buffers in [4usize, 16, 64] {
        group.bench_function(format!("n_buffers={n_buffers}"), |b| {
            b.iter(|| drive_n_triggers(black_box(200), n_buffers));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_slow_consumer_throughput);
criterion_main!(benches);
