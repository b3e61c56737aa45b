//! Producer loop: pulls data from the device and publishes slots (§4.1)
//!
//! Runs on its own thread, started by the Buffer Manager alongside the
//! dispatcher (§4.4). Waits on each slot's release-token channel rather
//! than polling a shared sentinel index, per the design note in §9 that
//! replaces sentinel polling with bounded-channel handoffs while keeping a
//! short maximum wait on every receive so `ACTIVE` going false is noticed
//! promptly.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, SystemTime};

use crossbeam_channel::{RecvTimeoutError, Sender};
use tracing::{debug, warn};

use crate::constants::{PRODUCER_IDLE_POLL_INTERVAL_MS, PRODUCER_POLL_INTERVAL_MS};
use crate::device::{AcquireDevice, AcquireOutcome};

use super::ring_buffer::RingBuffer;
use super::run_control::{RunFlags, RunStats};

/// Drives one [`AcquireDevice`] and publishes filled slot indices onto
/// `producer_tx` until the device reports [`AcquireOutcome::End`] or
/// `flags.is_active()` goes false.
pub struct Producer<D: AcquireDevice> {
    device: D,
    ring: Arc<RingBuffer>,
    producer_tx: Sender<usize>,
    flags: Arc<RunFlags>,
    stats: Arc<RunStats>,
    run_start_wall: f64,
    next_write: usize,
    next_sequence: u64,
}

impl<D: AcquireDevice> Producer<D> {
    /// Build a producer. `run_start_wall` is seconds since the Unix epoch at
    /// the moment the run started, used to turn the device's absolute
    /// trigger timestamps into run-relative ones (`triggerTime`).
    pub fn new(
        device: D,
        ring: Arc<RingBuffer>,
        producer_tx: Sender<usize>,
        flags: Arc<RunFlags>,
        stats: Arc<RunStats>,
    ) -> Self {
        let run_start_wall = SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs_f64();
        Self { device, ring, producer_tx, flags, stats, run_start_wall, next_write: 0, next_sequence: 0 }
    }

    /// Run until the device ends or the run is torn down. Intended to be
    /// spawned as `thread::Builder::new().name("producer".into())`.
    pub fn run(mut self) {
        loop {
            if !self.flags.is_active() {
                debug!("producer observed ACTIVE=false, exiting");
                return;
            }
            if !self.flags.is_running() {
                thread::sleep(Duration::from_millis(PRODUCER_IDLE_POLL_INTERVAL_MS));
                continue;
            }

            let index = self.next_write;
            if !self.wait_for_release(index) {
                return;
            }

            let outcome = {
                // Safety: we just consumed this slot's release token, so we
                // are the only writer until we publish the index below (I2).
                let slot = unsafe { self.ring.slot_mut(index) };
                self.device.acquire(slot.block.as_mut_slice())
            };

            match outcome {
                AcquireOutcome::End => {
                    debug!("device signalled end of data");
                    return;
                }
                AcquireOutcome::Triggered { trigger_wall_time, live_time_delta } => {
                    self.next_sequence += 1;
                    // Safety: same slot, same exclusive-writer window as above.
                    unsafe {
                        let slot = self.ring.slot_mut(index);
                        slot.trigger_time = trigger_wall_time - self.run_start_wall;
                        slot.sequence_number = self.next_sequence;
                    }
                    self.stats.record_trigger(live_time_delta);
                    if self.producer_tx.send(index).is_err() {
                        warn!("dispatcher channel closed, producer exiting");
                        return;
                    }
                    let fill_percent = self.producer_tx.len() as f64 / self.ring.capacity() as f64 * 100.0;
                    self.stats.update_buffer_fill_percent(fill_percent);
                    self.next_write = (index + 1) % self.ring.capacity();
                }
            }
        }
    }

    /// Block, polling at [`PRODUCER_POLL_INTERVAL_MS`], until slot `index`'s
    /// release token is available. Returns `false` if the run was torn down
    /// while waiting.
    fn wait_for_release(&self, index: usize) -> bool {
        loop {
            if !self.flags.is_active() {
                return false;
            }
            match self.ring.release_rx(index).recv_timeout(Duration::from_millis(PRODUCER_POLL_INTERVAL_MS)) {
                Ok(()) => return true,
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => return false,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DeviceConfig;
    use crate::device::SyntheticDevice;
    use crossbeam_channel::unbounded;

    #[test]
    fn test_producer_publishes_finite_triggers() {
        let ring = Arc::new(RingBuffer::new(2, 1, 4));
        let (producer_tx, producer_rx) = unbounded();
        let flags = Arc::new(RunFlags::default());
        flags.set_active(true);
        flags.set_running(true);
        let stats = Arc::new(RunStats::new());
        stats.mark_started();

        let cfg = DeviceConfig { channels: vec!["A".into()], n_samples: 4, ..DeviceConfig::default() };
        let device = SyntheticDevice::new(cfg, vec![1.0, 2.0, 3.0, 4.0], Some(2));
        let producer = Producer::new(device, ring.clone(), producer_tx, flags, stats.clone());
        producer.run();

        let published: Vec<usize> = producer_rx.try_iter().collect();
        assert_eq!(published, vec![0, 1]);
        assert_eq!(stats.snapshot().n_triggers, 2);
        unsafe {
            assert_eq!(ring.slot(0).sequence_number, 1);
            assert_eq!(ring.slot(1).sequence_number, 2);
        }
    }
}
