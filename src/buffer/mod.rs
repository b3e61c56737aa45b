//! The Buffer Manager (§3, §4): a multi-reader ring-buffered distribution
//! engine with obligatory/random in-process consumers, out-of-process IPC
//! queues, and run control.

pub mod client_registry;
pub mod dispatcher;
pub mod producer;
pub mod ring_buffer;
pub mod run_control;
pub mod sample_block;

use std::sync::Arc;
use std::thread;

use crossbeam_channel::{bounded, Receiver};
use parking_lot::Mutex;
use tracing::info;

use crate::config::BufferManagerConfig;
use crate::device::AcquireDevice;
use crate::error::Result;

pub use client_registry::{ClientHandle, ClientMode, ClientRegistry, SlotMessage};
pub use ring_buffer::RingBuffer;
pub use run_control::{RunCommand, RunController, RunFlags, RunState, RunStats, RunStatsSnapshot, RunStatusInfo};
pub use sample_block::{SampleBlock, Slot};

use dispatcher::Dispatcher;
use producer::Producer;

/// Owns the ring buffer, the client registry, and run control, and starts
/// the producer and dispatcher threads (§4). Clients must be registered
/// before [`BufferManager::start`] is called (§4.2).
pub struct BufferManager {
    config: BufferManagerConfig,
    ring: Arc<RingBuffer>,
    registry: Arc<ClientRegistry>,
    controller: Arc<RunController>,
    status_rx: Mutex<Option<Receiver<RunStatusInfo>>>,
}

impl BufferManager {
    /// Build a Buffer Manager sized for `channels × samples` blocks.
    pub fn new(config: BufferManagerConfig, channels: usize, samples: usize) -> Result<Self> {
        config.validate()?;
        let ring = Arc::new(RingBuffer::new(config.n_buffers, channels, samples));
        Ok(Self {
            config,
            ring,
            registry: Arc::new(ClientRegistry::new()),
            controller: Arc::new(RunController::new()),
            status_rx: Mutex::new(None),
        })
    }

    /// The status reporter's depth-1 info queue (§4.4), available once
    /// [`BufferManager::start`] has been called.
    pub fn status_receiver(&self) -> Option<Receiver<RunStatusInfo>> {
        self.status_rx.lock().clone()
    }

    /// Register an in-process consumer. Call before [`BufferManager::start`].
    pub fn register_in_process(&self, mode: ClientMode) -> ClientHandle {
        self.registry.register_in_process(mode)
    }

    /// Register an out-of-process display consumer. Call before
    /// [`BufferManager::start`].
    pub fn register_inter_process(&self, name: impl Into<String>) -> crossbeam_channel::Receiver<SlotMessage> {
        self.registry.register_inter_process(name)
    }

    /// Run controller shared with callers that issue `P`/`R`/`S`/`E`
    /// commands.
    pub fn controller(&self) -> Arc<RunController> {
        self.controller.clone()
    }

    /// Start the producer and dispatcher threads and transition run control
    /// to `RUNNING`. `device` is moved onto the producer thread.
    pub fn start<D: AcquireDevice + 'static>(&self, device: D) -> Result<()> {
        self.controller.start()?;
        let (producer_tx, producer_rx) = bounded(self.ring.capacity());

        let producer = Producer::new(
            device,
            self.ring.clone(),
            producer_tx,
            self.controller.flags(),
            self.controller.stats(),
        );
        thread::Builder::new()
            .name("producer".into())
            .spawn(move || producer.run())
            .map_err(|err| crate::error::DaqError::RunControl { message: err.to_string() })?;

        let dispatcher = Dispatcher::new(
            self.ring.clone(),
            self.registry.clone(),
            producer_rx,
            self.controller.flags(),
            self.config.log_interval_secs,
        );
        thread::Builder::new()
            .name("dispatcher".into())
            .spawn(move || dispatcher.run())
            .map_err(|err| crate::error::DaqError::RunControl { message: err.to_string() })?;

        let status_rx = self.controller.spawn_status_reporter(self.config.log_interval_secs)?;
        *self.status_rx.lock() = Some(status_rx);

        info!(n_buffers = self.ring.capacity(), "buffer manager started");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DeviceConfig;
    use crate::device::SyntheticDevice;

    #[test]
    fn test_buffer_manager_end_to_end_with_pointer_client() {
        let manager = BufferManager::new(BufferManagerConfig::default().with_n_buffers(4), 1, 4).unwrap();
        let client = manager.register_in_process(ClientMode::PointerOblig);

        let device_config = DeviceConfig { channels: vec!["A".into()], n_samples: 4, ..DeviceConfig::default() };
        let device = SyntheticDevice::new(device_config, vec![0.1, 0.2, 0.3, 0.4], Some(3));
        manager.start(device).unwrap();

        for expected_sequence in 1..=3u64 {
            let message = client.next().expect("producer should keep delivering until it ends");
            assert_eq!(message.sequence_number(), expected_sequence);
            assert_eq!(message.channel(0), &[0.1, 0.2, 0.3, 0.4]);
        }

        manager.controller().end().unwrap();
    }
}
