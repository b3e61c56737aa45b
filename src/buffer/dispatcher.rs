//! Dispatcher loop: distributes finished slots to registered consumers (§4.2)
//!
//! Grounded directly on `picodaqa.BufferMan.manageDataBuffer`: each round it
//! takes the next produced slot, serves every in-process client whose
//! request is currently pending (pointer or copy, per that client's
//! registered mode), offers a low-priority copy to each IPC queue if the
//! producer queue isn't more than half full, then blocks until every
//! obligatory client of this round has posted its *next* request — which is
//! this crate's channel-based stand-in for the reference program's
//! "request queue non-empty again" done-check — before releasing the slot
//! back to the producer.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError};
use tracing::{debug, info, warn};

use crate::constants::DISPATCHER_POLL_INTERVAL_US;

use super::client_registry::{ClientMode, ClientRegistry, SlotMessage};
use super::ring_buffer::RingBuffer;
use super::run_control::RunFlags;

/// Distributes slots produced on `producer_rx` to every client registered on
/// `registry`, then signals the producer that the slot is free again.
pub struct Dispatcher {
    ring: Arc<RingBuffer>,
    registry: Arc<ClientRegistry>,
    producer_rx: Receiver<usize>,
    flags: Arc<RunFlags>,
    log_interval_secs: u64,
}

impl Dispatcher {
    pub fn new(
        ring: Arc<RingBuffer>,
        registry: Arc<ClientRegistry>,
        producer_rx: Receiver<usize>,
        flags: Arc<RunFlags>,
        log_interval_secs: u64,
    ) -> Self {
        Self { ring, registry, producer_rx, flags, log_interval_secs }
    }

    /// Run until `producer_rx` disconnects or `flags.is_active()` goes
    /// false. Intended to be spawned as `thread::Builder::new().name("dispatcher".into())`.
    ///
    /// On exit, every registered client and IPC queue is disconnected so
    /// that a client blocked in [`super::client_registry::ClientHandle::next`]
    /// unblocks with `None` instead of hanging once nothing is left to serve
    /// it.
    pub fn run(self) {
        self.dispatch_loop();
        self.registry.clients.lock().clear();
        self.registry.ipc.lock().clear();
    }

    fn dispatch_loop(&self) {
        let mut last_log = Instant::now();
        let mut n: u64 = 0;

        loop {
            if !self.flags.is_active() {
                debug!("dispatcher observed ACTIVE=false, exiting");
                return;
            }

            let index = match self
                .producer_rx
                .recv_timeout(Duration::from_micros(DISPATCHER_POLL_INTERVAL_US))
            {
                Ok(index) => index,
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => return,
            };

            // Safety: this index is only in our hands between the producer
            // publishing it and us releasing it below; the producer cannot
            // touch it again until the release token is sent back (I2).
            let (sequence_number, trigger_time) = unsafe {
                let slot = self.ring.slot(index);
                (slot.sequence_number, slot.trigger_time)
            };

            let obligatory = self.serve_in_process_clients(index, trigger_time, sequence_number);
            self.serve_ipc_queues(index, trigger_time, sequence_number);

            if !obligatory.is_empty() && !self.wait_for_obligatory(&obligatory) {
                return;
            }

            if self.ring.release_tx(index).send(()).is_err() {
                warn!("producer disconnected while releasing slot");
                return;
            }

            n += 1;
            if last_log.elapsed().as_secs() >= self.log_interval_secs {
                info!(n, sequence_number, "dispatcher progress");
                last_log = Instant::now();
            }
        }
    }

    /// Serve every in-process client with a pending request this round;
    /// returns the indices of clients that must be waited on before the slot
    /// is freed.
    fn serve_in_process_clients(&self, index: usize, trigger_time: f64, sequence_number: u64) -> Vec<usize> {
        let mut obligatory = Vec::new();
        let clients = self.registry.clients.lock();
        for (i, client) in clients.iter().enumerate() {
            if client.request_rx.try_recv().is_err() {
                continue;
            }
            let message = match client.mode {
                ClientMode::PointerOblig => {
                    SlotMessage::Pointer { ring: self.ring.clone(), index, trigger_time, sequence_number }
                }
                ClientMode::CopyRand | ClientMode::CopyOblig => SlotMessage::Owned {
                    block: self.cloned_block(index),
                    trigger_time,
                    sequence_number,
                },
            };
            if client.response_tx.send(message).is_err() {
                warn!(client = i, "client response channel closed");
                continue;
            }
            if client.mode.is_obligatory() {
                obligatory.push(i);
            }
        }
        obligatory
    }

    /// Offer a copy to every IPC queue that isn't currently holding one,
    /// but only while the producer queue is at most half full — display
    /// consumers never get to throttle acquisition.
    fn serve_ipc_queues(&self, index: usize, trigger_time: f64, sequence_number: u64) {
        if self.producer_rx.len() * 2 > self.ring.capacity() {
            return;
        }
        let ipc = self.registry.ipc.lock();
        if ipc.is_empty() {
            return;
        }
        for queue in ipc.iter() {
            if !queue.tx.is_empty() {
                continue;
            }
            let message = SlotMessage::Owned { block: self.cloned_block(index), trigger_time, sequence_number };
            let _ = queue.tx.try_send(message);
        }
    }

    fn cloned_block(&self, index: usize) -> super::sample_block::SampleBlock {
        // Safety: see the comment in `run` above this slot's read window.
        unsafe { self.ring.slot(index).block().clone() }
    }

    /// Block until every client in `obligatory` has posted its next request,
    /// or `ACTIVE` goes false. Returns `false` on the latter.
    fn wait_for_obligatory(&self, obligatory: &[usize]) -> bool {
        loop {
            if !self.flags.is_active() {
                debug!("dispatcher ended while waiting on obligatory consumers");
                return false;
            }
            let clients = self.registry.clients.lock();
            let done = obligatory.iter().all(|&i| !clients[i].request_rx.is_empty());
            drop(clients);
            if done {
                return true;
            }
            thread::sleep(Duration::from_micros(DISPATCHER_POLL_INTERVAL_US));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::client_registry::ClientRegistry;
    use crossbeam_channel::unbounded;
    use std::thread;

    #[test]
    fn test_pointer_client_gates_slot_release() {
        let ring = Arc::new(RingBuffer::new(2, 1, 4));
        let registry = Arc::new(ClientRegistry::new());
        let client = registry.register_in_process(ClientMode::PointerOblig);
        let (producer_tx, producer_rx) = unbounded();
        let flags = Arc::new(RunFlags::default());
        flags.set_active(true);

        unsafe {
            let slot = ring.slot_mut(0);
            slot.sequence_number = 1;
            slot.trigger_time = 0.25;
        }
        producer_tx.send(0).unwrap();

        let dispatcher = Dispatcher::new(ring.clone(), registry, producer_rx, flags.clone(), 3600);
        thread::spawn(move || dispatcher.run());

        let message = client.next().expect("dispatcher should serve the pending slot");
        assert_eq!(message.sequence_number(), 1);
        assert_eq!(message.channel(0).len(), 4);

        // Not yet released: the obligatory client hasn't asked for its next slot.
        assert!(ring.release_rx(0).try_recv().is_err());

        // A second request from the same client satisfies the done-check.
        thread::spawn(move || {
            let _ = client.next();
        });

        let release = ring.release_rx(0).recv_timeout(Duration::from_secs(1));
        assert!(release.is_ok(), "slot 0 should be released once the obligatory client re-requests");
        flags.set_active(false);
    }

    #[test]
    fn test_copy_rand_client_is_not_obligatory() {
        let ring = Arc::new(RingBuffer::new(2, 1, 4));
        let registry = Arc::new(ClientRegistry::new());
        let client = registry.register_in_process(ClientMode::CopyRand);
        let (producer_tx, producer_rx) = unbounded();
        let flags = Arc::new(RunFlags::default());
        flags.set_active(true);

        unsafe {
            let slot = ring.slot_mut(0);
            slot.sequence_number = 5;
        }
        producer_tx.send(0).unwrap();

        let dispatcher = Dispatcher::new(ring.clone(), registry, producer_rx, flags.clone(), 3600);
        thread::spawn(move || dispatcher.run());

        let message = client.next().unwrap();
        assert_eq!(message.sequence_number(), 5);
        let release = ring.release_rx(0).recv_timeout(Duration::from_secs(1));
        assert!(release.is_ok(), "a copy-random client must never gate slot release");
        flags.set_active(false);
    }
}
