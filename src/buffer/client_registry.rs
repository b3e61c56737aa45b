//! Client registration and the messages handed to consumers (§3, §4.2)
//!
//! In-process clients get a request/response channel pair and pull the next
//! slot by sending an empty request and blocking on the response; the
//! request itself doubles as the acknowledgement that releases the previous
//! slot (§4.3 I3). Inter-process clients get a capacity-1 queue the
//! dispatcher pushes owned copies into on a best-effort basis, matching the
//! reference program's `mp.Queue(1)` display queues.

use std::sync::Arc;

use crossbeam_channel::{bounded, Receiver, Sender};
use parking_lot::Mutex;

use super::ring_buffer::RingBuffer;
use super::sample_block::SampleBlock;

/// How a registered in-process client is served (§3 `ClientMode`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientMode {
    /// Zero-copy view into the ring buffer; the dispatcher will not free the
    /// slot until this client requests its next one. Always obligatory.
    PointerOblig,
    /// Owned copy, delivered only when the client is ready; dropped instead
    /// of blocking the dispatcher if the client is still busy.
    CopyRand,
    /// Owned copy, delivered for every slot; the dispatcher waits for this
    /// client before freeing the slot.
    CopyOblig,
}

impl ClientMode {
    /// Whether the dispatcher must wait for this client before declaring a
    /// slot free (§4.3).
    pub fn is_obligatory(self) -> bool {
        matches!(self, ClientMode::PointerOblig | ClientMode::CopyOblig)
    }
}

/// One slot's contents, as handed to an in-process client or an IPC queue.
pub enum SlotMessage {
    /// A non-owning view, valid until the client sends its next request.
    Pointer { ring: Arc<RingBuffer>, index: usize, trigger_time: f64, sequence_number: u64 },
    /// An owned copy the client may keep indefinitely.
    Owned { block: SampleBlock, trigger_time: f64, sequence_number: u64 },
}

impl SlotMessage {
    /// Seconds since run start the trigger fired.
    pub fn trigger_time(&self) -> f64 {
        match self {
            SlotMessage::Pointer { trigger_time, .. } => *trigger_time,
            SlotMessage::Owned { trigger_time, .. } => *trigger_time,
        }
    }

    /// 1-based, strictly increasing sequence number.
    pub fn sequence_number(&self) -> u64 {
        match self {
            SlotMessage::Pointer { sequence_number, .. } => *sequence_number,
            SlotMessage::Owned { sequence_number, .. } => *sequence_number,
        }
    }

    /// Read-only view of one channel's waveform.
    ///
    /// For a [`SlotMessage::Pointer`] this is only valid for as long as the
    /// owning [`ClientHandle`] has not yet requested its next slot (§4.3 I3);
    /// every caller in this crate upholds that by construction.
    pub fn channel(&self, index: usize) -> &[f32] {
        match self {
            SlotMessage::Pointer { ring, index: slot_index, .. } => {
                // Safety: the dispatcher does not free this slot's release
                // token until this handle requests its next message (I3).
                unsafe { ring.slot(*slot_index).block().channel(index) }
            }
            SlotMessage::Owned { block, .. } => block.channel(index),
        }
    }
}

/// Handle returned to an in-process client by [`ClientRegistry::register_in_process`].
pub struct ClientHandle {
    request_tx: Sender<()>,
    response_rx: Receiver<SlotMessage>,
}

impl ClientHandle {
    /// Ask the dispatcher for the next slot and block until it arrives.
    /// Returns `None` once the dispatcher has shut down.
    pub fn next(&self) -> Option<SlotMessage> {
        self.request_tx.send(()).ok()?;
        self.response_rx.recv().ok()
    }
}

/// Dispatcher-side bookkeeping for one in-process client.
pub(crate) struct ClientSlot {
    pub mode: ClientMode,
    pub request_rx: Receiver<()>,
    pub response_tx: Sender<SlotMessage>,
}

/// Dispatcher-side bookkeeping for one inter-process display consumer.
pub(crate) struct IpcQueue {
    pub name: String,
    pub tx: Sender<SlotMessage>,
}

/// Append-only registry of in-process and inter-process consumers (§3
/// `ClientRegistry`). Registration only ever appends, matching the
/// reference program's registration-before-`start()` discipline (§4.2).
#[derive(Default)]
pub struct ClientRegistry {
    pub(crate) clients: Mutex<Vec<ClientSlot>>,
    pub(crate) ipc: Mutex<Vec<IpcQueue>>,
}

impl ClientRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an in-process consumer and get back its pull handle.
    pub fn register_in_process(&self, mode: ClientMode) -> ClientHandle {
        let (request_tx, request_rx) = bounded(1);
        let (response_tx, response_rx) = bounded(1);
        self.clients.lock().push(ClientSlot { mode, request_rx, response_tx });
        ClientHandle { request_tx, response_rx }
    }

    /// Register an out-of-process display consumer under `name` and get
    /// back the receiving end of its capacity-1 queue. Spawning the
    /// subprocess that will read from it is an external collaborator's job.
    pub fn register_inter_process(&self, name: impl Into<String>) -> Receiver<SlotMessage> {
        let (tx, rx) = bounded(1);
        self.ipc.lock().push(IpcQueue { name: name.into(), tx });
        rx
    }

    /// Number of registered in-process clients.
    pub fn in_process_count(&self) -> usize {
        self.clients.lock().len()
    }

    /// Number of registered IPC queues.
    pub fn inter_process_count(&self) -> usize {
        self.ipc.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_in_process_counts() {
        let registry = ClientRegistry::new();
        let _a = registry.register_in_process(ClientMode::CopyRand);
        let _b = registry.register_in_process(ClientMode::PointerOblig);
        assert_eq!(registry.in_process_count(), 2);
    }

    #[test]
    fn test_register_inter_process_counts() {
        let registry = ClientRegistry::new();
        let _rx = registry.register_inter_process("histogram");
        assert_eq!(registry.inter_process_count(), 1);
    }

    #[test]
    fn test_client_mode_obligatory() {
        assert!(ClientMode::PointerOblig.is_obligatory());
        assert!(ClientMode::CopyOblig.is_obligatory());
        assert!(!ClientMode::CopyRand.is_obligatory());
    }

    #[test]
    fn test_owned_slot_message_channel() {
        let mut block = SampleBlock::new(1, 2);
        block.as_mut_slice().copy_from_slice(&[1.0, 2.0]);
        let msg = SlotMessage::Owned { block, trigger_time: 0.5, sequence_number: 3 };
        assert_eq!(msg.channel(0), &[1.0, 2.0]);
        assert_eq!(msg.sequence_number(), 3);
    }
}
