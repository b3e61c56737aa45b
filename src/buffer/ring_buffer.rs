//! Fixed-capacity ring buffer storage (§3, §4.1)
//!
//! Storage is a plain array of [`Slot`]s, mutated in place by exactly one
//! producer and read by the dispatcher and the clients it hands views to.
//! Unlike the reference crate's disruptor-style ring buffer, which
//! synchronizes solely through atomic sequence counters polled in a spin
//! loop, this buffer's mutual exclusion is enforced by a per-slot release
//! channel (§5.1): a slot may only be written by the producer while it holds
//! that slot's release token, and the token is only handed back by the
//! dispatcher once every obligatory consumer has acknowledged the slot
//! (I2/I3). `slot`/`slot_mut` are therefore safe to call without additional
//! locking as long as callers respect the token protocol, which is true of
//! every caller in this crate.

use std::cell::UnsafeCell;

use crossbeam_channel::{bounded, Receiver, Sender};

use super::sample_block::Slot;

/// One slot's release-token channel: a single unit value in flight means
/// "this slot is free to write."
pub(crate) struct ReleaseChannel {
    pub(crate) tx: Sender<()>,
    pub(crate) rx: Receiver<()>,
}

/// The ring buffer's fixed-capacity storage (§3 `SampleBlock`/`Slot`).
pub struct RingBuffer {
    slots: Box<[UnsafeCell<Slot>]>,
    releases: Box<[ReleaseChannel]>,
    n_buffers: usize,
}

// Safety: access to `slots[i]` is serialized by the release-token protocol
// documented on the type; no two threads ever hold the token for the same
// index at once (I2/I3).
unsafe impl Send for RingBuffer {}
unsafe impl Sync for RingBuffer {}

impl RingBuffer {
    /// Allocate `n_buffers` slots, each sized for `channels × samples`
    /// voltages. Every slot starts with its release token available, so the
    /// producer can fill the whole buffer once before any client has
    /// registered.
    pub fn new(n_buffers: usize, channels: usize, samples: usize) -> Self {
        let slots = (0..n_buffers).map(|_| UnsafeCell::new(Slot::new(channels, samples))).collect();
        let releases = (0..n_buffers)
            .map(|_| {
                let (tx, rx) = bounded(1);
                tx.send(()).expect("fresh channel accepts the initial token");
                ReleaseChannel { tx, rx }
            })
            .collect();
        Self { slots, releases, n_buffers }
    }

    /// Ring-buffer capacity (`NBuffers`).
    pub fn capacity(&self) -> usize {
        self.n_buffers
    }

    /// Receiver side of slot `index`'s release-token channel; the producer
    /// waits here before it may write into the slot.
    pub(crate) fn release_rx(&self, index: usize) -> &Receiver<()> {
        &self.releases[index].rx
    }

    /// Sender side of slot `index`'s release-token channel; the dispatcher
    /// sends here once every obligatory consumer has acknowledged the slot.
    pub(crate) fn release_tx(&self, index: usize) -> &Sender<()> {
        &self.releases[index].tx
    }

    /// Mutable access to slot `index`.
    ///
    /// # Safety
    /// The caller must currently hold that slot's release token (i.e. have
    /// received it from [`RingBuffer::release_rx`] and not yet returned it).
    /// Only the producer loop calls this.
    #[allow(clippy::mut_from_ref)]
    pub(crate) unsafe fn slot_mut(&self, index: usize) -> &mut Slot {
        &mut *self.slots[index].get()
    }

    /// Read-only access to slot `index`.
    ///
    /// # Safety
    /// The caller must be the dispatcher (or a pointer-holding consumer
    /// within the window the dispatcher guarantees via I3) reading a slot
    /// the producer is not concurrently writing.
    pub(crate) unsafe fn slot(&self, index: usize) -> &Slot {
        &*self.slots[index].get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_tokens_available() {
        let rb = RingBuffer::new(4, 2, 8);
        for i in 0..4 {
            assert!(rb.release_rx(i).try_recv().is_ok());
        }
    }

    #[test]
    fn test_write_then_read_slot() {
        let rb = RingBuffer::new(2, 1, 4);
        unsafe {
            let slot = rb.slot_mut(0);
            slot.block.as_mut_slice().copy_from_slice(&[1.0, 2.0, 3.0, 4.0]);
            slot.sequence_number = 7;
        }
        unsafe {
            let slot = rb.slot(0);
            assert_eq!(slot.sequence_number, 7);
            assert_eq!(slot.block().channel(0), &[1.0, 2.0, 3.0, 4.0]);
        }
    }
}
