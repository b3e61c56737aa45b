//! `SampleBlock` and `Slot`: the ring buffer's storage unit (§3)

/// A rectangular `[channels × samples]` array of float32 voltages, one per
/// ring-buffer slot. Allocated once and overwritten in place by the
/// producer, never reallocated during a run.
#[derive(Debug, Clone)]
pub struct SampleBlock {
    data: Vec<f32>,
    channels: usize,
    samples: usize,
}

impl SampleBlock {
    /// Allocate a zero-filled block for `channels × samples` voltages.
    pub fn new(channels: usize, samples: usize) -> Self {
        Self { data: vec![0.0; channels * samples], channels, samples }
    }

    /// Number of channels.
    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Number of samples per channel.
    pub fn samples(&self) -> usize {
        self.samples
    }

    /// Read-only view of one channel's waveform.
    pub fn channel(&self, index: usize) -> &[f32] {
        let start = index * self.samples;
        &self.data[start..start + self.samples]
    }

    /// Mutable view of the whole row-major buffer, for the producer to fill
    /// via [`crate::device::AcquireDevice::acquire`].
    pub fn as_mut_slice(&mut self) -> &mut [f32] {
        &mut self.data
    }

    /// Read-only view of the whole row-major buffer.
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }
}

/// One element of the ring buffer: the sample data plus the bookkeeping the
/// dispatcher hands out alongside it (§3 `Slot`).
#[derive(Debug, Clone)]
pub struct Slot {
    pub(crate) block: SampleBlock,
    /// Seconds since run start, monotonic (`triggerTime`).
    pub trigger_time: f64,
    /// 1-based, strictly increasing (`sequenceNumber`).
    pub sequence_number: u64,
}

impl Slot {
    /// Allocate an empty slot for the given block shape.
    pub fn new(channels: usize, samples: usize) -> Self {
        Self { block: SampleBlock::new(channels, samples), trigger_time: 0.0, sequence_number: 0 }
    }

    /// The sample data.
    pub fn block(&self) -> &SampleBlock {
        &self.block
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_view() {
        let mut block = SampleBlock::new(2, 4);
        block.as_mut_slice().copy_from_slice(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0]);
        assert_eq!(block.channel(0), &[1.0, 2.0, 3.0, 4.0]);
        assert_eq!(block.channel(1), &[5.0, 6.0, 7.0, 8.0]);
    }
}
