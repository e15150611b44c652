//! Bounded, chronologically ordered history of utilization samples.

use downshift_core::UtilizationSample;

/// Fixed-capacity sliding window of utilization observations.
///
/// Samples are kept sorted by timestamp; appending past capacity
/// evicts the oldest sample. Samples sharing a timestamp keep their
/// arrival order.
#[derive(Debug, Clone)]
pub struct SampleWindow {
    samples: Vec<UtilizationSample>,
    capacity: usize,
}

impl SampleWindow {
    /// Create a window retaining at most `history_periods` samples.
    pub fn new(history_periods: usize) -> Self {
        Self {
            samples: Vec::with_capacity(history_periods),
            capacity: history_periods.max(1),
        }
    }

    /// Insert a sample at its chronological position, evicting the
    /// oldest sample if the window is full. Always succeeds.
    pub fn append(&mut self, sample: UtilizationSample) {
        // After any existing sample with the same epoch, so arrival
        // order is preserved on timestamp ties.
        let at = self.samples.partition_point(|s| s.epoch <= sample.epoch);
        self.samples.insert(at, sample);
        if self.samples.len() > self.capacity {
            self.samples.remove(0);
        }
    }

    /// Read-only view of the current samples, oldest first.
    pub fn samples(&self) -> &[UtilizationSample] {
        &self.samples
    }

    /// The most recent sample, if any.
    pub fn latest(&self) -> Option<UtilizationSample> {
        self.samples.last().copied()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Change the retention limit, evicting oldest samples as needed.
    /// Used when a reloaded config shrinks `history_periods`.
    pub fn set_capacity(&mut self, history_periods: usize) {
        self.capacity = history_periods.max(1);
        while self.samples.len() > self.capacity {
            self.samples.remove(0);
        }
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }
}
