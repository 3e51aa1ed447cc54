//! Running statistics driving the adaptive playback rate
//!
//! Both statistics are exponential moving averages so that a buffer keeps
//! constant memory no matter how long a source stays connected.

/// Exponential moving average over roughly `samples` values
#[derive(Debug, Clone)]
pub struct RunningAverage {
    value: f32,
    alpha: f32,
}

impl RunningAverage {
    /// Create an average seeded with `initial`
    pub fn new(samples: u32, initial: f32) -> Self {
        Self {
            value: initial,
            alpha: 1.0 / samples.max(1) as f32,
        }
    }

    /// Fold a new sample into the average
    pub fn add(&mut self, sample: f32) {
        self.value += (sample - self.value) * self.alpha;
    }

    /// Current average
    pub fn value(&self) -> f32 {
        self.value
    }

    /// Overwrite the average
    pub fn reset(&mut self, value: f32) {
        self.value = value;
    }
}

/// Availability statistics for a window of candidate playback offsets
///
/// Slot `i` tracks how often data would have been available had the cursor
/// been `(i - centre)` sub-steps ahead of where it actually was. The centre
/// slot is the current rate, the slot below it one sub-step slower, the slot
/// above it one sub-step faster.
#[derive(Debug, Clone)]
pub struct AvailabilityHistogram {
    slots: Vec<RunningAverage>,
}

impl AvailabilityHistogram {
    /// Create a histogram with `slots` slots (rounded up to an odd count)
    pub fn new(slots: usize, samples: u32, initial: f32) -> Self {
        let count = slots.max(3) | 1;
        Self {
            slots: (0..count)
                .map(|_| RunningAverage::new(samples, initial))
                .collect(),
        }
    }

    /// Index of the slot matching the current rate
    pub fn centre(&self) -> usize {
        self.slots.len() / 2
    }

    /// Number of slots
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Always false; a histogram has at least three slots
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Record availability for every slot
    ///
    /// `available(offset)` answers whether data existed for a cursor moved
    /// `offset` sub-steps from the current candidate.
    pub fn record(&mut self, mut available: impl FnMut(i32) -> bool) {
        let centre = self.centre() as i32;
        for (i, slot) in self.slots.iter_mut().enumerate() {
            let sample = if available(i as i32 - centre) { 1.0 } else { 0.0 };
            slot.add(sample);
        }
    }

    /// Availability at the current rate
    pub fn current(&self) -> f32 {
        self.slots[self.centre()].value()
    }

    /// Availability one sub-step slower
    pub fn slower(&self) -> f32 {
        self.slots[self.centre() - 1].value()
    }

    /// Availability one sub-step faster
    pub fn faster(&self) -> f32 {
        self.slots[self.centre() + 1].value()
    }

    /// Re-centre the window one sub-step slower
    ///
    /// Every slot takes the statistic of its slower neighbour; the slowest
    /// slot keeps its value.
    pub fn shift_slower(&mut self) {
        for i in (1..self.slots.len()).rev() {
            let value = self.slots[i - 1].value();
            self.slots[i].reset(value);
        }
    }

    /// Re-centre the window one sub-step faster
    ///
    /// Every slot takes the statistic of its faster neighbour; the fastest
    /// slot keeps its value.
    pub fn shift_faster(&mut self) {
        for i in 0..self.slots.len() - 1 {
            let value = self.slots[i + 1].value();
            self.slots[i].reset(value);
        }
    }

    /// Reset every slot to `value`
    pub fn reset(&mut self, value: f32) {
        for slot in &mut self.slots {
            slot.reset(value);
        }
    }
}
