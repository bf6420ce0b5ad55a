//! Quality filtering of raw samples.

use crate::sample::RawSample;

/// Default minimum quality on the 0–100 scale.
pub const DEFAULT_QUALITY_THRESHOLD: u8 = 50;

/// Keeps a sample iff its quality is at least the threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QualityFilter {
    threshold: u8,
}

impl Default for QualityFilter {
    fn default() -> Self {
        Self::new(DEFAULT_QUALITY_THRESHOLD)
    }
}

impl QualityFilter {
    pub fn new(threshold: u8) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> u8 {
        self.threshold
    }

    pub fn keeps(&self, sample: &RawSample) -> bool {
        sample.quality >= self.threshold
    }

    /// Lazily filter a sample stream; chainable in front of aggregation.
    pub fn apply<'a, I>(&self, samples: I) -> impl Iterator<Item = &'a RawSample>
    where
        I: IntoIterator<Item = &'a RawSample>,
    {
        let filter = *self;
        samples.into_iter().filter(move |s| filter.keeps(s))
    }
}
