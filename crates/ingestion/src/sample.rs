//! Raw samples as produced by a scan decoder.

use chrono::{DateTime, Utc};

/// One geolocated measurement with its quality score (0–100).
#[derive(Debug, Clone, PartialEq)]
pub struct RawSample {
    pub value: f64,
    pub longitude: f64,
    pub latitude: f64,
    pub timestamp: DateTime<Utc>,
    pub quality: u8,
}

/// The decoded samples of one source file.
///
/// Iterating borrows the samples, so a scan can be walked any number of times.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Scan {
    samples: Vec<RawSample>,
    masked: usize,
}

impl Scan {
    pub fn new(samples: Vec<RawSample>) -> Self {
        Self::with_masked(samples, 0)
    }

    /// Scan whose source also held `masked` records without a measurement.
    pub fn with_masked(samples: Vec<RawSample>, masked: usize) -> Self {
        Self { samples, masked }
    }

    /// Records that carried no measurement and produced no sample.
    pub fn masked(&self) -> usize {
        self.masked
    }

    /// Number of samples in the scan.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, RawSample> {
        self.samples.iter()
    }
}

impl<'a> IntoIterator for &'a Scan {
    type Item = &'a RawSample;
    type IntoIter = std::slice::Iter<'a, RawSample>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl FromIterator<RawSample> for Scan {
    fn from_iter<I: IntoIterator<Item = RawSample>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}
