//! Stored observation records and the unit of work that writes them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use emissions_common::{TableName, TimeWindow};

/// One persisted grid-cell measurement.
///
/// The point geometry is derived from `longitude`/`latitude` when written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub value: f64,
    pub longitude: f64,
    pub latitude: f64,
    pub timestamp: DateTime<Utc>,
}

/// First and last timestamp stored for a product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DataRange {
    pub first: Option<DateTime<Utc>>,
    pub last: Option<DateTime<Utc>>,
}

/// Everything one source file writes, committed atomically.
#[derive(Debug, Clone)]
pub struct ScanCommit {
    /// File name recorded as processed.
    pub filename: String,
    /// Observation table of the product.
    pub table: TableName,
    /// May be empty; the file is then only marked.
    pub observations: Vec<Observation>,
}

impl ScanCommit {
    /// Earliest and latest observation timestamp, if there are observations.
    pub fn time_span(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        let mut timestamps = self.observations.iter().map(|o| o.timestamp);
        let first = timestamps.next()?;
        Some(timestamps.fold((first, first), |(lo, hi), ts| (lo.min(ts), hi.max(ts))))
    }
}

/// Result of committing a scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    Committed { inserted: u64, invalidated: u64 },
    /// Another run already recorded this file; nothing was written.
    AlreadyIngested,
}

/// A persisted response together with the window it depends on.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub fingerprint: String,
    pub window: TimeWindow,
    pub response: Vec<u8>,
}
