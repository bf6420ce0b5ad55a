//! Time parsing and time windows.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::{EmissionsError, EmissionsResult};

/// Parse an instant from a request parameter.
///
/// Supports RFC 3339 (`2020-01-01T12:00:00Z`), a timestamp without zone
/// (`2020-01-01T12:00:00`, assumed UTC) and a plain date (`2020-01-01`,
/// midnight UTC).
pub fn parse_instant(s: &str) -> EmissionsResult<DateTime<Utc>> {
    let s = s.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }

    if let Ok(ndt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f") {
        return Ok(Utc.from_utc_datetime(&ndt));
    }

    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        if let Some(ndt) = date.and_hms_opt(0, 0, 0) {
            return Ok(Utc.from_utc_datetime(&ndt));
        }
    }

    Err(EmissionsError::InvalidTime(s.to_string()))
}

/// The `[begin, end)` range a cached response depends on.
///
/// `None` on either side is an open bound. A window with both sides open
/// depends on the whole data range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TimeWindow {
    pub begin: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl TimeWindow {
    pub fn new(begin: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Self {
        Self { begin, end }
    }

    /// A window with both bounds open.
    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn is_unbounded(&self) -> bool {
        self.begin.is_none() && self.end.is_none()
    }

    /// Whether data with timestamps in `[earliest, latest]` can affect a
    /// response depending on this window.
    pub fn overlaps(&self, earliest: DateTime<Utc>, latest: DateTime<Utc>) -> bool {
        self.begin.map_or(true, |begin| begin <= latest)
            && self.end.map_or(true, |end| end > earliest)
    }

    /// Whether an instant lies inside the window (begin inclusive, end exclusive).
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.begin.map_or(true, |begin| begin <= instant)
            && self.end.map_or(true, |end| instant < end)
    }
}
