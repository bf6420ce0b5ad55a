//! Normalization of request parameters into a typed filter set.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

use emissions_common::{
    parse_instant, validate_coordinates, BoundingBox, EmissionsError, EmissionsResult, Polygon,
    TimeWindow,
};
use storage::SECONDS_PER_DAY;

/// Raw request parameters, keyed by name.
pub type Params = BTreeMap<String, String>;

/// Location parameters; at most one may be given.
pub const LOCATION_PARAMS: [&str; 4] = ["geoframe", "country", "polygon", "point"];

/// Where observations must lie.
#[derive(Debug, Clone, PartialEq)]
pub enum LocationFilter {
    /// Rectangle given by two opposite corners.
    Rectangle(BoundingBox),
    /// Region code, upper-cased.
    Region(String),
    Polygon(Polygon),
    Point { longitude: f64, latitude: f64 },
}

/// All filters of one request after validation.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FilterSet {
    pub location: Option<LocationFilter>,
    /// Inclusive.
    pub begin: Option<DateTime<Utc>>,
    /// Exclusive.
    pub end: Option<DateTime<Utc>>,
    /// Statistics bucket length in seconds.
    pub interval_secs: Option<i64>,
    pub limit: Option<u64>,
    pub offset: u64,
}

impl FilterSet {
    /// Parse and validate request parameters. Unknown parameters are ignored.
    pub fn parse(params: &Params) -> EmissionsResult<Self> {
        let get = |name: &str| param(params, name);

        let given: Vec<(&str, &str)> = LOCATION_PARAMS
            .iter()
            .filter_map(|&name| param(params, name).map(|value| (name, value)))
            .collect();
        if given.len() > 1 {
            let names: Vec<&str> = given.iter().map(|(name, _)| *name).collect();
            return Err(EmissionsError::ConflictingParameters(names.join(", ")));
        }

        let location = match given.first() {
            Some(&("geoframe", value)) => Some(LocationFilter::Rectangle(
                BoundingBox::from_values(&parse_numbers("geoframe", value)?)?,
            )),
            Some(&("country", value)) => Some(parse_region(value)?),
            Some(&("polygon", value)) => Some(LocationFilter::Polygon(
                Polygon::from_flat_coordinates(&parse_numbers("polygon", value)?)?,
            )),
            Some(&(_, value)) => Some(parse_point(value)?),
            None => None,
        };

        let begin = get("begin").map(parse_instant).transpose()?;
        let end = get("end").map(parse_instant).transpose()?;
        if let (Some(b), Some(e)) = (begin, end) {
            if b >= e {
                return Err(EmissionsError::InvalidTime(format!(
                    "begin {} must be before end {}",
                    b.to_rfc3339(),
                    e.to_rfc3339()
                )));
            }
        }

        Ok(Self {
            location,
            begin,
            end,
            interval_secs: get("interval").map(parse_interval).transpose()?,
            limit: get("limit").map(|v| parse_count("limit", v)).transpose()?,
            offset: get("offset")
                .map(|v| parse_count("offset", v))
                .transpose()?
                .unwrap_or(0),
        })
    }

    /// The time window a response computed from these filters depends on.
    pub fn window(&self) -> TimeWindow {
        TimeWindow::new(self.begin, self.end)
    }
}

/// Trimmed parameter value; empty values count as absent.
fn param<'a>(params: &'a Params, name: &str) -> Option<&'a str> {
    params
        .get(name)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
}

/// Parse a comma-separated list of numbers.
pub fn parse_numbers(param: &str, value: &str) -> EmissionsResult<Vec<f64>> {
    value
        .split(',')
        .map(|part| {
            let part = part.trim();
            part.parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .ok_or_else(|| {
                    EmissionsError::invalid_parameter(param, format!("'{}' is not a number", part))
                })
        })
        .collect()
}

fn parse_region(code: &str) -> EmissionsResult<LocationFilter> {
    let valid = (2..=3).contains(&code.len()) && code.chars().all(|c| c.is_ascii_alphabetic());
    if !valid {
        return Err(EmissionsError::invalid_parameter(
            "country",
            format!("'{}' is not a two- or three-letter code", code),
        ));
    }
    Ok(LocationFilter::Region(code.to_ascii_uppercase()))
}

fn parse_point(value: &str) -> EmissionsResult<LocationFilter> {
    match parse_numbers("point", value)?.as_slice() {
        [longitude, latitude] => {
            validate_coordinates(*longitude, *latitude)?;
            Ok(LocationFilter::Point {
                longitude: *longitude,
                latitude: *latitude,
            })
        }
        values => Err(EmissionsError::invalid_parameter(
            "point",
            format!("Expected 2 values, got {}", values.len()),
        )),
    }
}

fn parse_count(param: &str, value: &str) -> EmissionsResult<u64> {
    value.parse().map_err(|_| {
        EmissionsError::invalid_parameter(param, format!("'{}' is not a non-negative integer", value))
    })
}

/// Parse a statistics interval: `hour`, `day`, `week` or `<n>` followed by
/// `s`, `m`, `h` or `d`.
pub fn parse_interval(value: &str) -> EmissionsResult<i64> {
    let invalid = || {
        EmissionsError::invalid_parameter(
            "interval",
            format!("'{}' is not a valid interval", value),
        )
    };

    let value = value.trim().to_ascii_lowercase();
    match value.as_str() {
        "hour" => return Ok(3_600),
        "day" => return Ok(SECONDS_PER_DAY),
        "week" => return Ok(7 * SECONDS_PER_DAY),
        _ => {}
    }

    let split = value.len().checked_sub(1).ok_or_else(invalid)?;
    if !value.is_char_boundary(split) {
        return Err(invalid());
    }
    let (count, unit) = value.split_at(split);
    let unit_secs = match unit {
        "s" => 1,
        "m" => 60,
        "h" => 3_600,
        "d" => SECONDS_PER_DAY,
        _ => return Err(invalid()),
    };

    count
        .parse::<i64>()
        .ok()
        .filter(|n| *n > 0)
        .and_then(|n| n.checked_mul(unit_secs))
        .ok_or_else(invalid)
}
