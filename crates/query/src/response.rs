//! Response payloads.
//!
//! Raw points are returned as a GeoJSON FeatureCollection, aggregated rows
//! and the data range as plain JSON.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use storage::{AverageRow, DataRange, Observation, QueryRows, StatisticsRow, SECONDS_PER_DAY};

use crate::error::QueryResult;

/// A GeoJSON FeatureCollection of observation points.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeatureCollection {
    #[serde(rename = "type")]
    pub type_: String,
    pub features: Vec<Feature>,
}

impl FeatureCollection {
    pub fn new(features: Vec<Feature>) -> Self {
        Self {
            type_: "FeatureCollection".to_string(),
            features,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Feature {
    #[serde(rename = "type")]
    pub type_: String,
    pub geometry: PointGeometry,
    pub properties: PointProperties,
}

impl From<&Observation> for Feature {
    fn from(observation: &Observation) -> Self {
        Self {
            type_: "Feature".to_string(),
            geometry: PointGeometry {
                type_: "Point".to_string(),
                coordinates: [observation.longitude, observation.latitude],
            },
            properties: PointProperties {
                value: observation.value,
                timestamp: observation.timestamp,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PointGeometry {
    #[serde(rename = "type")]
    pub type_: String,
    /// `[longitude, latitude]`
    pub coordinates: [f64; 2],
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PointProperties {
    pub value: f64,
    pub timestamp: DateTime<Utc>,
}

/// Daily average with the bounds of its day.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AveragePayload {
    pub average: f64,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl From<&AverageRow> for AveragePayload {
    fn from(row: &AverageRow) -> Self {
        Self {
            average: row.average,
            start: row.day,
            end: row.day + Duration::seconds(SECONDS_PER_DAY),
        }
    }
}

/// Statistics of one bucket.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatisticsPayload {
    pub value: StatisticsValues,
    pub time: StatisticsTimes,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatisticsValues {
    pub count: i64,
    pub average: f64,
    /// Sample standard deviation; `null` for fewer than two observations.
    #[serde(rename = "standard deviation")]
    pub standard_deviation: Option<f64>,
    pub min: f64,
    pub max: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatisticsTimes {
    /// Earliest observation in the bucket.
    pub min: DateTime<Utc>,
    /// Latest observation in the bucket.
    pub max: DateTime<Utc>,
    pub interval_start: DateTime<Utc>,
}

impl From<&StatisticsRow> for StatisticsPayload {
    fn from(row: &StatisticsRow) -> Self {
        Self {
            value: StatisticsValues {
                count: row.count,
                average: row.average,
                standard_deviation: row.standard_deviation,
                min: row.min,
                max: row.max,
            },
            time: StatisticsTimes {
                min: row.min_timestamp,
                max: row.max_timestamp,
                interval_start: row.interval_start,
            },
        }
    }
}

/// Serialize query rows into the payload of their shape.
pub fn encode_rows(rows: &QueryRows) -> QueryResult<Vec<u8>> {
    let bytes = match rows {
        QueryRows::Points(observations) => serde_json::to_vec(&FeatureCollection::new(
            observations.iter().map(Feature::from).collect(),
        ))?,
        QueryRows::Averages(rows) => {
            serde_json::to_vec(&rows.iter().map(AveragePayload::from).collect::<Vec<_>>())?
        }
        QueryRows::Statistics(rows) => {
            serde_json::to_vec(&rows.iter().map(StatisticsPayload::from).collect::<Vec<_>>())?
        }
    };
    Ok(bytes)
}

pub fn encode_data_range(range: &DataRange) -> QueryResult<Vec<u8>> {
    Ok(serde_json::to_vec(range)?)
}
