//! Observation query plans.
//!
//! A plan is built once by the query layer and executed by a store: the
//! PostgreSQL store renders it to PostGIS SQL with positional parameters, the
//! in-memory store evaluates it directly. Both produce the same rows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;

use emissions_common::{haversine_distance, Geometry, TableName};

use crate::error::{StorageError, StorageResult};
use crate::observation::Observation;

/// Length of the fixed daily bucket.
pub const SECONDS_PER_DAY: i64 = 86_400;

/// Spatial restriction of a query.
#[derive(Debug, Clone, PartialEq)]
pub enum LocationPredicate {
    /// Observation lies inside the area.
    Within(Geometry),
    /// Observation lies within `radius_m` meters of the point.
    Near {
        longitude: f64,
        latitude: f64,
        radius_m: f64,
    },
}

impl LocationPredicate {
    pub fn matches(&self, longitude: f64, latitude: f64) -> bool {
        match self {
            LocationPredicate::Within(geometry) => geometry.contains_point(longitude, latitude),
            LocationPredicate::Near {
                longitude: lon,
                latitude: lat,
                radius_m,
            } => haversine_distance(*lon, *lat, longitude, latitude) <= *radius_m,
        }
    }
}

/// Shape of the result rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregation {
    /// Raw observations.
    Points,
    /// Mean value per UTC day.
    DailyAverage,
    /// Full statistics per bucket of `period_secs` seconds.
    Statistics { period_secs: i64 },
}

impl Aggregation {
    fn bucket_secs(&self) -> Option<i64> {
        match self {
            Aggregation::Points => None,
            Aggregation::DailyAverage => Some(SECONDS_PER_DAY),
            Aggregation::Statistics { period_secs } => Some(*period_secs),
        }
    }
}

/// A filtered, aggregated and paginated read over one product table.
#[derive(Debug, Clone, PartialEq)]
pub struct ObservationQuery {
    pub table: TableName,
    pub location: Option<LocationPredicate>,
    /// Inclusive lower bound.
    pub begin: Option<DateTime<Utc>>,
    /// Exclusive upper bound.
    pub end: Option<DateTime<Utc>>,
    pub aggregation: Aggregation,
    pub limit: Option<u64>,
    pub offset: u64,
}

/// Per-day average row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AverageRow {
    pub average: f64,
    pub day: DateTime<Utc>,
}

/// Statistics of one bucket. The timestamps are the observed extremes, which
/// may be narrower than the bucket itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatisticsRow {
    pub count: i64,
    pub average: f64,
    pub standard_deviation: Option<f64>,
    pub min: f64,
    pub max: f64,
    pub min_timestamp: DateTime<Utc>,
    pub max_timestamp: DateTime<Utc>,
    pub interval_start: DateTime<Utc>,
}

/// Rows returned by executing a plan.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryRows {
    Points(Vec<Observation>),
    Averages(Vec<AverageRow>),
    Statistics(Vec<StatisticsRow>),
}

impl QueryRows {
    pub fn len(&self) -> usize {
        match self {
            QueryRows::Points(rows) => rows.len(),
            QueryRows::Averages(rows) => rows.len(),
            QueryRows::Statistics(rows) => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A positional SQL parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlParam {
    Text(String),
    Float(f64),
    Int(i64),
    Time(DateTime<Utc>),
}

impl ObservationQuery {
    /// Plan returning every raw observation of the table.
    pub fn new(table: TableName) -> Self {
        Self {
            table,
            location: None,
            begin: None,
            end: None,
            aggregation: Aggregation::Points,
            limit: None,
            offset: 0,
        }
    }

    pub fn validate(&self) -> StorageResult<()> {
        if let Aggregation::Statistics { period_secs } = self.aggregation {
            if period_secs <= 0 {
                return Err(StorageError::InvalidQuery(format!(
                    "Statistics period must be positive, got {}s",
                    period_secs
                )));
            }
        }
        Ok(())
    }

    /// Render the plan as PostGIS SQL with `$n` placeholders.
    pub fn to_sql(&self) -> StorageResult<(String, Vec<SqlParam>)> {
        self.validate()?;

        let mut params = Vec::new();
        let bucket = self.aggregation.bucket_secs().map(|n| {
            format!(
                "to_timestamp(floor(extract(epoch FROM \"timestamp\")::float8 / {n}) * {n})",
                n = n
            )
        });

        let mut sql = match (&self.aggregation, &bucket) {
            (Aggregation::Points, _) => {
                "SELECT value, longitude, latitude, \"timestamp\" FROM ".to_string()
            }
            (Aggregation::DailyAverage, Some(bucket)) => {
                format!("SELECT AVG(value) AS average, {} AS day FROM ", bucket)
            }
            (Aggregation::Statistics { .. }, Some(bucket)) => format!(
                "SELECT COUNT(value) AS count, AVG(value) AS average, \
                 stddev_samp(value) AS standard_deviation, \
                 MIN(value) AS min, MAX(value) AS max, \
                 MIN(\"timestamp\") AS min_timestamp, MAX(\"timestamp\") AS max_timestamp, \
                 {} AS interval_start FROM ",
                bucket
            ),
            _ => {
                return Err(StorageError::InvalidQuery(
                    "Aggregation without bucket".to_string(),
                ))
            }
        };
        sql.push_str(self.table.as_str());
        sql.push_str(" WHERE TRUE");

        match &self.location {
            Some(LocationPredicate::Within(geometry)) => {
                let area = push_param(&mut params, SqlParam::Text(geometry.to_wkt()));
                sql.push_str(&format!(
                    " AND ST_Within(geom, ST_GeomFromText({}, 4326))",
                    area
                ));
            }
            Some(LocationPredicate::Near {
                longitude,
                latitude,
                radius_m,
            }) => {
                let lon = push_param(&mut params, SqlParam::Float(*longitude));
                let lat = push_param(&mut params, SqlParam::Float(*latitude));
                let radius = push_param(&mut params, SqlParam::Float(*radius_m));
                sql.push_str(&format!(
                    " AND ST_DWithin(geom::geography, \
                     ST_SetSRID(ST_MakePoint({}, {}), 4326)::geography, {})",
                    lon, lat, radius
                ));
            }
            None => {}
        }

        if let Some(begin) = self.begin {
            let p = push_param(&mut params, SqlParam::Time(begin));
            sql.push_str(&format!(" AND \"timestamp\" >= {}", p));
        }
        if let Some(end) = self.end {
            let p = push_param(&mut params, SqlParam::Time(end));
            sql.push_str(&format!(" AND \"timestamp\" < {}", p));
        }

        sql.push_str(match self.aggregation {
            Aggregation::Points => " ORDER BY \"timestamp\", longitude, latitude, value",
            Aggregation::DailyAverage => " GROUP BY day ORDER BY day",
            Aggregation::Statistics { .. } => " GROUP BY interval_start ORDER BY interval_start",
        });

        if let Some(limit) = self.limit {
            let p = push_param(&mut params, SqlParam::Int(to_i64("limit", limit)?));
            sql.push_str(&format!(" LIMIT {}", p));
        }
        if self.offset > 0 {
            let p = push_param(&mut params, SqlParam::Int(to_i64("offset", self.offset)?));
            sql.push_str(&format!(" OFFSET {}", p));
        }

        Ok((sql, params))
    }

    /// Whether a single observation passes the location and time filters.
    pub fn matches(&self, observation: &Observation) -> bool {
        let in_time = self.begin.map_or(true, |b| observation.timestamp >= b)
            && self.end.map_or(true, |e| observation.timestamp < e);

        in_time
            && self.location.as_ref().map_or(true, |loc| {
                loc.matches(observation.longitude, observation.latitude)
            })
    }

    /// Evaluate the plan over observations held in memory.
    pub fn evaluate<'a, I>(&self, observations: I) -> StorageResult<QueryRows>
    where
        I: IntoIterator<Item = &'a Observation>,
    {
        self.validate()?;

        let mut matched: Vec<&Observation> = observations
            .into_iter()
            .filter(|o| self.matches(o))
            .collect();

        let rows = match self.aggregation {
            Aggregation::Points => {
                matched.sort_by(|a, b| point_order(a, b));
                QueryRows::Points(self.page(matched.into_iter().cloned()))
            }
            Aggregation::DailyAverage => {
                let buckets = bucketize(&matched, SECONDS_PER_DAY)?;
                QueryRows::Averages(self.page(buckets.into_iter().map(|(day, group)| {
                    AverageRow {
                        average: mean(&group),
                        day,
                    }
                })))
            }
            Aggregation::Statistics { period_secs } => {
                let buckets = bucketize(&matched, period_secs)?;
                QueryRows::Statistics(
                    self.page(
                        buckets
                            .into_iter()
                            .map(|(start, group)| statistics(start, &group)),
                    ),
                )
            }
        };

        Ok(rows)
    }

    fn page<T>(&self, rows: impl Iterator<Item = T>) -> Vec<T> {
        let rows = rows.skip(self.offset as usize);
        match self.limit {
            Some(limit) => rows.take(limit as usize).collect(),
            None => rows.collect(),
        }
    }
}

fn push_param(params: &mut Vec<SqlParam>, param: SqlParam) -> String {
    params.push(param);
    format!("${}", params.len())
}

fn to_i64(name: &str, value: u64) -> StorageResult<i64> {
    i64::try_from(value)
        .map_err(|_| StorageError::InvalidQuery(format!("{} {} is too large", name, value)))
}

fn point_order(a: &Observation, b: &Observation) -> Ordering {
    a.timestamp
        .cmp(&b.timestamp)
        .then(a.longitude.total_cmp(&b.longitude))
        .then(a.latitude.total_cmp(&b.latitude))
        .then(a.value.total_cmp(&b.value))
}

fn bucketize<'a>(
    observations: &[&'a Observation],
    period_secs: i64,
) -> StorageResult<BTreeMap<DateTime<Utc>, Vec<&'a Observation>>> {
    let mut buckets: BTreeMap<DateTime<Utc>, Vec<&Observation>> = BTreeMap::new();

    for &observation in observations {
        let start_secs = observation.timestamp.timestamp().div_euclid(period_secs) * period_secs;
        let start = DateTime::from_timestamp(start_secs, 0).ok_or_else(|| {
            StorageError::InvalidQuery(format!("Bucket start {} out of range", start_secs))
        })?;
        buckets.entry(start).or_default().push(observation);
    }

    Ok(buckets)
}

fn mean(group: &[&Observation]) -> f64 {
    group.iter().map(|o| o.value).sum::<f64>() / group.len() as f64
}

// Buckets are never empty.
fn statistics(interval_start: DateTime<Utc>, group: &[&Observation]) -> StatisticsRow {
    let average = mean(group);
    let count = group.len();

    let standard_deviation = (count >= 2).then(|| {
        let sum_sq: f64 = group.iter().map(|o| (o.value - average).powi(2)).sum();
        (sum_sq / (count - 1) as f64).sqrt()
    });

    let first = group[0];
    let (min, max, min_timestamp, max_timestamp) = group.iter().fold(
        (first.value, first.value, first.timestamp, first.timestamp),
        |(min, max, lo, hi), o| {
            (
                min.min(o.value),
                max.max(o.value),
                lo.min(o.timestamp),
                hi.max(o.timestamp),
            )
        },
    );

    StatisticsRow {
        count: count as i64,
        average,
        standard_deviation,
        min,
        max,
        min_timestamp,
        max_timestamp,
        interval_start,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use emissions_common::Polygon;

    fn table() -> TableName {
        TableName::new("carbonmonoxide").unwrap()
    }

    fn obs(value: f64, lon: f64, lat: f64, day: u32, hour: u32) -> Observation {
        Observation {
            value,
            longitude: lon,
            latitude: lat,
            timestamp: Utc.with_ymd_and_hms(2020, 1, day, hour, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_points_sql_numbers_parameters_in_order() {
        let mut plan = ObservationQuery::new(table());
        plan.location = Some(LocationPredicate::Near {
            longitude: 8.0,
            latitude: 50.0,
            radius_m: 3000.0,
        });
        plan.begin = Some(Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap());
        plan.limit = Some(10);
        plan.offset = 5;

        let (sql, params) = plan.to_sql().unwrap();
        assert!(sql.starts_with("SELECT value, longitude, latitude, \"timestamp\" FROM carbonmonoxide"));
        assert!(sql.contains("ST_MakePoint($1, $2), 4326)::geography, $3)"));
        assert!(sql.contains("\"timestamp\" >= $4"));
        assert!(sql.ends_with("LIMIT $5 OFFSET $6"));
        assert_eq!(params.len(), 6);
        assert_eq!(params[4], SqlParam::Int(10));
    }

    #[test]
    fn test_statistics_sql_groups_by_bucket() {
        let mut plan = ObservationQuery::new(table());
        plan.aggregation = Aggregation::Statistics { period_secs: 3600 };
        plan.location = Some(LocationPredicate::Within(
            Polygon::from_flat_coordinates(&[0.0, 0.0, 0.0, 1.0, 1.0, 1.0]).unwrap().into(),
        ));

        let (sql, params) = plan.to_sql().unwrap();
        assert!(sql.contains("stddev_samp(value)"));
        assert!(sql.contains("/ 3600) * 3600) AS interval_start"));
        assert!(sql.contains("ST_Within(geom, ST_GeomFromText($1, 4326))"));
        assert!(sql.ends_with("GROUP BY interval_start ORDER BY interval_start"));
        assert_eq!(
            params,
            vec![SqlParam::Text("POLYGON((0 0,0 1,1 1,0 0))".to_string())]
        );
    }

    #[test]
    fn test_non_positive_period_rejected() {
        let mut plan = ObservationQuery::new(table());
        plan.aggregation = Aggregation::Statistics { period_secs: 0 };
        assert!(matches!(plan.to_sql(), Err(StorageError::InvalidQuery(_))));
        assert!(plan.evaluate(std::iter::empty()).is_err());
    }

    #[test]
    fn test_time_bounds_are_half_open() {
        let data = vec![obs(1.0, 0.0, 0.0, 1, 0), obs(2.0, 0.0, 0.0, 2, 0)];
        let mut plan = ObservationQuery::new(table());
        plan.begin = Some(data[0].timestamp);
        plan.end = Some(data[1].timestamp);

        match plan.evaluate(&data).unwrap() {
            QueryRows::Points(rows) => assert_eq!(rows, vec![data[0].clone()]),
            other => panic!("unexpected rows {:?}", other),
        }
    }

    #[test]
    fn test_daily_average() {
        let data = vec![
            obs(1.0, 0.0, 0.0, 1, 3),
            obs(3.0, 0.0, 0.0, 1, 20),
            obs(10.0, 0.0, 0.0, 2, 1),
        ];
        let mut plan = ObservationQuery::new(table());
        plan.aggregation = Aggregation::DailyAverage;

        match plan.evaluate(&data).unwrap() {
            QueryRows::Averages(rows) => {
                assert_eq!(rows.len(), 2);
                assert_eq!(rows[0].average, 2.0);
                assert_eq!(rows[0].day, Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap());
                assert_eq!(rows[1].average, 10.0);
            }
            other => panic!("unexpected rows {:?}", other),
        }
    }

    #[test]
    fn test_statistics_single_sample_has_no_deviation() {
        let data = vec![
            obs(2.0, 0.0, 0.0, 1, 1),
            obs(4.0, 0.0, 0.0, 1, 2),
            obs(7.0, 0.0, 0.0, 3, 0),
        ];
        let mut plan = ObservationQuery::new(table());
        plan.aggregation = Aggregation::Statistics {
            period_secs: SECONDS_PER_DAY,
        };

        match plan.evaluate(&data).unwrap() {
            QueryRows::Statistics(rows) => {
                assert_eq!(rows.len(), 2);
                let first = &rows[0];
                assert_eq!(first.count, 2);
                assert_eq!(first.average, 3.0);
                assert!((first.standard_deviation.unwrap() - 2f64.sqrt()).abs() < 1e-12);
                assert_eq!(first.min_timestamp, data[0].timestamp);
                assert_eq!(first.max_timestamp, data[1].timestamp);
                assert_eq!(rows[1].standard_deviation, None);
                assert_eq!((rows[1].min, rows[1].max), (7.0, 7.0));
            }
            other => panic!("unexpected rows {:?}", other),
        }
    }

    #[test]
    fn test_near_predicate() {
        let near = LocationPredicate::Near {
            longitude: 0.0,
            latitude: 0.0,
            radius_m: 5000.0,
        };
        assert!(near.matches(0.01, 0.01));
        assert!(!near.matches(1.0, 0.0));
    }
}
