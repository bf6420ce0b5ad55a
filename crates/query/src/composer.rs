//! Composition of filter sets into observation query plans.

use std::sync::Arc;
use tracing::debug;

use emissions_common::{EmissionsError, EmissionsResult, EqualAreaGrid, Geometry, TableName};
use storage::{Aggregation, LocationPredicate, ObservationQuery, SECONDS_PER_DAY};

use crate::filter::{FilterSet, LocationFilter};
use crate::regions::RegionCatalog;

/// Requested result shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregationMode {
    Points,
    DailyAverage,
    /// Statistics per `interval` (one day if not given).
    Statistics,
}

/// Builds observation queries from validated filters.
#[derive(Clone)]
pub struct QueryComposer {
    grid: EqualAreaGrid,
    regions: Arc<dyn RegionCatalog>,
}

impl QueryComposer {
    /// `grid` must be the grid observations were aggregated on.
    pub fn new(grid: EqualAreaGrid, regions: Arc<dyn RegionCatalog>) -> Self {
        Self { grid, regions }
    }

    pub fn grid(&self) -> &EqualAreaGrid {
        &self.grid
    }

    pub fn compose(
        &self,
        table: &TableName,
        filters: &FilterSet,
        mode: AggregationMode,
    ) -> EmissionsResult<ObservationQuery> {
        let location = filters
            .location
            .as_ref()
            .map(|location| self.location_predicate(location))
            .transpose()?;

        let aggregation = match mode {
            AggregationMode::Points => Aggregation::Points,
            AggregationMode::DailyAverage => Aggregation::DailyAverage,
            AggregationMode::Statistics => Aggregation::Statistics {
                period_secs: filters.interval_secs.unwrap_or(SECONDS_PER_DAY),
            },
        };

        Ok(ObservationQuery {
            table: table.clone(),
            location,
            begin: filters.begin,
            end: filters.end,
            aggregation,
            limit: filters.limit,
            offset: filters.offset,
        })
    }

    fn location_predicate(&self, location: &LocationFilter) -> EmissionsResult<LocationPredicate> {
        match location {
            LocationFilter::Rectangle(bbox) => {
                Ok(LocationPredicate::Within(Geometry::from(bbox.to_polygon())))
            }
            LocationFilter::Region(code) => self
                .regions
                .lookup(code)
                .map(LocationPredicate::Within)
                .ok_or_else(|| EmissionsError::UnknownRegion(code.clone())),
            LocationFilter::Polygon(polygon) => {
                Ok(LocationPredicate::Within(Geometry::from(polygon.clone())))
            }
            LocationFilter::Point {
                longitude,
                latitude,
            } => {
                // Stored observations sit on cell centroids.
                let cell = self.grid.snap(*longitude, *latitude);
                let radius_m = self.grid.snap_radius_m(&cell);
                debug!(
                    longitude = cell.center_lon,
                    latitude = cell.center_lat,
                    radius_m,
                    "Snapped point query to grid cell"
                );
                Ok(LocationPredicate::Near {
                    longitude: cell.center_lon,
                    latitude: cell.center_lat,
                    radius_m,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::Params;
    use crate::regions::WktRegionCatalog;
    use test_utils::regions::CATALOG_YAML;

    fn composer() -> QueryComposer {
        let catalog = WktRegionCatalog::from_yaml_str(CATALOG_YAML).unwrap();
        QueryComposer::new(EqualAreaGrid::default(), Arc::new(catalog))
    }

    fn table() -> TableName {
        TableName::new("ozone").unwrap()
    }

    fn filters(pairs: &[(&str, &str)]) -> FilterSet {
        let params: Params = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        FilterSet::parse(&params).unwrap()
    }

    #[test]
    fn test_no_filters() {
        let query = composer()
            .compose(&table(), &FilterSet::default(), AggregationMode::Points)
            .unwrap();
        assert_eq!(query, ObservationQuery::new(table()));
    }

    #[test]
    fn test_point_snaps_to_cell_centroid() {
        let composer = composer();
        let query = composer
            .compose(&table(), &filters(&[("point", "8.01,50.01")]), AggregationMode::Points)
            .unwrap();

        let cell = composer.grid().snap(8.01, 50.01);
        match query.location {
            Some(LocationPredicate::Near {
                longitude,
                latitude,
                radius_m,
            }) => {
                assert_eq!((longitude, latitude), (cell.center_lon, cell.center_lat));
                assert!(radius_m > 0.0);
                // The neighbouring centroid is out of reach.
                let east = composer.grid().snap(cell.east + 1e-6, cell.center_lat);
                let near = LocationPredicate::Near {
                    longitude,
                    latitude,
                    radius_m,
                };
                assert!(near.matches(cell.center_lon, cell.center_lat));
                assert!(!near.matches(east.center_lon, east.center_lat));
            }
            other => panic!("unexpected location {:?}", other),
        }
    }

    #[test]
    fn test_region_lookup() {
        let query = composer()
            .compose(&table(), &filters(&[("country", "deu")]), AggregationMode::DailyAverage)
            .unwrap();
        assert!(matches!(query.location, Some(LocationPredicate::Within(_))));
        assert_eq!(query.aggregation, Aggregation::DailyAverage);

        let err = composer()
            .compose(&table(), &filters(&[("country", "FR")]), AggregationMode::Points)
            .unwrap_err();
        assert_eq!(err, EmissionsError::UnknownRegion("FR".to_string()));
        assert_eq!(err.http_status_code(), 400);
    }

    #[test]
    fn test_rectangle_containment() {
        let query = composer()
            .compose(&table(), &filters(&[("geoframe", "15,45,20,40")]), AggregationMode::Points)
            .unwrap();
        let location = query.location.unwrap();
        assert!(location.matches(17.0, 42.0));
        assert!(!location.matches(21.0, 42.0));
    }

    #[test]
    fn test_statistics_interval() {
        let composer = composer();
        let default = composer
            .compose(&table(), &FilterSet::default(), AggregationMode::Statistics)
            .unwrap();
        assert_eq!(
            default.aggregation,
            Aggregation::Statistics {
                period_secs: SECONDS_PER_DAY
            }
        );

        let hourly = composer
            .compose(&table(), &filters(&[("interval", "hour")]), AggregationMode::Statistics)
            .unwrap();
        assert_eq!(hourly.aggregation, Aggregation::Statistics { period_secs: 3_600 });
    }

    #[test]
    fn test_time_and_pagination_carried_over() {
        let query = composer()
            .compose(
                &table(),
                &filters(&[("begin", "2020-01-01"), ("limit", "5"), ("offset", "2")]),
                AggregationMode::Points,
            )
            .unwrap();
        assert!(query.begin.is_some());
        assert!(query.end.is_none());
        assert_eq!((query.limit, query.offset), (Some(5), 2));
    }
}
