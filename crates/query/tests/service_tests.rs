//! End-to-end request handling against the in-memory store.

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::sync::Arc;

use emissions_common::{parse_instant, EqualAreaGrid, Product, ProductRegistry, TableName};
use query::{fingerprint, ApiRequest, QueryConfig, QueryError, QueryService, WktRegionCatalog};
use storage::{IngestStore, MemoryStore, Observation, ScanCommit};
use test_utils::{assert_approx_eq, regions::CATALOG_YAML, time};

fn instant(s: &str) -> DateTime<Utc> {
    parse_instant(s).unwrap()
}

fn ozone_table() -> TableName {
    ProductRegistry::default()
        .get(Product::Ozone)
        .unwrap()
        .table
        .clone()
}

fn service(store: &MemoryStore) -> QueryService {
    let catalog = WktRegionCatalog::from_yaml_str(CATALOG_YAML).unwrap();
    QueryService::from_config(
        &QueryConfig::default(),
        ProductRegistry::default(),
        Arc::new(catalog),
        Arc::new(store.clone()),
        Arc::new(store.clone()),
    )
    .unwrap()
}

/// Observation on the centroid of the cell containing `(lon, lat)`.
fn cell_obs(value: f64, lon: f64, lat: f64, timestamp: &str) -> Observation {
    let cell = EqualAreaGrid::default().snap(lon, lat);
    Observation {
        value,
        longitude: cell.center_lon,
        latitude: cell.center_lat,
        timestamp: instant(timestamp),
    }
}

async fn ingest(store: &MemoryStore, filename: &str, observations: Vec<Observation>) {
    store
        .commit_scan(&ScanCommit {
            filename: filename.to_string(),
            table: ozone_table(),
            observations,
        })
        .await
        .unwrap();
}

async fn json(service: &QueryService, request: &ApiRequest) -> Value {
    let bytes = service.handle(request).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

// ============================================================================
// Routing and parameters
// ============================================================================

#[tokio::test]
async fn test_unknown_product_and_endpoint() {
    let store = MemoryStore::new();
    let service = service(&store);

    let err = service
        .handle(&ApiRequest::new("/api/v2/sulfurdioxide/geo.json"))
        .await
        .unwrap_err();
    assert_eq!(err.http_status_code(), 404);

    let err = service
        .handle(&ApiRequest::new("/api/v2/ozone/heatmap.png"))
        .await
        .unwrap_err();
    assert_eq!(err.http_status_code(), 404);
}

#[tokio::test]
async fn test_parameter_errors_are_400_and_not_cached() {
    let store = MemoryStore::new();
    let service = service(&store);

    let requests = [
        ApiRequest::new("/api/v2/ozone/geo.json")
            .with_param("point", "8,50")
            .with_param("polygon", "0,0,0,1,1,1"),
        ApiRequest::new("/api/v2/ozone/geo.json").with_param("polygon", "0,0,1,1"),
        ApiRequest::new("/api/v2/ozone/geo.json").with_param("country", "ZZ"),
        ApiRequest::new("/api/v2/ozone/geo.json").with_param("begin", "not-a-date"),
        ApiRequest::new("/api/v2/ozone/statistics.json").with_param("interval", "3y"),
    ];

    for request in &requests {
        let err = service.handle(request).await.unwrap_err();
        assert!(matches!(err, QueryError::Parameter(_)), "{:?}", request);
        assert_eq!(err.http_status_code(), 400);
    }
    assert_eq!(store.cache_len().await, 0);
}

// ============================================================================
// Result shapes
// ============================================================================

#[tokio::test]
async fn test_points_inside_region() {
    let store = MemoryStore::new();
    ingest(
        &store,
        "a.csv",
        vec![
            cell_obs(1.0, 10.0, 50.0, time::JAN_1_2020_NOON),
            cell_obs(2.0, -3.0, 40.0, time::JAN_1_2020_NOON),
        ],
    )
    .await;

    let response = json(
        &service(&store),
        &ApiRequest::new("/api/v2/ozone/geo.json").with_param("country", "de"),
    )
    .await;

    assert_eq!(response["type"], "FeatureCollection");
    let features = response["features"].as_array().unwrap();
    assert_eq!(features.len(), 1);
    assert_eq!(features[0]["properties"]["value"], 1.0);
}

#[tokio::test]
async fn test_point_query_matches_only_its_cell() {
    let store = MemoryStore::new();
    let grid = EqualAreaGrid::default();
    let cell = grid.snap(8.0, 50.0);
    let neighbour = grid.snap(cell.east + 1e-6, cell.center_lat);
    ingest(
        &store,
        "a.csv",
        vec![
            cell_obs(1.0, cell.center_lon, cell.center_lat, time::JAN_1_2020),
            cell_obs(2.0, neighbour.center_lon, neighbour.center_lat, time::JAN_1_2020),
        ],
    )
    .await;

    let response = json(
        &service(&store),
        &ApiRequest::new("/api/v2/ozone/geo.json").with_param("point", "8.0,50.0"),
    )
    .await;

    let features = response["features"].as_array().unwrap();
    assert_eq!(features.len(), 1);
    assert_eq!(features[0]["properties"]["value"], 1.0);
}

#[tokio::test]
async fn test_daily_average() {
    let store = MemoryStore::new();
    ingest(
        &store,
        "a.csv",
        vec![
            cell_obs(1.0, 8.0, 50.0, time::JAN_1_2020),
            cell_obs(3.0, 9.0, 50.0, time::JAN_1_2020_NOON),
            cell_obs(10.0, 8.0, 50.0, time::JAN_2_2020),
        ],
    )
    .await;

    let response = json(
        &service(&store),
        &ApiRequest::new("/api/v2/ozone/average.json"),
    )
    .await;

    let days = response.as_array().unwrap();
    assert_eq!(days.len(), 2);
    assert_approx_eq!(days[0]["average"].as_f64().unwrap(), 2.0, 1e-9);
    assert_eq!(days[0]["start"], "2020-01-01T00:00:00Z");
    assert_approx_eq!(days[1]["average"].as_f64().unwrap(), 10.0, 1e-9);
}

#[tokio::test]
async fn test_statistics_with_time_range() {
    let store = MemoryStore::new();
    ingest(
        &store,
        "a.csv",
        vec![
            cell_obs(1.0, 8.0, 50.0, "2020-01-01T01:00:00Z"),
            cell_obs(3.0, 9.0, 50.0, "2020-01-01T05:00:00Z"),
            cell_obs(7.0, 8.0, 50.0, time::JAN_2_2020),
        ],
    )
    .await;

    let response = json(
        &service(&store),
        &ApiRequest::new("/api/v2/ozone/statistics.json")
            .with_param("interval", "day")
            .with_param("begin", time::JAN_1_2020)
            .with_param("end", time::JAN_2_2020),
    )
    .await;

    let buckets = response.as_array().unwrap();
    assert_eq!(buckets.len(), 1);
    let value = &buckets[0]["value"];
    assert_eq!(value["count"], 2);
    assert_approx_eq!(value["average"].as_f64().unwrap(), 2.0, 1e-9);
    assert_approx_eq!(value["standard deviation"].as_f64().unwrap(), 2f64.sqrt(), 1e-9);
    assert_eq!(buckets[0]["time"]["min"], "2020-01-01T01:00:00Z");
    assert_eq!(buckets[0]["time"]["max"], "2020-01-01T05:00:00Z");
    assert_eq!(buckets[0]["time"]["interval_start"], "2020-01-01T00:00:00Z");
}

#[tokio::test]
async fn test_pagination_over_points() {
    let store = MemoryStore::new();
    let observations: Vec<Observation> = (0..6)
        .map(|i| cell_obs(i as f64, i as f64, 10.0, &format!("2020-01-01T0{}:00:00Z", i)))
        .collect();
    ingest(&store, "a.csv", observations).await;
    let service = service(&store);

    let page = json(
        &service,
        &ApiRequest::new("/api/v2/ozone/geo.json")
            .with_param("limit", "2")
            .with_param("offset", "3"),
    )
    .await;

    let values: Vec<f64> = page["features"]
        .as_array()
        .unwrap()
        .iter()
        .map(|f| f["properties"]["value"].as_f64().unwrap())
        .collect();
    assert_eq!(values, vec![3.0, 4.0]);
}

#[tokio::test]
async fn test_data_range() {
    let store = MemoryStore::new();
    let service = service(&store);

    let empty = json(&service, &ApiRequest::new("/api/v2/ozone/data-range.json")).await;
    assert!(empty["first"].is_null());

    ingest(
        &store,
        "a.csv",
        vec![
            cell_obs(1.0, 8.0, 50.0, time::JAN_1_2020),
            cell_obs(1.0, 8.0, 50.0, time::JUNE_1_2020),
        ],
    )
    .await;

    // The ingestion swept the unbounded entry.
    let range = json(&service, &ApiRequest::new("/api/v2/ozone/data-range.json")).await;
    assert_eq!(range["first"], "2020-01-01T00:00:00Z");
    assert_eq!(range["last"], "2020-06-01T00:00:00Z");

    let direct = service.data_range(Product::Ozone).await.unwrap();
    assert_eq!(direct.last, Some(instant(time::JUNE_1_2020)));
}

// ============================================================================
// Caching across ingestion
// ============================================================================

#[tokio::test]
async fn test_cached_response_refreshed_only_by_overlapping_data() {
    let store = MemoryStore::new();
    let service = service(&store);
    let request = ApiRequest::new("/api/v2/ozone/geo.json")
        .with_param("begin", time::JAN_1_2020)
        .with_param("end", time::JAN_2_2020);
    let count = |v: &Value| v["features"].as_array().unwrap().len();

    ingest(&store, "jan-a.csv", vec![cell_obs(1.0, 8.0, 50.0, time::JAN_1_2020_NOON)]).await;
    assert_eq!(count(&json(&service, &request).await), 1);
    assert!(store
        .cache_entry(&fingerprint(&request.path, &request.params))
        .await
        .is_some());

    // June data does not touch the January entry.
    ingest(&store, "june.csv", vec![cell_obs(1.0, 8.0, 50.0, time::JUNE_1_2020_NOON)]).await;
    assert!(store
        .cache_entry(&fingerprint(&request.path, &request.params))
        .await
        .is_some());

    // More January data invalidates it and the next request recomputes.
    ingest(&store, "jan-b.csv", vec![cell_obs(2.0, 9.0, 50.0, time::JAN_1_2020)]).await;
    assert!(store
        .cache_entry(&fingerprint(&request.path, &request.params))
        .await
        .is_none());
    assert_eq!(count(&json(&service, &request).await), 2);
}

#[tokio::test]
async fn test_nocache_sees_fresh_data_without_storing() {
    let store = MemoryStore::new();
    let service = service(&store);
    let request = ApiRequest::new("/api/v2/ozone/geo.json").with_param("nocache", "");

    ingest(&store, "a.csv", vec![cell_obs(1.0, 8.0, 50.0, time::JAN_1_2020)]).await;
    let response = json(&service, &request).await;

    assert_eq!(response["features"].as_array().unwrap().len(), 1);
    assert_eq!(store.cache_len().await, 0);
}
