//! End-to-end tests for single-file ingestion against the in-memory store.

use chrono::{DateTime, Utc};
use std::path::Path;
use std::sync::Arc;

use emissions_common::{parse_instant, EqualAreaGrid, Product, ProductRegistry, ProductSpec, TimeWindow};
use ingestion::{
    DecodeError, FileOutcome, IngestionConfig, IngestionError, IngestionPipeline, Scan,
    ScanDecoder, TextScanDecoder,
};
use storage::{CacheEntry, CacheStore, MemoryStore};
use test_utils::{clustered_rows, lattice_rows, scan_dump, time, write_scan, ScanRow};

fn ozone() -> ProductSpec {
    ProductRegistry::default()
        .get(Product::Ozone)
        .cloned()
        .unwrap()
}

fn pipeline(store: &MemoryStore) -> IngestionPipeline {
    IngestionPipeline::from_config(
        Arc::new(store.clone()),
        Arc::new(TextScanDecoder),
        &IngestionConfig::default(),
    )
    .unwrap()
}

fn instant(s: &str) -> DateTime<Utc> {
    parse_instant(s).unwrap()
}

fn cached(fingerprint: &str, begin: &str, end: &str) -> CacheEntry {
    CacheEntry {
        fingerprint: fingerprint.to_string(),
        window: TimeWindow::new(Some(instant(begin)), Some(instant(end))),
        response: b"{}".to_vec(),
    }
}

/// A decoder that always fails, standing in for a corrupt file.
struct BrokenDecoder;

impl ScanDecoder for BrokenDecoder {
    fn decode(&self, _path: &Path, _variable: &str) -> Result<Scan, DecodeError> {
        Err(DecodeError::Header("truncated file".to_string()))
    }
}

// ============================================================================
// Filtering and aggregation
// ============================================================================

#[tokio::test]
async fn test_low_quality_samples_are_dropped_before_averaging() {
    let dir = tempfile::tempdir().unwrap();
    let center = EqualAreaGrid::default().snap(8.0, 50.0);
    let rows = clustered_rows(center.center_lon, center.center_lat, time::JAN_1_2020_NOON, &[10, 60, 90]);
    let path = write_scan(dir.path(), "S5P_OFFL_O3_001.csv", &scan_dump(&rows));

    let store = MemoryStore::new();
    let outcome = pipeline(&store).ingest_file(&path, &ozone()).await.unwrap();

    assert!(matches!(
        outcome,
        FileOutcome::Committed {
            observations: 1,
            ..
        }
    ));

    let observations = store.observations(&ozone().table).await;
    assert_eq!(observations.len(), 1);
    test_utils::assert_approx_eq!(observations[0].value, 25.0, 1e-9);
    test_utils::assert_coords_approx_eq!(
        (observations[0].longitude, observations[0].latitude),
        (center.center_lon, center.center_lat),
        1e-12
    );
    assert_eq!(observations[0].timestamp, instant(time::JAN_1_2020_NOON));

    assert_eq!(store.ingested_files().await, vec!["S5P_OFFL_O3_001.csv"]);
}

#[tokio::test]
async fn test_observation_count_bounded_by_samples_and_cells() {
    let dir = tempfile::tempdir().unwrap();
    let rows = lattice_rows(0.0, 0.0, 0.01, 10, time::JAN_1_2020);
    let path = write_scan(dir.path(), "lattice.csv", &scan_dump(&rows));

    let store = MemoryStore::new();
    pipeline(&store).ingest_file(&path, &ozone()).await.unwrap();

    let observations = store.observations(&ozone().table).await;
    let grid = EqualAreaGrid::default();
    let mut cells: Vec<_> = rows.iter().map(|r| grid.cell_key(r.longitude, r.latitude)).collect();
    cells.sort();
    cells.dedup();

    assert!(observations.len() <= rows.len());
    assert_eq!(observations.len(), cells.len());
}

#[tokio::test]
async fn test_reduce_matches_committed_observations() {
    let store = MemoryStore::new();
    let pipeline = pipeline(&store);
    let scan = TextScanDecoder
        .decode_str(
            &scan_dump(&[
                ScanRow::new(1.0, 8.0, 50.0, time::JAN_1_2020, 40),
                ScanRow::new(2.0, 8.0, 50.0, time::JAN_1_2020, 80),
            ]),
            "value",
        )
        .unwrap();

    let reduced = pipeline.reduce(&scan).into_observations();
    assert_eq!(reduced.len(), 1);
    assert_eq!(reduced[0].value, 2.0);
}

#[tokio::test]
async fn test_masked_records_do_not_reach_the_average() {
    let dir = tempfile::tempdir().unwrap();
    let center = EqualAreaGrid::default().snap(8.0, 50.0);
    let dump = format!(
        "value,longitude,latitude,timestamp,quality\n\
         ,{lon},{lat},{ts},100\n\
         4.0,{lon},{lat},{ts},100\n",
        lon = center.center_lon,
        lat = center.center_lat,
        ts = time::JAN_1_2020_NOON,
    );
    let path = write_scan(dir.path(), "masked.csv", &dump);

    let store = MemoryStore::new();
    pipeline(&store).ingest_file(&path, &ozone()).await.unwrap();

    let observations = store.observations(&ozone().table).await;
    assert_eq!(observations.len(), 1);
    assert_eq!(observations[0].value, 4.0);
}

#[tokio::test]
async fn test_non_finite_value_fails_the_file() {
    let dir = tempfile::tempdir().unwrap();
    let dump = format!(
        "value,longitude,latitude,timestamp,quality\n1.0,8,50,{ts},90\nNaN,8,50,{ts},90\n",
        ts = time::JAN_1_2020_NOON,
    );
    let path = write_scan(dir.path(), "nan.csv", &dump);

    let store = MemoryStore::new();
    let err = pipeline(&store).ingest_file(&path, &ozone()).await.unwrap_err();

    assert!(matches!(err, IngestionError::Decode(DecodeError::Record { line: 3, .. })));
    assert!(store.observations(&ozone().table).await.is_empty());
    assert!(store.ingested_files().await.is_empty());
}

// ============================================================================
// Processed-file markers
// ============================================================================

#[tokio::test]
async fn test_second_run_skips_processed_file() {
    let dir = tempfile::tempdir().unwrap();
    let rows = clustered_rows(8.0, 50.0, time::JAN_1_2020, &[100]);
    let path = write_scan(dir.path(), "once.csv", &scan_dump(&rows));

    let store = MemoryStore::new();
    let pipeline = pipeline(&store);
    pipeline.ingest_file(&path, &ozone()).await.unwrap();
    let second = pipeline.ingest_file(&path, &ozone()).await.unwrap();

    assert_eq!(second, FileOutcome::Skipped);
    assert_eq!(store.observations(&ozone().table).await.len(), 1);
    assert_eq!(store.ingested_files().await.len(), 1);
}

#[tokio::test]
async fn test_file_without_good_samples_is_marked_empty() {
    let dir = tempfile::tempdir().unwrap();
    let rows = clustered_rows(8.0, 50.0, time::JAN_1_2020, &[0, 10, 49]);
    let path = write_scan(dir.path(), "cloudy.csv", &scan_dump(&rows));

    let store = MemoryStore::new();
    let outcome = pipeline(&store).ingest_file(&path, &ozone()).await.unwrap();

    assert_eq!(outcome, FileOutcome::Empty);
    assert!(store.observations(&ozone().table).await.is_empty());
    assert_eq!(store.ingested_files().await, vec!["cloudy.csv"]);
}

#[tokio::test]
async fn test_decode_failure_leaves_file_unmarked() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_scan(dir.path(), "corrupt.csv", "garbage");

    let store = MemoryStore::new();
    let pipeline = IngestionPipeline::from_config(
        Arc::new(store.clone()),
        Arc::new(BrokenDecoder),
        &IngestionConfig::default(),
    )
    .unwrap();

    let result = pipeline.ingest_file(&path, &ozone()).await;

    assert!(matches!(result, Err(IngestionError::Decode(_))));
    assert!(store.ingested_files().await.is_empty());
}

#[tokio::test]
async fn test_missing_file_is_a_decode_error() {
    let store = MemoryStore::new();
    let result = pipeline(&store)
        .ingest_file(Path::new("/nonexistent/scan.csv"), &ozone())
        .await;

    assert!(matches!(
        result,
        Err(IngestionError::Decode(DecodeError::Io { .. }))
    ));
    assert!(store.ingested_files().await.is_empty());
}

// ============================================================================
// Cache invalidation
// ============================================================================

#[tokio::test]
async fn test_commit_invalidates_only_overlapping_entries() {
    let store = MemoryStore::new();
    store
        .put_cached(&cached("january", time::JAN_1_2020, time::JAN_2_2020))
        .await
        .unwrap();
    store
        .put_cached(&cached("june", time::JUNE_1_2020, "2020-06-02T00:00:00Z"))
        .await
        .unwrap();
    store
        .put_cached(&CacheEntry {
            fingerprint: "everything".to_string(),
            window: TimeWindow::unbounded(),
            response: Vec::new(),
        })
        .await
        .unwrap();

    let dir = tempfile::tempdir().unwrap();
    let rows = clustered_rows(8.0, 50.0, time::JAN_1_2020_NOON, &[100]);
    let path = write_scan(dir.path(), "jan.csv", &scan_dump(&rows));

    let outcome = pipeline(&store).ingest_file(&path, &ozone()).await.unwrap();

    assert!(matches!(
        outcome,
        FileOutcome::Committed { invalidated: 2, .. }
    ));
    assert!(store.cache_entry("january").await.is_none());
    assert!(store.cache_entry("everything").await.is_none());
    assert!(store.cache_entry("june").await.is_some());
}

#[tokio::test]
async fn test_empty_file_keeps_cache() {
    let store = MemoryStore::new();
    store
        .put_cached(&cached("january", time::JAN_1_2020, time::JAN_2_2020))
        .await
        .unwrap();

    let dir = tempfile::tempdir().unwrap();
    let rows = clustered_rows(8.0, 50.0, time::JAN_1_2020_NOON, &[0]);
    let path = write_scan(dir.path(), "empty.csv", &scan_dump(&rows));

    pipeline(&store).ingest_file(&path, &ozone()).await.unwrap();

    assert_eq!(store.cache_len().await, 1);
}
