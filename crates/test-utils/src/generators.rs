//! Generators for synthetic scan dumps.
//!
//! Scan dumps are comma-separated files with the header
//! `value,longitude,latitude,timestamp,quality`, one sample per line.

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

/// Header line of a scan dump.
pub const SCAN_HEADER: &str = "value,longitude,latitude,timestamp,quality";

/// One sample line of a scan dump.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanRow {
    pub value: f64,
    pub longitude: f64,
    pub latitude: f64,
    pub timestamp: String,
    pub quality: u8,
}

impl ScanRow {
    pub fn new(value: f64, longitude: f64, latitude: f64, timestamp: &str, quality: u8) -> Self {
        Self {
            value,
            longitude,
            latitude,
            timestamp: timestamp.to_string(),
            quality,
        }
    }

    fn to_line(&self) -> String {
        format!(
            "{},{},{},{},{}",
            self.value, self.longitude, self.latitude, self.timestamp, self.quality
        )
    }
}

/// Render rows as a scan dump with the standard header.
pub fn scan_dump(rows: &[ScanRow]) -> String {
    scan_dump_with_header(SCAN_HEADER, rows)
}

/// Render rows below a custom header line.
pub fn scan_dump_with_header(header: &str, rows: &[ScanRow]) -> String {
    let mut out = String::with_capacity(64 * (rows.len() + 1));
    out.push_str(header);
    out.push('\n');
    for row in rows {
        out.push_str(&row.to_line());
        out.push('\n');
    }
    out
}

/// Samples packed tightly around one point, one per quality score.
///
/// Sample `i` has value `10 * (i + 1)` and sits `i * 1e-4` degrees east of
/// the center, so all of them fall into the same grid cell.
pub fn clustered_rows(lon: f64, lat: f64, timestamp: &str, qualities: &[u8]) -> Vec<ScanRow> {
    qualities
        .iter()
        .enumerate()
        .map(|(i, &quality)| {
            ScanRow::new(
                10.0 * (i + 1) as f64,
                lon + i as f64 * 1e-4,
                lat,
                timestamp,
                quality,
            )
        })
        .collect()
}

/// A regular `n x n` lattice of good-quality samples starting at
/// `(min_lon, min_lat)` with `step` degrees spacing.
pub fn lattice_rows(min_lon: f64, min_lat: f64, step: f64, n: usize, timestamp: &str) -> Vec<ScanRow> {
    let mut rows = Vec::with_capacity(n * n);
    for i in 0..n {
        for j in 0..n {
            rows.push(ScanRow::new(
                (i * n + j) as f64,
                min_lon + j as f64 * step,
                min_lat + i as f64 * step,
                timestamp,
                100,
            ));
        }
    }
    rows
}

/// Write a file below `dir`, creating parent directories.
pub fn write_scan(dir: &Path, name: &str, contents: &str) -> PathBuf {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create scan directory");
    }
    fs::write(&path, contents).expect("write scan file");
    path
}

/// A temporary directory holding the given `(relative path, contents)` files.
pub fn scan_directory(files: &[(&str, String)]) -> TempDir {
    let dir = TempDir::new().expect("create temp dir");
    for (name, contents) in files {
        write_scan(dir.path(), name, contents);
    }
    dir
}
