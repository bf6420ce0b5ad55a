//! Equal-area spatial grid used to bin samples into cells.
//!
//! The grid is a cylindrical equal-area partition of the sphere: rows are
//! uniform in `sin(latitude)` and columns are uniform in longitude, so every
//! cell covers the same surface area. At resolution `r` there are
//! `2^(r+2)` rows and `2^(r+3)` columns.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::geometry::{haversine_distance, EARTH_RADIUS_M};
use crate::{EmissionsError, EmissionsResult};

/// Highest supported resolution.
pub const MAX_RESOLUTION: u8 = 20;

/// Default resolution (cells of roughly 61 km²).
pub const DEFAULT_RESOLUTION: u8 = 9;

const ROW_SHIFT: u32 = 28;
const RES_SHIFT: u32 = 56;
const COL_MASK: u64 = (1 << ROW_SHIFT) - 1;
const ROW_MASK: u64 = (1 << (RES_SHIFT - ROW_SHIFT)) - 1;

/// Identifier of one grid cell. Ordered by resolution, row, then column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GridCellKey(u64);

impl GridCellKey {
    fn new(resolution: u8, row: u64, col: u64) -> Self {
        Self(((resolution as u64) << RES_SHIFT) | (row << ROW_SHIFT) | col)
    }

    pub fn resolution(&self) -> u8 {
        (self.0 >> RES_SHIFT) as u8
    }

    pub fn row(&self) -> u64 {
        (self.0 >> ROW_SHIFT) & ROW_MASK
    }

    pub fn col(&self) -> u64 {
        self.0 & COL_MASK
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for GridCellKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.resolution(), self.row(), self.col())
    }
}

/// Geometry of a single cell.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridCell {
    pub key: GridCellKey,
    pub center_lon: f64,
    pub center_lat: f64,
    pub west: f64,
    pub east: f64,
    pub south: f64,
    pub north: f64,
}

/// Equal-area grid at a fixed resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EqualAreaGrid {
    resolution: u8,
}

impl Default for EqualAreaGrid {
    fn default() -> Self {
        Self {
            resolution: DEFAULT_RESOLUTION,
        }
    }
}

impl EqualAreaGrid {
    pub fn new(resolution: u8) -> EmissionsResult<Self> {
        if resolution > MAX_RESOLUTION {
            return Err(EmissionsError::invalid_parameter(
                "grid_resolution",
                format!("{} exceeds maximum resolution {}", resolution, MAX_RESOLUTION),
            ));
        }
        Ok(Self { resolution })
    }

    pub fn resolution(&self) -> u8 {
        self.resolution
    }

    /// Number of latitude rows.
    pub fn rows(&self) -> u64 {
        1 << (self.resolution as u32 + 2)
    }

    /// Number of longitude columns.
    pub fn cols(&self) -> u64 {
        1 << (self.resolution as u32 + 3)
    }

    /// Surface area of every cell in square meters.
    pub fn cell_area_m2(&self) -> f64 {
        4.0 * std::f64::consts::PI * EARTH_RADIUS_M * EARTH_RADIUS_M
            / (self.rows() * self.cols()) as f64
    }

    /// Compute the cell containing a point.
    ///
    /// Longitudes outside [-180, 180) wrap around; latitudes are clamped.
    pub fn cell_key(&self, lon: f64, lat: f64) -> GridCellKey {
        let lon = (lon + 180.0).rem_euclid(360.0);
        let lat = lat.clamp(-90.0, 90.0);

        let cols = self.cols();
        let rows = self.rows();

        let col = ((lon / 360.0 * cols as f64).floor() as u64).min(cols - 1);
        let s = lat.to_radians().sin();
        let row = (((s + 1.0) / 2.0 * rows as f64).floor() as u64).min(rows - 1);

        GridCellKey::new(self.resolution, row, col)
    }

    /// Centroid and bounds of a cell.
    pub fn cell(&self, key: GridCellKey) -> GridCell {
        let (row, col) = (key.row(), key.col());
        let col_width = 360.0 / self.cols() as f64;

        GridCell {
            key,
            center_lon: -180.0 + (col as f64 + 0.5) * col_width,
            center_lat: self.row_latitude(row as f64 + 0.5),
            west: -180.0 + col as f64 * col_width,
            east: -180.0 + (col + 1) as f64 * col_width,
            south: self.row_latitude(row as f64),
            north: self.row_latitude((row + 1) as f64),
        }
    }

    /// Snap a point to the centroid of its cell.
    pub fn snap(&self, lon: f64, lat: f64) -> GridCell {
        self.cell(self.cell_key(lon, lat))
    }

    /// Largest radius in meters around the cell centroid that reaches no
    /// other cell's centroid.
    pub fn snap_radius_m(&self, cell: &GridCell) -> f64 {
        let col_width = 360.0 / self.cols() as f64;
        let mut nearest = haversine_distance(
            cell.center_lon,
            cell.center_lat,
            cell.center_lon + col_width,
            cell.center_lat,
        );

        let row = cell.key.row();
        if row > 0 {
            let below = self.row_latitude(row as f64 - 0.5);
            nearest = nearest.min((cell.center_lat - below).to_radians() * EARTH_RADIUS_M);
        }
        if row + 1 < self.rows() {
            let above = self.row_latitude(row as f64 + 1.5);
            nearest = nearest.min((above - cell.center_lat).to_radians() * EARTH_RADIUS_M);
        }

        nearest / 2.0
    }

    fn row_latitude(&self, fractional_row: f64) -> f64 {
        let s = fractional_row / self.rows() as f64 * 2.0 - 1.0;
        s.clamp(-1.0, 1.0).asin().to_degrees()
    }
}
