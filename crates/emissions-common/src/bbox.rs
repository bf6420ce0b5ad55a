//! Bounding box types and operations.

use serde::{Deserialize, Serialize};

use crate::geometry::{validate_coordinates, Polygon};
use crate::{EmissionsError, EmissionsResult};

/// A geographic bounding box in degrees (EPSG:4326).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl BoundingBox {
    /// Create a new bounding box from min/max coordinates.
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    /// Create a bounding box from two opposite corners given in any order.
    ///
    /// Both corners are range-checked as longitude/latitude pairs.
    pub fn from_corners(lon1: f64, lat1: f64, lon2: f64, lat2: f64) -> EmissionsResult<Self> {
        validate_coordinates(lon1, lat1)?;
        validate_coordinates(lon2, lat2)?;

        if lon1 == lon2 || lat1 == lat2 {
            return Err(EmissionsError::InvalidGeometry(format!(
                "Rectangle ({}, {}), ({}, {}) has no area",
                lon1, lat1, lon2, lat2
            )));
        }

        Ok(Self {
            min_x: lon1.min(lon2),
            min_y: lat1.min(lat2),
            max_x: lon1.max(lon2),
            max_y: lat1.max(lat2),
        })
    }

    /// Build a bounding box from a flat `[lon1, lat1, lon2, lat2]` list.
    pub fn from_values(values: &[f64]) -> EmissionsResult<Self> {
        match values {
            [lon1, lat1, lon2, lat2] => Self::from_corners(*lon1, *lat1, *lon2, *lat2),
            _ => Err(EmissionsError::invalid_parameter(
                "geoframe",
                format!("Expected 4 values, got {}", values.len()),
            )),
        }
    }

    /// Width of the bounding box in degrees.
    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    /// Height of the bounding box in degrees.
    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    /// Check if a point is contained within this bbox (edges inclusive).
    pub fn contains_point(&self, x: f64, y: f64) -> bool {
        x >= self.min_x && x <= self.max_x && y >= self.min_y && y <= self.max_y
    }

    /// The closed rectangle ring, counter-clockwise from the south-west corner.
    pub fn to_polygon(&self) -> Polygon {
        Polygon::new(vec![
            (self.min_x, self.min_y),
            (self.max_x, self.min_y),
            (self.max_x, self.max_y),
            (self.min_x, self.max_y),
            (self.min_x, self.min_y),
        ])
    }
}
