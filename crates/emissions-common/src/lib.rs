//! Common types and utilities shared across the emissions crates.

pub mod bbox;
pub mod error;
pub mod geometry;
pub mod grid;
pub mod product;
pub mod time;

pub use bbox::BoundingBox;
pub use error::{EmissionsError, EmissionsResult};
pub use geometry::{haversine_distance, validate_coordinates, Geometry, Polygon};
pub use grid::{EqualAreaGrid, GridCell, GridCellKey};
pub use product::{Product, ProductRegistry, ProductSpec, TableName};
pub use time::{parse_instant, TimeWindow};
