//! Common test fixtures for emissions tests.
//!
//! Areas, region geometries and instants used across the test suites.

/// Common bounding boxes as `(min_lon, min_lat, max_lon, max_lat)`.
pub mod bbox {
    /// Global bounding box (-180 to 180, -90 to 90)
    pub const GLOBAL: (f64, f64, f64, f64) = (-180.0, -90.0, 180.0, 90.0);

    /// Europe bounding box
    pub const EUROPE: (f64, f64, f64, f64) = (-15.0, 35.0, 45.0, 72.0);

    /// Rough outline of Germany
    pub const GERMANY: (f64, f64, f64, f64) = (5.9, 47.3, 15.0, 55.1);

    /// Unit square at the origin
    pub const UNIT: (f64, f64, f64, f64) = (0.0, 0.0, 1.0, 1.0);
}

/// Region geometries in WKT.
pub mod regions {
    /// Simplified outline of Germany.
    pub const DE_WKT: &str =
        "POLYGON((5.9 47.3,15.0 47.3,15.0 55.1,5.9 55.1,5.9 47.3))";

    /// Two islands, one of them with a lake.
    pub const ISLANDS_WKT: &str = "MULTIPOLYGON(((0 0,4 0,4 4,0 4,0 0),(1 1,3 1,3 3,1 3,1 1)),((10 10,12 10,12 12,10 12,10 10)))";

    /// Region catalog file content keyed by alpha-2 and alpha-3 codes.
    pub const CATALOG_YAML: &str = r#"
DE: "POLYGON((5.9 47.3,15.0 47.3,15.0 55.1,5.9 55.1,5.9 47.3))"
DEU: "POLYGON((5.9 47.3,15.0 47.3,15.0 55.1,5.9 55.1,5.9 47.3))"
XI: "MULTIPOLYGON(((0 0,4 0,4 4,0 4,0 0),(1 1,3 1,3 3,1 3,1 1)),((10 10,12 10,12 12,10 12,10 10)))"
"#;
}

/// Common instants (RFC 3339).
pub mod time {
    pub const JAN_1_2020: &str = "2020-01-01T00:00:00Z";
    pub const JAN_1_2020_NOON: &str = "2020-01-01T12:00:00Z";
    pub const JAN_2_2020: &str = "2020-01-02T00:00:00Z";
    pub const JUNE_1_2020: &str = "2020-06-01T00:00:00Z";
    pub const JUNE_1_2020_NOON: &str = "2020-06-01T12:00:00Z";
}

/// Measurement variable names as they appear in scan headers.
pub mod variables {
    pub const CARBON_MONOXIDE: &str = "carbonmonoxide_total_column";
    pub const OZONE: &str = "ozone_total_vertical_column";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bbox_fixtures_are_ordered() {
        for (min_x, min_y, max_x, max_y) in [bbox::GLOBAL, bbox::EUROPE, bbox::GERMANY, bbox::UNIT] {
            assert!(min_x < max_x);
            assert!(min_y < max_y);
        }
    }

    #[test]
    fn test_catalog_lists_both_code_styles() {
        assert!(regions::CATALOG_YAML.contains("\nDE:"));
        assert!(regions::CATALOG_YAML.contains("\nDEU:"));
    }
}
