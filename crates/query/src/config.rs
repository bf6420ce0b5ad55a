//! Query layer settings.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use emissions_common::grid::DEFAULT_RESOLUTION;
use emissions_common::{EmissionsResult, EqualAreaGrid};

fn default_grid_resolution() -> u8 {
    DEFAULT_RESOLUTION
}

fn default_request_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryConfig {
    /// Must match the ingestion grid so point queries hit stored cells.
    #[serde(default = "default_grid_resolution")]
    pub grid_resolution: u8,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// YAML file mapping region codes to WKT geometries.
    #[serde(default)]
    pub regions_file: Option<PathBuf>,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            grid_resolution: default_grid_resolution(),
            request_timeout_secs: default_request_timeout_secs(),
            regions_file: None,
        }
    }
}

impl QueryConfig {
    pub fn grid(&self) -> EmissionsResult<EqualAreaGrid> {
        EqualAreaGrid::new(self.grid_resolution)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
