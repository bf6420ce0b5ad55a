//! Ingestion settings shared by every worker.

use serde::{Deserialize, Serialize};

use emissions_common::grid::DEFAULT_RESOLUTION;
use emissions_common::EqualAreaGrid;

use crate::aggregate::GridAggregator;
use crate::error::{IngestionError, Result};
use crate::filter::{QualityFilter, DEFAULT_QUALITY_THRESHOLD};

fn default_quality_threshold() -> u8 {
    DEFAULT_QUALITY_THRESHOLD
}

fn default_grid_resolution() -> u8 {
    DEFAULT_RESOLUTION
}

fn default_workers() -> usize {
    4
}

/// Settings of the filtering and binning stages and the worker pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestionConfig {
    /// Minimum sample quality (0–100).
    #[serde(default = "default_quality_threshold")]
    pub quality_threshold: u8,

    /// Resolution of the aggregation grid.
    #[serde(default = "default_grid_resolution")]
    pub grid_resolution: u8,

    /// Number of files ingested concurrently.
    #[serde(default = "default_workers")]
    pub workers: usize,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            quality_threshold: default_quality_threshold(),
            grid_resolution: default_grid_resolution(),
            workers: default_workers(),
        }
    }
}

impl IngestionConfig {
    /// Check value ranges.
    pub fn validate(&self) -> Result<()> {
        if self.quality_threshold > 100 {
            return Err(IngestionError::InvalidConfig(format!(
                "quality_threshold {} is outside 0..=100",
                self.quality_threshold
            )));
        }
        if self.workers == 0 {
            return Err(IngestionError::InvalidConfig(
                "workers must be at least 1".to_string(),
            ));
        }
        self.grid()?;
        Ok(())
    }

    pub fn grid(&self) -> Result<EqualAreaGrid> {
        EqualAreaGrid::new(self.grid_resolution)
            .map_err(|e| IngestionError::InvalidConfig(e.to_string()))
    }

    pub fn quality_filter(&self) -> QualityFilter {
        QualityFilter::new(self.quality_threshold)
    }

    pub fn aggregator(&self) -> Result<GridAggregator> {
        Ok(GridAggregator::new(self.grid()?))
    }
}
