//! Spatial binning of samples into grid-cell observations.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

use emissions_common::{EqualAreaGrid, GridCellKey};
use storage::Observation;

use crate::sample::RawSample;

/// Result of aggregating one scan.
#[derive(Debug, Clone, PartialEq)]
pub enum Aggregated {
    /// No sample survived filtering; nothing should be written.
    Empty,
    /// One observation per occupied cell, in ascending cell order.
    Observations(Vec<Observation>),
}

impl Aggregated {
    pub fn len(&self) -> usize {
        match self {
            Aggregated::Empty => 0,
            Aggregated::Observations(observations) => observations.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn into_observations(self) -> Vec<Observation> {
        match self {
            Aggregated::Empty => Vec::new(),
            Aggregated::Observations(observations) => observations,
        }
    }
}

#[derive(Debug)]
struct CellAccumulator {
    sum: f64,
    count: usize,
    earliest: DateTime<Utc>,
}

/// Reduces samples of one scan to at most one observation per grid cell.
///
/// Value is the mean of the cell's samples, position is the cell centroid
/// and the timestamp is the earliest sample timestamp in the cell.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GridAggregator {
    grid: EqualAreaGrid,
}

impl GridAggregator {
    pub fn new(grid: EqualAreaGrid) -> Self {
        Self { grid }
    }

    pub fn grid(&self) -> &EqualAreaGrid {
        &self.grid
    }

    pub fn aggregate<'a, I>(&self, samples: I) -> Aggregated
    where
        I: IntoIterator<Item = &'a RawSample>,
    {
        let mut cells: BTreeMap<GridCellKey, CellAccumulator> = BTreeMap::new();

        for sample in samples {
            let key = self.grid.cell_key(sample.longitude, sample.latitude);
            cells
                .entry(key)
                .and_modify(|cell| {
                    cell.sum += sample.value;
                    cell.count += 1;
                    cell.earliest = cell.earliest.min(sample.timestamp);
                })
                .or_insert(CellAccumulator {
                    sum: sample.value,
                    count: 1,
                    earliest: sample.timestamp,
                });
        }

        if cells.is_empty() {
            return Aggregated::Empty;
        }

        let observations = cells
            .into_iter()
            .map(|(key, cell)| {
                let geometry = self.grid.cell(key);
                Observation {
                    value: cell.sum / cell.count as f64,
                    longitude: geometry.center_lon,
                    latitude: geometry.center_lat,
                    timestamp: cell.earliest,
                }
            })
            .collect();

        Aggregated::Observations(observations)
    }
}
