//! Ingestion of a single source file.
//!
//! A file moves through `Pending → Decoded → Filtered → Aggregated →
//! Committed`, or straight to `Skipped` when it was already processed. The
//! decode, filter and aggregate stages are pure and run on the blocking
//! pool; the commit is one store transaction.

use chrono::{DateTime, Utc};
use metrics::counter;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, instrument};

use emissions_common::ProductSpec;
use storage::{CommitOutcome, IngestStore, ScanCommit};

use crate::aggregate::{Aggregated, GridAggregator};
use crate::config::IngestionConfig;
use crate::decoder::ScanDecoder;
use crate::error::{IngestionError, Result};
use crate::filter::QualityFilter;
use crate::sample::Scan;

/// Final state of one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileOutcome {
    /// Already recorded as processed; nothing was written.
    Skipped,
    /// No sample passed the quality filter; the file was only marked.
    Empty,
    Committed {
        observations: u64,
        earliest: DateTime<Utc>,
        latest: DateTime<Utc>,
        invalidated: u64,
    },
}

impl FileOutcome {
    fn label(&self) -> &'static str {
        match self {
            FileOutcome::Skipped => "skipped",
            FileOutcome::Empty => "empty",
            FileOutcome::Committed { .. } => "committed",
        }
    }
}

/// Counts gathered while reducing a scan.
#[derive(Debug)]
struct Reduced {
    records: usize,
    masked: usize,
    kept: usize,
    aggregated: Aggregated,
}

/// Turns one source file into committed observations.
pub struct IngestionPipeline {
    store: Arc<dyn IngestStore>,
    decoder: Arc<dyn ScanDecoder>,
    filter: QualityFilter,
    aggregator: GridAggregator,
}

impl IngestionPipeline {
    pub fn new(
        store: Arc<dyn IngestStore>,
        decoder: Arc<dyn ScanDecoder>,
        filter: QualityFilter,
        aggregator: GridAggregator,
    ) -> Self {
        Self {
            store,
            decoder,
            filter,
            aggregator,
        }
    }

    pub fn from_config(
        store: Arc<dyn IngestStore>,
        decoder: Arc<dyn ScanDecoder>,
        config: &IngestionConfig,
    ) -> Result<Self> {
        Ok(Self::new(
            store,
            decoder,
            config.quality_filter(),
            config.aggregator()?,
        ))
    }

    /// Filter and aggregate a decoded scan.
    pub fn reduce(&self, scan: &Scan) -> Aggregated {
        self.aggregator.aggregate(self.filter.apply(scan))
    }

    /// Ingest one file into the product's table.
    #[instrument(skip(self, path, spec), fields(path = %path.display(), table = %spec.table))]
    pub async fn ingest_file(&self, path: &Path, spec: &ProductSpec) -> Result<FileOutcome> {
        let filename = file_name(path)?;

        if self.store.is_file_ingested(&filename).await? {
            debug!("File already ingested, skipping");
            counter!("ingest_files_total", "outcome" => "skipped").increment(1);
            return Ok(FileOutcome::Skipped);
        }

        let reduced = self.decode_and_reduce(path, &spec.variable).await?;
        counter!("ingest_masked_records_total").increment(reduced.masked as u64);
        info!(
            records = reduced.records,
            masked = reduced.masked,
            kept = reduced.kept,
            cells = reduced.aggregated.len(),
            "Scan aggregated"
        );

        let commit = ScanCommit {
            filename,
            table: spec.table.clone(),
            observations: reduced.aggregated.into_observations(),
        };

        let outcome = match self.store.commit_scan(&commit).await? {
            CommitOutcome::AlreadyIngested => {
                debug!("File recorded by a concurrent run, skipping");
                FileOutcome::Skipped
            }
            CommitOutcome::Committed {
                inserted,
                invalidated,
            } => match commit.time_span() {
                Some((earliest, latest)) => FileOutcome::Committed {
                    observations: inserted,
                    earliest,
                    latest,
                    invalidated,
                },
                None => FileOutcome::Empty,
            },
        };

        if let FileOutcome::Committed {
            observations,
            invalidated,
            ..
        } = outcome
        {
            counter!("ingest_observations_total").increment(observations);
            counter!("cache_invalidations_total").increment(invalidated);
        }
        counter!("ingest_files_total", "outcome" => outcome.label()).increment(1);
        info!(outcome = outcome.label(), "File ingested");

        Ok(outcome)
    }

    async fn decode_and_reduce(&self, path: &Path, variable: &str) -> Result<Reduced> {
        let decoder = Arc::clone(&self.decoder);
        let filter = self.filter;
        let aggregator = self.aggregator;
        let path: PathBuf = path.to_path_buf();
        let variable = variable.to_string();

        tokio::task::spawn_blocking(move || -> Result<Reduced> {
            let scan = decoder.decode(&path, &variable)?;
            Ok(Reduced {
                records: scan.len(),
                masked: scan.masked(),
                kept: filter.apply(&scan).count(),
                aggregated: aggregator.aggregate(filter.apply(&scan)),
            })
        })
        .await
        .map_err(|e| IngestionError::Task(e.to_string()))?
    }
}

fn file_name(path: &Path) -> Result<String> {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(str::to_string)
        .ok_or_else(|| IngestionError::InvalidPath(path.display().to_string()))
}
