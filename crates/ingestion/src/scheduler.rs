//! Batch driver that ingests every pending file of the configured products.

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use metrics::{counter, gauge};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use walkdir::WalkDir;

use emissions_common::{Product, ProductSpec};
use storage::{IngestStore, MemoryStore, PgStore, StorageResult};

use crate::config::IngestionConfig;
use crate::decoder::ScanDecoder;
use crate::error::{IngestionError, Result};
use crate::pipeline::{FileOutcome, IngestionPipeline};

/// Creates a fresh store handle for each file task.
#[async_trait]
pub trait StoreConnector: Send + Sync {
    async fn connect(&self) -> StorageResult<Arc<dyn IngestStore>>;
}

/// Opens a small dedicated PostgreSQL pool per task.
#[derive(Debug, Clone)]
pub struct PgConnector {
    database_url: String,
    max_connections: u32,
}

impl PgConnector {
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            max_connections: 1,
        }
    }
}

#[async_trait]
impl StoreConnector for PgConnector {
    async fn connect(&self) -> StorageResult<Arc<dyn IngestStore>> {
        let store = PgStore::connect_with(&self.database_url, self.max_connections).await?;
        Ok(Arc::new(store))
    }
}

#[async_trait]
impl StoreConnector for MemoryStore {
    async fn connect(&self) -> StorageResult<Arc<dyn IngestStore>> {
        Ok(Arc::new(self.clone()))
    }
}

/// Source files of one product.
#[derive(Debug, Clone)]
pub struct ProductJob {
    pub product: Product,
    pub spec: ProductSpec,
    pub directory: PathBuf,
    /// File extension without the dot, matched case-insensitively.
    pub extension: String,
}

/// Per-product tally of one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductProgress {
    pub product: Product,
    pub total: usize,
    pub committed: usize,
    pub empty: usize,
    pub skipped: usize,
    pub failed: usize,
    pub observations: u64,
}

impl ProductProgress {
    fn new(product: Product, total: usize) -> Self {
        Self {
            product,
            total,
            committed: 0,
            empty: 0,
            skipped: 0,
            failed: 0,
            observations: 0,
        }
    }

    fn record(&mut self, outcome: &FileOutcome) {
        match outcome {
            FileOutcome::Skipped => self.skipped += 1,
            FileOutcome::Empty => self.empty += 1,
            FileOutcome::Committed { observations, .. } => {
                self.committed += 1;
                self.observations += observations;
            }
        }
    }

    /// Files handled so far, successfully or not.
    pub fn finished(&self) -> usize {
        self.committed + self.empty + self.skipped + self.failed
    }
}

/// Runs ingestion pipelines on a fixed-size worker pool.
pub struct Scheduler {
    connector: Arc<dyn StoreConnector>,
    decoder: Arc<dyn ScanDecoder>,
    config: IngestionConfig,
}

impl Scheduler {
    pub fn new(
        connector: Arc<dyn StoreConnector>,
        decoder: Arc<dyn ScanDecoder>,
        config: IngestionConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            connector,
            decoder,
            config,
        })
    }

    /// Ingest every product in turn.
    pub async fn run(&self, jobs: &[ProductJob]) -> Vec<ProductProgress> {
        let mut progress = Vec::with_capacity(jobs.len());
        for job in jobs {
            progress.push(self.run_product(job).await);
        }
        progress
    }

    /// Ingest all files of one product. Failures are logged and counted.
    #[instrument(skip(self, job), fields(product = %job.product))]
    pub async fn run_product(&self, job: &ProductJob) -> ProductProgress {
        let files = discover_files(&job.directory, &job.extension);
        let mut progress = ProductProgress::new(job.product, files.len());
        info!(
            directory = %job.directory.display(),
            files = files.len(),
            workers = self.config.workers,
            "Starting product ingestion"
        );

        let product = job.product.name();
        let results: Vec<(PathBuf, Result<FileOutcome>)> = stream::iter(files)
            .map(|path| {
                let connector = Arc::clone(&self.connector);
                let decoder = Arc::clone(&self.decoder);
                let config = self.config.clone();
                let spec = job.spec.clone();

                async move {
                    gauge!("active_imports", "product" => product).increment(1.0);
                    let task_path = path.clone();
                    let handle = tokio::spawn(async move {
                        ingest_one(connector, decoder, &config, &spec, &task_path).await
                    });
                    let result = handle
                        .await
                        .unwrap_or_else(|e| Err(IngestionError::Task(e.to_string())));
                    gauge!("active_imports", "product" => product).decrement(1.0);
                    (path, result)
                }
            })
            .buffer_unordered(self.config.workers)
            .collect()
            .await;

        for (path, result) in results {
            match result {
                Ok(outcome) => progress.record(&outcome),
                Err(e) => {
                    progress.failed += 1;
                    counter!("ingest_failures_total", "product" => product).increment(1);
                    error!(path = %path.display(), error = %e, "File ingestion failed");
                }
            }
        }

        info!(
            total = progress.total,
            committed = progress.committed,
            empty = progress.empty,
            skipped = progress.skipped,
            failed = progress.failed,
            observations = progress.observations,
            "Product ingestion finished"
        );
        progress
    }
}

async fn ingest_one(
    connector: Arc<dyn StoreConnector>,
    decoder: Arc<dyn ScanDecoder>,
    config: &IngestionConfig,
    spec: &ProductSpec,
    path: &Path,
) -> Result<FileOutcome> {
    let store = connector.connect().await?;
    let pipeline = IngestionPipeline::from_config(store, decoder, config)?;
    pipeline.ingest_file(path, spec).await
}

/// Files below `directory` with the given extension, sorted by path.
pub fn discover_files(directory: &Path, extension: &str) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(directory)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!(error = %e, "Skipping unreadable directory entry");
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| {
            path.extension()
                .and_then(|ext| ext.to_str())
                .map_or(false, |ext| ext.eq_ignore_ascii_case(extension))
        })
        .collect();

    files.sort();
    files
}
