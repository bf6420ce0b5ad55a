//! Trace-gas scan ingestion library.
//!
//! Turns satellite scan files into per-cell observations and commits them
//! together with the processed-file marker and cache invalidation.
//!
//! # Architecture
//!
//! - [`decoder`]: reads a source file into a [`Scan`] of raw samples
//! - [`filter`]: drops samples below the quality threshold
//! - [`aggregate`]: bins the remaining samples into equal-area grid cells
//! - [`pipeline`]: runs one file through the stages above and commits it
//! - [`scheduler`]: discovers pending files and drives pipelines on a
//!   bounded worker pool

pub mod aggregate;
pub mod config;
pub mod decoder;
pub mod error;
pub mod filter;
pub mod pipeline;
pub mod sample;
pub mod scheduler;

// Re-exports
pub use aggregate::{Aggregated, GridAggregator};
pub use config::IngestionConfig;
pub use decoder::{ScanDecoder, TextScanDecoder};
pub use error::{DecodeError, IngestionError, Result};
pub use filter::{QualityFilter, DEFAULT_QUALITY_THRESHOLD};
pub use pipeline::{FileOutcome, IngestionPipeline};
pub use sample::{RawSample, Scan};
pub use scheduler::{
    discover_files, PgConnector, ProductJob, ProductProgress, Scheduler, StoreConnector,
};
