//! Store traits shared by the PostgreSQL and in-memory stores.
//!
//! Components receive the narrowest trait they need; the process entrypoint
//! decides which implementation backs them.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use emissions_common::TableName;

use crate::error::StorageResult;
use crate::observation::{CacheEntry, CommitOutcome, DataRange, ScanCommit};
use crate::plan::{ObservationQuery, QueryRows};

/// Write side used by the ingestion pipeline.
#[async_trait]
pub trait IngestStore: Send + Sync {
    /// Whether a file has been recorded as processed.
    async fn is_file_ingested(&self, filename: &str) -> StorageResult<bool>;

    /// Atomically insert the observations, record the file and invalidate
    /// cache entries overlapping the observations' time span.
    async fn commit_scan(&self, commit: &ScanCommit) -> StorageResult<CommitOutcome>;
}

/// Persistent response cache.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get_cached(&self, fingerprint: &str) -> StorageResult<Option<Vec<u8>>>;

    /// Insert or replace the entry for its fingerprint.
    async fn put_cached(&self, entry: &CacheEntry) -> StorageResult<()>;

    /// Current ingestion generation. It advances with every commit or
    /// invalidation that can delete entries.
    async fn generation(&self) -> StorageResult<u64>;

    /// Insert or replace the entry only while the generation still equals
    /// `generation`. Returns whether the entry was written.
    async fn put_cached_if_current(
        &self,
        entry: &CacheEntry,
        generation: u64,
    ) -> StorageResult<bool>;

    /// Delete entries whose window overlaps `[earliest, latest]`. Returns the
    /// number of deleted entries.
    async fn invalidate(
        &self,
        earliest: DateTime<Utc>,
        latest: DateTime<Utc>,
    ) -> StorageResult<u64>;
}

/// Read side used by the query layer.
#[async_trait]
pub trait ObservationSource: Send + Sync {
    async fn fetch(&self, query: &ObservationQuery) -> StorageResult<QueryRows>;

    async fn data_range(&self, table: &TableName) -> StorageResult<DataRange>;
}
