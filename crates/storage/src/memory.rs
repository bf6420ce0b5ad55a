//! In-memory store.
//!
//! Holds every table behind one lock so a scan commit is atomic, mirroring
//! the transactional guarantees of the PostgreSQL store. Used by tests and
//! dry runs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::Mutex;

use emissions_common::TableName;

use crate::error::StorageResult;
use crate::observation::{CacheEntry, CommitOutcome, DataRange, Observation, ScanCommit};
use crate::plan::{ObservationQuery, QueryRows};
use crate::store::{CacheStore, IngestStore, ObservationSource};

#[derive(Default)]
struct MemoryState {
    tables: HashMap<TableName, Vec<Observation>>,
    files: HashSet<String>,
    cache: HashMap<String, CacheEntry>,
    generation: u64,
}

impl MemoryState {
    fn delete_overlapping(&mut self, earliest: DateTime<Utc>, latest: DateTime<Utc>) -> u64 {
        self.generation += 1;
        let before = self.cache.len();
        self.cache
            .retain(|_, entry| !entry.window.overlaps(earliest, latest));
        (before - self.cache.len()) as u64
    }
}

/// Cloneable handle to shared in-memory tables.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Observations stored in a table, in insertion order.
    pub async fn observations(&self, table: &TableName) -> Vec<Observation> {
        let state = self.state.lock().await;
        state.tables.get(table).cloned().unwrap_or_default()
    }

    /// Recorded file names, sorted.
    pub async fn ingested_files(&self) -> Vec<String> {
        let state = self.state.lock().await;
        let mut files: Vec<String> = state.files.iter().cloned().collect();
        files.sort();
        files
    }

    pub async fn cache_entry(&self, fingerprint: &str) -> Option<CacheEntry> {
        let state = self.state.lock().await;
        state.cache.get(fingerprint).cloned()
    }

    pub async fn cache_len(&self) -> usize {
        self.state.lock().await.cache.len()
    }
}

#[async_trait]
impl IngestStore for MemoryStore {
    async fn is_file_ingested(&self, filename: &str) -> StorageResult<bool> {
        Ok(self.state.lock().await.files.contains(filename))
    }

    async fn commit_scan(&self, commit: &ScanCommit) -> StorageResult<CommitOutcome> {
        let mut state = self.state.lock().await;

        if !state.files.insert(commit.filename.clone()) {
            return Ok(CommitOutcome::AlreadyIngested);
        }

        state
            .tables
            .entry(commit.table.clone())
            .or_default()
            .extend(commit.observations.iter().cloned());

        let invalidated = match commit.time_span() {
            Some((earliest, latest)) => state.delete_overlapping(earliest, latest),
            None => 0,
        };

        Ok(CommitOutcome::Committed {
            inserted: commit.observations.len() as u64,
            invalidated,
        })
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn get_cached(&self, fingerprint: &str) -> StorageResult<Option<Vec<u8>>> {
        let state = self.state.lock().await;
        Ok(state.cache.get(fingerprint).map(|e| e.response.clone()))
    }

    async fn put_cached(&self, entry: &CacheEntry) -> StorageResult<()> {
        let mut state = self.state.lock().await;
        state.cache.insert(entry.fingerprint.clone(), entry.clone());
        Ok(())
    }

    async fn generation(&self) -> StorageResult<u64> {
        Ok(self.state.lock().await.generation)
    }

    async fn put_cached_if_current(
        &self,
        entry: &CacheEntry,
        generation: u64,
    ) -> StorageResult<bool> {
        let mut state = self.state.lock().await;
        if state.generation != generation {
            return Ok(false);
        }
        state.cache.insert(entry.fingerprint.clone(), entry.clone());
        Ok(true)
    }

    async fn invalidate(
        &self,
        earliest: DateTime<Utc>,
        latest: DateTime<Utc>,
    ) -> StorageResult<u64> {
        Ok(self.state.lock().await.delete_overlapping(earliest, latest))
    }
}

#[async_trait]
impl ObservationSource for MemoryStore {
    async fn fetch(&self, query: &ObservationQuery) -> StorageResult<QueryRows> {
        let state = self.state.lock().await;
        let observations = state.tables.get(&query.table).map(Vec::as_slice).unwrap_or(&[]);
        query.evaluate(observations)
    }

    async fn data_range(&self, table: &TableName) -> StorageResult<DataRange> {
        let state = self.state.lock().await;
        let timestamps = state.tables.get(table).into_iter().flatten().map(|o| o.timestamp);

        Ok(timestamps.fold(DataRange::default(), |range, ts| DataRange {
            first: Some(range.first.map_or(ts, |first| first.min(ts))),
            last: Some(range.last.map_or(ts, |last| last.max(ts))),
        }))
    }
}
