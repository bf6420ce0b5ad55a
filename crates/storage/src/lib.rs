//! Storage for the emissions services.
//!
//! Provides:
//! - PostgreSQL/PostGIS store for observations, processed files and cached responses
//! - An in-memory store with the same semantics
//! - Observation query plans shared by both

pub mod error;
pub mod memory;
pub mod observation;
pub mod plan;
pub mod postgres;
pub mod store;

pub use error::{StorageError, StorageResult};
pub use memory::MemoryStore;
pub use observation::{CacheEntry, CommitOutcome, DataRange, Observation, ScanCommit};
pub use plan::{
    Aggregation, AverageRow, LocationPredicate, ObservationQuery, QueryRows, SqlParam,
    StatisticsRow, SECONDS_PER_DAY,
};
pub use postgres::PgStore;
pub use store::{CacheStore, IngestStore, ObservationSource};
