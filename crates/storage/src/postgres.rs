//! PostgreSQL/PostGIS store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgArguments, PgExecutor, PgPoolOptions};
use sqlx::query::QueryAs;
use sqlx::{FromRow, PgPool, Postgres};
use tracing::{debug, info, instrument};

use emissions_common::TableName;

use crate::error::{StorageError, StorageResult};
use crate::observation::{CacheEntry, CommitOutcome, DataRange, Observation, ScanCommit};
use crate::plan::{Aggregation, AverageRow, ObservationQuery, QueryRows, SqlParam, StatisticsRow};
use crate::store::{CacheStore, IngestStore, ObservationSource};

/// Store handle backed by a PostgreSQL connection pool.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Create a new store from a database URL.
    pub async fn connect(database_url: &str) -> StorageResult<Self> {
        Self::connect_with(database_url, 10).await
    }

    /// Create a new store with a bounded number of connections.
    pub async fn connect_with(database_url: &str, max_connections: u32) -> StorageResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| StorageError::Connection(format!("Connection failed: {}", e)))?;

        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create the shared tables and one observation table per product.
    pub async fn migrate<'a, I>(&self, tables: I) -> StorageResult<()>
    where
        I: IntoIterator<Item = &'a TableName>,
    {
        self.execute_schema(SCHEMA_SQL).await?;

        for table in tables {
            let sql = OBSERVATION_SCHEMA_SQL.replace("{table}", table.as_str());
            self.execute_schema(&sql).await?;
            debug!(table = %table, "Observation table ready");
        }

        Ok(())
    }

    async fn execute_schema(&self, schema: &str) -> StorageResult<()> {
        // Split SQL statements and execute them individually
        for statement in schema.split(';') {
            let trimmed = statement.trim();
            if !trimmed.is_empty() {
                sqlx::query(trimmed)
                    .execute(&self.pool)
                    .await
                    .map_err(|e| StorageError::Migration(format!("{}: {}", trimmed, e)))?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl IngestStore for PgStore {
    async fn is_file_ingested(&self, filename: &str) -> StorageResult<bool> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM file WHERE filename = $1)",
        )
        .bind(filename)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| StorageError::Database(format!("Query failed: {}", e)))?;

        Ok(exists)
    }

    #[instrument(skip(self, commit), fields(filename = %commit.filename, table = %commit.table))]
    async fn commit_scan(&self, commit: &ScanCommit) -> StorageResult<CommitOutcome> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StorageError::Database(format!("Begin failed: {}", e)))?;

        let inserted = if commit.observations.is_empty() {
            0
        } else {
            let observations = &commit.observations;
            let values: Vec<f64> = observations.iter().map(|o| o.value).collect();
            let longitudes: Vec<f64> = observations.iter().map(|o| o.longitude).collect();
            let latitudes: Vec<f64> = observations.iter().map(|o| o.latitude).collect();
            let timestamps: Vec<DateTime<Utc>> = observations.iter().map(|o| o.timestamp).collect();

            let sql = format!(
                "INSERT INTO {} (value, longitude, latitude, \"timestamp\", geom) \
                 SELECT v, lon, lat, ts, ST_SetSRID(ST_MakePoint(lon, lat), 4326) \
                 FROM UNNEST($1::float8[], $2::float8[], $3::float8[], $4::timestamptz[]) \
                 AS t(v, lon, lat, ts)",
                commit.table
            );

            sqlx::query(&sql)
                .bind(values)
                .bind(longitudes)
                .bind(latitudes)
                .bind(timestamps)
                .execute(&mut *tx)
                .await
                .map_err(|e| StorageError::Database(format!("Insert failed: {}", e)))?
                .rows_affected()
        };

        // A concurrent run that recorded the file first wins; drop our rows.
        let marked = sqlx::query(
            "INSERT INTO file (filename) VALUES ($1) ON CONFLICT (filename) DO NOTHING",
        )
        .bind(&commit.filename)
        .execute(&mut *tx)
        .await
        .map_err(|e| StorageError::Database(format!("Insert failed: {}", e)))?
        .rows_affected();

        if marked == 0 {
            tx.rollback()
                .await
                .map_err(|e| StorageError::Database(format!("Rollback failed: {}", e)))?;
            return Ok(CommitOutcome::AlreadyIngested);
        }

        // The generation row stays locked until commit, so conditional cache
        // writes wait for this transaction and then see the new generation.
        let invalidated = match commit.time_span() {
            Some((earliest, latest)) => {
                advance_generation(&mut *tx).await?;
                delete_overlapping(&mut *tx, earliest, latest).await?
            }
            None => 0,
        };

        tx.commit()
            .await
            .map_err(|e| StorageError::Database(format!("Commit failed: {}", e)))?;

        info!(inserted, invalidated, "Scan committed");
        Ok(CommitOutcome::Committed {
            inserted,
            invalidated,
        })
    }
}

#[async_trait]
impl CacheStore for PgStore {
    async fn get_cached(&self, fingerprint: &str) -> StorageResult<Option<Vec<u8>>> {
        sqlx::query_scalar::<_, Vec<u8>>("SELECT response FROM cache WHERE request = $1")
            .bind(fingerprint)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StorageError::Database(format!("Query failed: {}", e)))
    }

    async fn put_cached(&self, entry: &CacheEntry) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO cache (request, "begin", "end", response)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (request)
            DO UPDATE SET
                "begin" = EXCLUDED."begin",
                "end" = EXCLUDED."end",
                response = EXCLUDED.response
            "#,
        )
        .bind(&entry.fingerprint)
        .bind(entry.window.begin)
        .bind(entry.window.end)
        .bind(&entry.response)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Database(format!("Insert failed: {}", e)))?;

        Ok(())
    }

    async fn generation(&self) -> StorageResult<u64> {
        let generation =
            sqlx::query_scalar::<_, i64>("SELECT generation FROM ingest_generation")
                .fetch_one(&self.pool)
                .await
                .map_err(|e| StorageError::Database(format!("Query failed: {}", e)))?;

        Ok(generation as u64)
    }

    async fn put_cached_if_current(
        &self,
        entry: &CacheEntry,
        generation: u64,
    ) -> StorageResult<bool> {
        let written = sqlx::query(
            r#"
            INSERT INTO cache (request, "begin", "end", response)
            SELECT $1::text, $2::timestamptz, $3::timestamptz, $4::bytea
            FROM ingest_generation
            WHERE generation = $5
            FOR SHARE
            ON CONFLICT (request)
            DO UPDATE SET
                "begin" = EXCLUDED."begin",
                "end" = EXCLUDED."end",
                response = EXCLUDED.response
            "#,
        )
        .bind(&entry.fingerprint)
        .bind(entry.window.begin)
        .bind(entry.window.end)
        .bind(&entry.response)
        .bind(generation as i64)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Database(format!("Insert failed: {}", e)))?
        .rows_affected();

        Ok(written > 0)
    }

    async fn invalidate(
        &self,
        earliest: DateTime<Utc>,
        latest: DateTime<Utc>,
    ) -> StorageResult<u64> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StorageError::Database(format!("Begin failed: {}", e)))?;

        advance_generation(&mut *tx).await?;
        let deleted = delete_overlapping(&mut *tx, earliest, latest).await?;

        tx.commit()
            .await
            .map_err(|e| StorageError::Database(format!("Commit failed: {}", e)))?;
        Ok(deleted)
    }
}

#[async_trait]
impl ObservationSource for PgStore {
    #[instrument(skip(self, query), fields(table = %query.table))]
    async fn fetch(&self, query: &ObservationQuery) -> StorageResult<QueryRows> {
        let (sql, params) = query.to_sql()?;
        debug!(sql = %sql, params = params.len(), "Executing observation query");

        let rows = match query.aggregation {
            Aggregation::Points => {
                let rows = bind_params(sqlx::query_as::<_, ObservationRow>(&sql), &params)
                    .fetch_all(&self.pool)
                    .await
                    .map_err(|e| StorageError::Database(format!("Query failed: {}", e)))?;
                QueryRows::Points(rows.into_iter().map(Into::into).collect())
            }
            Aggregation::DailyAverage => {
                let rows = bind_params(sqlx::query_as::<_, AverageRecord>(&sql), &params)
                    .fetch_all(&self.pool)
                    .await
                    .map_err(|e| StorageError::Database(format!("Query failed: {}", e)))?;
                QueryRows::Averages(rows.into_iter().map(Into::into).collect())
            }
            Aggregation::Statistics { .. } => {
                let rows = bind_params(sqlx::query_as::<_, StatisticsRecord>(&sql), &params)
                    .fetch_all(&self.pool)
                    .await
                    .map_err(|e| StorageError::Database(format!("Query failed: {}", e)))?;
                QueryRows::Statistics(rows.into_iter().map(Into::into).collect())
            }
        };

        Ok(rows)
    }

    async fn data_range(&self, table: &TableName) -> StorageResult<DataRange> {
        let sql = format!(
            "SELECT MIN(\"timestamp\"), MAX(\"timestamp\") FROM {}",
            table
        );
        let (first, last) =
            sqlx::query_as::<_, (Option<DateTime<Utc>>, Option<DateTime<Utc>>)>(&sql)
                .fetch_one(&self.pool)
                .await
                .map_err(|e| StorageError::Database(format!("Query failed: {}", e)))?;

        Ok(DataRange { first, last })
    }
}

async fn advance_generation<'e, E>(executor: E) -> StorageResult<()>
where
    E: PgExecutor<'e>,
{
    sqlx::query("UPDATE ingest_generation SET generation = generation + 1")
        .execute(executor)
        .await
        .map_err(|e| StorageError::Database(format!("Update failed: {}", e)))?;
    Ok(())
}

async fn delete_overlapping<'e, E>(
    executor: E,
    earliest: DateTime<Utc>,
    latest: DateTime<Utc>,
) -> StorageResult<u64>
where
    E: PgExecutor<'e>,
{
    let result = sqlx::query(
        "DELETE FROM cache \
         WHERE (\"begin\" IS NULL OR \"begin\" <= $1) \
         AND (\"end\" IS NULL OR \"end\" > $2)",
    )
    .bind(latest)
    .bind(earliest)
    .execute(executor)
    .await
    .map_err(|e| StorageError::Database(format!("Delete failed: {}", e)))?;

    Ok(result.rows_affected())
}

fn bind_params<'q, O>(
    mut query: QueryAs<'q, Postgres, O, PgArguments>,
    params: &[SqlParam],
) -> QueryAs<'q, Postgres, O, PgArguments> {
    for param in params {
        query = match param {
            SqlParam::Text(text) => query.bind(text.clone()),
            SqlParam::Float(value) => query.bind(*value),
            SqlParam::Int(value) => query.bind(*value),
            SqlParam::Time(instant) => query.bind(*instant),
        };
    }
    query
}

/// Internal row types for database queries.
#[derive(FromRow)]
struct ObservationRow {
    value: f64,
    longitude: f64,
    latitude: f64,
    timestamp: DateTime<Utc>,
}

impl From<ObservationRow> for Observation {
    fn from(row: ObservationRow) -> Self {
        Observation {
            value: row.value,
            longitude: row.longitude,
            latitude: row.latitude,
            timestamp: row.timestamp,
        }
    }
}

#[derive(FromRow)]
struct AverageRecord {
    average: f64,
    day: DateTime<Utc>,
}

impl From<AverageRecord> for AverageRow {
    fn from(row: AverageRecord) -> Self {
        AverageRow {
            average: row.average,
            day: row.day,
        }
    }
}

#[derive(FromRow)]
struct StatisticsRecord {
    count: i64,
    average: f64,
    standard_deviation: Option<f64>,
    min: f64,
    max: f64,
    min_timestamp: DateTime<Utc>,
    max_timestamp: DateTime<Utc>,
    interval_start: DateTime<Utc>,
}

impl From<StatisticsRecord> for StatisticsRow {
    fn from(row: StatisticsRecord) -> Self {
        StatisticsRow {
            count: row.count,
            average: row.average,
            standard_deviation: row.standard_deviation,
            min: row.min,
            max: row.max,
            min_timestamp: row.min_timestamp,
            max_timestamp: row.max_timestamp,
            interval_start: row.interval_start,
        }
    }
}

/// Shared tables.
const SCHEMA_SQL: &str = r#"
CREATE EXTENSION IF NOT EXISTS postgis;

CREATE TABLE IF NOT EXISTS file (
    filename TEXT PRIMARY KEY
);

CREATE TABLE IF NOT EXISTS cache (
    request TEXT PRIMARY KEY,
    "begin" TIMESTAMPTZ,
    "end" TIMESTAMPTZ,
    response BYTEA NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_cache_window ON cache("begin", "end");

CREATE TABLE IF NOT EXISTS ingest_generation (
    id BOOLEAN PRIMARY KEY DEFAULT TRUE CHECK (id),
    generation BIGINT NOT NULL DEFAULT 0
);

INSERT INTO ingest_generation (id) VALUES (TRUE) ON CONFLICT (id) DO NOTHING;
"#;

/// Per-product observation table; `{table}` is a validated identifier.
const OBSERVATION_SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS {table} (
    id BIGSERIAL PRIMARY KEY,
    value DOUBLE PRECISION NOT NULL,
    longitude DOUBLE PRECISION NOT NULL,
    latitude DOUBLE PRECISION NOT NULL,
    "timestamp" TIMESTAMPTZ NOT NULL,
    geom geometry(POINT, 4326) NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_{table}_timestamp ON {table}("timestamp");
CREATE INDEX IF NOT EXISTS idx_{table}_geom ON {table} USING GIST (geom);
"#;
