// SQLite binding for the shared datastore. WAL mode so the pipeline can keep writing
// while the monitor reads counts and appends samples.

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::Row;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use tracing::{info, instrument};

use super::{CompletionMarker, EntityCounter, SampleStore, StatusFeed};
use crate::config::DatabaseConfig;
use crate::error::{StoreError, StoreResult};
use crate::models::{Counts, EntityKind, Rates, Sample, StatusUpdate};

const STATISTICS_COLUMNS: &str = "created_at, files, chunks, candidates, clones, chunks_rate, candidates_rate, clones_rate";
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub async fn connect(path: &str, busy_timeout: Duration) -> anyhow::Result<Self> {
        if let Some(parent) = Path::new(path).parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}", path))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .busy_timeout(busy_timeout)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal);
        let pool = SqlitePoolOptions::new()
            .acquire_timeout(ACQUIRE_TIMEOUT)
            .connect_with(opts)
            .await?;
        Ok(Self { pool })
    }

    /// Startup bootstrap: connect and ping until the datastore answers or attempts run out.
    pub async fn wait_until_ready(config: &DatabaseConfig) -> anyhow::Result<Self> {
        let busy_timeout = Duration::from_millis(config.busy_timeout_ms);
        let retry_delay = Duration::from_millis(config.connect_retry_ms);
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            let result = match Self::connect(&config.path, busy_timeout).await {
                Ok(store) => store.ping().await.map(|_| store).map_err(anyhow::Error::from),
                Err(e) => Err(e),
            };
            match result {
                Ok(store) => {
                    info!(path = %config.path, attempt, "Successfully connected to datastore");
                    return Ok(store);
                }
                Err(e) if attempt >= config.connect_attempts => {
                    anyhow::bail!(
                        "failed to connect to datastore after {} attempts: {}",
                        attempt,
                        e
                    );
                }
                Err(e) => {
                    tracing::debug!(error = %e, attempt, "datastore not ready");
                    info!(
                        attempt,
                        max_attempts = config.connect_attempts,
                        "Waiting for datastore..."
                    );
                    tokio::time::sleep(retry_delay).await;
                }
            }
        }
    }

    pub async fn ping(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    pub async fn init(&self) -> StoreResult<()> {
        for kind in EntityKind::ALL {
            sqlx::query(&format!(
                "CREATE TABLE IF NOT EXISTS {} (id INTEGER PRIMARY KEY AUTOINCREMENT, data BLOB)",
                kind.as_str()
            ))
            .execute(&self.pool)
            .await?;
        }

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS statistics (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                created_at INTEGER NOT NULL,
                files INTEGER NOT NULL,
                chunks INTEGER NOT NULL,
                candidates INTEGER NOT NULL,
                clones INTEGER NOT NULL,
                chunks_rate REAL NOT NULL,
                candidates_rate REAL NOT NULL,
                clones_rate REAL NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_statistics_created_at ON statistics(created_at)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS status_updates (id INTEGER PRIMARY KEY AUTOINCREMENT, created_at INTEGER NOT NULL, message TEXT NOT NULL)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS process_completed (id INTEGER PRIMARY KEY AUTOINCREMENT, created_at INTEGER NOT NULL)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Clears every collection the monitor tracks. Run once at startup, before the first sample.
    #[instrument(skip(self), fields(repo = "datastore", operation = "reset"))]
    pub async fn reset(&self) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        let tables = EntityKind::ALL
            .iter()
            .map(|k| k.as_str())
            .chain(["status_updates", "statistics", "process_completed"]);
        let mut cleared = Vec::new();
        for table in tables {
            sqlx::query(&format!("DELETE FROM {}", table))
                .execute(&mut *tx)
                .await?;
            cleared.push(table);
        }
        tx.commit().await?;
        info!(collections = %cleared.join(", "), "Cleared all collections");
        Ok(())
    }

    /// Sets the completion marker (normally done by the pipeline).
    pub async fn signal_completion(&self) -> StoreResult<()> {
        sqlx::query("INSERT INTO process_completed (created_at) VALUES ($1)")
            .bind(chrono::Utc::now().timestamp_millis())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Underlying pool, for tooling that writes pipeline tables directly.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    fn parse_sample_row(row: &SqliteRow) -> StoreResult<Sample> {
        let timestamp: i64 = row.try_get("created_at")?;
        let mut counts = Counts::new();
        for kind in EntityKind::ALL {
            let n: i64 = row.try_get(kind.as_str())?;
            let n = u64::try_from(n)
                .map_err(|_| StoreError::Decode(format!("negative {} count: {}", kind, n)))?;
            counts.insert(kind, n);
        }
        let mut rates = Rates::new();
        for kind in EntityKind::RATE_TRACKED {
            let r: f64 = row.try_get(kind.rate_column())?;
            rates.insert(kind, r);
        }
        Ok(Sample {
            timestamp,
            counts,
            rates,
        })
    }

    fn parse_rows(rows: &[SqliteRow]) -> StoreResult<Vec<Sample>> {
        rows.iter().map(Self::parse_sample_row).collect()
    }
}

#[async_trait]
impl EntityCounter for SqliteStore {
    async fn count(&self, kind: EntityKind) -> StoreResult<u64> {
        let n = sqlx::query_scalar::<_, i64>(&format!("SELECT COUNT(*) FROM {}", kind.as_str()))
            .fetch_one(&self.pool)
            .await?;
        Ok(n.max(0) as u64)
    }
}

#[async_trait]
impl SampleStore for SqliteStore {
    #[instrument(skip(self, sample), fields(repo = "datastore", operation = "insert_sample"))]
    async fn insert(&self, sample: &Sample) -> StoreResult<()> {
        sqlx::query(&format!(
            "INSERT INTO statistics ({}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
            STATISTICS_COLUMNS
        ))
        .bind(sample.timestamp)
        .bind(sample.count(EntityKind::Files) as i64)
        .bind(sample.count(EntityKind::Chunks) as i64)
        .bind(sample.count(EntityKind::Candidates) as i64)
        .bind(sample.count(EntityKind::Clones) as i64)
        .bind(sample.rate(EntityKind::Chunks))
        .bind(sample.rate(EntityKind::Candidates))
        .bind(sample.rate(EntityKind::Clones))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn most_recent(&self) -> StoreResult<Option<Sample>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM statistics ORDER BY created_at DESC, id DESC LIMIT 1",
            STATISTICS_COLUMNS
        ))
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(Self::parse_sample_row).transpose()
    }

    #[instrument(skip(self), fields(repo = "datastore", operation = "all_samples"))]
    async fn all(&self) -> StoreResult<Vec<Sample>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM statistics ORDER BY created_at ASC, id ASC",
            STATISTICS_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;
        Self::parse_rows(&rows)
    }

    async fn recent(&self, n: usize) -> StoreResult<Vec<Sample>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM statistics ORDER BY created_at DESC, id DESC LIMIT $1",
            STATISTICS_COLUMNS
        ))
        .bind(n as i64)
        .fetch_all(&self.pool)
        .await?;
        let mut out = Self::parse_rows(&rows)?;
        out.reverse();
        Ok(out)
    }
}

#[async_trait]
impl StatusFeed for SqliteStore {
    async fn all(&self) -> StoreResult<Vec<StatusUpdate>> {
        let rows = sqlx::query(
            "SELECT created_at, message FROM status_updates ORDER BY created_at DESC, id DESC",
        )
        .fetch_all(&self.pool)
        .await?;
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(StatusUpdate {
                timestamp: row.try_get("created_at")?,
                message: row.try_get("message")?,
            });
        }
        Ok(out)
    }

    async fn append(&self, message: &str) -> StoreResult<()> {
        sqlx::query("INSERT INTO status_updates (created_at, message) VALUES ($1, $2)")
            .bind(chrono::Utc::now().timestamp_millis())
            .bind(message)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl CompletionMarker for SqliteStore {
    async fn is_set(&self) -> StoreResult<bool> {
        let n = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM process_completed")
            .fetch_one(&self.pool)
            .await?;
        Ok(n > 0)
    }

    async fn clear(&self) -> StoreResult<()> {
        sqlx::query("DELETE FROM process_completed")
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    #[instrument(skip(self), fields(repo = "datastore", operation = "take_completion"))]
    async fn take(&self) -> StoreResult<bool> {
        let r = sqlx::query("DELETE FROM process_completed")
            .execute(&self.pool)
            .await?;
        Ok(r.rows_affected() > 0)
    }
}
