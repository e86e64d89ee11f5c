// Datastore capabilities the monitor depends on, plus the SQLite binding.
// The pipeline owns the entity tables; the monitor reads counts, appends samples,
// and consumes the completion marker.

mod sqlite;

pub use sqlite::SqliteStore;

use async_trait::async_trait;

use crate::error::StoreResult;
use crate::models::{EntityKind, Sample, StatusUpdate};

/// Reads current row counts of tracked entity kinds.
#[async_trait]
pub trait EntityCounter: Send + Sync {
    async fn count(&self, kind: EntityKind) -> StoreResult<u64>;
}

/// Append-only ordered log of samples.
#[async_trait]
pub trait SampleStore: Send + Sync {
    /// Appends one sample atomically; readers never see a partial row.
    async fn insert(&self, sample: &Sample) -> StoreResult<()>;

    /// Most recent sample by timestamp, not by insertion position.
    async fn most_recent(&self) -> StoreResult<Option<Sample>>;

    /// Every sample, ascending by timestamp.
    async fn all(&self) -> StoreResult<Vec<Sample>>;

    /// The last `n` samples by timestamp, returned oldest first.
    async fn recent(&self, n: usize) -> StoreResult<Vec<Sample>>;
}

/// Read view over pipeline status messages.
#[async_trait]
pub trait StatusFeed: Send + Sync {
    /// Every update, newest first.
    async fn all(&self) -> StoreResult<Vec<StatusUpdate>>;

    async fn append(&self, message: &str) -> StoreResult<()>;
}

/// Presence/absence signal written by the pipeline when it finishes.
#[async_trait]
pub trait CompletionMarker: Send + Sync {
    async fn is_set(&self) -> StoreResult<bool>;

    async fn clear(&self) -> StoreResult<()>;

    /// Observes and clears the marker in one step. Returns whether it was set.
    /// Shared-store implementations must make this a single atomic operation.
    async fn take(&self) -> StoreResult<bool> {
        if self.is_set().await? {
            self.clear().await?;
            Ok(true)
        } else {
            Ok(false)
        }
    }
}
