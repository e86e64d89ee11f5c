// Datastore error taxonomy. Only `Unreachable` ends a monitoring run.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    /// The datastore as a whole cannot be reached (pool closed/timed out, I/O, connect failure).
    #[error("datastore unreachable: {0}")]
    Unreachable(#[source] sqlx::Error),
    /// A single statement failed; the store itself is still reachable.
    #[error("query failed: {0}")]
    Query(#[source] sqlx::Error),
    /// A row could not be turned into a domain value.
    #[error("decode failed: {0}")]
    Decode(String),
}

impl StoreError {
    pub fn is_unreachable(&self) -> bool {
        matches!(self, StoreError::Unreachable(_))
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::WorkerCrashed => StoreError::Unreachable(e),
            other => StoreError::Query(other),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
