// Shared test helpers: in-memory datastore with fault injection

#![allow(dead_code)]

use async_trait::async_trait;
use pipeline_monitor::datastore::{CompletionMarker, EntityCounter, SampleStore, StatusFeed};
use pipeline_monitor::error::{StoreError, StoreResult};
use pipeline_monitor::models::*;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

#[derive(Default)]
pub struct MemoryStore {
    pub counts: Mutex<Counts>,
    pub samples: Mutex<Vec<Sample>>,
    pub updates: Mutex<Vec<StatusUpdate>>,
    pub completed: AtomicBool,
    /// Next `count(Chunks)` fails with a transient query error.
    pub fail_next_count: AtomicBool,
    /// Every call fails as if the datastore were gone.
    pub unreachable: AtomicBool,
    pub take_calls: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_counts(&self, files: u64, chunks: u64, candidates: u64, clones: u64) {
        *self.counts.lock().unwrap() = counts(files, chunks, candidates, clones);
    }

    pub fn signal_completion(&self) {
        self.completed.store(true, Ordering::SeqCst);
    }

    pub fn sample_count(&self) -> usize {
        self.samples.lock().unwrap().len()
    }

    pub fn snapshot(&self) -> Vec<Sample> {
        self.samples.lock().unwrap().clone()
    }

    fn check_reachable(&self) -> StoreResult<()> {
        if self.unreachable.load(Ordering::SeqCst) {
            Err(StoreError::Unreachable(sqlx::Error::PoolClosed))
        } else {
            Ok(())
        }
    }
}

pub fn counts(files: u64, chunks: u64, candidates: u64, clones: u64) -> Counts {
    Counts::from([
        (EntityKind::Files, files),
        (EntityKind::Chunks, chunks),
        (EntityKind::Candidates, candidates),
        (EntityKind::Clones, clones),
    ])
}

#[async_trait]
impl EntityCounter for MemoryStore {
    async fn count(&self, kind: EntityKind) -> StoreResult<u64> {
        self.check_reachable()?;
        if kind == EntityKind::Chunks && self.fail_next_count.swap(false, Ordering::SeqCst) {
            return Err(StoreError::Query(sqlx::Error::Protocol(
                "injected count failure".into(),
            )));
        }
        Ok(self.counts.lock().unwrap().get(&kind).copied().unwrap_or(0))
    }
}

#[async_trait]
impl SampleStore for MemoryStore {
    async fn insert(&self, sample: &Sample) -> StoreResult<()> {
        self.check_reachable()?;
        self.samples.lock().unwrap().push(sample.clone());
        Ok(())
    }

    async fn most_recent(&self) -> StoreResult<Option<Sample>> {
        self.check_reachable()?;
        Ok(self
            .samples
            .lock()
            .unwrap()
            .iter()
            .max_by_key(|s| s.timestamp)
            .cloned())
    }

    async fn all(&self) -> StoreResult<Vec<Sample>> {
        self.check_reachable()?;
        let mut out = self.snapshot();
        out.sort_by_key(|s| s.timestamp);
        Ok(out)
    }

    async fn recent(&self, n: usize) -> StoreResult<Vec<Sample>> {
        let all = SampleStore::all(self).await?;
        let skip = all.len().saturating_sub(n);
        Ok(all.into_iter().skip(skip).collect())
    }
}

#[async_trait]
impl StatusFeed for MemoryStore {
    async fn all(&self) -> StoreResult<Vec<StatusUpdate>> {
        self.check_reachable()?;
        let mut out = self.updates.lock().unwrap().clone();
        out.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(out)
    }

    async fn append(&self, message: &str) -> StoreResult<()> {
        self.check_reachable()?;
        let mut updates = self.updates.lock().unwrap();
        let timestamp = updates.len() as i64 * 1000;
        updates.push(StatusUpdate {
            timestamp,
            message: message.to_string(),
        });
        Ok(())
    }
}

#[async_trait]
impl CompletionMarker for MemoryStore {
    async fn is_set(&self) -> StoreResult<bool> {
        self.check_reachable()?;
        Ok(self.completed.load(Ordering::SeqCst))
    }

    async fn clear(&self) -> StoreResult<()> {
        self.check_reachable()?;
        self.completed.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn take(&self) -> StoreResult<bool> {
        self.check_reachable()?;
        self.take_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.completed.swap(false, Ordering::SeqCst))
    }
}
