// Poller tests: sampling, rate derivation, failure handling, completion and shutdown

mod common;

use common::{MemoryStore, counts};
use pipeline_monitor::archive::ArchiveWriter;
use pipeline_monitor::datastore::StatusFeed;
use pipeline_monitor::models::EntityKind;
use pipeline_monitor::poller::{PollerConfig, PollerDeps, PollerExit, poll_once, spawn};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;

fn deps(store: &Arc<MemoryStore>, dir: &std::path::Path, shutdown: CancellationToken) -> PollerDeps {
    PollerDeps {
        counter: store.clone(),
        samples: store.clone(),
        feed: store.clone(),
        marker: store.clone(),
        archive: ArchiveWriter::new(dir, "clone_detector_report"),
        shutdown,
    }
}

fn config(interval_ms: u64) -> PollerConfig {
    PollerConfig {
        interval: Duration::from_millis(interval_ms),
        recent_samples: 100,
    }
}

fn archive_entries(dir: &std::path::Path) -> Vec<String> {
    match std::fs::read_dir(dir) {
        Ok(rd) => rd
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect(),
        Err(_) => vec![],
    }
}

#[tokio::test]
async fn first_cycle_on_empty_store_appends_zero_rate_sample() {
    let store = MemoryStore::new();
    store.set_counts(0, 0, 0, 0);

    let sample = poll_once(&store, &store, 1_000).await.unwrap();

    assert_eq!(store.sample_count(), 1);
    assert_eq!(sample.counts, counts(0, 0, 0, 0));
    for kind in EntityKind::RATE_TRACKED {
        assert_eq!(sample.rate(kind), 0.0);
    }
}

#[tokio::test]
async fn second_cycle_derives_rate_from_prior_sample() {
    let store = MemoryStore::new();
    store.set_counts(1, 10, 0, 0);
    poll_once(&store, &store, 0).await.unwrap();

    store.set_counts(1, 14, 0, 0);
    let sample = poll_once(&store, &store, 2_000).await.unwrap();

    assert_eq!(sample.rate(EntityKind::Chunks), 2.0);
    assert_eq!(sample.rate(EntityKind::Candidates), 0.0);
}

#[tokio::test]
async fn duplicate_timestamp_yields_zero_rates() {
    let store = MemoryStore::new();
    store.set_counts(0, 10, 10, 10);
    poll_once(&store, &store, 5_000).await.unwrap();

    store.set_counts(0, 50, 50, 50);
    let sample = poll_once(&store, &store, 5_000).await.unwrap();

    for kind in EntityKind::RATE_TRACKED {
        assert_eq!(sample.rate(kind), 0.0);
    }
}

#[tokio::test]
async fn failed_count_read_skips_cycle_and_next_cycle_uses_last_good_sample() {
    let store = MemoryStore::new();
    for cycle in 1..=4u64 {
        store.set_counts(0, cycle * 10, 0, 0);
        poll_once(&store, &store, cycle as i64 * 1_000).await.unwrap();
    }
    assert_eq!(store.sample_count(), 4);

    store.set_counts(0, 50, 0, 0);
    store.fail_next_count.store(true, Ordering::SeqCst);
    let err = poll_once(&store, &store, 5_000).await.unwrap_err();
    assert!(!err.is_unreachable());
    assert_eq!(store.sample_count(), 4, "no partial sample written");

    store.set_counts(0, 60, 0, 0);
    let sample = poll_once(&store, &store, 6_000).await.unwrap();
    // Prior is cycle 4 (t=4s, chunks=40): (60 - 40) / 2s.
    assert_eq!(sample.rate(EntityKind::Chunks), 10.0);
    assert_eq!(store.sample_count(), 5);
}

#[tokio::test]
async fn loop_keeps_running_after_transient_failure() {
    let store = Arc::new(MemoryStore::new());
    store.set_counts(1, 1, 1, 1);
    store.fail_next_count.store(true, Ordering::SeqCst);
    let dir = tempfile::TempDir::new().unwrap();
    let shutdown = CancellationToken::new();

    let handle = spawn(deps(&store, dir.path(), shutdown.clone()), config(10));
    tokio::time::sleep(Duration::from_millis(120)).await;
    shutdown.cancel();
    let exit = handle.await.unwrap();

    assert!(matches!(exit, PollerExit::Cancelled));
    assert_eq!(exit.exit_code(), 0);
    assert!(store.sample_count() >= 2);
    assert!(archive_entries(dir.path()).is_empty(), "cancellation never archives");
}

#[tokio::test]
async fn samples_are_strictly_ordered_and_rates_consistent() {
    let store = Arc::new(MemoryStore::new());
    store.set_counts(0, 0, 0, 0);
    let dir = tempfile::TempDir::new().unwrap();
    let shutdown = CancellationToken::new();

    let writer = {
        let store = store.clone();
        tokio::spawn(async move {
            for i in 1..=20u64 {
                store.set_counts(i, i * 3, i * 2, i);
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
    };
    let handle = spawn(deps(&store, dir.path(), shutdown.clone()), config(10));
    writer.await.unwrap();
    tokio::time::sleep(Duration::from_millis(30)).await;
    shutdown.cancel();
    handle.await.unwrap();

    let samples = store.snapshot();
    assert!(samples.len() >= 2);
    for kind in EntityKind::RATE_TRACKED {
        assert_eq!(samples[0].rate(kind), 0.0);
    }
    for pair in samples.windows(2) {
        let (prev, cur) = (&pair[0], &pair[1]);
        let dt = (cur.timestamp - prev.timestamp) as f64 / 1000.0;
        for kind in EntityKind::RATE_TRACKED {
            let expected = if dt > 0.0 {
                (cur.count(kind) as f64 - prev.count(kind) as f64) / dt
            } else {
                0.0
            };
            assert_eq!(cur.rate(kind), expected);
        }
    }
}

#[tokio::test]
async fn completion_before_cycle_archives_once_without_new_sample() {
    let store = Arc::new(MemoryStore::new());
    store.set_counts(3, 3, 3, 3);
    store.signal_completion();
    let dir = tempfile::TempDir::new().unwrap();

    let exit = spawn(deps(&store, dir.path(), CancellationToken::new()), config(10))
        .await
        .unwrap();

    let PollerExit::Completed { archive } = &exit else {
        panic!("expected completion, got {:?}", exit);
    };
    assert_eq!(exit.exit_code(), 0);
    assert_eq!(store.sample_count(), 0);
    let path = archive.as_ref().expect("archive written");
    let entries = archive_entries(dir.path());
    assert_eq!(entries.len(), 1);
    assert!(entries[0].starts_with("clone_detector_report_"));
    assert!(entries[0].ends_with(".html"));
    let body = std::fs::read_to_string(path).unwrap();
    assert!(body.contains("Clone Detector Monitor"));
    assert!(!store.completed.load(Ordering::SeqCst), "marker consumed");
}

#[tokio::test]
async fn completion_mid_run_archives_samples_taken_so_far() {
    let store = Arc::new(MemoryStore::new());
    store.set_counts(1, 2, 3, 4);
    StatusFeed::append(&*store, "chunking started").await.unwrap();
    let dir = tempfile::TempDir::new().unwrap();

    let handle = spawn(deps(&store, dir.path(), CancellationToken::new()), config(10));
    tokio::time::sleep(Duration::from_millis(60)).await;
    store.signal_completion();
    let exit = tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .expect("poller stops after completion")
        .unwrap();

    let PollerExit::Completed { archive: Some(path) } = exit else {
        panic!("expected archived completion");
    };
    let taken = store.sample_count();
    assert!(taken >= 1);
    let body = std::fs::read_to_string(path).unwrap();
    assert!(body.contains("chunking started"));
    assert!(body.contains("Processing Rates Over Time (Complete)"));
    assert_eq!(archive_entries(dir.path()).len(), 1);
}

#[tokio::test]
async fn archive_failure_still_completes_run() {
    let store = Arc::new(MemoryStore::new());
    store.signal_completion();
    let dir = tempfile::TempDir::new().unwrap();
    // A plain file where the archive directory should be.
    let blocked = dir.path().join("archives");
    std::fs::write(&blocked, b"not a directory").unwrap();

    let exit = spawn(deps(&store, &blocked, CancellationToken::new()), config(10))
        .await
        .unwrap();

    assert!(matches!(exit, PollerExit::Completed { archive: None }));
    assert_eq!(exit.exit_code(), 0);
    assert!(!exit.is_fatal());
}

#[tokio::test]
async fn unreachable_store_is_fatal() {
    let store = Arc::new(MemoryStore::new());
    store.unreachable.store(true, Ordering::SeqCst);
    let dir = tempfile::TempDir::new().unwrap();

    let exit = spawn(deps(&store, dir.path(), CancellationToken::new()), config(10))
        .await
        .unwrap();

    assert!(matches!(exit, PollerExit::Unreachable(_)));
    assert_eq!(exit.exit_code(), 1);
    assert!(exit.is_fatal(), "unreachable exit skips the graceful server drain");
    assert!(archive_entries(dir.path()).is_empty());
}

#[tokio::test]
async fn connectivity_lost_mid_run_stops_without_archive() {
    let store = Arc::new(MemoryStore::new());
    store.set_counts(1, 1, 1, 1);
    let dir = tempfile::TempDir::new().unwrap();

    let handle = spawn(deps(&store, dir.path(), CancellationToken::new()), config(10));
    tokio::time::sleep(Duration::from_millis(40)).await;
    store.unreachable.store(true, Ordering::SeqCst);
    let exit = tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .expect("poller stops when store is gone")
        .unwrap();

    assert_eq!(exit.exit_code(), 1);
    assert!(exit.is_fatal());
    assert!(archive_entries(dir.path()).is_empty());
}

#[tokio::test]
async fn cancellation_stops_loop_before_next_cycle() {
    let store = Arc::new(MemoryStore::new());
    let dir = tempfile::TempDir::new().unwrap();
    let shutdown = CancellationToken::new();
    shutdown.cancel();

    let exit = spawn(deps(&store, dir.path(), shutdown), config(10))
        .await
        .unwrap();

    assert!(matches!(exit, PollerExit::Cancelled));
    assert!(!exit.is_fatal());
    assert_eq!(store.sample_count(), 0);
    assert_eq!(store.take_calls.load(Ordering::SeqCst), 0);
}
