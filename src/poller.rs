// Background poller: one sample per interval, completion check each cycle, final archive on completion.
// Single loop, so cycles never overlap; the shutdown token is only observed while waiting for the next tick.

use std::path::PathBuf;
use std::sync::Arc;

use futures_util::future::try_join_all;
use tokio::time::{Duration, MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::archive::ArchiveWriter;
use crate::completion::{CompletionDetector, RunState};
use crate::datastore::{CompletionMarker, EntityCounter, SampleStore, StatusFeed};
use crate::error::{StoreError, StoreResult};
use crate::models::{Counts, EntityKind, Sample};
use crate::report::ReportInputs;

/// Stores, archive target and shutdown token for the poller.
pub struct PollerDeps {
    pub counter: Arc<dyn EntityCounter>,
    pub samples: Arc<dyn SampleStore>,
    pub feed: Arc<dyn StatusFeed>,
    pub marker: Arc<dyn CompletionMarker>,
    pub archive: ArchiveWriter,
    pub shutdown: CancellationToken,
}

pub struct PollerConfig {
    pub interval: Duration,
    /// Size of the recent window in the archived report.
    pub recent_samples: usize,
}

/// Why the poll loop ended.
#[derive(Debug)]
pub enum PollerExit {
    /// Completion marker observed. `archive` is the written report, if archival succeeded.
    Completed { archive: Option<PathBuf> },
    /// Shutdown token cancelled.
    Cancelled,
    /// Datastore unreachable; the run ends without archival.
    Unreachable(StoreError),
}

impl PollerExit {
    pub fn exit_code(&self) -> u8 {
        match self {
            PollerExit::Completed { .. } | PollerExit::Cancelled => 0,
            PollerExit::Unreachable(_) => 1,
        }
    }

    /// Fatal exits end the process without waiting for in-flight requests.
    pub fn is_fatal(&self) -> bool {
        matches!(self, PollerExit::Unreachable(_))
    }
}

pub fn spawn(deps: PollerDeps, config: PollerConfig) -> tokio::task::JoinHandle<PollerExit> {
    tokio::spawn(run(deps, config))
}

#[instrument(skip_all, fields(interval_ms = config.interval.as_millis() as u64))]
pub async fn run(deps: PollerDeps, config: PollerConfig) -> PollerExit {
    let PollerDeps {
        counter,
        samples,
        feed,
        marker,
        archive,
        shutdown,
    } = deps;

    let mut tick = interval(config.interval);
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut detector = CompletionDetector::new(marker);

    loop {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => {
                debug!("Poller shutting down");
                return PollerExit::Cancelled;
            }
            _ = tick.tick() => {}
        }

        match detector.check().await {
            Ok(RunState::Stopped) => {
                info!("Pipeline completed. Saving final report and shutting down...");
                let archive =
                    archive_final_report(&*samples, &*feed, &archive, config.recent_samples).await;
                return PollerExit::Completed { archive };
            }
            Ok(RunState::Running) => {}
            Err(e) if e.is_unreachable() => {
                error!(error = %e, operation = "check_completion", "Datastore connection lost. Shutting down...");
                return PollerExit::Unreachable(e);
            }
            Err(e) => {
                warn!(error = %e, operation = "check_completion", "completion check failed");
            }
        }

        let timestamp = chrono::Utc::now().timestamp_millis();
        match poll_once(&*counter, &*samples, timestamp).await {
            Ok(sample) => {
                debug!(
                    files = sample.count(EntityKind::Files),
                    chunks = sample.count(EntityKind::Chunks),
                    candidates = sample.count(EntityKind::Candidates),
                    clones = sample.count(EntityKind::Clones),
                    chunks_rate = sample.rate(EntityKind::Chunks),
                    "sample recorded"
                );
            }
            Err(e) if e.is_unreachable() => {
                error!(error = %e, operation = "poll_cycle", "Datastore connection lost. Shutting down...");
                return PollerExit::Unreachable(e);
            }
            Err(e) => {
                warn!(error = %e, operation = "poll_cycle", "poll cycle abandoned");
            }
        }
    }
}

/// One cycle: read every count, pair with the most recent sample, append. Any failure
/// abandons the cycle before anything is written.
pub async fn poll_once(
    counter: &dyn EntityCounter,
    samples: &dyn SampleStore,
    timestamp: i64,
) -> StoreResult<Sample> {
    let counts = collect_counts(counter).await?;
    let prior = samples.most_recent().await?;
    let sample = Sample::from_counts(timestamp, counts, prior.as_ref());
    samples.insert(&sample).await?;
    Ok(sample)
}

/// Reads all tracked kinds concurrently.
pub async fn collect_counts(counter: &dyn EntityCounter) -> StoreResult<Counts> {
    let values = try_join_all(EntityKind::ALL.iter().map(|&kind| counter.count(kind))).await?;
    Ok(EntityKind::ALL.into_iter().zip(values).collect())
}

/// Renders the current store contents and writes them to the archive. Failures are logged,
/// never propagated: the run ends either way.
pub async fn archive_final_report(
    samples: &dyn SampleStore,
    feed: &dyn StatusFeed,
    archive: &ArchiveWriter,
    recent_samples: usize,
) -> Option<PathBuf> {
    let inputs = match ReportInputs::load(samples, feed, recent_samples).await {
        Ok(i) => i,
        Err(e) => {
            error!(error = %e, operation = "load_report", "Error saving final report");
            return None;
        }
    };
    let blob = inputs.render();
    match archive.archive(blob.as_bytes(), &chrono::Local::now()).await {
        Ok(path) => {
            info!(path = %path.display(), "Final report saved");
            Some(path)
        }
        Err(e) => {
            error!(error = %e, operation = "write_archive", "Error saving final report");
            None
        }
    }
}
