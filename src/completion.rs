// Completion detector: RUNNING until the pipeline's completion marker is seen, then STOPPED for good.

use std::sync::Arc;

use crate::datastore::CompletionMarker;
use crate::error::StoreResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Running,
    Stopped,
}

pub struct CompletionDetector {
    marker: Arc<dyn CompletionMarker>,
    state: RunState,
}

impl CompletionDetector {
    pub fn new(marker: Arc<dyn CompletionMarker>) -> Self {
        Self {
            marker,
            state: RunState::Running,
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// Checks the marker once. Observing it consumes it and moves to `Stopped`;
    /// once stopped the marker is never consulted again.
    pub async fn check(&mut self) -> StoreResult<RunState> {
        if self.state == RunState::Stopped {
            return Ok(RunState::Stopped);
        }
        if self.marker.take().await? {
            tracing::info!("Pipeline completion marker observed");
            self.state = RunState::Stopped;
        }
        Ok(self.state)
    }
}
