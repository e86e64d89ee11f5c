// Human-readable status messages written by the pipeline

use serde::{Deserialize, Serialize};

/// One append-only status message. `timestamp` is epoch milliseconds (UTC).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusUpdate {
    pub timestamp: i64,
    pub message: String,
}
