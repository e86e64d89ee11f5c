// Sample model: per-cycle entity counts plus rates derived from the prior sample

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Fixed set of quantities polled each cycle. `Files` is the size kind and carries no rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Files,
    Chunks,
    Candidates,
    Clones,
}

impl EntityKind {
    /// All tracked kinds, in polling order.
    pub const ALL: [EntityKind; 4] = [
        EntityKind::Files,
        EntityKind::Chunks,
        EntityKind::Candidates,
        EntityKind::Clones,
    ];

    /// Kinds that get an items-per-second rate.
    pub const RATE_TRACKED: [EntityKind; 3] = [
        EntityKind::Chunks,
        EntityKind::Candidates,
        EntityKind::Clones,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EntityKind::Files => "files",
            EntityKind::Chunks => "chunks",
            EntityKind::Candidates => "candidates",
            EntityKind::Clones => "clones",
        }
    }

    /// Column holding this kind's rate in the statistics table.
    pub fn rate_column(self) -> &'static str {
        match self {
            EntityKind::Files => "files_rate",
            EntityKind::Chunks => "chunks_rate",
            EntityKind::Candidates => "candidates_rate",
            EntityKind::Clones => "clones_rate",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub type Counts = BTreeMap<EntityKind, u64>;
pub type Rates = BTreeMap<EntityKind, f64>;

/// One poll cycle. `timestamp` is epoch milliseconds (UTC).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sample {
    pub timestamp: i64,
    pub counts: Counts,
    pub rates: Rates,
}

impl Sample {
    /// Builds a sample from fresh counts, deriving rates against `prior`.
    ///
    /// Rates are `(count - prior count) / Δt` in items per second. With no prior sample,
    /// or when `Δt <= 0` (duplicate or out-of-order timestamps), every rate is `0`.
    pub fn from_counts(timestamp: i64, counts: Counts, prior: Option<&Sample>) -> Self {
        let elapsed_secs = prior.map(|p| (timestamp - p.timestamp) as f64 / 1000.0);
        let rates = EntityKind::RATE_TRACKED
            .iter()
            .map(|&kind| {
                let rate = match (prior, elapsed_secs) {
                    (Some(p), Some(dt)) if dt > 0.0 => {
                        let delta = counts.get(&kind).copied().unwrap_or(0) as f64
                            - p.count(kind) as f64;
                        delta / dt
                    }
                    _ => 0.0,
                };
                (kind, rate)
            })
            .collect();
        Self {
            timestamp,
            counts,
            rates,
        }
    }

    pub fn count(&self, kind: EntityKind) -> u64 {
        self.counts.get(&kind).copied().unwrap_or(0)
    }

    pub fn rate(&self, kind: EntityKind) -> f64 {
        self.rates.get(&kind).copied().unwrap_or(0.0)
    }
}
