//! Engine lifecycle status and halt reporting.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{Position, SourceKey};

/// Why an instance halted.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum HaltReason {
    #[error("feed {feed} interrupted at {since}, no resume after {waited_secs}s")]
    FeedInterrupted {
        feed: SourceKey,
        since: DateTime<Utc>,
        waited_secs: i64,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EngineStatus {
    Running,
    /// A source is interrupted; indicators keep updating but no intents are produced.
    Paused,
    Halted(HaltReason),
    Stopped,
}

impl EngineStatus {
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Running | Self::Paused)
    }
}

/// What a halted instance reports: last known position and the condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HaltReport {
    pub position: Position,
    pub reason: HaltReason,
}
