//! Run journal: every intent the engine acted on, the orders it sent and what
//! went wrong along the way.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{OrderRequest, Position, TradeIntent};
use crate::execution::ExecutionError;
use crate::feed::FeedError;
use crate::protection::ExitTrigger;

use super::status::{EngineStatus, HaltReport};

/// Who produced an intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentOrigin {
    Signal,
    Protection(ExitTrigger),
    /// Explicit flatten on stop.
    Liquidation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentOutcome {
    /// Every order accepted.
    Executed { orders: usize },
    /// Some legs accepted before a rejection.
    Partial { legs_filled: usize },
    /// Already positioned as asked.
    Hold,
    /// Incompatible with the position or outside the trading window.
    Dropped { reason: String },
    /// The router refused the first order.
    Rejected { reason: String },
}

impl IntentOutcome {
    /// At least one order reached the router and was accepted.
    pub fn is_filled(&self) -> bool {
        matches!(self, Self::Executed { .. } | Self::Partial { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentRecord {
    /// Index of the primary bar the intent belongs to.
    pub bar_index: usize,
    pub time: DateTime<Utc>,
    pub intent: TradeIntent,
    pub origin: IntentOrigin,
    pub price: f64,
    pub outcome: IntentOutcome,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub strategy: String,
    pub bars_processed: usize,
    pub intents: Vec<IntentRecord>,
    pub orders: Vec<OrderRequest>,
    pub rejections: Vec<ExecutionError>,
    pub feed_errors: Vec<FeedError>,
    pub position: Position,
    pub status: EngineStatus,
    pub halt: Option<HaltReport>,
}

impl RunReport {
    pub fn new(strategy: impl Into<String>, position: Position) -> Self {
        Self {
            strategy: strategy.into(),
            bars_processed: 0,
            intents: Vec::new(),
            orders: Vec::new(),
            rejections: Vec::new(),
            feed_errors: Vec::new(),
            position,
            status: EngineStatus::Running,
            halt: None,
        }
    }

    /// Intents that were logged and discarded.
    pub fn dropped(&self) -> impl Iterator<Item = &IntentRecord> {
        self.intents
            .iter()
            .filter(|r| matches!(r.outcome, IntentOutcome::Dropped { .. }))
    }

    /// Intents that changed the position (fully or partly).
    pub fn executed(&self) -> impl Iterator<Item = &IntentRecord> {
        self.intents.iter().filter(|r| {
            matches!(
                r.outcome,
                IntentOutcome::Executed { .. } | IntentOutcome::Partial { .. }
            )
        })
    }

    /// Position-opening transitions, a rough trade count.
    pub fn entries(&self) -> usize {
        self.executed()
            .filter(|r| {
                matches!(
                    r.intent,
                    TradeIntent::EnterLong(_) | TradeIntent::EnterShort(_) | TradeIntent::Reverse(_)
                )
            })
            .count()
    }
}
