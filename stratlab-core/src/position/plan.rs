//! Transition plans: the order legs that realize one intent.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{OrderSide, TradeIntent};

/// What a leg does to the position it is applied to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LegKind {
    /// Open from flat at the plan price.
    Open,
    /// Grow the position; the average entry price is re-weighted.
    Add,
    /// Shrink the position, keeping its side.
    Reduce,
    /// Close the whole position.
    Close,
}

/// One buy or sell step.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Leg {
    pub side: OrderSide,
    pub volume: f64,
    pub kind: LegKind,
}

impl Leg {
    pub fn new(side: OrderSide, volume: f64, kind: LegKind) -> Self {
        Self { side, volume, kind }
    }

    pub fn signed_volume(&self) -> f64 {
        self.side.sign() * self.volume
    }
}

/// Legs for one intent, all executed at the same bar price.
///
/// Legs are ordered: a reversal closes before it opens.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionPlan {
    pub intent: TradeIntent,
    pub legs: Vec<Leg>,
    pub price: f64,
    pub time: DateTime<Utc>,
}

impl TransitionPlan {
    /// Net signed volume change if every leg fills.
    pub fn net_volume(&self) -> f64 {
        self.legs.iter().map(Leg::signed_volume).sum()
    }
}

/// Outcome of resolving an intent against the current position.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// Nothing to do (no intent, or already positioned as asked).
    Hold,
    Execute(TransitionPlan),
}
