//! ExecutionSink: the only component that talks to the order router.
//!
//! Turns a transition plan into the minimal set of buy/sell requests. Under
//! `ReversalPolicy::Netted` consecutive legs on the same side are merged, so
//! a reversal of `Long(v)` into `Short(v)` is a single sell of `2v`. Under
//! `ReversalPolicy::Split` every leg is its own order (close `v`, then open
//! `v`).
//!
//! Position state is never updated optimistically: the sink reports how many
//! legs were accepted and the state machine commits exactly those.

pub mod router;

pub use router::{OrderRouter, RecordingRouter, RouterRejection};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::domain::{IdGen, OrderId, OrderPurpose, OrderRequest, OrderType};
use crate::position::{Leg, LegKind, TransitionPlan};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReversalPolicy {
    /// The venue nets by volume: one order per side change.
    Netted,
    /// One order per leg.
    #[default]
    Split,
}

#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
pub enum ExecutionError {
    #[error("order {order} rejected: {reason}")]
    Rejected { order: OrderId, reason: String },
}

/// How the orders for a plan are sent.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OrderStyle {
    Market,
    /// Protective exit; `limit` carries the level for take-profit exits.
    Protective { limit: Option<f64> },
}

/// Result of submitting a plan of which at least one order was accepted.
#[derive(Debug, Clone, PartialEq)]
pub struct Submission {
    pub orders: Vec<OrderRequest>,
    /// Leading legs of the plan covered by accepted orders.
    pub legs_filled: usize,
    /// Set when a later order of the plan was refused.
    pub rejection: Option<ExecutionError>,
}

/// Legs merged into one order.
struct Batch<'a> {
    legs: &'a [Leg],
}

impl Batch<'_> {
    fn volume(&self) -> f64 {
        self.legs.iter().map(|l| l.volume).sum()
    }

    fn purpose(&self, style: OrderStyle) -> OrderPurpose {
        if matches!(style, OrderStyle::Protective { .. }) {
            return OrderPurpose::Protection;
        }
        match self.legs {
            [leg] => match leg.kind {
                LegKind::Open => OrderPurpose::Entry,
                LegKind::Add => OrderPurpose::ScaleIn,
                LegKind::Reduce => OrderPurpose::ScaleOut,
                LegKind::Close => OrderPurpose::Exit,
            },
            _ => OrderPurpose::Reversal,
        }
    }
}

pub struct ExecutionSink {
    router: Box<dyn OrderRouter>,
    policy: ReversalPolicy,
    ids: IdGen,
    instrument: String,
}

impl ExecutionSink {
    pub fn new(
        instrument: impl Into<String>,
        router: Box<dyn OrderRouter>,
        policy: ReversalPolicy,
    ) -> Self {
        Self {
            router,
            policy,
            ids: IdGen::default(),
            instrument: instrument.into(),
        }
    }

    pub fn policy(&self) -> ReversalPolicy {
        self.policy
    }

    fn batches<'a>(&self, legs: &'a [Leg]) -> Vec<Batch<'a>> {
        match self.policy {
            ReversalPolicy::Split => legs.chunks(1).map(|legs| Batch { legs }).collect(),
            ReversalPolicy::Netted => {
                let mut batches = Vec::new();
                let mut start = 0;
                for end in 1..=legs.len() {
                    if end == legs.len() || legs[end].side != legs[start].side {
                        batches.push(Batch {
                            legs: &legs[start..end],
                        });
                        start = end;
                    }
                }
                batches
            }
        }
    }

    /// Send the orders realizing `plan`, in leg order, stopping at the first
    /// refusal. Fails only when nothing was accepted.
    pub fn submit(
        &mut self,
        plan: &TransitionPlan,
        style: OrderStyle,
    ) -> Result<Submission, ExecutionError> {
        let order_type = match style {
            OrderStyle::Protective { limit: Some(price) } => OrderType::Limit { price },
            _ => OrderType::Market,
        };

        let mut orders = Vec::new();
        let mut legs_filled = 0;
        let mut rejection = None;

        for batch in self.batches(&plan.legs) {
            let Some(first) = batch.legs.first() else {
                continue;
            };
            let order = OrderRequest {
                id: self.ids.next_order_id(),
                instrument: self.instrument.clone(),
                side: first.side,
                volume: batch.volume(),
                order_type,
                purpose: batch.purpose(style),
                bar_time: plan.time,
            };
            match self.router.submit(&order) {
                Ok(()) => {
                    debug!(order = %order.id, side = ?order.side, volume = order.volume, "order accepted");
                    legs_filled += batch.legs.len();
                    orders.push(order);
                }
                Err(refusal) => {
                    let err = ExecutionError::Rejected {
                        order: order.id,
                        reason: refusal.reason,
                    };
                    warn!(error = %err, intent = %plan.intent, "execution rejected");
                    rejection = Some(err);
                    break;
                }
            }
        }

        match rejection {
            Some(err) if orders.is_empty() => Err(err),
            rejection => Ok(Submission {
                orders,
                legs_filled,
                rejection,
            }),
        }
    }
}
