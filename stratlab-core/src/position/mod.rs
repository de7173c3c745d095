//! PositionStateMachine: owner of the single net position.
//!
//! States are `Flat`, `Long(volume)` and `Short(volume)`. Resolving an intent
//! is pure and produces a [`TransitionPlan`]; the position only changes when
//! the plan is committed after the execution sink reports which legs were
//! accepted. Volume never nets across signs: a reversal closes first, then
//! opens the other side.

pub mod plan;

pub use plan::{Leg, LegKind, Resolution, TransitionPlan};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::domain::{OrderSide, Position, PositionSide, TradeIntent, VOLUME_EPSILON};

/// Intent incompatible with the current position. Logged and dropped.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
pub enum TransitionError {
    #[error("{intent} requires an open position")]
    NoPosition { intent: TradeIntent },

    #[error("{intent} conflicts with the open {held:?} position")]
    OppositeExposure {
        intent: TradeIntent,
        held: PositionSide,
    },

    #[error("{intent} carries an invalid volume")]
    InvalidVolume { intent: TradeIntent },
}

/// Discrete view of the position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum PositionState {
    Flat,
    Long(f64),
    Short(f64),
}

impl From<&Position> for PositionState {
    fn from(position: &Position) -> Self {
        match position.side() {
            PositionSide::Flat => PositionState::Flat,
            PositionSide::Long => PositionState::Long(position.volume()),
            PositionSide::Short => PositionState::Short(position.volume()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PositionStateMachine {
    position: Position,
}

impl PositionStateMachine {
    pub fn new(instrument: impl Into<String>) -> Self {
        Self {
            position: Position::flat(instrument),
        }
    }

    pub fn position(&self) -> &Position {
        &self.position
    }

    pub fn state(&self) -> PositionState {
        PositionState::from(&self.position)
    }

    /// Turn `intent` into the legs needed at `price`. Does not touch the position.
    pub fn resolve(
        &self,
        intent: TradeIntent,
        price: f64,
        time: DateTime<Utc>,
    ) -> Result<Resolution, TransitionError> {
        if let Some(v) = intent.volume() {
            if !v.is_finite() || v <= VOLUME_EPSILON {
                return Err(TransitionError::InvalidVolume { intent });
            }
        }

        let held = self.position.volume();
        let side = self.position.side();
        // Side that reduces the current exposure.
        let closing = match side {
            PositionSide::Long => OrderSide::Sell,
            _ => OrderSide::Buy,
        };

        let legs = match (intent, side) {
            (TradeIntent::None, _) => return Ok(Resolution::Hold),

            (TradeIntent::EnterLong(v), PositionSide::Flat) => {
                vec![Leg::new(OrderSide::Buy, v, LegKind::Open)]
            }
            (TradeIntent::EnterShort(v), PositionSide::Flat) => {
                vec![Leg::new(OrderSide::Sell, v, LegKind::Open)]
            }
            (TradeIntent::EnterLong(_), PositionSide::Long)
            | (TradeIntent::EnterShort(_), PositionSide::Short) => return Ok(Resolution::Hold),
            (TradeIntent::EnterLong(_) | TradeIntent::EnterShort(_), held_side) => {
                return Err(TransitionError::OppositeExposure {
                    intent,
                    held: held_side,
                })
            }

            (
                TradeIntent::Reverse(_)
                | TradeIntent::ExitAll
                | TradeIntent::ExitPartial(_)
                | TradeIntent::AddToPosition(_),
                PositionSide::Flat,
            ) => return Err(TransitionError::NoPosition { intent }),

            (TradeIntent::Reverse(v), _) => vec![
                Leg::new(closing, held, LegKind::Close),
                Leg::new(closing, v, LegKind::Open),
            ],
            (TradeIntent::ExitAll, _) => vec![Leg::new(closing, held, LegKind::Close)],
            (TradeIntent::ExitPartial(v), _) if v >= held - VOLUME_EPSILON => {
                vec![Leg::new(closing, held, LegKind::Close)]
            }
            (TradeIntent::ExitPartial(v), _) => vec![Leg::new(closing, v, LegKind::Reduce)],
            (TradeIntent::AddToPosition(v), _) => {
                vec![Leg::new(closing.opposite(), v, LegKind::Add)]
            }
        };

        Ok(Resolution::Execute(TransitionPlan {
            intent,
            legs,
            price,
            time,
        }))
    }

    /// Apply the first `legs_filled` legs of `plan` to the position.
    pub fn commit(&mut self, plan: &TransitionPlan, legs_filled: usize) -> &Position {
        let before = PositionState::from(&self.position);
        for leg in plan.legs.iter().take(legs_filled) {
            self.apply_leg(leg, plan.price, plan.time);
        }
        let after = PositionState::from(&self.position);
        if before != after {
            info!(
                instrument = %self.position.instrument,
                intent = %plan.intent,
                ?before,
                ?after,
                price = plan.price,
                "position transition"
            );
        }
        &self.position
    }

    fn apply_leg(&mut self, leg: &Leg, price: f64, time: DateTime<Utc>) {
        let pos = &mut self.position;
        match leg.kind {
            LegKind::Open => {
                pos.signed_volume = leg.signed_volume();
                pos.average_entry_price = price;
                pos.open_timestamp = Some(time);
            }
            LegKind::Add => {
                let old = pos.volume();
                let total = old + leg.volume;
                pos.average_entry_price =
                    (pos.average_entry_price * old + price * leg.volume) / total;
                pos.signed_volume += leg.signed_volume();
            }
            LegKind::Reduce => {
                pos.signed_volume += leg.signed_volume();
                if pos.is_flat() {
                    *pos = Position::flat(pos.instrument.clone());
                }
            }
            LegKind::Close => {
                *pos = Position::flat(pos.instrument.clone());
            }
        }
    }
}
