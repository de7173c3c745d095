//! Averaging down (DCA).
//!
//! Long-only. Enters when the watched reading crosses below `entry_level`,
//! adds `volume` on every later cross below it while fewer than `max_adds`
//! additions are held, and exits everything when the reading crosses above
//! `exit_level`. The number of additions is derived from the held volume, so
//! the evaluator stays stateless.

use crate::domain::{Position, PositionSide, TradeIntent};
use crate::pipeline::IndicatorSnapshot;

use super::{crossed_above, crossed_below, pair, SignalEvaluator};

#[derive(Debug, Clone)]
pub struct Averaging {
    pub indicator: String,
    pub entry_level: f64,
    pub exit_level: f64,
    pub volume: f64,
    pub max_adds: usize,
}

impl Averaging {
    pub fn new(
        indicator: impl Into<String>,
        entry_level: f64,
        exit_level: f64,
        volume: f64,
        max_adds: usize,
    ) -> Self {
        Self {
            indicator: indicator.into(),
            entry_level,
            exit_level,
            volume,
            max_adds,
        }
    }

    /// Additions already made on top of the initial entry.
    fn adds_held(&self, position: &Position) -> usize {
        let lots = (position.volume() / self.volume).round() as usize;
        lots.saturating_sub(1)
    }
}

impl SignalEvaluator for Averaging {
    fn name(&self) -> &str {
        "averaging"
    }

    fn evaluate(
        &self,
        current: &IndicatorSnapshot,
        previous: &IndicatorSnapshot,
        position: &Position,
    ) -> TradeIntent {
        let Some((now, before)) = pair(current, previous, &self.indicator) else {
            return TradeIntent::None;
        };
        let touched = crossed_below(now, self.entry_level, before, self.entry_level);

        match position.side() {
            PositionSide::Flat if touched => TradeIntent::EnterLong(self.volume),
            PositionSide::Long if crossed_above(now, self.exit_level, before, self.exit_level) => {
                TradeIntent::ExitAll
            }
            PositionSide::Long if touched && self.adds_held(position) < self.max_adds => {
                TradeIntent::AddToPosition(self.volume)
            }
            _ => TradeIntent::None,
        }
    }
}
