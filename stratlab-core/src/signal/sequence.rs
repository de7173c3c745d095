//! N consecutive same-direction bars.
//!
//! Reads a signed streak count (see `indicators::Streak`). Once `length` up
//! bars in a row are seen the bias is long, `length` down bars is short.
//! The contrarian variant fades the run instead.

use crate::domain::{Bias, Position, TradeIntent};
use crate::pipeline::IndicatorSnapshot;

use super::SignalEvaluator;

#[derive(Debug, Clone)]
pub struct StreakSignal {
    pub indicator: String,
    pub length: usize,
    pub volume: f64,
    pub contrarian: bool,
}

impl StreakSignal {
    pub fn new(indicator: impl Into<String>, length: usize, volume: f64) -> Self {
        Self {
            indicator: indicator.into(),
            length,
            volume,
            contrarian: false,
        }
    }

    pub fn contrarian(mut self, on: bool) -> Self {
        self.contrarian = on;
        self
    }
}

impl SignalEvaluator for StreakSignal {
    fn name(&self) -> &str {
        "streak"
    }

    fn evaluate(
        &self,
        current: &IndicatorSnapshot,
        _previous: &IndicatorSnapshot,
        position: &Position,
    ) -> TradeIntent {
        let Some(streak) = current.get(&self.indicator) else {
            return TradeIntent::None;
        };
        let n = self.length as f64;
        let run = if streak >= n {
            Bias::Long
        } else if streak <= -n {
            Bias::Short
        } else {
            return TradeIntent::None;
        };
        let bias = if self.contrarian { run.opposite() } else { run };
        bias.toward(position, self.volume)
    }
}
