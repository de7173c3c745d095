//! Two-line crossover: golden cross and death cross detection.
//!
//! Goes long when the fast line crosses above the slow line and short (or
//! flat, when long-only) when it crosses below.

use crate::domain::{Bias, Position, TradeIntent};
use crate::pipeline::IndicatorSnapshot;

use super::{crossed_above, crossed_below, pair, SignalEvaluator};

#[derive(Debug, Clone)]
pub struct MaCrossover {
    pub fast: String,
    pub slow: String,
    pub volume: f64,
    pub long_only: bool,
}

impl MaCrossover {
    pub fn new(fast: impl Into<String>, slow: impl Into<String>, volume: f64) -> Self {
        Self {
            fast: fast.into(),
            slow: slow.into(),
            volume,
            long_only: false,
        }
    }

    pub fn long_only(mut self, long_only: bool) -> Self {
        self.long_only = long_only;
        self
    }
}

impl SignalEvaluator for MaCrossover {
    fn name(&self) -> &str {
        "ma_crossover"
    }

    fn evaluate(
        &self,
        current: &IndicatorSnapshot,
        previous: &IndicatorSnapshot,
        position: &Position,
    ) -> TradeIntent {
        let Some((fast_now, fast_prev)) = pair(current, previous, &self.fast) else {
            return TradeIntent::None;
        };
        let Some((slow_now, slow_prev)) = pair(current, previous, &self.slow) else {
            return TradeIntent::None;
        };

        let bias = if crossed_above(fast_now, slow_now, fast_prev, slow_prev) {
            Bias::Long
        } else if crossed_below(fast_now, slow_now, fast_prev, slow_prev) {
            if self.long_only {
                Bias::Flat
            } else {
                Bias::Short
            }
        } else {
            return TradeIntent::None;
        };
        bias.toward(position, self.volume)
    }
}
