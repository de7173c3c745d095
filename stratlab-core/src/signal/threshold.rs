//! Threshold crossing on a single reading (RSI bands, ROC zero line, ...).
//!
//! Momentum orientation: crossing above `upper` is long, crossing below
//! `lower` is short. Mean-reversion orientation flips both: crossing below
//! `lower` (oversold) is long, crossing above `upper` (overbought) is short.

use crate::domain::{Bias, Position, TradeIntent};
use crate::pipeline::IndicatorSnapshot;

use super::{crossed_above, crossed_below, pair, SignalEvaluator};

#[derive(Debug, Clone)]
pub struct ThresholdCross {
    pub indicator: String,
    pub upper: f64,
    pub lower: f64,
    pub volume: f64,
    pub mean_reversion: bool,
}

impl ThresholdCross {
    pub fn new(indicator: impl Into<String>, upper: f64, lower: f64, volume: f64) -> Self {
        Self {
            indicator: indicator.into(),
            upper,
            lower,
            volume,
            mean_reversion: false,
        }
    }

    pub fn mean_reversion(mut self, on: bool) -> Self {
        self.mean_reversion = on;
        self
    }
}

impl SignalEvaluator for ThresholdCross {
    fn name(&self) -> &str {
        "threshold_cross"
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

        let up = crossed_above(now, self.upper, before, self.upper);
        let down = crossed_below(now, self.lower, before, self.lower);
        let bias = match (up, down, self.mean_reversion) {
            (true, _, false) => Bias::Long,
            (_, true, false) => Bias::Short,
            (true, _, true) => Bias::Short,
            (_, true, true) => Bias::Long,
            _ => return TradeIntent::None,
        };
        bias.toward(position, self.volume)
    }
}
