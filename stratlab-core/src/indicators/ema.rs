//! Exponential Moving Average (EMA).
//!
//! Recursive: EMA[t] = alpha * close[t] + (1 - alpha) * EMA[t-1]
//! Seed: SMA of the first `period` closes. Formed after `period` bars.

use super::Indicator;
use crate::domain::BarEvent;

#[derive(Debug, Clone)]
pub struct Ema {
    period: usize,
    name: String,
    alpha: f64,
    seen: usize,
    seed_sum: f64,
    value: Option<f64>,
}

impl Ema {
    pub fn new(period: usize) -> Self {
        assert!(period >= 1, "EMA period must be >= 1");
        Self {
            period,
            name: format!("ema_{period}"),
            alpha: 2.0 / (period as f64 + 1.0),
            seen: 0,
            seed_sum: 0.0,
            value: None,
        }
    }
}

impl Indicator for Ema {
    fn name(&self) -> &str {
        &self.name
    }

    fn min_history(&self) -> usize {
        self.period
    }

    fn update(&mut self, bar: &BarEvent) -> Option<f64> {
        self.seen += 1;
        self.value = match self.value {
            Some(prev) => Some(self.alpha * bar.close + (1.0 - self.alpha) * prev),
            None => {
                self.seed_sum += bar.close;
                (self.seen == self.period).then(|| self.seed_sum / self.period as f64)
            }
        };
        self.value
    }

    fn value(&self) -> Option<f64> {
        self.value
    }

    fn reset(&mut self) {
        self.seen = 0;
        self.seed_sum = 0.0;
        self.value = None;
    }
}
