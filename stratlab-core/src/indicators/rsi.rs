//! Relative Strength Index (RSI).
//!
//! Uses Wilder smoothing of average gains and average losses.
//! RSI = 100 - 100 / (1 + avg_gain / avg_loss)
//! Formed after `period + 1` bars (`period` price changes).
//! Edge cases: no movement reads 50; avg_loss == 0 reads 100.

use super::Indicator;
use crate::domain::BarEvent;

#[derive(Debug, Clone)]
pub struct Rsi {
    period: usize,
    name: String,
    prev_close: Option<f64>,
    changes: usize,
    avg_gain: f64,
    avg_loss: f64,
    value: Option<f64>,
}

impl Rsi {
    pub fn new(period: usize) -> Self {
        assert!(period >= 1, "RSI period must be >= 1");
        Self {
            period,
            name: format!("rsi_{period}"),
            prev_close: None,
            changes: 0,
            avg_gain: 0.0,
            avg_loss: 0.0,
            value: None,
        }
    }
}

impl Indicator for Rsi {
    fn name(&self) -> &str {
        &self.name
    }

    fn min_history(&self) -> usize {
        self.period + 1
    }

    fn update(&mut self, bar: &BarEvent) -> Option<f64> {
        let Some(prev) = self.prev_close.replace(bar.close) else {
            return None;
        };
        let change = bar.close - prev;
        let gain = change.max(0.0);
        let loss = (-change).max(0.0);
        self.changes += 1;

        let period = self.period as f64;
        if self.changes <= self.period {
            // Seed: simple average over the first `period` changes.
            self.avg_gain += gain / period;
            self.avg_loss += loss / period;
            if self.changes < self.period {
                return None;
            }
        } else {
            self.avg_gain = (self.avg_gain * (period - 1.0) + gain) / period;
            self.avg_loss = (self.avg_loss * (period - 1.0) + loss) / period;
        }

        self.value = Some(compute_rsi(self.avg_gain, self.avg_loss));
        self.value
    }

    fn value(&self) -> Option<f64> {
        self.value
    }

    fn reset(&mut self) {
        self.prev_close = None;
        self.changes = 0;
        self.avg_gain = 0.0;
        self.avg_loss = 0.0;
        self.value = None;
    }
}

fn compute_rsi(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 && avg_gain == 0.0 {
        50.0 // no movement
    } else if avg_loss == 0.0 {
        100.0
    } else {
        100.0 - 100.0 / (1.0 + avg_gain / avg_loss)
    }
}
