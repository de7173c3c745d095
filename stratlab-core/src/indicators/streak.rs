//! Consecutive-bar streak.
//!
//! Signed count of consecutive closes in the same direction: +3 after three
//! higher closes in a row, -2 after two lower closes, 0 after an unchanged
//! close. Formed after 2 bars.

use super::Indicator;
use crate::domain::BarEvent;

#[derive(Debug, Clone, Default)]
pub struct Streak {
    prev_close: Option<f64>,
    value: Option<f64>,
}

impl Streak {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Indicator for Streak {
    fn name(&self) -> &str {
        "streak"
    }

    fn min_history(&self) -> usize {
        2
    }

    fn update(&mut self, bar: &BarEvent) -> Option<f64> {
        let Some(prev) = self.prev_close.replace(bar.close) else {
            return None;
        };
        let current = self.value.unwrap_or(0.0);
        self.value = Some(if bar.close > prev {
            if current > 0.0 {
                current + 1.0
            } else {
                1.0
            }
        } else if bar.close < prev {
            if current < 0.0 {
                current - 1.0
            } else {
                -1.0
            }
        } else {
            0.0
        });
        self.value
    }

    fn value(&self) -> Option<f64> {
        self.value
    }

    fn reset(&mut self) {
        self.prev_close = None;
        self.value = None;
    }
}
