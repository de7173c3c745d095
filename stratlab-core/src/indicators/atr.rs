//! Average True Range (ATR).
//!
//! True Range: max(high-low, |high-prev_close|, |low-prev_close|); the first bar
//! has no previous close and uses high-low.
//! ATR uses Wilder smoothing seeded with the mean of the first `period` TRs.
//! Formed after `period` bars.

use super::Indicator;
use crate::domain::BarEvent;

#[derive(Debug, Clone)]
pub struct Atr {
    period: usize,
    name: String,
    prev_close: Option<f64>,
    seen: usize,
    seed_sum: f64,
    value: Option<f64>,
}

impl Atr {
    pub fn new(period: usize) -> Self {
        assert!(period >= 1, "ATR period must be >= 1");
        Self {
            period,
            name: format!("atr_{period}"),
            prev_close: None,
            seen: 0,
            seed_sum: 0.0,
            value: None,
        }
    }
}

/// True range of `bar` given the previous close.
pub fn true_range(bar: &BarEvent, prev_close: Option<f64>) -> f64 {
    let hl = bar.high - bar.low;
    match prev_close {
        Some(pc) => hl.max((bar.high - pc).abs()).max((bar.low - pc).abs()),
        None => hl,
    }
}

impl Indicator for Atr {
    fn name(&self) -> &str {
        &self.name
    }

    fn min_history(&self) -> usize {
        self.period
    }

    fn update(&mut self, bar: &BarEvent) -> Option<f64> {
        let tr = true_range(bar, self.prev_close);
        self.prev_close = Some(bar.close);
        self.seen += 1;

        let period = self.period as f64;
        self.value = match self.value {
            Some(prev) => Some((prev * (period - 1.0) + tr) / period),
            None => {
                self.seed_sum += tr;
                (self.seen == self.period).then(|| self.seed_sum / period)
            }
        };
        self.value
    }

    fn value(&self) -> Option<f64> {
        self.value
    }

    fn reset(&mut self) {
        self.prev_close = None;
        self.seen = 0;
        self.seed_sum = 0.0;
        self.value = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{assert_approx, make_bars, run_series, DEFAULT_EPSILON};

    #[test]
    fn true_range_uses_gap_from_previous_close() {
        let bars = make_bars(&[100.0, 100.0]);
        // high 101, low 99 → hl 2; previous close 90 → |101 - 90| = 11
        assert_approx(true_range(&bars[1], Some(90.0)), 11.0, DEFAULT_EPSILON);
        assert_approx(true_range(&bars[1], None), 2.0, DEFAULT_EPSILON);
    }

    #[test]
    fn atr_constant_range() {
        // make_bars on flat closes: high - low = 2 every bar, no gaps
        let bars = make_bars(&[50.0; 6]);
        let mut atr = Atr::new(3);
        let result = run_series(&mut atr, &bars);
        assert!(result[0].is_none() && result[1].is_none());
        for value in &result[2..] {
            assert_approx(value.unwrap(), 2.0, DEFAULT_EPSILON);
        }
    }
}
