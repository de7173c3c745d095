//! Simple Moving Average (SMA).
//!
//! Rolling mean of close prices over a window of `period` bars.
//! Formed after `period` bars.

use std::collections::VecDeque;

use super::Indicator;
use crate::domain::BarEvent;

#[derive(Debug, Clone)]
pub struct Sma {
    period: usize,
    name: String,
    window: VecDeque<f64>,
    sum: f64,
}

impl Sma {
    pub fn new(period: usize) -> Self {
        assert!(period >= 1, "SMA period must be >= 1");
        Self {
            period,
            name: format!("sma_{period}"),
            window: VecDeque::with_capacity(period + 1),
            sum: 0.0,
        }
    }
}

impl Indicator for Sma {
    fn name(&self) -> &str {
        &self.name
    }

    fn min_history(&self) -> usize {
        self.period
    }

    fn update(&mut self, bar: &BarEvent) -> Option<f64> {
        self.window.push_back(bar.close);
        self.sum += bar.close;
        if self.window.len() > self.period {
            if let Some(leaving) = self.window.pop_front() {
                self.sum -= leaving;
            }
        }
        self.value()
    }

    fn value(&self) -> Option<f64> {
        (self.window.len() == self.period).then(|| self.sum / self.period as f64)
    }

    fn reset(&mut self) {
        self.window.clear();
        self.sum = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{assert_approx, make_bars, run_series, DEFAULT_EPSILON};

    #[test]
    fn sma_5_basic() {
        let bars = make_bars(&[10.0, 11.0, 12.0, 13.0, 14.0, 15.0, 16.0]);
        let mut sma = Sma::new(5);
        let result = run_series(&mut sma, &bars);

        assert_eq!(result.len(), 7);
        for (i, value) in result.iter().enumerate().take(4) {
            assert!(value.is_none(), "expected unformed at index {i}");
        }
        // SMA[4] = mean(10,11,12,13,14) = 12.0
        assert_approx(result[4].unwrap(), 12.0, DEFAULT_EPSILON);
        assert_approx(result[5].unwrap(), 13.0, DEFAULT_EPSILON);
        assert_approx(result[6].unwrap(), 14.0, DEFAULT_EPSILON);
    }

    #[test]
    fn sma_1_is_close() {
        let bars = make_bars(&[100.0, 200.0, 300.0]);
        let mut sma = Sma::new(1);
        let result = run_series(&mut sma, &bars);
        assert_eq!(result, vec![Some(100.0), Some(200.0), Some(300.0)]);
    }

    #[test]
    fn zero_average_is_a_value_not_a_sentinel() {
        let bars = make_bars(&[-1.0, 1.0]);
        let mut sma = Sma::new(2);
        sma.update(&bars[0]);
        assert!(!sma.is_formed());
        assert_eq!(sma.update(&bars[1]), Some(0.0));
        assert!(sma.is_formed());
    }

    #[test]
    fn reset_clears_history() {
        let bars = make_bars(&[1.0, 2.0, 3.0]);
        let mut sma = Sma::new(2);
        run_series(&mut sma, &bars);
        assert!(sma.is_formed());
        sma.reset();
        assert_eq!(sma.value(), None);
    }
}
