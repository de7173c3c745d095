//! Rate of Change (ROC).
//!
//! Percentage price change over N bars.
//! ROC[t] = (close[t] - close[t-period]) / close[t-period] * 100
//! Formed after `period + 1` bars. A zero reference close yields no value.

use std::collections::VecDeque;

use super::Indicator;
use crate::domain::BarEvent;

#[derive(Debug, Clone)]
pub struct Roc {
    period: usize,
    name: String,
    closes: VecDeque<f64>,
}

impl Roc {
    pub fn new(period: usize) -> Self {
        assert!(period >= 1, "ROC period must be >= 1");
        Self {
            period,
            name: format!("roc_{period}"),
            closes: VecDeque::with_capacity(period + 2),
        }
    }
}

impl Indicator for Roc {
    fn name(&self) -> &str {
        &self.name
    }

    fn min_history(&self) -> usize {
        self.period + 1
    }

    fn update(&mut self, bar: &BarEvent) -> Option<f64> {
        self.closes.push_back(bar.close);
        if self.closes.len() > self.period + 1 {
            self.closes.pop_front();
        }
        self.value()
    }

    fn value(&self) -> Option<f64> {
        if self.closes.len() <= self.period {
            return None;
        }
        let prev = *self.closes.front()?;
        let curr = *self.closes.back()?;
        (prev != 0.0).then(|| (curr - prev) / prev * 100.0)
    }

    fn reset(&mut self) {
        self.closes.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{assert_approx, make_bars, run_series, DEFAULT_EPSILON};

    #[test]
    fn roc_percentage_change() {
        let bars = make_bars(&[100.0, 105.0, 110.0, 99.0]);
        let mut roc = Roc::new(2);
        let result = run_series(&mut roc, &bars);
        assert!(result[0].is_none() && result[1].is_none());
        assert_approx(result[2].unwrap(), 10.0, DEFAULT_EPSILON);
        // (99 - 105) / 105 * 100
        assert_approx(result[3].unwrap(), -6.0 / 105.0 * 100.0, DEFAULT_EPSILON);
    }
}
