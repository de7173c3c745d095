//! Highest high / lowest low over a lookback window (Donchian bands).
//!
//! Formed after `period` bars.

use std::collections::VecDeque;

use super::Indicator;
use crate::domain::BarEvent;

/// Which side of the channel to track.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Extreme {
    High,
    Low,
}

#[derive(Debug, Clone)]
struct Window {
    period: usize,
    extreme: Extreme,
    values: VecDeque<f64>,
}

impl Window {
    fn new(period: usize, extreme: Extreme) -> Self {
        assert!(period >= 1, "channel period must be >= 1");
        Self {
            period,
            extreme,
            values: VecDeque::with_capacity(period + 1),
        }
    }

    fn push(&mut self, bar: &BarEvent) {
        let v = match self.extreme {
            Extreme::High => bar.high,
            Extreme::Low => bar.low,
        };
        self.values.push_back(v);
        if self.values.len() > self.period {
            self.values.pop_front();
        }
    }

    fn value(&self) -> Option<f64> {
        if self.values.len() < self.period {
            return None;
        }
        let iter = self.values.iter().copied();
        match self.extreme {
            Extreme::High => iter.reduce(f64::max),
            Extreme::Low => iter.reduce(f64::min),
        }
    }
}

/// Highest high over the last `period` bars.
#[derive(Debug, Clone)]
pub struct Highest {
    name: String,
    window: Window,
}

impl Highest {
    pub fn new(period: usize) -> Self {
        Self {
            name: format!("highest_{period}"),
            window: Window::new(period, Extreme::High),
        }
    }
}

impl Indicator for Highest {
    fn name(&self) -> &str {
        &self.name
    }

    fn min_history(&self) -> usize {
        self.window.period
    }

    fn update(&mut self, bar: &BarEvent) -> Option<f64> {
        self.window.push(bar);
        self.window.value()
    }

    fn value(&self) -> Option<f64> {
        self.window.value()
    }

    fn reset(&mut self) {
        self.window.values.clear();
    }
}

/// Lowest low over the last `period` bars.
#[derive(Debug, Clone)]
pub struct Lowest {
    name: String,
    window: Window,
}

impl Lowest {
    pub fn new(period: usize) -> Self {
        Self {
            name: format!("lowest_{period}"),
            window: Window::new(period, Extreme::Low),
        }
    }
}

impl Indicator for Lowest {
    fn name(&self) -> &str {
        &self.name
    }

    fn min_history(&self) -> usize {
        self.window.period
    }

    fn update(&mut self, bar: &BarEvent) -> Option<f64> {
        self.window.push(bar);
        self.window.value()
    }

    fn value(&self) -> Option<f64> {
        self.window.value()
    }

    fn reset(&mut self) {
        self.window.values.clear();
    }
}
