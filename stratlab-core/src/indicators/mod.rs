//! Indicator trait and concrete incremental implementations.
//!
//! Indicators are stateful, incremental functions over their own bounded
//! history: one finished bar in, latest value out. A value is `None` until the
//! indicator has consumed `min_history()` bars ("formed"); zero is always a
//! legitimate reading, never a placeholder.
//!
//! # Look-ahead contamination guard
//! The value after bar t may depend only on bars <= t. Every indicator must
//! pass the truncated-vs-full series test.

pub mod atr;
pub mod ema;
pub mod extremes;
pub mod roc;
pub mod rsi;
pub mod sma;
pub mod streak;

pub use atr::Atr;
pub use ema::Ema;
pub use extremes::{Highest, Lowest};
pub use roc::Roc;
pub use rsi::Rsi;
pub use sma::Sma;
pub use streak::Streak;

use crate::domain::BarEvent;

/// Trait for incremental indicators.
pub trait Indicator: Send + Sync {
    /// Human-readable name (e.g., "sma_20", "atr_14").
    fn name(&self) -> &str;

    /// Number of bars consumed before the first value is produced.
    fn min_history(&self) -> usize;

    /// Feed one finished bar and return the updated value.
    fn update(&mut self, bar: &BarEvent) -> Option<f64>;

    /// Latest value, `None` while not formed.
    fn value(&self) -> Option<f64>;

    fn is_formed(&self) -> bool {
        self.value().is_some()
    }

    /// Drop all history.
    fn reset(&mut self);
}

/// Create synthetic bars from close prices for testing.
///
/// Generates plausible OHLV: open = prev_close (or close for first bar),
/// high = max(open,close) + 1.0, low = min(open,close) - 1.0, volume = 1000.
#[cfg(test)]
pub fn make_bars(closes: &[f64]) -> Vec<BarEvent> {
    use crate::domain::SourceKey;
    use chrono::TimeZone;
    let base = chrono::Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| {
            let open = if i == 0 { close } else { closes[i - 1] };
            BarEvent {
                source: SourceKey::new("TEST", "1d"),
                open_time: base + chrono::Duration::days(i as i64),
                close_time: base + chrono::Duration::days(i as i64 + 1),
                open,
                high: open.max(close) + 1.0,
                low: open.min(close) - 1.0,
                close,
                volume: 1000.0,
                is_final: true,
            }
        })
        .collect()
}

/// Feed every bar and collect the value after each one.
#[cfg(test)]
pub fn run_series(indicator: &mut dyn Indicator, bars: &[BarEvent]) -> Vec<Option<f64>> {
    bars.iter().map(|b| indicator.update(b)).collect()
}

/// Assert two f64 values are approximately equal (within epsilon).
#[cfg(test)]
pub fn assert_approx(actual: f64, expected: f64, epsilon: f64) {
    assert!(
        (actual - expected).abs() < epsilon,
        "assert_approx failed: actual={actual}, expected={expected}, diff={}, epsilon={epsilon}",
        (actual - expected).abs()
    );
}

/// Default epsilon for indicator tests.
#[cfg(test)]
pub const DEFAULT_EPSILON: f64 = 1e-10;
