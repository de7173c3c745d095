//! Signal evaluators: the per-strategy decision function.
//!
//! An evaluator maps (current snapshot, previous snapshot, position) to a
//! `TradeIntent`. It is pure: no interior state, no I/O, and the same inputs
//! always give the same intent. Anything an evaluator needs to remember
//! between bars is expressed through the previous snapshot or the position.
//!
//! The engine only calls `evaluate` once every indicator in the pipeline is
//! formed, so evaluators never see warmup values. They can still receive an
//! absent reading for a name they were misconfigured with; the concrete
//! evaluators answer `TradeIntent::None` in that case.

pub mod averaging;
pub mod confirmation;
pub mod crossover;
pub mod sequence;
pub mod threshold;

pub use averaging::Averaging;
pub use confirmation::MultiTimeframe;
pub use crossover::MaCrossover;
pub use sequence::StreakSignal;
pub use threshold::ThresholdCross;

use crate::domain::{Position, TradeIntent};
use crate::pipeline::IndicatorSnapshot;

/// Pure decision function plugged into the engine.
pub trait SignalEvaluator: Send + Sync {
    fn name(&self) -> &str;

    fn evaluate(
        &self,
        current: &IndicatorSnapshot,
        previous: &IndicatorSnapshot,
        position: &Position,
    ) -> TradeIntent;
}

/// Evaluator backed by a closure.
pub struct FnEvaluator<F> {
    name: String,
    f: F,
}

impl<F> FnEvaluator<F>
where
    F: Fn(&IndicatorSnapshot, &IndicatorSnapshot, &Position) -> TradeIntent + Send + Sync,
{
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }
}

impl<F> SignalEvaluator for FnEvaluator<F>
where
    F: Fn(&IndicatorSnapshot, &IndicatorSnapshot, &Position) -> TradeIntent + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn evaluate(
        &self,
        current: &IndicatorSnapshot,
        previous: &IndicatorSnapshot,
        position: &Position,
    ) -> TradeIntent {
        (self.f)(current, previous, position)
    }
}

/// Current and previous value of one reading, if both exist.
pub fn pair(current: &IndicatorSnapshot, previous: &IndicatorSnapshot, name: &str) -> Option<(f64, f64)> {
    Some((current.get(name)?, previous.get(name)?))
}

/// `a` crossed above `b` between the previous and the current bar.
pub fn crossed_above(a_now: f64, b_now: f64, a_prev: f64, b_prev: f64) -> bool {
    a_now > b_now && a_prev <= b_prev
}

/// `a` crossed below `b` between the previous and the current bar.
pub fn crossed_below(a_now: f64, b_now: f64, a_prev: f64, b_prev: f64) -> bool {
    a_now < b_now && a_prev >= b_prev
}

/// Build a snapshot from `(name, value)` pairs.
#[cfg(test)]
pub fn snapshot_of(values: &[(&str, Option<f64>)]) -> IndicatorSnapshot {
    use crate::domain::SourceKey;
    use crate::pipeline::Reading;

    let readings = values
        .iter()
        .map(|(name, value)| {
            (
                name.to_string(),
                Reading {
                    source: SourceKey::new("TEST", "1d"),
                    time: None,
                    value: *value,
                },
            )
        })
        .collect();
    IndicatorSnapshot::new(None, readings)
}

/// Position held at `avg` with signed volume `signed`.
#[cfg(test)]
pub fn position_with(signed: f64, avg: f64) -> Position {
    use chrono::TimeZone;
    Position {
        instrument: "TEST".into(),
        signed_volume: signed,
        average_entry_price: avg,
        open_timestamp: (signed != 0.0)
            .then(|| chrono::Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crossing_requires_a_change_of_order() {
        assert!(crossed_above(11.0, 10.0, 9.0, 10.0));
        assert!(crossed_above(11.0, 10.0, 10.0, 10.0));
        assert!(!crossed_above(11.0, 10.0, 11.0, 10.0));
        assert!(crossed_below(9.0, 10.0, 10.0, 10.0));
        assert!(!crossed_below(9.0, 10.0, 9.5, 10.0));
    }

    #[test]
    fn closure_evaluator_is_pure() {
        let eval = FnEvaluator::new("always_long", |_: &IndicatorSnapshot, _: &IndicatorSnapshot, p: &Position| {
            if p.is_flat() {
                TradeIntent::EnterLong(1.0)
            } else {
                TradeIntent::None
            }
        });
        let snap = snapshot_of(&[]);
        let flat = Position::flat("TEST");
        assert_eq!(eval.name(), "always_long");
        assert_eq!(eval.evaluate(&snap, &snap, &flat), TradeIntent::EnterLong(1.0));
        assert_eq!(eval.evaluate(&snap, &snap, &flat), TradeIntent::EnterLong(1.0));
        assert_eq!(
            eval.evaluate(&snap, &snap, &position_with(1.0, 100.0)),
            TradeIntent::None
        );
    }

    #[test]
    fn pair_needs_both_values() {
        let now = snapshot_of(&[("x", Some(1.0))]);
        let before = snapshot_of(&[("x", None)]);
        assert_eq!(pair(&now, &before, "x"), None);
        assert_eq!(pair(&now, &now, "x"), Some((1.0, 1.0)));
    }
}
