//! ProtectionLayer: protective exits evaluated every bar.
//!
//! Rules run in a fixed order: time window, fixed stop, fixed take, trailing
//! stop. The first rule that fires produces the exit for the bar. When a fixed
//! stop and a fixed take are both touched inside one bar the stop wins, since
//! the path through the bar is unknown.
//!
//! Touch tests use the bar's low/high by default (`PriceSource::Intrabar`) or
//! only its close (`PriceSource::CloseOnly`). A bar that opens beyond a level
//! fills at the open; otherwise the exit is priced at the level itself.
//!
//! Trigger state (best price, trailing level, partial-take flag) belongs to one
//! position and is reset whenever the position goes flat or is replaced.

pub mod ratchet;
pub mod rules;

pub use ratchet::RatchetState;
pub use rules::ProtectionRule;

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::{BarEvent, Position, PositionSide, TradeIntent, VOLUME_EPSILON};

/// Which prices the touch tests look at.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceSource {
    #[default]
    Intrabar,
    CloseOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitTrigger {
    TimeWindow,
    FixedStop,
    FixedTake,
    TrailingStop,
}

impl fmt::Display for ExitTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::TimeWindow => "time_window",
            Self::FixedStop => "fixed_stop",
            Self::FixedTake => "fixed_take",
            Self::TrailingStop => "trailing_stop",
        })
    }
}

/// A forced exit and the price it is expected to fill at.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProtectiveExit {
    pub intent: TradeIntent,
    pub trigger: ExitTrigger,
    pub price: f64,
    /// Index of the producing rule in evaluation order.
    pub rule: usize,
}

impl ProtectiveExit {
    /// Take-profit exits rest as limit orders; everything else goes at market.
    pub fn is_limit(&self) -> bool {
        self.trigger == ExitTrigger::FixedTake
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProtectionVerdict {
    pub exit: Option<ProtectiveExit>,
    /// False outside the trading window: new exposure must not be taken.
    pub entries_allowed: bool,
}

#[derive(Debug, Clone)]
struct RuleState {
    ratchet: RatchetState,
    fired: bool,
}

/// Trigger state for the currently open position.
#[derive(Debug, Clone)]
struct Tracked {
    opened: Option<DateTime<Utc>>,
    side: PositionSide,
    best_price: f64,
    rules: Vec<RuleState>,
}

#[derive(Debug, Clone)]
pub struct ProtectionLayer {
    rules: Vec<ProtectionRule>,
    price_source: PriceSource,
    tracked: Option<Tracked>,
}

impl ProtectionLayer {
    pub fn new(mut rules: Vec<ProtectionRule>, price_source: PriceSource) -> Self {
        rules.sort_by_key(ProtectionRule::rank);
        Self {
            rules,
            price_source,
            tracked: None,
        }
    }

    pub fn rules(&self) -> &[ProtectionRule] {
        &self.rules
    }

    pub fn price_source(&self) -> PriceSource {
        self.price_source
    }

    /// Level of the first trailing stop, once it has activated.
    pub fn trailing_level(&self) -> Option<f64> {
        let tracked = self.tracked.as_ref()?;
        self.rules
            .iter()
            .zip(&tracked.rules)
            .find(|(rule, _)| matches!(rule, ProtectionRule::TrailingStop { .. }))
            .and_then(|(_, state)| state.ratchet.current_level())
    }

    /// Align trigger state with `position`: drop it when flat, start over when
    /// a different position (new open time or side) is held.
    pub fn sync(&mut self, position: &Position) {
        let side = position.side();
        if side == PositionSide::Flat {
            self.tracked = None;
            return;
        }
        let same = self
            .tracked
            .as_ref()
            .is_some_and(|t| t.opened == position.open_timestamp && t.side == side);
        if !same {
            debug!(side = ?side, entry = position.average_entry_price, "protection armed");
            self.tracked = Some(Tracked {
                opened: position.open_timestamp,
                side,
                best_price: position.average_entry_price,
                rules: self
                    .rules
                    .iter()
                    .map(|_| RuleState {
                        ratchet: RatchetState::new(side),
                        fired: false,
                    })
                    .collect(),
            });
        }
    }

    /// Mark `exit` as carried out. One-shot rules (a partial take) stay
    /// armed until their exit is confirmed, so a rejected exit is retried.
    pub fn confirm(&mut self, exit: &ProtectiveExit) {
        if let Some(state) = self
            .tracked
            .as_mut()
            .and_then(|t| t.rules.get_mut(exit.rule))
        {
            state.fired = true;
        }
    }

    /// Evaluate every rule against `bar` for the held `position`.
    ///
    /// Trading windows are checked at the bar's close, the time signal
    /// intents execute at.
    pub fn evaluate(&mut self, bar: &BarEvent, position: &Position) -> ProtectionVerdict {
        let time_of_day = bar.close_time.time();
        let entries_allowed = self.rules.iter().all(|r| r.allows(time_of_day));

        self.sync(position);
        let Some(tracked) = self.tracked.as_mut() else {
            return ProtectionVerdict {
                exit: None,
                entries_allowed,
            };
        };

        let touch = Touch::new(bar, self.price_source, tracked.side);
        let entry = position.average_entry_price;
        let dir = tracked.side.sign();
        let held = position.volume();

        let mut exit = None;
        for (idx, (rule, state)) in self.rules.iter().zip(&tracked.rules).enumerate() {
            exit = match *rule {
                ProtectionRule::TimeWindow { .. } if !rule.allows(time_of_day) => {
                    Some(ProtectiveExit {
                        intent: TradeIntent::ExitAll,
                        trigger: ExitTrigger::TimeWindow,
                        price: bar.close,
                        rule: idx,
                    })
                }
                ProtectionRule::FixedStop { distance } => {
                    touch.adverse(entry - dir * distance).map(|price| ProtectiveExit {
                        intent: TradeIntent::ExitAll,
                        trigger: ExitTrigger::FixedStop,
                        price,
                        rule: idx,
                    })
                }
                ProtectionRule::FixedTake {
                    distance,
                    exit_volume,
                } if !state.fired => {
                    touch.favorable(entry + dir * distance).map(|price| {
                        let intent = match exit_volume {
                            Some(v) if v < held - VOLUME_EPSILON => TradeIntent::ExitPartial(v),
                            _ => TradeIntent::ExitAll,
                        };
                        ProtectiveExit {
                            intent,
                            trigger: ExitTrigger::FixedTake,
                            price,
                            rule: idx,
                        }
                    })
                }
                ProtectionRule::TrailingStop { .. } => state
                    .ratchet
                    .current_level()
                    .and_then(|level| touch.adverse(level))
                    .map(|price| ProtectiveExit {
                        intent: TradeIntent::ExitAll,
                        trigger: ExitTrigger::TrailingStop,
                        price,
                        rule: idx,
                    }),
                _ => None,
            };
            if exit.is_some() {
                break;
            }
        }

        if exit.is_none() {
            // Trail from prices seen up to and including this bar; the new
            // level is first tested on the next bar.
            tracked.best_price = match tracked.side {
                PositionSide::Long => tracked.best_price.max(touch.favorable_extreme),
                _ => tracked.best_price.min(touch.favorable_extreme),
            };
            for (rule, state) in self.rules.iter().zip(tracked.rules.iter_mut()) {
                if let ProtectionRule::TrailingStop {
                    distance,
                    activation,
                } = *rule
                {
                    if dir * (tracked.best_price - entry) >= activation {
                        state.ratchet.apply(tracked.best_price - dir * distance);
                    }
                }
            }
        }

        if let Some(e) = &exit {
            debug!(trigger = %e.trigger, intent = %e.intent, price = e.price, "protective exit");
        }
        ProtectionVerdict {
            exit,
            entries_allowed,
        }
    }
}

/// Touch tests for one bar and one position side.
struct Touch {
    open: f64,
    side: PositionSide,
    adverse_extreme: f64,
    favorable_extreme: f64,
    close_only: bool,
    close: f64,
}

impl Touch {
    fn new(bar: &BarEvent, source: PriceSource, side: PositionSide) -> Self {
        let (low, high) = match source {
            PriceSource::Intrabar => (bar.low, bar.high),
            PriceSource::CloseOnly => (bar.close, bar.close),
        };
        let (adverse_extreme, favorable_extreme) = match side {
            PositionSide::Short => (high, low),
            _ => (low, high),
        };
        Self {
            open: bar.open,
            side,
            adverse_extreme,
            favorable_extreme,
            close_only: source == PriceSource::CloseOnly,
            close: bar.close,
        }
    }

    /// `a` is at or beyond `b` in the adverse direction.
    fn beyond_adverse(&self, a: f64, b: f64) -> bool {
        match self.side {
            PositionSide::Short => a >= b,
            _ => a <= b,
        }
    }

    /// Fill price if a stop at `level` was touched.
    fn adverse(&self, level: f64) -> Option<f64> {
        if !self.beyond_adverse(self.adverse_extreme, level) {
            return None;
        }
        Some(self.fill(level, self.beyond_adverse(self.open, level)))
    }

    /// Fill price if a take at `level` was touched.
    fn favorable(&self, level: f64) -> Option<f64> {
        if !self.beyond_adverse(level, self.favorable_extreme) {
            return None;
        }
        Some(self.fill(level, self.beyond_adverse(level, self.open)))
    }

    fn fill(&self, level: f64, gapped: bool) -> f64 {
        if self.close_only {
            self.close
        } else if gapped {
            self.open
        } else {
            level
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::SourceKey;
    use chrono::{NaiveTime, TimeZone};

    fn bar(hour: u32, o: f64, h: f64, l: f64, c: f64) -> BarEvent {
        let open_time = Utc.with_ymd_and_hms(2024, 1, 2, hour, 0, 0).unwrap();
        BarEvent {
            source: SourceKey::new("TEST", "1h"),
            open_time,
            close_time: open_time + chrono::Duration::hours(1),
            open: o,
            high: h,
            low: l,
            close: c,
            volume: 100.0,
            is_final: true,
        }
    }

    fn long(volume: f64, entry: f64) -> Position {
        Position {
            instrument: "TEST".into(),
            signed_volume: volume,
            average_entry_price: entry,
            open_timestamp: Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()),
        }
    }

    fn short(volume: f64, entry: f64) -> Position {
        let mut p = long(volume, entry);
        p.signed_volume = -volume;
        p
    }

    fn layer(rules: Vec<ProtectionRule>) -> ProtectionLayer {
        ProtectionLayer::new(rules, PriceSource::Intrabar)
    }

    #[test]
    fn flat_position_never_exits() {
        let mut p = layer(vec![ProtectionRule::FixedStop { distance: 1.0 }]);
        let v = p.evaluate(&bar(10, 100.0, 100.0, 50.0, 60.0), &Position::flat("TEST"));
        assert_eq!(v.exit, None);
        assert!(v.entries_allowed);
    }

    #[test]
    fn fixed_stop_uses_intrabar_low() {
        let mut p = layer(vec![ProtectionRule::FixedStop { distance: 3.0 }]);
        let pos = long(1.0, 104.0);
        assert_eq!(p.evaluate(&bar(10, 104.0, 110.0, 103.0, 109.0), &pos).exit, None);
        let exit = p
            .evaluate(&bar(11, 109.0, 109.0, 100.0, 101.0), &pos)
            .exit
            .unwrap();
        assert_eq!(exit.trigger, ExitTrigger::FixedStop);
        assert_eq!(exit.intent, TradeIntent::ExitAll);
        assert_eq!(exit.price, 101.0);
    }

    #[test]
    fn close_only_ignores_wicks() {
        let mut p = ProtectionLayer::new(
            vec![ProtectionRule::FixedStop { distance: 3.0 }],
            PriceSource::CloseOnly,
        );
        let pos = long(1.0, 104.0);
        assert_eq!(p.evaluate(&bar(10, 104.0, 105.0, 95.0, 102.0), &pos).exit, None);
        let exit = p
            .evaluate(&bar(11, 102.0, 102.0, 99.0, 100.0), &pos)
            .exit
            .unwrap();
        assert_eq!(exit.price, 100.0);
    }

    #[test]
    fn gap_through_stop_fills_at_open() {
        let mut p = layer(vec![ProtectionRule::FixedStop { distance: 5.0 }]);
        let exit = p
            .evaluate(&bar(10, 90.0, 92.0, 88.0, 91.0), &long(1.0, 100.0))
            .exit
            .unwrap();
        assert_eq!(exit.price, 90.0);
    }

    #[test]
    fn short_stop_and_take() {
        let mut p = layer(vec![
            ProtectionRule::FixedStop { distance: 5.0 },
            ProtectionRule::FixedTake {
                distance: 5.0,
                exit_volume: None,
            },
        ]);
        let exit = p
            .evaluate(&bar(10, 100.0, 106.0, 99.0, 104.0), &short(1.0, 100.0))
            .exit
            .unwrap();
        assert_eq!((exit.trigger, exit.price), (ExitTrigger::FixedStop, 105.0));

        let mut p = layer(vec![ProtectionRule::FixedTake {
            distance: 5.0,
            exit_volume: None,
        }]);
        let exit = p
            .evaluate(&bar(10, 100.0, 101.0, 94.0, 96.0), &short(1.0, 100.0))
            .exit
            .unwrap();
        assert_eq!((exit.trigger, exit.price), (ExitTrigger::FixedTake, 95.0));
        assert!(exit.is_limit());
    }

    #[test]
    fn stop_wins_when_both_touched() {
        let mut p = layer(vec![
            ProtectionRule::FixedTake {
                distance: 2.0,
                exit_volume: None,
            },
            ProtectionRule::FixedStop { distance: 2.0 },
        ]);
        let exit = p
            .evaluate(&bar(10, 100.0, 103.0, 97.0, 100.0), &long(1.0, 100.0))
            .exit
            .unwrap();
        assert_eq!(exit.trigger, ExitTrigger::FixedStop);
    }

    #[test]
    fn partial_take_fires_once_per_position() {
        let mut p = layer(vec![ProtectionRule::FixedTake {
            distance: 2.0,
            exit_volume: Some(1.0),
        }]);
        let pos = long(3.0, 100.0);
        let exit = p
            .evaluate(&bar(10, 100.0, 103.0, 99.0, 102.0), &pos)
            .exit
            .unwrap();
        assert_eq!(exit.intent, TradeIntent::ExitPartial(1.0));
        p.confirm(&exit);

        let mut reduced = pos.clone();
        reduced.signed_volume = 2.0;
        assert_eq!(p.evaluate(&bar(11, 102.0, 104.0, 101.0, 103.0), &reduced).exit, None);

        // A new position re-arms the take.
        let mut next = long(3.0, 100.0);
        next.open_timestamp = Some(Utc.with_ymd_and_hms(2024, 1, 2, 12, 0, 0).unwrap());
        assert!(p.evaluate(&bar(12, 100.0, 103.0, 99.0, 102.0), &next).exit.is_some());
    }

    #[test]
    fn unconfirmed_take_stays_armed() {
        let mut p = layer(vec![ProtectionRule::FixedTake {
            distance: 5.0,
            exit_volume: Some(1.0),
        }]);
        let pos = long(2.0, 100.0);
        let first = p
            .evaluate(&bar(10, 100.0, 106.0, 99.0, 105.0), &pos)
            .exit
            .unwrap();
        assert_eq!(first.intent, TradeIntent::ExitPartial(1.0));

        // Not confirmed (the order was rejected): the next touch fires again.
        let again = p
            .evaluate(&bar(11, 105.0, 107.0, 104.0, 106.0), &pos)
            .exit
            .unwrap();
        assert_eq!((again.trigger, again.price), (ExitTrigger::FixedTake, 105.0));
    }

    #[test]
    fn partial_take_larger_than_position_exits_all() {
        let mut p = layer(vec![ProtectionRule::FixedTake {
            distance: 2.0,
            exit_volume: Some(5.0),
        }]);
        let exit = p
            .evaluate(&bar(10, 100.0, 103.0, 99.0, 102.0), &long(3.0, 100.0))
            .exit
            .unwrap();
        assert_eq!(exit.intent, TradeIntent::ExitAll);
    }

    #[test]
    fn trailing_stop_activates_and_ratchets() {
        let mut p = layer(vec![ProtectionRule::TrailingStop {
            distance: 3.0,
            activation: 5.0,
        }]);
        let pos = long(1.0, 100.0);

        // +4 in favor: not yet active.
        assert_eq!(p.evaluate(&bar(10, 100.0, 104.0, 99.0, 103.0), &pos).exit, None);
        assert_eq!(p.trailing_level(), None);

        // +8: active, level = 108 - 3.
        assert_eq!(p.evaluate(&bar(11, 103.0, 108.0, 102.0, 107.0), &pos).exit, None);
        assert_eq!(p.trailing_level(), Some(105.0));

        // Lower high does not loosen the level.
        assert_eq!(p.evaluate(&bar(12, 107.0, 107.5, 106.0, 107.0), &pos).exit, None);
        assert_eq!(p.trailing_level(), Some(105.0));

        let exit = p
            .evaluate(&bar(13, 107.0, 107.0, 104.0, 104.5), &pos)
            .exit
            .unwrap();
        assert_eq!((exit.trigger, exit.price), (ExitTrigger::TrailingStop, 105.0));
    }

    #[test]
    fn trailing_level_is_tested_before_the_bar_moves_it() {
        let mut p = layer(vec![ProtectionRule::TrailingStop {
            distance: 2.0,
            activation: 0.0,
        }]);
        let pos = long(1.0, 100.0);
        // The high of this bar would put the level at 108, above the low,
        // but the level only exists from the next bar on.
        assert_eq!(p.evaluate(&bar(10, 100.0, 110.0, 101.0, 109.0), &pos).exit, None);
        assert_eq!(p.trailing_level(), Some(108.0));
    }

    #[test]
    fn state_resets_when_flat() {
        let mut p = layer(vec![ProtectionRule::TrailingStop {
            distance: 1.0,
            activation: 0.0,
        }]);
        p.evaluate(&bar(10, 100.0, 105.0, 99.5, 104.0), &long(1.0, 100.0));
        assert!(p.trailing_level().is_some());
        p.sync(&Position::flat("TEST"));
        assert_eq!(p.trailing_level(), None);
    }

    #[test]
    fn time_window_exits_and_blocks_entries() {
        let window = ProtectionRule::TimeWindow {
            start: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            end: NaiveTime::from_hms_opt(17, 0, 0).unwrap(),
        };
        let mut p = layer(vec![ProtectionRule::FixedStop { distance: 50.0 }, window]);

        let inside = p.evaluate(&bar(10, 100.0, 101.0, 99.0, 100.0), &long(1.0, 100.0));
        assert!(inside.entries_allowed);
        assert_eq!(inside.exit, None);

        let outside = p.evaluate(&bar(18, 100.0, 101.0, 99.0, 100.5), &long(1.0, 100.0));
        assert!(!outside.entries_allowed);
        let exit = outside.exit.unwrap();
        assert_eq!((exit.trigger, exit.price), (ExitTrigger::TimeWindow, 100.5));

        let flat = p.evaluate(&bar(18, 100.0, 101.0, 99.0, 100.5), &Position::flat("TEST"));
        assert!(!flat.entries_allowed);
        assert_eq!(flat.exit, None);
    }

    #[test]
    fn time_window_is_checked_at_bar_close() {
        let window = ProtectionRule::TimeWindow {
            start: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            end: NaiveTime::from_hms_opt(17, 0, 0).unwrap(),
        };
        let mut p = layer(vec![window]);

        // 08:00-09:00 closes inside the window.
        assert!(p.evaluate(&bar(8, 100.0, 101.0, 99.0, 100.0), &Position::flat("TEST")).entries_allowed);

        // 16:00-17:00 closes at the end of the window, which is excluded.
        let last = p.evaluate(&bar(16, 100.0, 101.0, 99.0, 100.0), &long(1.0, 100.0));
        assert!(!last.entries_allowed);
        assert_eq!(last.exit.unwrap().trigger, ExitTrigger::TimeWindow);
    }
}
