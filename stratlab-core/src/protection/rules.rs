//! Protective rule definitions.

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

/// One protective rule. Distances are absolute price distances from the
/// average entry price.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum ProtectionRule {
    FixedStop {
        distance: f64,
    },
    /// Take profit. With `exit_volume` only that much is closed, once per
    /// position; otherwise the whole position.
    FixedTake {
        distance: f64,
        #[serde(default)]
        exit_volume: Option<f64>,
    },
    /// Trails the best price by `distance` once price has moved `activation`
    /// in favor of the position.
    TrailingStop {
        distance: f64,
        #[serde(default)]
        activation: f64,
    },
    /// Trading allowed in `[start, end)`, UTC time of day of the bar close;
    /// wraps midnight when `start > end`.
    TimeWindow { start: NaiveTime, end: NaiveTime },
}

impl ProtectionRule {
    /// Evaluation order within one bar.
    pub fn rank(&self) -> u8 {
        match self {
            Self::TimeWindow { .. } => 0,
            Self::FixedStop { .. } => 1,
            Self::FixedTake { .. } => 2,
            Self::TrailingStop { .. } => 3,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::FixedStop { .. } => "fixed_stop",
            Self::FixedTake { .. } => "fixed_take",
            Self::TrailingStop { .. } => "trailing_stop",
            Self::TimeWindow { .. } => "time_window",
        }
    }

    /// Whether new exposure may be taken at `time`. Only windows restrict.
    pub fn allows(&self, time: NaiveTime) -> bool {
        match *self {
            Self::TimeWindow { start, end } if start <= end => start <= time && time < end,
            Self::TimeWindow { start, end } => time >= start || time < end,
            _ => true,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        let positive = |what: &str, v: f64| {
            if v.is_finite() && v > 0.0 {
                Ok(())
            } else {
                Err(format!("{}: {what} must be positive, got {v}", self.name()))
            }
        };
        match *self {
            Self::FixedStop { distance } => positive("distance", distance),
            Self::FixedTake {
                distance,
                exit_volume,
            } => {
                positive("distance", distance)?;
                exit_volume.map_or(Ok(()), |v| positive("exit_volume", v))
            }
            Self::TrailingStop {
                distance,
                activation,
            } => {
                positive("distance", distance)?;
                if activation.is_finite() && activation >= 0.0 {
                    Ok(())
                } else {
                    Err(format!(
                        "trailing_stop: activation must be >= 0, got {activation}"
                    ))
                }
            }
            Self::TimeWindow { start, end } if start == end => {
                Err("time_window: start and end must differ".into())
            }
            Self::TimeWindow { .. } => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hm(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn window_is_half_open() {
        let rule = ProtectionRule::TimeWindow {
            start: hm(9, 30),
            end: hm(16, 0),
        };
        assert!(!rule.allows(hm(9, 29)));
        assert!(rule.allows(hm(9, 30)));
        assert!(rule.allows(hm(15, 59)));
        assert!(!rule.allows(hm(16, 0)));
    }

    #[test]
    fn window_wraps_midnight() {
        let rule = ProtectionRule::TimeWindow {
            start: hm(22, 0),
            end: hm(2, 0),
        };
        assert!(rule.allows(hm(23, 0)));
        assert!(rule.allows(hm(1, 59)));
        assert!(!rule.allows(hm(2, 0)));
        assert!(!rule.allows(hm(12, 0)));
    }

    #[test]
    fn validation() {
        assert!(ProtectionRule::FixedStop { distance: 1.0 }.validate().is_ok());
        assert!(ProtectionRule::FixedStop { distance: 0.0 }.validate().is_err());
        assert!(ProtectionRule::FixedTake {
            distance: 1.0,
            exit_volume: Some(-1.0)
        }
        .validate()
        .is_err());
        assert!(ProtectionRule::TrailingStop {
            distance: 1.0,
            activation: 0.0
        }
        .validate()
        .is_ok());
        assert!(ProtectionRule::TimeWindow {
            start: hm(1, 0),
            end: hm(1, 0)
        }
        .validate()
        .is_err());
    }

    #[test]
    fn rules_deserialize_from_toml() {
        #[derive(Deserialize)]
        struct Wrapper {
            protection: Vec<ProtectionRule>,
        }
        let src = r#"
            [[protection]]
            rule = "fixed_stop"
            distance = 2.5

            [[protection]]
            rule = "trailing_stop"
            distance = 3.0
            activation = 1.0

            [[protection]]
            rule = "time_window"
            start = "09:30:00"
            end = "16:00:00"
        "#;
        let parsed: Wrapper = toml::from_str(src).unwrap();
        assert_eq!(
            parsed.protection,
            vec![
                ProtectionRule::FixedStop { distance: 2.5 },
                ProtectionRule::TrailingStop {
                    distance: 3.0,
                    activation: 1.0
                },
                ProtectionRule::TimeWindow {
                    start: hm(9, 30),
                    end: hm(16, 0)
                },
            ]
        );
    }
}
