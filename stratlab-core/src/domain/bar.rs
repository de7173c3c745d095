//! Bars: the fundamental market data unit.
//!
//! A `RawBar` is what the market-data collaborator pushes for one subscription.
//! A `BarEvent` is a finished, validated bar stamped with its `SourceKey`; it is
//! created by the feed and never mutated afterwards.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One bar stream: an instrument sampled at a timeframe.
///
/// Written as `INSTRUMENT@TIMEFRAME` in configs and logs (e.g. `SPY@1d`, `BTCUSDT@5m`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SourceKey {
    pub instrument: String,
    pub timeframe: String,
}

impl SourceKey {
    pub fn new(instrument: impl Into<String>, timeframe: impl Into<String>) -> Self {
        Self {
            instrument: instrument.into(),
            timeframe: timeframe.into(),
        }
    }

    /// Length of one bar, when the timeframe label is recognized.
    pub fn bar_duration(&self) -> Option<Duration> {
        timeframe_duration(&self.timeframe)
    }
}

/// Parse a timeframe label like `30s`, `5m`, `1h`, `1d` or `1w`.
pub fn timeframe_duration(timeframe: &str) -> Option<Duration> {
    let split = timeframe.find(|c: char| !c.is_ascii_digit())?;
    let (count, unit) = timeframe.split_at(split);
    let count: i64 = count.parse().ok().filter(|n| *n > 0)?;
    match unit {
        "s" => Some(Duration::seconds(count)),
        "m" => Some(Duration::minutes(count)),
        "h" => Some(Duration::hours(count)),
        "d" => Some(Duration::days(count)),
        "w" => Some(Duration::weeks(count)),
        _ => None,
    }
}

impl fmt::Display for SourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.instrument, self.timeframe)
    }
}

impl FromStr for SourceKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('@') {
            Some((instrument, timeframe)) if !instrument.is_empty() && !timeframe.is_empty() => {
                Ok(Self::new(instrument.trim(), timeframe.trim()))
            }
            _ => Err(format!(
                "invalid source key '{s}': expected INSTRUMENT@TIMEFRAME"
            )),
        }
    }
}

impl TryFrom<String> for SourceKey {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<SourceKey> for String {
    fn from(key: SourceKey) -> Self {
        key.to_string()
    }
}

/// OHLCV record as delivered by the market-data collaborator.
///
/// `is_final == false` marks an in-progress bar; those never pass the feed boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawBar {
    pub open_time: DateTime<Utc>,
    pub close_time: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub is_final: bool,
}

/// A finished bar for one source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BarEvent {
    pub source: SourceKey,
    pub open_time: DateTime<Utc>,
    pub close_time: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub is_final: bool,
}

impl BarEvent {
    pub fn from_raw(source: SourceKey, raw: &RawBar) -> Self {
        Self {
            source,
            open_time: raw.open_time,
            close_time: raw.close_time,
            open: raw.open,
            high: raw.high,
            low: raw.low,
            close: raw.close,
            volume: raw.volume,
            is_final: raw.is_final,
        }
    }

    /// Returns true if any price field is NaN or infinite (void bar).
    pub fn is_void(&self) -> bool {
        !(self.open.is_finite()
            && self.high.is_finite()
            && self.low.is_finite()
            && self.close.is_finite())
    }

    /// Basic OHLC sanity check: high >= low, high >= open, high >= close, etc.
    pub fn is_sane(&self) -> bool {
        if self.is_void() {
            return false;
        }
        self.high >= self.low
            && self.high >= self.open
            && self.high >= self.close
            && self.low <= self.open
            && self.low <= self.close
            && self.volume >= 0.0
            && self.open_time <= self.close_time
    }
}
