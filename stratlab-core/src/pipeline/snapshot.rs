//! Indicator snapshots and the current/previous pair evaluators read from.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::SourceKey;

/// Latest value of one indicator, tagged with where and when it was computed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub source: SourceKey,
    /// Close time of the last bar the indicator consumed.
    pub time: Option<DateTime<Utc>>,
    /// `None` while the indicator is not formed.
    pub value: Option<f64>,
}

/// Immutable view of every indicator at one logical timestamp.
///
/// A fresh snapshot supersedes the previous one; snapshots are never mutated
/// after construction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndicatorSnapshot {
    pub time: Option<DateTime<Utc>>,
    readings: BTreeMap<String, Reading>,
}

impl IndicatorSnapshot {
    pub fn new(time: Option<DateTime<Utc>>, readings: BTreeMap<String, Reading>) -> Self {
        Self { time, readings }
    }

    /// Snapshot with no readings, used before the first bar.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Value of `name`, `None` when unknown or not formed.
    pub fn get(&self, name: &str) -> Option<f64> {
        self.readings.get(name).and_then(|r| r.value)
    }

    pub fn reading(&self, name: &str) -> Option<&Reading> {
        self.readings.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.readings.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    /// True when every reading carries a value.
    pub fn is_formed(&self) -> bool {
        self.readings.values().all(|r| r.value.is_some())
    }
}

/// The two snapshots the engine keeps: current and previous, swapped each step.
#[derive(Debug, Clone, Default)]
pub struct SnapshotPair {
    current: IndicatorSnapshot,
    previous: IndicatorSnapshot,
}

impl SnapshotPair {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install `next` as current; the old current becomes previous.
    pub fn advance(&mut self, next: IndicatorSnapshot) {
        self.previous = std::mem::replace(&mut self.current, next);
    }

    pub fn current(&self) -> &IndicatorSnapshot {
        &self.current
    }

    pub fn previous(&self) -> &IndicatorSnapshot {
        &self.previous
    }
}
