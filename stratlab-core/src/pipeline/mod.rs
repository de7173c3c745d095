//! IndicatorPipeline: ordered, source-bound indicators with a formed gate.
//!
//! Every registered indicator is bound to one source key and only consumes
//! bars from that source, so its value after bar t depends only on bars <= t
//! of that source. The pipeline keeps the latest reading of each indicator and
//! hands out immutable snapshots of them.

pub mod snapshot;

pub use snapshot::{IndicatorSnapshot, Reading, SnapshotPair};

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::trace;

use crate::domain::{BarEvent, SourceKey};
use crate::indicators::Indicator;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PipelineError {
    #[error("indicator name `{0}` is already registered")]
    DuplicateName(String),
}

/// Stable handle to a registered indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IndicatorHandle(usize);

/// Whether the evaluator may run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateState {
    Formed,
    /// Names of the indicators still short of history.
    Warming { unformed: Vec<String> },
}

impl GateState {
    pub fn is_formed(&self) -> bool {
        matches!(self, GateState::Formed)
    }
}

/// Indicators recomputed by one bar.
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotDelta {
    pub source: SourceKey,
    pub time: DateTime<Utc>,
    pub updated: Vec<(String, Option<f64>)>,
}

impl SnapshotDelta {
    pub fn is_empty(&self) -> bool {
        self.updated.is_empty()
    }
}

struct Binding {
    name: String,
    source: SourceKey,
    indicator: Box<dyn Indicator>,
    last_time: Option<DateTime<Utc>>,
}

#[derive(Default)]
pub struct IndicatorPipeline {
    bindings: Vec<Binding>,
}

impl IndicatorPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `indicator` to `source`. The reading is published under `alias`
    /// when given, otherwise under the indicator's own name.
    pub fn register(
        &mut self,
        source: SourceKey,
        indicator: Box<dyn Indicator>,
        alias: Option<String>,
    ) -> Result<IndicatorHandle, PipelineError> {
        let name = alias.unwrap_or_else(|| indicator.name().to_string());
        if self.bindings.iter().any(|b| b.name == name) {
            return Err(PipelineError::DuplicateName(name));
        }
        self.bindings.push(Binding {
            name,
            source,
            indicator,
            last_time: None,
        });
        Ok(IndicatorHandle(self.bindings.len() - 1))
    }

    /// Feed one finished bar to every indicator bound to its source.
    pub fn on_bar(&mut self, bar: &BarEvent) -> SnapshotDelta {
        let mut updated = Vec::new();
        for binding in self.bindings.iter_mut().filter(|b| b.source == bar.source) {
            let value = binding.indicator.update(bar);
            binding.last_time = Some(bar.close_time);
            trace!(indicator = %binding.name, source = %bar.source, ?value, "indicator updated");
            updated.push((binding.name.clone(), value));
        }
        SnapshotDelta {
            source: bar.source.clone(),
            time: bar.close_time,
            updated,
        }
    }

    /// Current readings of every indicator, stamped with `time`.
    pub fn snapshot(&self, time: DateTime<Utc>) -> IndicatorSnapshot {
        let readings: BTreeMap<String, Reading> = self
            .bindings
            .iter()
            .map(|b| {
                (
                    b.name.clone(),
                    Reading {
                        source: b.source.clone(),
                        time: b.last_time,
                        value: b.indicator.value(),
                    },
                )
            })
            .collect();
        IndicatorSnapshot::new(Some(time), readings)
    }

    pub fn value(&self, handle: IndicatorHandle) -> Option<f64> {
        self.bindings.get(handle.0).and_then(|b| b.indicator.value())
    }

    pub fn name(&self, handle: IndicatorHandle) -> Option<&str> {
        self.bindings.get(handle.0).map(|b| b.name.as_str())
    }

    pub fn gate(&self) -> GateState {
        let unformed: Vec<String> = self
            .bindings
            .iter()
            .filter(|b| !b.indicator.is_formed())
            .map(|b| b.name.clone())
            .collect();
        if unformed.is_empty() {
            GateState::Formed
        } else {
            GateState::Warming { unformed }
        }
    }

    pub fn is_formed(&self) -> bool {
        self.bindings.iter().all(|b| b.indicator.is_formed())
    }

    /// Every source some indicator is bound to.
    pub fn sources(&self) -> BTreeSet<SourceKey> {
        self.bindings.iter().map(|b| b.source.clone()).collect()
    }

    /// Close time of the last bar consumed from `source`.
    pub fn source_time(&self, source: &SourceKey) -> Option<DateTime<Utc>> {
        self.bindings
            .iter()
            .filter(|b| &b.source == source)
            .filter_map(|b| b.last_time)
            .max()
    }

    /// Largest warmup requirement across the pipeline, in bars.
    pub fn max_history(&self) -> usize {
        self.bindings
            .iter()
            .map(|b| b.indicator.min_history())
            .max()
            .unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Drop all indicator history.
    pub fn reset(&mut self) {
        for binding in &mut self.bindings {
            binding.indicator.reset();
            binding.last_time = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{make_bars, Sma};

    fn key(tf: &str) -> SourceKey {
        SourceKey::new("TEST", tf)
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let mut pipeline = IndicatorPipeline::new();
        pipeline.register(key("1d"), Box::new(Sma::new(3)), None).unwrap();
        let err = pipeline
            .register(key("1d"), Box::new(Sma::new(3)), None)
            .unwrap_err();
        assert_eq!(err, PipelineError::DuplicateName("sma_3".into()));
        // Same indicator under an alias is fine.
        pipeline
            .register(key("1d"), Box::new(Sma::new(3)), Some("slow".into()))
            .unwrap();
        assert_eq!(pipeline.len(), 2);
    }

    #[test]
    fn gate_reports_unformed_until_all_formed() {
        let mut pipeline = IndicatorPipeline::new();
        pipeline.register(key("1d"), Box::new(Sma::new(2)), None).unwrap();
        pipeline.register(key("1d"), Box::new(Sma::new(3)), None).unwrap();

        let bars = make_bars(&[1.0, 2.0, 3.0]);
        pipeline.on_bar(&bars[0]);
        assert_eq!(
            pipeline.gate(),
            GateState::Warming {
                unformed: vec!["sma_2".into(), "sma_3".into()]
            }
        );
        pipeline.on_bar(&bars[1]);
        assert_eq!(
            pipeline.gate(),
            GateState::Warming {
                unformed: vec!["sma_3".into()]
            }
        );
        pipeline.on_bar(&bars[2]);
        assert!(pipeline.gate().is_formed());
        assert_eq!(pipeline.max_history(), 3);
    }

    #[test]
    fn indicators_only_see_their_own_source() {
        let mut pipeline = IndicatorPipeline::new();
        let daily = pipeline
            .register(key("1d"), Box::new(Sma::new(1)), Some("daily".into()))
            .unwrap();
        let hourly = pipeline
            .register(key("1h"), Box::new(Sma::new(1)), Some("hourly".into()))
            .unwrap();

        let bars = make_bars(&[10.0, 20.0]);
        let delta = pipeline.on_bar(&bars[0]);
        assert_eq!(delta.updated, vec![("daily".to_string(), Some(10.0))]);
        assert_eq!(pipeline.value(daily), Some(10.0));
        assert_eq!(pipeline.value(hourly), None);

        let mut other = bars[1].clone();
        other.source = key("1h");
        pipeline.on_bar(&other);
        assert_eq!(pipeline.value(daily), Some(10.0));
        assert_eq!(pipeline.value(hourly), Some(20.0));

        let snap = pipeline.snapshot(other.close_time);
        assert_eq!(snap.reading("daily").unwrap().time, Some(bars[0].close_time));
        assert_eq!(snap.reading("hourly").unwrap().source, key("1h"));
        assert_eq!(pipeline.source_time(&key("1d")), Some(bars[0].close_time));
        assert_eq!(pipeline.source_time(&key("1h")), Some(other.close_time));
        assert_eq!(pipeline.source_time(&key("4h")), None);
    }

    #[test]
    fn bar_for_unbound_source_updates_nothing() {
        let mut pipeline = IndicatorPipeline::new();
        pipeline.register(key("1d"), Box::new(Sma::new(1)), None).unwrap();
        let mut bar = make_bars(&[5.0])[0].clone();
        bar.source = key("4h");
        assert!(pipeline.on_bar(&bar).is_empty());
    }
}
