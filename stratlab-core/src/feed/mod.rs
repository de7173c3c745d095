//! BarFeed: normalizes upstream streams into one time-ordered event sequence.
//!
//! Per source the feed guarantees:
//! - only final bars pass (in-progress bars are dropped at the boundary)
//! - `close_time` is non-decreasing (regressions are dropped and logged)
//! - void or malformed bars are dropped and logged
//!
//! Across sources the feed serializes events into one queue. Ordering key:
//! `(time, source priority, arrival sequence)`, lower first. Sources with
//! different timeframes are not aligned, only ordered.

pub mod source;

pub use source::{replay, BarSource, FeedMessage};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::domain::{BarEvent, SourceKey};

/// Errors raised at the feed boundary.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
pub enum FeedError {
    #[error("source {0} is already subscribed")]
    DuplicateSource(SourceKey),

    #[error("bar from unsubscribed source {0}")]
    UnknownSource(SourceKey),

    #[error("{feed}: bar closing at {close_time} is older than last bar at {last_close_time}")]
    OutOfOrder {
        feed: SourceKey,
        close_time: DateTime<Utc>,
        last_close_time: DateTime<Utc>,
    },

    #[error("{feed}: malformed bar closing at {close_time}")]
    InvalidBar {
        feed: SourceKey,
        close_time: DateTime<Utc>,
    },
}

/// One serialized event delivered downstream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FeedEvent {
    Bar(BarEvent),
    /// The `FeedInterrupted` condition for one source.
    Interrupted { source: SourceKey, at: DateTime<Utc> },
    Resumed { source: SourceKey, at: DateTime<Utc> },
}

impl FeedEvent {
    pub fn time(&self) -> DateTime<Utc> {
        match self {
            Self::Bar(bar) => bar.close_time,
            Self::Interrupted { at, .. } | Self::Resumed { at, .. } => *at,
        }
    }

    pub fn source(&self) -> &SourceKey {
        match self {
            Self::Bar(bar) => &bar.source,
            Self::Interrupted { source, .. } | Self::Resumed { source, .. } => source,
        }
    }
}

/// Counters for what the feed dropped at the boundary.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedStats {
    pub delivered: usize,
    pub dropped_partial: usize,
    pub dropped_invalid: usize,
    pub dropped_out_of_order: usize,
}

struct Pending {
    event: FeedEvent,
    arrival: u64,
}

struct Subscription {
    key: SourceKey,
    priority: u32,
    source: Box<dyn BarSource>,
    pending: Option<Pending>,
    last_close: Option<DateTime<Utc>>,
    exhausted: bool,
}

/// Merges any number of subscriptions into a single ordered event stream.
///
/// The feed is an `Iterator` that ends once every source is exhausted. It is
/// not restartable: a consumed event is gone.
#[derive(Default)]
pub struct BarFeed {
    subscriptions: Vec<Subscription>,
    arrival: u64,
    stats: FeedStats,
    errors: Vec<FeedError>,
}

impl BarFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe a source under `key`. Lower `priority` wins timestamp ties.
    pub fn subscribe(
        &mut self,
        key: SourceKey,
        priority: u32,
        source: impl BarSource + 'static,
    ) -> Result<(), FeedError> {
        if self.subscriptions.iter().any(|s| s.key == key) {
            return Err(FeedError::DuplicateSource(key));
        }
        self.subscriptions.push(Subscription {
            key,
            priority,
            source: Box::new(source),
            pending: None,
            last_close: None,
            exhausted: false,
        });
        Ok(())
    }

    pub fn sources(&self) -> impl Iterator<Item = &SourceKey> {
        self.subscriptions.iter().map(|s| &s.key)
    }

    pub fn stats(&self) -> &FeedStats {
        &self.stats
    }

    /// Boundary violations observed so far (dropped bars).
    pub fn errors(&self) -> &[FeedError] {
        &self.errors
    }

    /// Pull the next accepted event for subscription `idx` into its pending slot.
    fn refill(&mut self, idx: usize) {
        loop {
            let sub = &mut self.subscriptions[idx];
            if sub.pending.is_some() || sub.exhausted {
                return;
            }
            let Some(message) = sub.source.next_message() else {
                debug!(source = %sub.key, "source exhausted");
                sub.exhausted = true;
                return;
            };

            let event = match message {
                FeedMessage::Bar(raw) => {
                    if !raw.is_final {
                        self.stats.dropped_partial += 1;
                        continue;
                    }
                    let bar = BarEvent::from_raw(sub.key.clone(), &raw);
                    if !bar.is_sane() {
                        let err = FeedError::InvalidBar {
                            feed: sub.key.clone(),
                            close_time: bar.close_time,
                        };
                        warn!(error = %err, "dropping bar");
                        self.stats.dropped_invalid += 1;
                        self.errors.push(err);
                        continue;
                    }
                    if let Some(last) = sub.last_close {
                        if bar.close_time < last {
                            let err = FeedError::OutOfOrder {
                                feed: sub.key.clone(),
                                close_time: bar.close_time,
                                last_close_time: last,
                            };
                            warn!(error = %err, "dropping bar");
                            self.stats.dropped_out_of_order += 1;
                            self.errors.push(err);
                            continue;
                        }
                    }
                    sub.last_close = Some(bar.close_time);
                    FeedEvent::Bar(bar)
                }
                FeedMessage::Interrupted { at } => FeedEvent::Interrupted {
                    source: sub.key.clone(),
                    at,
                },
                FeedMessage::Resumed { at } => FeedEvent::Resumed {
                    source: sub.key.clone(),
                    at,
                },
            };

            self.arrival += 1;
            sub.pending = Some(Pending {
                event,
                arrival: self.arrival,
            });
        }
    }
}

impl Iterator for BarFeed {
    type Item = FeedEvent;

    fn next(&mut self) -> Option<FeedEvent> {
        for idx in 0..self.subscriptions.len() {
            self.refill(idx);
        }

        let winner = self
            .subscriptions
            .iter()
            .enumerate()
            .filter_map(|(idx, sub)| {
                sub.pending
                    .as_ref()
                    .map(|p| ((p.event.time(), sub.priority, p.arrival), idx))
            })
            .min_by_key(|(order, _)| *order)
            .map(|(_, idx)| idx)?;

        let pending = self.subscriptions[winner].pending.take()?;
        if matches!(pending.event, FeedEvent::Bar(_)) {
            self.stats.delivered += 1;
        }
        Some(pending.event)
    }
}
