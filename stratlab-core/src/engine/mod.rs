//! StrategyEngine: the per-instance, single-writer bar loop.
//!
//! Events arrive already serialized by the `BarFeed`. For every bar the engine
//! updates the indicators bound to the bar's source. Bars from the primary
//! source additionally run one decision step:
//!
//! 1. Advance the snapshot pair (current becomes previous).
//! 2. Run the protection layer. A protective exit wins the bar outright; the
//!    evaluator does not run and nothing is re-entered on the same bar.
//! 3. Otherwise run the evaluator, but only once every indicator is formed.
//! 4. Drop exposure-increasing intents outside the trading window.
//! 5. Resolve the intent against the position, submit the orders, and commit
//!    only the legs the router accepted.
//!
//! When other sources are bound, the decision for a primary bar waits until
//! each of them has delivered its bar for the same close time, or cannot
//! deliver one because its next bar closes later. The held decision runs as
//! soon as the set is complete, when a later event arrives, or on `flush`.
//!
//! Signal intents execute at the bar close; protective exits at their trigger
//! price. A feed interruption pauses decisions until every interrupted source
//! resumes; an interruption outlasting the grace period (measured on the data
//! clock) halts the instance.

pub mod report;
pub mod status;

pub use report::{IntentOrigin, IntentOutcome, IntentRecord, RunReport};
pub use status::{EngineStatus, HaltReason, HaltReport};

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, error, info, trace, warn};

use crate::domain::{BarEvent, Position, SourceKey, TradeIntent};
use crate::execution::{ExecutionSink, OrderRouter, OrderStyle, RecordingRouter, ReversalPolicy};
use crate::feed::{FeedError, FeedEvent};
use crate::pipeline::{GateState, IndicatorPipeline, SnapshotPair};
use crate::position::{PositionStateMachine, Resolution};
use crate::protection::{PriceSource, ProtectionLayer};
use crate::signal::SignalEvaluator;

/// Default time a source may stay interrupted before the instance halts.
pub const DEFAULT_FEED_GRACE_SECS: i64 = 300;

/// Everything an engine is assembled from.
pub struct EngineParts {
    pub name: String,
    pub primary: SourceKey,
    pub pipeline: IndicatorPipeline,
    pub evaluator: Box<dyn SignalEvaluator>,
    pub protection: ProtectionLayer,
    pub router: Box<dyn OrderRouter>,
    pub reversal_policy: ReversalPolicy,
    pub feed_grace: Duration,
}

impl EngineParts {
    /// Parts with no protection, a recording router, split reversals and the
    /// default grace period.
    pub fn new(
        primary: SourceKey,
        pipeline: IndicatorPipeline,
        evaluator: Box<dyn SignalEvaluator>,
    ) -> Self {
        Self {
            name: evaluator.name().to_string(),
            primary,
            pipeline,
            evaluator,
            protection: ProtectionLayer::new(Vec::new(), PriceSource::Intrabar),
            router: Box::new(RecordingRouter::new()),
            reversal_policy: ReversalPolicy::default(),
            feed_grace: Duration::seconds(DEFAULT_FEED_GRACE_SECS),
        }
    }
}

pub struct StrategyEngine {
    primary: SourceKey,
    pipeline: IndicatorPipeline,
    snapshots: SnapshotPair,
    evaluator: Box<dyn SignalEvaluator>,
    machine: PositionStateMachine,
    protection: ProtectionLayer,
    sink: ExecutionSink,
    status: EngineStatus,
    /// Interrupted sources and when they went down.
    interrupted: BTreeMap<SourceKey, DateTime<Utc>>,
    feed_grace: Duration,
    report: RunReport,
    bar_index: usize,
    last_primary: Option<(DateTime<Utc>, f64)>,
    /// Bound sources other than the primary.
    secondaries: Vec<SourceKey>,
    /// Primary bar whose decision waits for same-time bars.
    held: Option<BarEvent>,
}

impl StrategyEngine {
    pub fn new(parts: EngineParts) -> Self {
        let instrument = parts.primary.instrument.clone();
        let machine = PositionStateMachine::new(instrument.clone());
        let secondaries: Vec<SourceKey> = parts
            .pipeline
            .sources()
            .into_iter()
            .filter(|s| *s != parts.primary)
            .collect();
        Self {
            report: RunReport::new(parts.name, machine.position().clone()),
            sink: ExecutionSink::new(instrument, parts.router, parts.reversal_policy),
            primary: parts.primary,
            pipeline: parts.pipeline,
            snapshots: SnapshotPair::new(),
            evaluator: parts.evaluator,
            machine,
            protection: parts.protection,
            status: EngineStatus::Running,
            interrupted: BTreeMap::new(),
            feed_grace: parts.feed_grace,
            bar_index: 0,
            last_primary: None,
            secondaries,
            held: None,
        }
    }

    pub fn primary(&self) -> &SourceKey {
        &self.primary
    }

    pub fn position(&self) -> &Position {
        self.machine.position()
    }

    pub fn status(&self) -> &EngineStatus {
        &self.status
    }

    pub fn pipeline(&self) -> &IndicatorPipeline {
        &self.pipeline
    }

    pub fn snapshots(&self) -> &SnapshotPair {
        &self.snapshots
    }

    pub fn protection(&self) -> &ProtectionLayer {
        &self.protection
    }

    pub fn report(&self) -> &RunReport {
        &self.report
    }

    pub fn into_report(self) -> RunReport {
        self.report
    }

    pub fn halt_report(&self) -> Option<&HaltReport> {
        self.report.halt.as_ref()
    }

    /// Drive the engine over a whole event stream. Returns early on halt or stop.
    pub fn run<I>(&mut self, events: I) -> &RunReport
    where
        I: IntoIterator<Item = FeedEvent>,
    {
        for event in events {
            self.on_event(event);
            if !self.status.is_active() {
                break;
            }
        }
        self.flush();
        &self.report
    }

    /// Process one feed event. Returns the journal record when a primary bar
    /// produced an intent.
    pub fn on_event(&mut self, event: FeedEvent) -> Option<IntentRecord> {
        if !self.status.is_active() {
            trace!(status = ?self.status, "event ignored");
            return None;
        }
        // Anything but a bar for the held timestamp releases the decision.
        let release = self.held.as_ref().is_some_and(|held| {
            !matches!(&event, FeedEvent::Bar(bar) if bar.close_time <= held.close_time)
        });
        let released = if release { self.flush() } else { None };
        if self.check_deadline(event.time()) {
            return released;
        }

        let record = match event {
            FeedEvent::Interrupted { source, at } => {
                warn!(source = %source, at = %at, "feed interrupted, pausing");
                self.interrupted.entry(source).or_insert(at);
                self.set_status(EngineStatus::Paused);
                None
            }
            FeedEvent::Resumed { source, at } => {
                if let Some(since) = self.interrupted.remove(&source) {
                    if at - since > self.feed_grace {
                        self.halt(source, since, at);
                        return released;
                    }
                    info!(source = %source, at = %at, "feed resumed");
                }
                if self.interrupted.is_empty() && self.status == EngineStatus::Paused {
                    self.set_status(EngineStatus::Running);
                }
                None
            }
            FeedEvent::Bar(bar) => self.on_bar(&bar),
        };
        record.or(released)
    }

    /// Run the decision held for same-time bars, if any. `run` does this at
    /// the end of the stream; hosts calling `on_event` directly use it once
    /// no more bars for the held close time will arrive.
    pub fn flush(&mut self) -> Option<IntentRecord> {
        let bar = self.held.take()?;
        if !self.status.is_active() {
            return None;
        }
        self.step(&bar)
    }

    /// Halt if any interrupted source has exceeded the grace period at `now`.
    /// Callers with a wall clock can use this between events.
    pub fn check_deadline(&mut self, now: DateTime<Utc>) -> bool {
        let expired = self
            .interrupted
            .iter()
            .find(|(_, since)| now - **since > self.feed_grace)
            .map(|(source, since)| (source.clone(), *since));
        match expired {
            Some((source, since)) => {
                self.halt(source, since, now);
                true
            }
            None => false,
        }
    }

    /// Stop without touching the position. A held decision is discarded.
    pub fn stop(&mut self) {
        if self.status.is_active() {
            info!(position = self.position().signed_volume, "strategy stopped");
            self.held = None;
            self.set_status(EngineStatus::Stopped);
        }
    }

    /// Close any open position at the last primary close, then stop.
    ///
    /// On a halted instance this is the operator's explicit liquidation and
    /// the halt status is kept. A stopped instance sends nothing.
    pub fn stop_and_flatten(&mut self) -> Option<IntentRecord> {
        if self.status == EngineStatus::Stopped {
            debug!("already stopped, nothing to flatten");
            return None;
        }
        self.held = None;
        let record = match self.last_primary {
            Some((time, price)) if !self.position().is_flat() => {
                let index = self.bar_index.saturating_sub(1);
                Some(self.process(
                    index,
                    time,
                    TradeIntent::ExitAll,
                    price,
                    IntentOrigin::Liquidation,
                    OrderStyle::Market,
                ))
            }
            _ => None,
        };
        if !matches!(self.status, EngineStatus::Halted(_)) {
            info!(position = self.position().signed_volume, "strategy stopped and flattened");
            self.set_status(EngineStatus::Stopped);
        }
        record
    }

    fn on_bar(&mut self, bar: &BarEvent) -> Option<IntentRecord> {
        let is_primary = bar.source == self.primary;
        let delta = self.pipeline.on_bar(bar);
        if delta.is_empty() && !is_primary {
            let err = FeedError::UnknownSource(bar.source.clone());
            warn!(error = %err, "bar ignored");
            self.report.feed_errors.push(err);
            return None;
        }
        if is_primary {
            self.last_primary = Some((bar.close_time, bar.close));
            if self.awaiting(bar.close_time) {
                trace!(time = %bar.close_time, "decision held for same-time bars");
                self.held = Some(bar.clone());
                return None;
            }
            return self.step(bar);
        }
        let complete = self
            .held
            .as_ref()
            .is_some_and(|held| !self.awaiting(held.close_time));
        if complete {
            self.flush()
        } else {
            None
        }
    }

    /// True while some secondary source may still deliver a bar closing at
    /// `time`. A source whose next bar closes later is not waited for.
    fn awaiting(&self, time: DateTime<Utc>) -> bool {
        self.secondaries
            .iter()
            .any(|source| match self.pipeline.source_time(source) {
                Some(last) if last >= time => false,
                Some(last) => source.bar_duration().map_or(true, |len| last + len <= time),
                None => true,
            })
    }

    fn step(&mut self, bar: &BarEvent) -> Option<IntentRecord> {
        let index = self.bar_index;
        self.bar_index += 1;
        self.report.bars_processed += 1;
        self.snapshots.advance(self.pipeline.snapshot(bar.close_time));

        debug!(
            bar = index,
            source = %bar.source,
            close = bar.close,
            position = self.position().signed_volume,
            "step"
        );
        if self.status == EngineStatus::Paused {
            return None;
        }

        let verdict = self.protection.evaluate(bar, self.machine.position());
        if let Some(exit) = verdict.exit {
            let style = OrderStyle::Protective {
                limit: exit.is_limit().then_some(exit.price),
            };
            let record = self.process(
                index,
                bar.close_time,
                exit.intent,
                exit.price,
                IntentOrigin::Protection(exit.trigger),
                style,
            );
            if record.outcome.is_filled() {
                self.protection.confirm(&exit);
            }
            return Some(record);
        }

        let intent = match self.pipeline.gate() {
            GateState::Formed => self.evaluator.evaluate(
                self.snapshots.current(),
                self.snapshots.previous(),
                self.machine.position(),
            ),
            GateState::Warming { unformed } => {
                trace!(?unformed, "indicators warming up");
                TradeIntent::None
            }
        };
        if intent.is_none() {
            return None;
        }

        if !verdict.entries_allowed && intent.increases_exposure() {
            warn!(intent = %intent, "intent dropped outside trading window");
            let record = IntentRecord {
                bar_index: index,
                time: bar.close_time,
                intent,
                origin: IntentOrigin::Signal,
                price: bar.close,
                outcome: IntentOutcome::Dropped {
                    reason: "outside trading window".into(),
                },
            };
            self.report.intents.push(record.clone());
            return Some(record);
        }

        Some(self.process(
            index,
            bar.close_time,
            intent,
            bar.close,
            IntentOrigin::Signal,
            OrderStyle::Market,
        ))
    }

    /// Resolve, submit and commit one intent, journaling the outcome.
    fn process(
        &mut self,
        bar_index: usize,
        time: DateTime<Utc>,
        intent: TradeIntent,
        price: f64,
        origin: IntentOrigin,
        style: OrderStyle,
    ) -> IntentRecord {
        let outcome = match self.machine.resolve(intent, price, time) {
            Ok(Resolution::Hold) => IntentOutcome::Hold,
            Ok(Resolution::Execute(plan)) => match self.sink.submit(&plan, style) {
                Ok(submission) => {
                    self.machine.commit(&plan, submission.legs_filled);
                    self.protection.sync(self.machine.position());
                    self.report.position = self.machine.position().clone();
                    let orders = submission.orders.len();
                    self.report.orders.extend(submission.orders);
                    match submission.rejection {
                        Some(err) => {
                            self.report.rejections.push(err);
                            IntentOutcome::Partial {
                                legs_filled: submission.legs_filled,
                            }
                        }
                        None => IntentOutcome::Executed { orders },
                    }
                }
                Err(err) => {
                    let reason = err.to_string();
                    self.report.rejections.push(err);
                    IntentOutcome::Rejected { reason }
                }
            },
            Err(err) => {
                warn!(error = %err, intent = %intent, ?origin, "intent dropped");
                IntentOutcome::Dropped {
                    reason: err.to_string(),
                }
            }
        };

        let record = IntentRecord {
            bar_index,
            time,
            intent,
            origin,
            price,
            outcome,
        };
        self.report.intents.push(record.clone());
        record
    }

    fn halt(&mut self, feed: SourceKey, since: DateTime<Utc>, now: DateTime<Utc>) {
        let reason = HaltReason::FeedInterrupted {
            feed,
            since,
            waited_secs: (now - since).num_seconds(),
        };
        error!(reason = %reason, position = self.position().signed_volume, "strategy halted");
        self.report.halt = Some(HaltReport {
            position: self.machine.position().clone(),
            reason: reason.clone(),
        });
        self.set_status(EngineStatus::Halted(reason));
    }

    fn set_status(&mut self, status: EngineStatus) {
        if self.status != status {
            debug!(from = ?self.status, to = ?status, "status change");
            self.status = status;
            self.report.status = self.status.clone();
        }
    }
}
