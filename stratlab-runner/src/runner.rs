//! Strategy runner: wires config, data and engine together.
//!
//! Two entry points:
//! - `run_report()`: builds the engine from a config, replays the given bars
//!   through a `BarFeed` and returns the full journal.
//! - `run_strategy()`: the same run condensed into a `RunSummary`. Used by
//!   sweeps and the CLI.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use stratlab_core::domain::{Position, SourceKey};
use stratlab_core::execution::RecordingRouter;
use stratlab_core::feed::{replay, FeedError};
use stratlab_core::fingerprint::journal_digest;
use stratlab_core::{BarFeed, ConfigError, EngineStatus, RunReport, StrategyConfig, StrategyEngine};

use crate::data_loader::{dataset_hash, SourceData};

/// Errors from the runner.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("feed error: {0}")]
    Feed(#[from] FeedError),

    #[error("no data for subscribed source {0}")]
    MissingData(SourceKey),

    #[error("serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Condensed result of one strategy run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub strategy: String,
    pub config_hash: String,
    pub structural_hash: String,
    pub dataset_hash: String,
    pub has_synthetic: bool,
    pub bars_processed: usize,
    /// Intents journaled, whatever their outcome.
    pub intents: usize,
    /// Positions opened (flat to long or short, including reversals).
    pub trades: usize,
    pub orders: usize,
    pub dropped: usize,
    pub rejections: usize,
    pub feed_errors: usize,
    pub final_position: Position,
    pub status: EngineStatus,
    pub journal_digest: String,
}

impl RunSummary {
    pub fn from_report(
        report: &RunReport,
        config: &StrategyConfig,
        dataset_hash: String,
        has_synthetic: bool,
    ) -> Result<Self, RunError> {
        Ok(Self {
            strategy: report.strategy.clone(),
            config_hash: config.fingerprint()?.to_string(),
            structural_hash: config.structural_hash().to_string(),
            dataset_hash,
            has_synthetic,
            bars_processed: report.bars_processed,
            intents: report.intents.len(),
            trades: report.entries(),
            orders: report.orders.len(),
            dropped: report.dropped().count(),
            rejections: report.rejections.len(),
            feed_errors: report.feed_errors.len(),
            final_position: report.position.clone(),
            status: report.status.clone(),
            journal_digest: journal_digest(report)?,
        })
    }

    pub fn halted(&self) -> bool {
        matches!(self.status, EngineStatus::Halted(_))
    }
}

/// Pick the data for every subscription of `config`, in subscription order.
fn select_feeds<'a>(
    config: &StrategyConfig,
    feeds: &'a [SourceData],
) -> Result<Vec<(u32, &'a SourceData)>, RunError> {
    let subs = config.subscriptions();
    for feed in feeds {
        if !subs.iter().any(|s| s.key == feed.key) {
            warn!(source = %feed.key, strategy = %config.name, "data for unsubscribed source ignored");
        }
    }
    subs.iter()
        .map(|sub| {
            feeds
                .iter()
                .find(|f| f.key == sub.key)
                .map(|f| (sub.priority, f))
                .ok_or_else(|| RunError::MissingData(sub.key.clone()))
        })
        .collect()
}

/// Run `config` over `feeds` and return the engine's journal.
///
/// Feed-boundary drops (out-of-order, malformed) are appended to the
/// report's `feed_errors`.
pub fn run_report(config: &StrategyConfig, feeds: &[SourceData]) -> Result<RunReport, RunError> {
    let selected = select_feeds(config, feeds)?;

    let mut feed = BarFeed::new();
    for (priority, data) in &selected {
        feed.subscribe(data.key.clone(), *priority, replay(data.bars.clone()))?;
    }

    let mut engine = StrategyEngine::from_config(config, Box::new(RecordingRouter::new()))?;
    engine.run(feed.by_ref());

    let mut report = engine.into_report();
    report.feed_errors.extend(feed.errors().iter().cloned());
    Ok(report)
}

/// Run `config` over `feeds` and summarize the outcome.
pub fn run_strategy(config: &StrategyConfig, feeds: &[SourceData]) -> Result<RunSummary, RunError> {
    let selected = select_feeds(config, feeds)?;
    let used: Vec<&SourceData> = selected.iter().map(|(_, data)| *data).collect();
    let hash = dataset_hash(&used);
    let has_synthetic = used.iter().any(|d| d.synthetic);

    let report = run_report(config, feeds)?;
    let summary = RunSummary::from_report(&report, config, hash, has_synthetic)?;
    info!(
        strategy = %summary.strategy,
        bars = summary.bars_processed,
        trades = summary.trades,
        position = summary.final_position.signed_volume,
        status = ?summary.status,
        "run complete"
    );
    Ok(summary)
}
