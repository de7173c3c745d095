//! Run fingerprinting: deterministic identification of configurations and runs.
//!
//! - `config_hash`: exact identity (every field and parameter value).
//! - `structural_hash`: evaluator id + indicator kinds + rule kinds, no values.
//! - `journal_digest`: identity of a run's outcome (intents, orders, position),
//!   so two runs can be compared for determinism without diffing journals.

use serde::Serialize;

use crate::config::StrategyConfig;
use crate::domain::ConfigHash;
use crate::engine::RunReport;

/// Canonical JSON: object keys sorted, no whitespace.
///
/// Going through `serde_json::Value` sorts every map, including ones that
/// serialize from unordered collections.
pub fn canonical_json<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    let value = serde_json::to_value(value)?;
    serde_json::to_string(&value)
}

pub fn config_hash(config: &StrategyConfig) -> Result<ConfigHash, serde_json::Error> {
    Ok(ConfigHash::from_bytes(canonical_json(config)?.as_bytes()))
}

/// Two crossover strategies with different periods share this hash.
pub fn structural_hash(config: &StrategyConfig) -> ConfigHash {
    let indicators: Vec<&str> = config.indicators.iter().map(|i| i.kind.as_str()).collect();
    let rules: Vec<&str> = config.protection.iter().map(|r| r.name()).collect();
    let structural = format!(
        "{}|{}|{}",
        config.evaluator.id,
        indicators.join("+"),
        rules.join("+"),
    );
    ConfigHash::from_bytes(structural.as_bytes())
}

#[derive(Serialize)]
struct JournalView<'a> {
    intents: &'a [crate::engine::IntentRecord],
    orders: &'a [crate::domain::OrderRequest],
    position: &'a crate::domain::Position,
}

/// BLAKE3 of the decision-relevant part of a run report.
pub fn journal_digest(report: &RunReport) -> Result<String, serde_json::Error> {
    let view = JournalView {
        intents: &report.intents,
        orders: &report.orders,
        position: &report.position,
    };
    Ok(blake3::hash(canonical_json(&view)?.as_bytes())
        .to_hex()
        .to_string())
}
