//! Factory system: converts configuration records into runtime objects.
//!
//! `create_indicator` and `create_evaluator` map ids to trait objects;
//! `build_pipeline` and `build_engine` assemble a whole strategy instance
//! from a validated `StrategyConfig`.

use chrono::Duration;
use serde_json::Value;

use crate::config::{ConfigError, EvaluatorConfig, IndicatorConfig, StrategyConfig};
use crate::engine::{EngineParts, StrategyEngine};
use crate::execution::OrderRouter;
use crate::indicators::{Atr, Ema, Highest, Indicator, Lowest, Roc, Rsi, Sma, Streak};
use crate::pipeline::IndicatorPipeline;
use crate::protection::ProtectionLayer;
use crate::signal::{
    Averaging, MaCrossover, MultiTimeframe, SignalEvaluator, StreakSignal, ThresholdCross,
};

pub const INDICATOR_KINDS: &[&str] = &[
    "sma", "ema", "rsi", "atr", "highest", "lowest", "roc", "streak",
];

pub const EVALUATOR_IDS: &[&str] = &[
    "ma_crossover",
    "threshold_cross",
    "multi_timeframe",
    "streak",
    "averaging",
];

// ─── Error type ──────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum FactoryError {
    #[error("Unknown indicator kind: {0}")]
    UnknownIndicator(String),
    #[error("Unknown evaluator id: {0}")]
    UnknownEvaluator(String),
    #[error("{component}: missing parameter `{name}`")]
    MissingParam { component: String, name: String },
    #[error("{component}: invalid parameter `{name}`: {reason}")]
    InvalidParam {
        component: String,
        name: String,
        reason: String,
    },
}

// ─── Helpers ─────────────────────────────────────────────────────────

fn missing(config: &EvaluatorConfig, name: &str) -> FactoryError {
    FactoryError::MissingParam {
        component: config.id.clone(),
        name: name.to_string(),
    }
}

fn invalid(config: &EvaluatorConfig, name: &str, reason: &str) -> FactoryError {
    FactoryError::InvalidParam {
        component: config.id.clone(),
        name: name.to_string(),
        reason: reason.to_string(),
    }
}

/// Extract a named f64 parameter, falling back to `default` when absent.
fn param(config: &EvaluatorConfig, name: &str, default: f64) -> Result<f64, FactoryError> {
    match config.params.get(name) {
        None => Ok(default),
        Some(v) => v
            .as_f64()
            .filter(|x| x.is_finite())
            .ok_or_else(|| invalid(config, name, "expected a number")),
    }
}

/// Extract a required f64 parameter.
fn required(config: &EvaluatorConfig, name: &str) -> Result<f64, FactoryError> {
    if !config.params.contains_key(name) {
        return Err(missing(config, name));
    }
    param(config, name, 0.0)
}

/// Extract a named usize parameter, falling back to `default` when absent.
fn param_usize(config: &EvaluatorConfig, name: &str, default: usize) -> Result<usize, FactoryError> {
    match config.params.get(name) {
        None => Ok(default),
        Some(v) => v
            .as_u64()
            .map(|x| x as usize)
            .ok_or_else(|| invalid(config, name, "expected a non-negative integer")),
    }
}

fn param_bool(config: &EvaluatorConfig, name: &str, default: bool) -> Result<bool, FactoryError> {
    match config.params.get(name) {
        None => Ok(default),
        Some(v) => v
            .as_bool()
            .ok_or_else(|| invalid(config, name, "expected true or false")),
    }
}

/// Extract a string parameter (an indicator name), with optional default.
fn param_str(
    config: &EvaluatorConfig,
    name: &str,
    default: Option<&str>,
) -> Result<String, FactoryError> {
    match (config.params.get(name), default) {
        (Some(Value::String(s)), _) => Ok(s.clone()),
        (Some(_), _) => Err(invalid(config, name, "expected a string")),
        (None, Some(d)) => Ok(d.to_string()),
        (None, None) => Err(missing(config, name)),
    }
}

/// `[[fast, slow], ...]` name pairs.
fn param_pairs(config: &EvaluatorConfig, name: &str) -> Result<Vec<(String, String)>, FactoryError> {
    let Some(value) = config.params.get(name) else {
        return Err(missing(config, name));
    };
    let bad = || invalid(config, name, "expected a list of [fast, slow] name pairs");
    let pairs = value
        .as_array()
        .ok_or_else(bad)?
        .iter()
        .map(|pair| match pair.as_array().map(Vec::as_slice) {
            Some([Value::String(fast), Value::String(slow)]) => Ok((fast.clone(), slow.clone())),
            _ => Err(bad()),
        })
        .collect::<Result<Vec<_>, _>>()?;
    if pairs.is_empty() {
        return Err(bad());
    }
    Ok(pairs)
}

// ─── Indicator factory ───────────────────────────────────────────────

/// Create an indicator from an `IndicatorConfig`.
pub fn create_indicator(config: &IndicatorConfig) -> Result<Box<dyn Indicator>, FactoryError> {
    let period = || match config.period {
        Some(0) => Err(FactoryError::InvalidParam {
            component: config.kind.clone(),
            name: "period".into(),
            reason: "must be >= 1".into(),
        }),
        Some(p) => Ok(p),
        None => Err(FactoryError::MissingParam {
            component: config.kind.clone(),
            name: "period".into(),
        }),
    };

    match config.kind.as_str() {
        "sma" => Ok(Box::new(Sma::new(period()?))),
        "ema" => Ok(Box::new(Ema::new(period()?))),
        "rsi" => Ok(Box::new(Rsi::new(period()?))),
        "atr" => Ok(Box::new(Atr::new(period()?))),
        "highest" => Ok(Box::new(Highest::new(period()?))),
        "lowest" => Ok(Box::new(Lowest::new(period()?))),
        "roc" => Ok(Box::new(Roc::new(period()?))),
        "streak" => Ok(Box::new(Streak::new())),
        other => Err(FactoryError::UnknownIndicator(other.to_string())),
    }
}

// ─── Evaluator factory ───────────────────────────────────────────────

/// Create a signal evaluator. `volume` defaults to `base_volume`.
pub fn create_evaluator(
    config: &EvaluatorConfig,
    base_volume: f64,
) -> Result<Box<dyn SignalEvaluator>, FactoryError> {
    let volume = param(config, "volume", base_volume)?;
    if volume <= 0.0 {
        return Err(invalid(config, "volume", "must be positive"));
    }

    match config.id.as_str() {
        "ma_crossover" => {
            let fast = param_str(config, "fast", Some("fast"))?;
            let slow = param_str(config, "slow", Some("slow"))?;
            let long_only = param_bool(config, "long_only", false)?;
            Ok(Box::new(MaCrossover::new(fast, slow, volume).long_only(long_only)))
        }
        "threshold_cross" => {
            let indicator = param_str(config, "indicator", None)?;
            let upper = required(config, "upper")?;
            let lower = required(config, "lower")?;
            if lower > upper {
                return Err(invalid(config, "lower", "must not exceed upper"));
            }
            let mean_reversion = param_bool(config, "mean_reversion", false)?;
            Ok(Box::new(
                ThresholdCross::new(indicator, upper, lower, volume).mean_reversion(mean_reversion),
            ))
        }
        "multi_timeframe" => {
            let pairs = param_pairs(config, "pairs")?;
            Ok(Box::new(MultiTimeframe::new(pairs, volume)))
        }
        "streak" => {
            let indicator = param_str(config, "indicator", Some("streak"))?;
            let length = param_usize(config, "length", 3)?;
            if length == 0 {
                return Err(invalid(config, "length", "must be >= 1"));
            }
            let contrarian = param_bool(config, "contrarian", false)?;
            Ok(Box::new(
                StreakSignal::new(indicator, length, volume).contrarian(contrarian),
            ))
        }
        "averaging" => {
            let indicator = param_str(config, "indicator", None)?;
            let entry_level = required(config, "entry_level")?;
            let exit_level = required(config, "exit_level")?;
            let max_adds = param_usize(config, "max_adds", 3)?;
            Ok(Box::new(Averaging::new(
                indicator,
                entry_level,
                exit_level,
                volume,
                max_adds,
            )))
        }
        other => Err(FactoryError::UnknownEvaluator(other.to_string())),
    }
}

// ─── Assembly ────────────────────────────────────────────────────────

/// Register every configured indicator, in declaration order.
pub fn build_pipeline(config: &StrategyConfig) -> Result<IndicatorPipeline, ConfigError> {
    let mut pipeline = IndicatorPipeline::new();
    for ind in &config.indicators {
        let source = ind.source_or(&config.primary).clone();
        pipeline.register(source, create_indicator(ind)?, ind.alias.clone())?;
    }
    Ok(pipeline)
}

/// Validate `config` and assemble an engine that routes orders to `router`.
pub fn build_engine(
    config: &StrategyConfig,
    router: Box<dyn OrderRouter>,
) -> Result<StrategyEngine, ConfigError> {
    config.validate()?;
    let parts = EngineParts {
        name: config.name.clone(),
        primary: config.primary.clone(),
        pipeline: build_pipeline(config)?,
        evaluator: create_evaluator(&config.evaluator, config.base_volume)?,
        protection: ProtectionLayer::new(config.protection.clone(), config.protection_price),
        router,
        reversal_policy: config.reversal_policy,
        feed_grace: Duration::seconds(config.feed_grace_secs),
    };
    Ok(StrategyEngine::new(parts))
}

impl StrategyEngine {
    pub fn from_config(
        config: &StrategyConfig,
        router: Box<dyn OrderRouter>,
    ) -> Result<Self, ConfigError> {
        build_engine(config, router)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn eval_config(id: &str, params: &[(&str, Value)]) -> EvaluatorConfig {
        EvaluatorConfig {
            id: id.to_string(),
            params: params
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect::<BTreeMap<_, _>>(),
        }
    }

    fn ind_config(kind: &str, period: Option<usize>) -> IndicatorConfig {
        IndicatorConfig {
            source: None,
            kind: kind.to_string(),
            period,
            alias: None,
        }
    }

    #[test]
    fn every_indicator_kind_builds() {
        for kind in INDICATOR_KINDS {
            let ind = create_indicator(&ind_config(kind, Some(5))).unwrap();
            assert!(!ind.name().is_empty());
        }
    }

    #[test]
    fn indicator_period_is_checked() {
        assert!(matches!(
            create_indicator(&ind_config("sma", None)),
            Err(FactoryError::MissingParam { .. })
        ));
        assert!(matches!(
            create_indicator(&ind_config("ema", Some(0))),
            Err(FactoryError::InvalidParam { .. })
        ));
        // Streak needs no period.
        assert!(create_indicator(&ind_config("streak", None)).is_ok());
        assert!(matches!(
            create_indicator(&ind_config("vwap", Some(3))),
            Err(FactoryError::UnknownIndicator(_))
        ));
    }

    #[test]
    fn every_evaluator_id_builds() {
        let configs = [
            eval_config("ma_crossover", &[]),
            eval_config(
                "threshold_cross",
                &[
                    ("indicator", Value::from("rsi_14")),
                    ("upper", Value::from(70.0)),
                    ("lower", Value::from(30.0)),
                    ("mean_reversion", Value::from(true)),
                ],
            ),
            eval_config(
                "multi_timeframe",
                &[(
                    "pairs",
                    serde_json::json!([["d_fast", "d_slow"], ["h_fast", "h_slow"]]),
                )],
            ),
            eval_config("streak", &[("length", Value::from(4))]),
            eval_config(
                "averaging",
                &[
                    ("indicator", Value::from("close")),
                    ("entry_level", Value::from(95.0)),
                    ("exit_level", Value::from(105.0)),
                ],
            ),
        ];
        for (config, id) in configs.iter().zip(EVALUATOR_IDS) {
            let eval = create_evaluator(config, 1.0).unwrap();
            assert_eq!(eval.name(), *id);
        }
    }

    #[test]
    fn evaluator_param_errors() {
        assert!(matches!(
            create_evaluator(&eval_config("threshold_cross", &[]), 1.0),
            Err(FactoryError::MissingParam { .. })
        ));
        assert!(matches!(
            create_evaluator(
                &eval_config("ma_crossover", &[("long_only", Value::from("yes"))]),
                1.0
            ),
            Err(FactoryError::InvalidParam { .. })
        ));
        assert!(matches!(
            create_evaluator(
                &eval_config("multi_timeframe", &[("pairs", serde_json::json!([["a"]]))]),
                1.0
            ),
            Err(FactoryError::InvalidParam { .. })
        ));
        assert!(matches!(
            create_evaluator(&eval_config("ma_crossover", &[]), 0.0),
            Err(FactoryError::InvalidParam { .. })
        ));
        assert!(matches!(
            create_evaluator(&eval_config("oracle", &[]), 1.0),
            Err(FactoryError::UnknownEvaluator(_))
        ));
    }
}
