//! Declarative strategy configuration.
//!
//! One `StrategyConfig` describes a whole strategy instance: the sources it
//! listens to, the indicators bound to them, the evaluator id with its
//! parameters, protective rules and execution policy. Configs load from TOML
//! or JSON and are validated before an engine is built from them.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{ConfigHash, SourceKey};
use crate::engine::DEFAULT_FEED_GRACE_SECS;
use crate::execution::ReversalPolicy;
use crate::factory::{create_evaluator, create_indicator, FactoryError};
use crate::fingerprint;
use crate::pipeline::PipelineError;
use crate::protection::{PriceSource, ProtectionRule};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid TOML: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),

    #[error(transparent)]
    Factory(#[from] FactoryError),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

/// A subscribed source and its tie-break priority (lower wins).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceConfig {
    pub key: SourceKey,
    #[serde(default)]
    pub priority: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndicatorConfig {
    /// Bound source; the primary source when omitted.
    #[serde(default)]
    pub source: Option<SourceKey>,
    pub kind: String,
    #[serde(default)]
    pub period: Option<usize>,
    /// Name the reading is published under; defaults to e.g. `sma_20`.
    #[serde(default)]
    pub alias: Option<String>,
}

impl IndicatorConfig {
    pub fn source_or<'a>(&'a self, primary: &'a SourceKey) -> &'a SourceKey {
        self.source.as_ref().unwrap_or(primary)
    }
}

/// Evaluator id plus free-form parameters.
///
/// `BTreeMap` keeps key order deterministic for hashing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluatorConfig {
    pub id: String,
    #[serde(default)]
    pub params: BTreeMap<String, serde_json::Value>,
}

fn default_base_volume() -> f64 {
    1.0
}

fn default_feed_grace_secs() -> i64 {
    DEFAULT_FEED_GRACE_SECS
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyConfig {
    pub name: String,
    /// Source whose bars drive decisions; its instrument is the traded one.
    pub primary: SourceKey,
    /// Extra subscriptions. The primary is implied when not listed.
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
    #[serde(default)]
    pub indicators: Vec<IndicatorConfig>,
    pub evaluator: EvaluatorConfig,
    #[serde(default)]
    pub protection: Vec<ProtectionRule>,
    #[serde(default = "default_base_volume")]
    pub base_volume: f64,
    #[serde(default)]
    pub reversal_policy: ReversalPolicy,
    #[serde(default)]
    pub protection_price: PriceSource,
    #[serde(default = "default_feed_grace_secs")]
    pub feed_grace_secs: i64,
}

impl StrategyConfig {
    pub fn from_toml_str(src: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(src)?)
    }

    pub fn from_json_str(src: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(src)?)
    }

    /// Load from a `.json` file, or TOML for any other extension.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let src = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json_str(&src),
            _ => Self::from_toml_str(&src),
        }
    }

    /// Subscriptions in declaration order, with the primary added at priority
    /// 0 when it is not listed.
    pub fn subscriptions(&self) -> Vec<SourceConfig> {
        let mut subs = self.sources.clone();
        if !subs.iter().any(|s| s.key == self.primary) {
            subs.insert(
                0,
                SourceConfig {
                    key: self.primary.clone(),
                    priority: 0,
                },
            );
        }
        subs
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));

        if self.name.trim().is_empty() {
            return invalid("name must not be empty".into());
        }
        if !(self.base_volume.is_finite() && self.base_volume > 0.0) {
            return invalid(format!("base_volume must be positive, got {}", self.base_volume));
        }
        if self.feed_grace_secs < 0 {
            return invalid(format!(
                "feed_grace_secs must be >= 0, got {}",
                self.feed_grace_secs
            ));
        }

        let mut declared = BTreeSet::new();
        for sub in &self.sources {
            if !declared.insert(&sub.key) {
                return invalid(format!("source {} declared twice", sub.key));
            }
        }
        declared.insert(&self.primary);

        let mut names = BTreeSet::new();
        for ind in &self.indicators {
            let source = ind.source_or(&self.primary);
            if !declared.contains(source) {
                return invalid(format!(
                    "indicator `{}` is bound to undeclared source {source}",
                    ind.kind
                ));
            }
            let indicator = create_indicator(ind)?;
            let name = ind.alias.clone().unwrap_or_else(|| indicator.name().to_string());
            if !names.insert(name.clone()) {
                return Err(PipelineError::DuplicateName(name).into());
            }
        }

        for rule in &self.protection {
            rule.validate().map_err(ConfigError::Invalid)?;
        }

        create_evaluator(&self.evaluator, self.base_volume)?;
        Ok(())
    }

    /// BLAKE3 of the canonical JSON: identical configs hash identically.
    pub fn fingerprint(&self) -> Result<ConfigHash, ConfigError> {
        Ok(fingerprint::config_hash(self)?)
    }

    /// Hash of the structure only (evaluator id, indicator kinds, rule kinds),
    /// shared by configs that differ only in parameter values.
    pub fn structural_hash(&self) -> ConfigHash {
        fingerprint::structural_hash(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        name = "sma_cross_spy"
        primary = "SPY@1d"
        base_volume = 10.0
        reversal_policy = "netted"

        [[indicators]]
        kind = "sma"
        period = 5
        alias = "fast"

        [[indicators]]
        kind = "sma"
        period = 20
        alias = "slow"

        [evaluator]
        id = "ma_crossover"
        params = { fast = "fast", slow = "slow" }

        [[protection]]
        rule = "fixed_stop"
        distance = 2.0
    "#;

    #[test]
    fn parses_and_validates_sample() {
        let config = StrategyConfig::from_toml_str(SAMPLE).unwrap();
        config.validate().unwrap();
        assert_eq!(config.primary, SourceKey::new("SPY", "1d"));
        assert_eq!(config.reversal_policy, ReversalPolicy::Netted);
        assert_eq!(config.protection_price, PriceSource::Intrabar);
        assert_eq!(config.feed_grace_secs, DEFAULT_FEED_GRACE_SECS);
        assert_eq!(config.subscriptions().len(), 1);
    }

    #[test]
    fn rejects_undeclared_indicator_source() {
        let mut config = StrategyConfig::from_toml_str(SAMPLE).unwrap();
        config.indicators[0].source = Some(SourceKey::new("SPY", "1h"));
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        config.sources.push(SourceConfig {
            key: SourceKey::new("SPY", "1h"),
            priority: 1,
        });
        config.validate().unwrap();
        assert_eq!(config.subscriptions().len(), 2);
    }

    #[test]
    fn rejects_duplicate_alias() {
        let mut config = StrategyConfig::from_toml_str(SAMPLE).unwrap();
        config.indicators[1].alias = Some("fast".into());
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Pipeline(PipelineError::DuplicateName(_)))
        ));
    }

    #[test]
    fn rejects_unknown_evaluator() {
        let mut config = StrategyConfig::from_toml_str(SAMPLE).unwrap();
        config.evaluator.id = "astrology".into();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Factory(FactoryError::UnknownEvaluator(_)))
        ));
    }

    #[test]
    fn rejects_bad_volume_and_rules() {
        let mut config = StrategyConfig::from_toml_str(SAMPLE).unwrap();
        config.base_volume = 0.0;
        assert!(config.validate().is_err());

        let mut config = StrategyConfig::from_toml_str(SAMPLE).unwrap();
        config.protection.push(ProtectionRule::FixedStop { distance: -1.0 });
        assert!(config.validate().is_err());
    }

    #[test]
    fn json_and_toml_agree() {
        let config = StrategyConfig::from_toml_str(SAMPLE).unwrap();
        let json = serde_json::to_string(&config).unwrap();
        let back = StrategyConfig::from_json_str(&json).unwrap();
        assert_eq!(config, back);
        assert_eq!(config.fingerprint().unwrap(), back.fingerprint().unwrap());
    }

    #[test]
    fn load_reads_file_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("strategy.toml");
        std::fs::write(&path, SAMPLE).unwrap();
        let config = StrategyConfig::load(&path).unwrap();
        assert_eq!(config.name, "sma_cross_spy");

        let json_path = dir.path().join("strategy.json");
        std::fs::write(&json_path, serde_json::to_string(&config).unwrap()).unwrap();
        assert_eq!(StrategyConfig::load(&json_path).unwrap(), config);

        let missing = StrategyConfig::load(&dir.path().join("missing.toml"));
        assert!(matches!(missing, Err(ConfigError::Io { .. })));
    }
}
