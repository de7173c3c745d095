//! Sweeps: many independent strategy instances, run in parallel.
//!
//! A sweep file (TOML) lists jobs. Each job names a strategy config, the data
//! for every source it subscribes to, and optionally a grid of indicator
//! periods to expand into one instance per combination:
//!
//! ```toml
//! [[jobs]]
//! strategy = "strategies/cross.toml"
//!
//! [[jobs.feeds]]
//! source = "SPY@1d"
//! csv = "data/spy.csv"
//!
//! [[jobs.grid]]
//! alias = "fast"
//! periods = [5, 10, 20]
//! ```
//!
//! Relative paths resolve against the sweep file's directory. Instances share
//! no mutable state; results come back in job order whatever the scheduling.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use stratlab_core::domain::SourceKey;
use stratlab_core::StrategyConfig;

use crate::data_loader::{load_bars_csv, SourceData};
use crate::runner::{run_strategy, RunSummary};
use crate::synthetic::{synthetic_bars, SyntheticSpec};

fn default_parallel() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepConfig {
    #[serde(default = "default_parallel")]
    pub parallel: bool,
    pub jobs: Vec<JobSpec>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSpec {
    pub strategy: PathBuf,
    pub feeds: Vec<FeedSpec>,
    #[serde(default)]
    pub grid: Vec<PeriodAxis>,
}

/// Data for one source: a CSV file or a synthetic walk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedSpec {
    pub source: SourceKey,
    #[serde(default)]
    pub csv: Option<PathBuf>,
    #[serde(default)]
    pub synthetic: Option<SyntheticSpec>,
}

/// Candidate periods for the indicator published as `alias`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodAxis {
    pub alias: String,
    pub periods: Vec<usize>,
}

/// One ready-to-run strategy instance.
#[derive(Debug, Clone)]
pub struct SweepJob {
    pub label: String,
    pub config: StrategyConfig,
    pub feeds: Arc<[SourceData]>,
}

/// Result of one instance. Failures do not abort the sweep.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepOutcome {
    pub label: String,
    pub summary: Option<RunSummary>,
    pub error: Option<String>,
}

impl SweepConfig {
    pub fn from_toml_str(src: &str) -> Result<Self> {
        let config: Self = toml::from_str(src).context("invalid sweep file")?;
        if config.jobs.is_empty() {
            bail!("sweep file has no jobs");
        }
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let src = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::from_toml_str(&src).with_context(|| format!("in {}", path.display()))
    }

    /// Load every strategy config and data file, expand grids, and return
    /// the instances in declaration order.
    pub fn into_jobs(self, base_dir: &Path) -> Result<Vec<SweepJob>> {
        let mut jobs = Vec::new();
        for spec in self.jobs {
            let strategy_path = base_dir.join(&spec.strategy);
            let config = StrategyConfig::load(&strategy_path)
                .with_context(|| format!("strategy {}", strategy_path.display()))?;
            let feeds: Arc<[SourceData]> = spec
                .feeds
                .iter()
                .map(|feed| feed.resolve(base_dir))
                .collect::<Result<Vec<_>>>()?
                .into();
            for (label, config) in expand_grid(&config, &spec.grid)? {
                jobs.push(SweepJob {
                    label,
                    config,
                    feeds: Arc::clone(&feeds),
                });
            }
        }
        debug!(jobs = jobs.len(), "sweep expanded");
        Ok(jobs)
    }
}

impl FeedSpec {
    fn resolve(&self, base_dir: &Path) -> Result<SourceData> {
        match (&self.csv, &self.synthetic) {
            (Some(path), None) => Ok(load_bars_csv(&base_dir.join(path), self.source.clone())?),
            (None, Some(spec)) => Ok(synthetic_bars(&self.source, spec.bars, spec.seed)),
            _ => bail!(
                "feed {} needs exactly one of `csv` or `synthetic`",
                self.source
            ),
        }
    }
}

/// Cartesian product of the period axes applied to `base`. Without axes the
/// base config is the only instance.
pub fn expand_grid(
    base: &StrategyConfig,
    axes: &[PeriodAxis],
) -> Result<Vec<(String, StrategyConfig)>> {
    for axis in axes {
        let known = base
            .indicators
            .iter()
            .any(|ind| ind.alias.as_deref() == Some(axis.alias.as_str()));
        if !known {
            bail!("grid alias `{}` not found in strategy `{}`", axis.alias, base.name);
        }
        if axis.periods.is_empty() {
            bail!("grid alias `{}` has no periods", axis.alias);
        }
    }

    let mut combos: Vec<Vec<(&str, usize)>> = vec![Vec::new()];
    for axis in axes {
        combos = combos
            .into_iter()
            .flat_map(|prefix| {
                axis.periods.iter().map(move |&p| {
                    let mut combo = prefix.clone();
                    combo.push((axis.alias.as_str(), p));
                    combo
                })
            })
            .collect();
    }

    Ok(combos
        .into_iter()
        .map(|combo| {
            if combo.is_empty() {
                return (base.name.clone(), base.clone());
            }
            let mut config = base.clone();
            for &(alias, period) in &combo {
                for ind in &mut config.indicators {
                    if ind.alias.as_deref() == Some(alias) {
                        ind.period = Some(period);
                    }
                }
            }
            let params: Vec<String> = combo.iter().map(|(a, p)| format!("{a}={p}")).collect();
            config.name = format!("{}[{}]", base.name, params.join(","));
            (config.name.clone(), config)
        })
        .collect())
}

fn run_job(job: &SweepJob) -> SweepOutcome {
    match run_strategy(&job.config, &job.feeds) {
        Ok(summary) => SweepOutcome {
            label: job.label.clone(),
            summary: Some(summary),
            error: None,
        },
        Err(err) => SweepOutcome {
            label: job.label.clone(),
            summary: None,
            error: Some(err.to_string()),
        },
    }
}

/// Run every job; outcomes are returned in job order.
pub fn run_sweep(jobs: &[SweepJob], parallel: bool) -> Vec<SweepOutcome> {
    info!(jobs = jobs.len(), parallel, "sweep started");
    let outcomes: Vec<SweepOutcome> = if parallel {
        jobs.par_iter().map(run_job).collect()
    } else {
        jobs.iter().map(run_job).collect()
    };
    let failed = outcomes.iter().filter(|o| o.error.is_some()).count();
    info!(jobs = outcomes.len(), failed, "sweep finished");
    outcomes
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> StrategyConfig {
        StrategyConfig::from_toml_str(
            r#"
            name = "cross"
            primary = "SYN@1d"

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
            "#,
        )
        .unwrap()
    }

    fn axis(alias: &str, periods: &[usize]) -> PeriodAxis {
        PeriodAxis {
            alias: alias.into(),
            periods: periods.to_vec(),
        }
    }

    #[test]
    fn no_axes_is_the_base_config() {
        let expanded = expand_grid(&base(), &[]).unwrap();
        assert_eq!(expanded.len(), 1);
        assert_eq!(expanded[0].0, "cross");
        assert_eq!(expanded[0].1, base());
    }

    #[test]
    fn grid_is_a_cartesian_product_in_order() {
        let expanded =
            expand_grid(&base(), &[axis("fast", &[3, 5]), axis("slow", &[20, 30, 40])]).unwrap();
        let labels: Vec<&str> = expanded.iter().map(|(l, _)| l.as_str()).collect();
        assert_eq!(
            labels,
            vec![
                "cross[fast=3,slow=20]",
                "cross[fast=3,slow=30]",
                "cross[fast=3,slow=40]",
                "cross[fast=5,slow=20]",
                "cross[fast=5,slow=30]",
                "cross[fast=5,slow=40]",
            ]
        );
        let (_, last) = &expanded[5];
        assert_eq!(last.indicators[0].period, Some(5));
        assert_eq!(last.indicators[1].period, Some(40));
    }

    #[test]
    fn unknown_alias_is_rejected() {
        assert!(expand_grid(&base(), &[axis("medium", &[10])]).is_err());
        assert!(expand_grid(&base(), &[axis("fast", &[])]).is_err());
    }

    #[test]
    fn parallel_and_sequential_agree() {
        let feeds: Arc<[SourceData]> = vec![synthetic_bars(&base().primary, 200, 9)].into();
        let jobs: Vec<SweepJob> = expand_grid(&base(), &[axis("fast", &[2, 3, 5, 8])])
            .unwrap()
            .into_iter()
            .map(|(label, config)| SweepJob {
                label,
                config,
                feeds: Arc::clone(&feeds),
            })
            .collect();
        let par = run_sweep(&jobs, true);
        let seq = run_sweep(&jobs, false);
        assert_eq!(par, seq);
        assert!(par.iter().all(|o| o.summary.is_some()));
        assert_eq!(par[2].label, "cross[fast=5]");
    }

    #[test]
    fn failing_job_does_not_abort_sweep() {
        let mut broken = base();
        broken.evaluator.id = "unknown".into();
        let feeds: Arc<[SourceData]> = vec![synthetic_bars(&base().primary, 50, 1)].into();
        let jobs = vec![
            SweepJob {
                label: "broken".into(),
                config: broken,
                feeds: Arc::clone(&feeds),
            },
            SweepJob {
                label: "ok".into(),
                config: base(),
                feeds,
            },
        ];
        let outcomes = run_sweep(&jobs, true);
        assert!(outcomes[0].error.is_some());
        assert!(outcomes[1].summary.is_some());
    }

    #[test]
    fn feed_spec_needs_exactly_one_origin() {
        let spec = FeedSpec {
            source: SourceKey::new("SYN", "1d"),
            csv: None,
            synthetic: None,
        };
        assert!(spec.resolve(Path::new(".")).is_err());
    }

    #[test]
    fn empty_sweep_is_rejected() {
        assert!(SweepConfig::from_toml_str("jobs = []").is_err());
    }
}
