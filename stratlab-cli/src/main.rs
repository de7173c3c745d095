//! StratLab CLI: run, sweep, validate and fingerprint strategy configs.
//!
//! Commands:
//! - `run`: run one strategy config over CSV or synthetic bars
//! - `sweep`: run every job of a sweep file in parallel
//! - `validate`: check strategy configs without running them
//! - `fingerprint`: print the config and structural hashes

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use stratlab_core::domain::SourceKey;
use stratlab_core::StrategyConfig;
use stratlab_runner::{
    load_bars_csv, run_report, run_sweep, synthetic_bars, RunSummary, SourceData, SweepConfig,
};

#[derive(Parser)]
#[command(
    name = "stratlab",
    about = "StratLab CLI: bar-driven strategy execution core"
)]
struct Cli {
    /// Log filter (e.g. `debug`, `stratlab_core=trace`). Overrides RUST_LOG.
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one strategy config.
    Run {
        /// Path to a strategy config (TOML, or JSON by extension).
        #[arg(long)]
        config: PathBuf,

        /// CSV data for a source, as SOURCE=PATH (e.g. SPY@1d=data/spy.csv).
        #[arg(long = "data", value_parser = parse_data_arg)]
        data: Vec<(SourceKey, PathBuf)>,

        /// Generate this many synthetic bars for sources without --data.
        #[arg(long)]
        synthetic: Option<usize>,

        /// Seed for synthetic bars.
        #[arg(long, default_value_t = 0)]
        seed: u64,

        /// Write the full run journal as JSON to this path.
        #[arg(long)]
        journal: Option<PathBuf>,

        /// Print the summary as JSON instead of a table.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Run all jobs of a sweep file.
    Sweep {
        /// Path to the sweep TOML file.
        file: PathBuf,

        /// Run jobs one after another instead of in parallel.
        #[arg(long, default_value_t = false)]
        sequential: bool,

        /// Write all outcomes as JSON to this path.
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Validate strategy configs.
    Validate {
        #[arg(required = true)]
        configs: Vec<PathBuf>,
    },
    /// Print config and structural hashes.
    Fingerprint { config: PathBuf },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_level.as_deref())?;

    match cli.command {
        Commands::Run {
            config,
            data,
            synthetic,
            seed,
            journal,
            json,
        } => run_cmd(&config, data, synthetic, seed, journal.as_deref(), json),
        Commands::Sweep {
            file,
            sequential,
            output,
        } => sweep_cmd(&file, sequential, output.as_deref()),
        Commands::Validate { configs } => validate_cmd(&configs),
        Commands::Fingerprint { config } => fingerprint_cmd(&config),
    }
}

fn init_logging(level: Option<&str>) -> Result<()> {
    let filter = match level {
        Some(level) => EnvFilter::try_new(level).context("invalid --log-level")?,
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

fn parse_data_arg(arg: &str) -> Result<(SourceKey, PathBuf), String> {
    let (key, path) = arg
        .split_once('=')
        .ok_or_else(|| format!("expected SOURCE=PATH, got '{arg}'"))?;
    if path.is_empty() {
        return Err(format!("missing path in '{arg}'"));
    }
    Ok((key.parse()?, PathBuf::from(path)))
}

fn run_cmd(
    config_path: &Path,
    data: Vec<(SourceKey, PathBuf)>,
    synthetic: Option<usize>,
    seed: u64,
    journal: Option<&Path>,
    json: bool,
) -> Result<()> {
    let config = StrategyConfig::load(config_path)?;
    config.validate()?;

    let mut feeds: Vec<SourceData> = data
        .into_iter()
        .map(|(key, path)| load_bars_csv(&path, key))
        .collect::<Result<_, _>>()?;
    for sub in config.subscriptions() {
        if feeds.iter().any(|f| f.key == sub.key) {
            continue;
        }
        let Some(n) = synthetic else {
            bail!("no --data for {} (pass --synthetic N to generate bars)", sub.key);
        };
        info!(source = %sub.key, bars = n, seed, "using synthetic bars");
        feeds.push(synthetic_bars(&sub.key, n, seed));
    }

    let report = run_report(&config, &feeds)?;
    let used: Vec<&SourceData> = config
        .subscriptions()
        .iter()
        .filter_map(|sub| feeds.iter().find(|f| f.key == sub.key))
        .collect();
    let summary = RunSummary::from_report(
        &report,
        &config,
        stratlab_runner::dataset_hash(&used),
        used.iter().any(|f| f.synthetic),
    )?;

    if let Some(path) = journal {
        let out = serde_json::to_string_pretty(&report)?;
        std::fs::write(path, out).with_context(|| format!("failed to write {}", path.display()))?;
        info!(path = %path.display(), "journal written");
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_summary(&summary);
    }
    if let Some(halt) = &report.halt {
        bail!("strategy halted: {}", halt.reason);
    }
    Ok(())
}

fn sweep_cmd(file: &Path, sequential: bool, output: Option<&Path>) -> Result<()> {
    let sweep = SweepConfig::load(file)?;
    let parallel = sweep.parallel && !sequential;
    let base_dir = file.parent().unwrap_or_else(|| Path::new("."));
    let jobs = sweep.into_jobs(base_dir)?;

    let outcomes = run_sweep(&jobs, parallel);

    println!(
        "{:<40} {:>8} {:>7} {:>7} {:>10}  {}",
        "Strategy", "Bars", "Trades", "Orders", "Position", "Status"
    );
    println!("{}", "-".repeat(90));
    for outcome in &outcomes {
        match (&outcome.summary, &outcome.error) {
            (Some(s), _) => println!(
                "{:<40} {:>8} {:>7} {:>7} {:>10.4}  {:?}",
                outcome.label,
                s.bars_processed,
                s.trades,
                s.orders,
                s.final_position.signed_volume,
                s.status
            ),
            (None, Some(err)) => println!("{:<40} error: {err}", outcome.label),
            (None, None) => println!("{:<40} no result", outcome.label),
        }
    }

    if let Some(path) = output {
        let out = serde_json::to_string_pretty(&outcomes)?;
        std::fs::write(path, out).with_context(|| format!("failed to write {}", path.display()))?;
        println!("Outcomes saved to: {}", path.display());
    }

    let failed = outcomes.iter().filter(|o| o.error.is_some()).count();
    if failed > 0 {
        bail!("{failed} of {} job(s) failed", outcomes.len());
    }
    Ok(())
}

fn validate_cmd(paths: &[PathBuf]) -> Result<()> {
    let mut failed = 0;
    for path in paths {
        match StrategyConfig::load(path).and_then(|c| c.validate().map(|()| c)) {
            Ok(config) => println!("ok      {} ({})", path.display(), config.name),
            Err(err) => {
                failed += 1;
                println!("invalid {}: {err}", path.display());
            }
        }
    }
    if failed > 0 {
        bail!("{failed} invalid config(s)");
    }
    Ok(())
}

fn fingerprint_cmd(path: &Path) -> Result<()> {
    let config = StrategyConfig::load(path)?;
    println!("config:     {}", config.fingerprint()?);
    println!("structural: {}", config.structural_hash());
    Ok(())
}

fn print_summary(s: &RunSummary) {
    println!();
    println!("=== Run Result ===");
    println!("Strategy:       {}", s.strategy);
    println!("Config hash:    {}", s.config_hash);
    println!(
        "Data:           {}{}",
        s.dataset_hash,
        if s.has_synthetic { " (synthetic)" } else { "" }
    );
    println!("Bars:           {}", s.bars_processed);
    println!();
    println!("--- Decisions ---");
    println!("Intents:        {}", s.intents);
    println!("Trades:         {}", s.trades);
    println!("Orders:         {}", s.orders);
    println!("Dropped:        {}", s.dropped);
    println!("Rejected:       {}", s.rejections);
    println!("Feed errors:    {}", s.feed_errors);
    println!();
    println!("--- Final State ---");
    println!(
        "Position:       {:+.4} @ {:.4}",
        s.final_position.signed_volume, s.final_position.average_entry_price
    );
    println!("Status:         {:?}", s.status);
    println!("Journal digest: {}", s.journal_digest);
}
