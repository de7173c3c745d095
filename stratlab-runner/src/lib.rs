//! StratLab Runner: drives strategy engines from data.
//!
//! This crate builds on `stratlab-core` to provide:
//! - CSV bar loading and dataset hashing
//! - Seeded synthetic bars for development
//! - Single-run orchestration with a condensed `RunSummary`
//! - Parallel sweeps over independent strategy instances

pub mod data_loader;
pub mod runner;
pub mod sweep;
pub mod synthetic;

pub use data_loader::{dataset_hash, load_bars_csv, LoadError, SourceData};
pub use runner::{run_report, run_strategy, RunError, RunSummary};
pub use sweep::{expand_grid, run_sweep, SweepConfig, SweepJob, SweepOutcome};
pub use synthetic::{synthetic_bars, SyntheticSpec};
