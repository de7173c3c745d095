//! StratLab Core: deterministic strategy execution.
//!
//! This crate contains the per-instance strategy loop:
//! - Domain types (bars, positions, intents, orders)
//! - `BarFeed`: final-bar filtering and time-ordered merge of many sources
//! - `IndicatorPipeline`: incremental, source-bound indicators with a formed gate
//! - `SignalEvaluator`: the pure, pluggable decision function
//! - `PositionStateMachine`: single net position, close-before-open reversals
//! - `ProtectionLayer`: stops, takes, trailing stops and trading windows
//! - `ExecutionSink`: the only boundary to the order router
//! - `StrategyEngine`: the bar loop tying them together
//! - Config, factory and fingerprinting for config-driven instances

pub mod config;
pub mod domain;
pub mod engine;
pub mod execution;
pub mod factory;
pub mod feed;
pub mod fingerprint;
pub mod indicators;
pub mod pipeline;
pub mod position;
pub mod protection;
pub mod signal;

pub use config::{ConfigError, StrategyConfig};
pub use engine::{EngineParts, EngineStatus, RunReport, StrategyEngine};
pub use feed::{BarFeed, FeedEvent};
