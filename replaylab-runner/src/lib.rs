//! ReplayLab Runner — replay orchestration, artifacts, metrics.
//!
//! This crate builds on `replaylab-core` to provide:
//! - Bar and trade-tape ingestion from CSV
//! - TOML config loading
//! - A buffered CSV sink for the four record streams
//! - Single-replay runner with fingerprinting and artifacts
//! - Summary metrics and a bootstrap CI on expectancy

pub mod bootstrap;
pub mod config;
pub mod data_loader;
pub mod export;
pub mod metrics;
pub mod runner;

pub use bootstrap::{bootstrap_expectancy, BootstrapConfig, BootstrapError, BootstrapResult};
pub use config::{load_config, ConfigError};
pub use data_loader::{load_bars_csv, load_trade_r_multiples, write_bars_csv, LoadError};
pub use export::{save_artifacts, CsvSink};
pub use metrics::Summary;
pub use runner::{run_backtest, run_on_bars, RunError, RunOutcome};
