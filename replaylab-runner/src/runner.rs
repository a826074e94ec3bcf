//! Replay runner — wires together config, bars, engine, sink and artifacts.
//!
//! Two entry points:
//! - `run_backtest()`: reads the config and bar files, then runs. Used by CLI.
//! - `run_on_bars()`: takes an already validated config and loaded bars.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::info;

use replaylab_core::domain::Bar;
use replaylab_core::fingerprint::RunFingerprint;
use replaylab_core::{Engine, EngineConfig, EngineError, RunResult};

use crate::config::{load_config, ConfigError};
use crate::data_loader::{load_bars_csv, LoadError};
use crate::export::{save_artifacts, CsvSink};
use crate::metrics::Summary;

/// Length of the run-hash prefix naming the run directory.
const RUN_DIR_HASH_LEN: usize = 12;

#[derive(Debug, Error)]
pub enum RunError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("engine config error: {0}")]
    EngineConfig(#[from] replaylab_core::ConfigError),
    #[error("data error: {0}")]
    Data(#[from] LoadError),
    #[error("engine error: {0}")]
    Engine(#[from] EngineError),
    #[error("fingerprint error: {0}")]
    Fingerprint(#[from] serde_json::Error),
    #[error(transparent)]
    Artifacts(#[from] anyhow::Error),
}

/// Everything a caller needs after a replay.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub result: RunResult,
    pub fingerprint: RunFingerprint,
    pub summary: Summary,
    /// Directory holding the record streams and artifacts.
    pub run_dir: PathBuf,
}

/// Load `config_path` and `bars_path`, replay, and write everything under
/// `output_dir/<run-hash prefix>/`.
pub fn run_backtest(config_path: &Path, bars_path: &Path, output_dir: &Path) -> Result<RunOutcome, RunError> {
    let config = load_config(config_path)?;
    let bars = load_bars_csv(bars_path)?;
    run_on_bars(config, &bars, output_dir)
}

pub fn run_on_bars(config: EngineConfig, bars: &[Bar], output_dir: &Path) -> Result<RunOutcome, RunError> {
    let engine = Engine::new(config.clone())?;
    let fingerprint = RunFingerprint::new(&config, engine.model_name(), bars)?;
    let run_dir = output_dir.join(&fingerprint.run_hash[..RUN_DIR_HASH_LEN]);
    info!(
        run = %fingerprint.run_hash,
        model = %fingerprint.model,
        bars = bars.len(),
        dir = %run_dir.display(),
        "run starting"
    );

    let mut sink = CsvSink::create(&run_dir)?;
    let result = engine.run(bars, &mut sink)?;
    sink.finish()?;

    save_artifacts(&result, &fingerprint, &config, &run_dir)?;
    let summary = Summary::compute(&result);
    info!(
        trades = summary.trade_count,
        win_rate = summary.win_rate,
        expectancy_r = summary.expectancy_r,
        total_pnl = summary.total_pnl,
        "run finished"
    );

    Ok(RunOutcome {
        result,
        fingerprint,
        summary,
        run_dir,
    })
}
