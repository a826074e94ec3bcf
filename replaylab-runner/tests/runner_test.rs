//! Integration tests for the runner: config + CSV bars in, record streams
//! and artifacts out.

use std::path::{Path, PathBuf};

use replaylab_core::synthetic::{opening_range_days, SyntheticConfig};
use replaylab_runner::bootstrap::MIN_TRADES;
use replaylab_runner::export::{load_manifest, TRADE_COLUMNS};
use replaylab_runner::{
    bootstrap_expectancy, load_trade_r_multiples, run_backtest, write_bars_csv, BootstrapConfig,
    BootstrapError, RunError,
};

const ORB_CONFIG: &str = r#"
strategy_family = "session"
starting_balance = 10000.0
risk_per_trade_pct = 0.01

[alternate]
signal_model = "opening_range"
"#;

fn fixture(dir: &Path, days: usize) -> (PathBuf, PathBuf) {
    let config_path = dir.join("config.toml");
    std::fs::write(&config_path, ORB_CONFIG).unwrap();
    let bars_path = dir.join("bars.csv");
    let bars = opening_range_days(&SyntheticConfig {
        days,
        ..SyntheticConfig::default()
    });
    write_bars_csv(&bars, &bars_path).unwrap();
    (config_path, bars_path)
}

fn data_rows(path: &Path) -> usize {
    let mut reader = csv::Reader::from_path(path).unwrap();
    reader.records().map(|r| r.unwrap()).count()
}

#[test]
fn run_writes_streams_and_artifacts() {
    let dir = tempfile::tempdir().unwrap();
    let (config_path, bars_path) = fixture(dir.path(), 5);
    let out = dir.path().join("results");

    let outcome = run_backtest(&config_path, &bars_path, &out).unwrap();
    assert!(outcome.run_dir.starts_with(&out));
    for name in [
        "events.csv",
        "trades.csv",
        "signals.csv",
        "fills.csv",
        "manifest.json",
        "equity.csv",
        "daily.csv",
    ] {
        assert!(outcome.run_dir.join(name).exists(), "missing {name}");
    }

    assert!(outcome.summary.trade_count > 0);
    assert_eq!(data_rows(&outcome.run_dir.join("trades.csv")), outcome.summary.trade_count);
    assert_eq!(data_rows(&outcome.run_dir.join("fills.csv")), outcome.result.fills.len());
    assert_eq!(data_rows(&outcome.run_dir.join("equity.csv")), outcome.result.bar_count);
    assert_eq!(
        data_rows(&outcome.run_dir.join("events.csv")),
        outcome.result.event_count
    );

    let manifest = load_manifest(&outcome.run_dir).unwrap();
    assert_eq!(manifest.fingerprint, outcome.fingerprint);
    assert_eq!(manifest.summary, outcome.summary);
    assert_eq!(manifest.fingerprint.model, "opening_range");
    let reasons: usize = manifest.summary.exit_reasons.values().sum();
    assert_eq!(reasons, manifest.summary.trade_count);
}

#[test]
fn trade_tape_header_is_fixed() {
    let dir = tempfile::tempdir().unwrap();
    let (config_path, bars_path) = fixture(dir.path(), 2);
    let outcome = run_backtest(&config_path, &bars_path, &dir.path().join("out")).unwrap();

    let mut reader = csv::Reader::from_path(outcome.run_dir.join("trades.csv")).unwrap();
    let header: Vec<String> = reader.headers().unwrap().iter().map(String::from).collect();
    assert_eq!(header, TRADE_COLUMNS);
}

#[test]
fn identical_inputs_write_identical_files() {
    let dir = tempfile::tempdir().unwrap();
    let (config_path, bars_path) = fixture(dir.path(), 3);
    let a = run_backtest(&config_path, &bars_path, &dir.path().join("a")).unwrap();
    let b = run_backtest(&config_path, &bars_path, &dir.path().join("b")).unwrap();

    assert_eq!(a.fingerprint.run_hash, b.fingerprint.run_hash);
    for name in ["events.csv", "trades.csv", "signals.csv", "fills.csv", "equity.csv"] {
        let left = std::fs::read(a.run_dir.join(name)).unwrap();
        let right = std::fs::read(b.run_dir.join(name)).unwrap();
        assert_eq!(left, right, "{name} differs");
    }
}

#[test]
fn trade_tape_feeds_the_bootstrap() {
    let dir = tempfile::tempdir().unwrap();
    let (config_path, bars_path) = fixture(dir.path(), 10);
    let outcome = run_backtest(&config_path, &bars_path, &dir.path().join("out")).unwrap();

    let rs = load_trade_r_multiples(&outcome.run_dir.join("trades.csv")).unwrap();
    assert_eq!(rs.len(), outcome.result.trades.len());
    for (r, trade) in rs.iter().zip(&outcome.result.trades) {
        assert!((r - trade.r_multiple).abs() < 1e-4);
    }

    match bootstrap_expectancy(&rs, &BootstrapConfig::default()) {
        Ok(ci) => {
            assert!(rs.len() >= MIN_TRADES);
            assert!(ci.ci_lower <= ci.median && ci.median <= ci.ci_upper);
        }
        Err(BootstrapError::InsufficientData { sample_size }) => {
            assert_eq!(sample_size, rs.len());
            assert!(sample_size < MIN_TRADES);
        }
        Err(e) => panic!("unexpected bootstrap error: {e}"),
    }
}

#[test]
fn missing_config_is_a_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let (_, bars_path) = fixture(dir.path(), 1);
    let err = run_backtest(&dir.path().join("absent.toml"), &bars_path, dir.path()).unwrap_err();
    assert!(matches!(err, RunError::Config(_)));
}

#[test]
fn malformed_bars_are_a_data_error() {
    let dir = tempfile::tempdir().unwrap();
    let (config_path, _) = fixture(dir.path(), 1);
    let bars_path = dir.path().join("broken.csv");
    std::fs::write(
        &bars_path,
        "timestamp,open,high,low,close\n2024-01-02 09:05:00,1,2,0.5,1\n2024-01-02 09:00:00,1,2,0.5,1\n",
    )
    .unwrap();
    let err = run_backtest(&config_path, &bars_path, dir.path()).unwrap_err();
    assert!(matches!(err, RunError::Data(_)));
}

#[test]
fn insane_bar_is_an_engine_error() {
    let dir = tempfile::tempdir().unwrap();
    let (config_path, _) = fixture(dir.path(), 1);
    let bars_path = dir.path().join("insane.csv");
    std::fs::write(
        &bars_path,
        "timestamp,open,high,low,close\n2024-01-02 09:00:00,1,2,0.5,1\n2024-01-02 09:05:00,1,0.8,0.5,1\n",
    )
    .unwrap();
    let err = run_backtest(&config_path, &bars_path, &dir.path().join("out")).unwrap_err();
    assert!(matches!(err, RunError::Engine(_)));
}
