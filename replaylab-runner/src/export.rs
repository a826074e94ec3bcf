//! Reporting and export — record streams and run artifacts on disk.
//!
//! - `CsvSink`: the engine's four record streams as `events.csv`,
//!   `trades.csv`, `signals.csv` and `fills.csv`
//! - `save_artifacts`: `manifest.json` (fingerprint, summary, config),
//!   `equity.csv` and `daily.csv`
//!
//! All persisted manifests carry a `schema_version` field.

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

use replaylab_core::domain::Trade;
use replaylab_core::engine::EquityPoint;
use replaylab_core::fingerprint::RunFingerprint;
use replaylab_core::records::{
    EventRecord, FillRecord, RecordSink, SignalRecord, EVENT_COLUMNS, FILL_COLUMNS, SIGNAL_COLUMNS,
};
use replaylab_core::{EngineConfig, RunResult};

use crate::data_loader::TIMESTAMP_FORMAT;
use crate::metrics::Summary;

/// Current schema version for persisted manifests.
pub const SCHEMA_VERSION: u32 = 1;

pub const TRADE_COLUMNS: [&str; 28] = [
    "trade_id",
    "strategy",
    "setup_reason",
    "direction",
    "entry_bar",
    "entry_time",
    "entry_mid",
    "entry_fill",
    "initial_stop",
    "stop_loss",
    "take_profit",
    "tp1",
    "partial_fraction",
    "size",
    "remaining_fraction",
    "risk_amount",
    "tp1_hit",
    "break_even_moved",
    "mae_r",
    "mfe_r",
    "bars_held",
    "minutes_held",
    "exit_time",
    "exit_mid",
    "exit_fill",
    "exit_reason",
    "realized_pnl",
    "r_multiple",
];

fn price(v: f64) -> String {
    format!("{v:.6}")
}

fn opt_price(v: Option<f64>) -> String {
    v.map(price).unwrap_or_default()
}

// ─── Record sink ────────────────────────────────────────────────────

type Out = csv::Writer<BufWriter<File>>;

fn open_stream(dir: &Path, name: &str, header: &[&str]) -> Result<Out> {
    let path = dir.join(name);
    let file = File::create(&path).with_context(|| format!("failed to create {}", path.display()))?;
    let mut wtr = csv::Writer::from_writer(BufWriter::new(file));
    wtr.write_record(header)
        .with_context(|| format!("failed to write header of {}", path.display()))?;
    Ok(wtr)
}

/// Writes each record stream to its own CSV file under one directory.
///
/// `RecordSink` methods cannot fail, so the first write error is kept and
/// returned by `finish`. Later rows are still attempted.
pub struct CsvSink {
    dir: PathBuf,
    events: Out,
    trades: Out,
    signals: Out,
    fills: Out,
    error: Option<csv::Error>,
}

impl CsvSink {
    pub fn create(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;
        Ok(Self {
            dir: dir.to_path_buf(),
            events: open_stream(dir, "events.csv", &EVENT_COLUMNS)?,
            trades: open_stream(dir, "trades.csv", &TRADE_COLUMNS)?,
            signals: open_stream(dir, "signals.csv", &SIGNAL_COLUMNS)?,
            fills: open_stream(dir, "fills.csv", &FILL_COLUMNS)?,
            error: None,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn keep(&mut self, stream: &'static str, outcome: csv::Result<()>) {
        if let Err(e) = outcome {
            warn!(stream, error = %e, "record write failed");
            if self.error.is_none() {
                self.error = Some(e);
            }
        }
    }

    /// Flush every stream and surface the first write error, if any.
    pub fn finish(mut self) -> Result<()> {
        for (name, wtr) in [
            ("events", &mut self.events),
            ("trades", &mut self.trades),
            ("signals", &mut self.signals),
            ("fills", &mut self.fills),
        ] {
            wtr.flush().with_context(|| format!("failed to flush {name}.csv"))?;
        }
        match self.error {
            Some(e) => Err(e).context("record stream write failed"),
            None => Ok(()),
        }
    }
}

impl RecordSink for CsvSink {
    fn event(&mut self, record: &EventRecord) {
        let outcome = self.events.write_record([
            record.timestamp.format(TIMESTAMP_FORMAT).to_string(),
            record.state.clone(),
            record.event_type.clone(),
            record.signal.clone(),
            record.bias.clone(),
            record.confirmation.clone(),
            record.payload.clone(),
        ]);
        self.keep("events", outcome);
    }

    fn trade(&mut self, t: &Trade) {
        let outcome = self.trades.write_record([
            t.id.to_string(),
            t.strategy.clone(),
            t.setup_reason.clone(),
            t.direction.to_string(),
            t.entry_bar.to_string(),
            t.entry_time.format(TIMESTAMP_FORMAT).to_string(),
            price(t.entry_mid),
            price(t.entry_fill),
            price(t.initial_stop),
            price(t.stop_loss),
            price(t.take_profit),
            opt_price(t.tp1),
            format!("{:.4}", t.partial_fraction),
            price(t.size),
            format!("{:.4}", t.remaining_fraction),
            format!("{:.2}", t.risk_amount),
            t.tp1_hit.to_string(),
            t.break_even_moved.to_string(),
            format!("{:.4}", t.mae_r),
            format!("{:.4}", t.mfe_r),
            t.bars_held.to_string(),
            t.minutes_held.to_string(),
            t.exit_time
                .map(|ts| ts.format(TIMESTAMP_FORMAT).to_string())
                .unwrap_or_default(),
            opt_price(t.exit_mid),
            opt_price(t.exit_fill),
            t.exit_reason.map(|r| r.to_string()).unwrap_or_default(),
            format!("{:.2}", t.realized_pnl),
            format!("{:.4}", t.r_multiple),
        ]);
        self.keep("trades", outcome);
    }

    fn signal(&mut self, record: &SignalRecord) {
        let outcome = self.signals.write_record([
            record.timestamp.format(TIMESTAMP_FORMAT).to_string(),
            record.strategy.clone(),
            record.signal.clone(),
            record.reason.clone(),
            price(record.price),
            record.payload.clone(),
        ]);
        self.keep("signals", outcome);
    }

    fn fill(&mut self, record: &FillRecord) {
        let outcome = self.fills.write_record([
            record.timestamp.format(TIMESTAMP_FORMAT).to_string(),
            record.trade_id.to_string(),
            record.kind.to_string(),
            record.direction.to_string(),
            price(record.size),
            price(record.mid_price),
            price(record.fill_price),
            format!("{:.2}", record.pnl),
        ]);
        self.keep("fills", outcome);
    }
}

// ─── Run artifacts ──────────────────────────────────────────────────

/// Contents of `manifest.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub schema_version: u32,
    pub fingerprint: RunFingerprint,
    pub summary: Summary,
    pub config: EngineConfig,
    pub bar_count: usize,
    pub warmup_bars: usize,
}

pub fn export_equity_csv(curve: &[EquityPoint]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(["timestamp", "equity"])?;
    for point in curve {
        wtr.write_record([
            point.timestamp.format(TIMESTAMP_FORMAT).to_string(),
            format!("{:.2}", point.equity),
        ])?;
    }
    let bytes = wtr.into_inner().context("failed to finish equity CSV")?;
    String::from_utf8(bytes).context("equity CSV is not UTF-8")
}

/// One row per ledger day, oldest first.
pub fn export_daily_csv(result: &RunResult) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record([
        "date",
        "start_equity",
        "pnl",
        "trade_pnl",
        "r_multiple",
        "trades",
        "finalized",
    ])?;
    for (date, day) in result.ledger.days() {
        wtr.write_record([
            date.to_string(),
            day.start_equity.map(|e| format!("{e:.2}")).unwrap_or_default(),
            format!("{:.2}", day.pnl),
            format!("{:.2}", day.trade_pnl),
            format!("{:.4}", day.r_multiple),
            day.trades.to_string(),
            day.finalized.to_string(),
        ])?;
    }
    let bytes = wtr.into_inner().context("failed to finish daily CSV")?;
    String::from_utf8(bytes).context("daily CSV is not UTF-8")
}

/// Write `manifest.json`, `equity.csv` and `daily.csv` into `output_dir`.
///
/// Returns the manifest path.
pub fn save_artifacts(
    result: &RunResult,
    fingerprint: &RunFingerprint,
    config: &EngineConfig,
    output_dir: &Path,
) -> Result<PathBuf> {
    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("failed to create {}", output_dir.display()))?;

    let manifest = Manifest {
        schema_version: SCHEMA_VERSION,
        fingerprint: fingerprint.clone(),
        summary: Summary::compute(result),
        config: config.clone(),
        bar_count: result.bar_count,
        warmup_bars: result.warmup_bars,
    };
    let manifest_path = output_dir.join("manifest.json");
    let json = serde_json::to_string_pretty(&manifest).context("failed to serialize manifest")?;
    std::fs::write(&manifest_path, json)
        .with_context(|| format!("failed to write {}", manifest_path.display()))?;

    let equity_path = output_dir.join("equity.csv");
    std::fs::write(&equity_path, export_equity_csv(&result.equity_curve)?)
        .with_context(|| format!("failed to write {}", equity_path.display()))?;

    let daily_path = output_dir.join("daily.csv");
    std::fs::write(&daily_path, export_daily_csv(result)?)
        .with_context(|| format!("failed to write {}", daily_path.display()))?;

    Ok(manifest_path)
}

/// Read a manifest back, rejecting newer schema versions.
pub fn load_manifest(dir: &Path) -> Result<Manifest> {
    let path = dir.join("manifest.json");
    let json =
        std::fs::read_to_string(&path).with_context(|| format!("failed to read {}", path.display()))?;
    let manifest: Manifest = serde_json::from_str(&json).context("failed to parse manifest")?;
    if manifest.schema_version > SCHEMA_VERSION {
        anyhow::bail!(
            "unsupported schema version {} (max supported: {})",
            manifest.schema_version,
            SCHEMA_VERSION
        );
    }
    Ok(manifest)
}
