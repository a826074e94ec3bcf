//! CSV ingestion — M5 bars in, trade tapes back in for resampling.
//!
//! Bar files carry the header `timestamp,open,high,low,close` plus optional
//! `volume,bid,ask,spread`. Timestamps are bar open times, written as
//! `%Y-%m-%d %H:%M:%S` or with a `T` separator. Anything malformed is fatal:
//! the engine never sees a partially loaded file.

use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use replaylab_core::domain::Bar;

/// Timestamp format used on both ingestion and export.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const TIMESTAMP_FORMAT_T: &str = "%Y-%m-%dT%H:%M:%S";

/// Errors from the ingestion layer.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read '{path}': {source}")]
    Csv { path: PathBuf, source: csv::Error },

    #[error("line {line}: unparsable timestamp '{value}'")]
    Timestamp { line: u64, value: String },

    #[error("line {line}: timestamp {timestamp} is not after the previous bar")]
    NotIncreasing { line: u64, timestamp: NaiveDateTime },

    #[error("'{path}' has no '{column}' column")]
    MissingColumn { path: PathBuf, column: &'static str },

    #[error("line {line}: unparsable {column} '{value}'")]
    Number {
        line: u64,
        column: &'static str,
        value: String,
    },
}

#[derive(Debug, Deserialize)]
struct BarRow {
    timestamp: String,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    #[serde(default)]
    volume: Option<f64>,
    #[serde(default)]
    bid: Option<f64>,
    #[serde(default)]
    ask: Option<f64>,
    #[serde(default)]
    spread: Option<f64>,
}

pub fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    NaiveDateTime::parse_from_str(value, TIMESTAMP_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(value, TIMESTAMP_FORMAT_T))
        .ok()
}

/// Load an M5 bar file. Timestamps must be strictly increasing.
pub fn load_bars_csv(path: &Path) -> Result<Vec<Bar>, LoadError> {
    let csv_err = |source| LoadError::Csv {
        path: path.to_path_buf(),
        source,
    };
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(csv_err)?;

    let mut bars: Vec<Bar> = Vec::new();
    for row in reader.deserialize::<BarRow>() {
        let row = row.map_err(csv_err)?;
        // Header is line 1.
        let line = bars.len() as u64 + 2;
        let timestamp = parse_timestamp(&row.timestamp).ok_or_else(|| LoadError::Timestamp {
            line,
            value: row.timestamp.clone(),
        })?;
        if let Some(prev) = bars.last() {
            if timestamp <= prev.timestamp {
                return Err(LoadError::NotIncreasing { line, timestamp });
            }
        }
        bars.push(Bar {
            timestamp,
            open: row.open,
            high: row.high,
            low: row.low,
            close: row.close,
            volume: row.volume.unwrap_or(0.0),
            bid: row.bid,
            ask: row.ask,
            spread: row.spread,
        });
    }

    debug!(path = %path.display(), bars = bars.len(), "bars loaded");
    Ok(bars)
}

/// Write bars in the format `load_bars_csv` reads.
pub fn write_bars_csv(bars: &[Bar], path: &Path) -> Result<(), csv::Error> {
    let mut wtr = csv::Writer::from_path(path)?;
    wtr.write_record(["timestamp", "open", "high", "low", "close", "volume"])?;
    for bar in bars {
        wtr.write_record([
            bar.timestamp.format(TIMESTAMP_FORMAT).to_string(),
            format!("{:.6}", bar.open),
            format!("{:.6}", bar.high),
            format!("{:.6}", bar.low),
            format!("{:.6}", bar.close),
            format!("{}", bar.volume),
        ])?;
    }
    wtr.flush()?;
    Ok(())
}

/// Read the `r_multiple` column of a `trades.csv` tape.
pub fn load_trade_r_multiples(path: &Path) -> Result<Vec<f64>, LoadError> {
    let csv_err = |source| LoadError::Csv {
        path: path.to_path_buf(),
        source,
    };
    let mut reader = csv::Reader::from_path(path).map_err(csv_err)?;
    let column = reader
        .headers()
        .map_err(csv_err)?
        .iter()
        .position(|h| h == "r_multiple")
        .ok_or_else(|| LoadError::MissingColumn {
            path: path.to_path_buf(),
            column: "r_multiple",
        })?;

    let mut out = Vec::new();
    for (i, record) in reader.records().enumerate() {
        let record = record.map_err(csv_err)?;
        let line = i as u64 + 2;
        let value = record.get(column).unwrap_or("");
        let r = value.trim().parse::<f64>().map_err(|_| LoadError::Number {
            line,
            column: "r_multiple",
            value: value.to_string(),
        })?;
        out.push(r);
    }
    Ok(out)
}
