//! Run fingerprinting — deterministic identification of a replay.
//!
//! - `ConfigHash`: BLAKE3 over the canonical JSON of the engine config.
//! - `DatasetHash`: BLAKE3 over the bar sequence (timestamps + OHLC bits).
//! - `RunFingerprint`: both hashes plus enough context to reproduce the run.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::domain::{Bar, ConfigHash, DatasetHash, RunId};

/// Structural identity of a configuration. Struct fields serialize in
/// declaration order, so the JSON is canonical.
pub fn config_hash(config: &EngineConfig) -> Result<ConfigHash, serde_json::Error> {
    let json = serde_json::to_vec(config)?;
    Ok(ConfigHash::from_bytes(&json))
}

/// Content hash of a bar sequence. Optional quote fields are included so two
/// files differing only in spreads hash differently.
pub fn dataset_hash(bars: &[Bar]) -> DatasetHash {
    let mut hasher = blake3::Hasher::new();
    for bar in bars {
        hasher.update(&bar.timestamp.and_utc().timestamp().to_le_bytes());
        for v in [bar.open, bar.high, bar.low, bar.close, bar.volume] {
            hasher.update(&v.to_bits().to_le_bytes());
        }
        for q in [bar.bid, bar.ask, bar.spread] {
            match q {
                Some(v) => hasher.update(&v.to_bits().to_le_bytes()),
                None => hasher.update(&[0xff]),
            };
        }
    }
    DatasetHash(hasher.finalize().to_hex().to_string())
}

/// Complete fingerprint of a single replay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunFingerprint {
    // ── Identity ──
    pub run_id: RunId,
    pub run_hash: String,

    // ── Context ──
    pub model: String,
    pub bar_count: usize,
    pub first_bar: Option<NaiveDateTime>,
    pub last_bar: Option<NaiveDateTime>,
    pub starting_balance: f64,
}

impl RunFingerprint {
    pub fn new(config: &EngineConfig, model: &str, bars: &[Bar]) -> Result<Self, serde_json::Error> {
        let run_id = RunId::new(config_hash(config)?, dataset_hash(bars));
        Ok(Self {
            run_hash: run_id.hash(),
            run_id,
            model: model.to_string(),
            bar_count: bars.len(),
            first_bar: bars.first().map(|b| b.timestamp),
            last_bar: bars.last().map(|b| b.timestamp),
            starting_balance: config.starting_balance,
        })
    }
}
