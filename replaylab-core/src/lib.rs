//! ReplayLab Core — deterministic multi-timeframe bar replay.
//!
//! This crate contains the whole simulation:
//! - Domain types (bars, signals, trades, ids)
//! - Timeframe aggregation (M5 → M15/H1) with look-ahead-safe views
//! - Causal indicators (EMA, SMA, Wilder ATR)
//! - Staged evaluators (H1 bias → M15 confirmation → M5 entry)
//! - Session-windowed alternate evaluators (mean reversion, shock, opening range)
//! - Trade lifecycle, risk ledger and the bar-by-bar engine
//! - Fixed-column output records

pub mod components;
pub mod config;
pub mod data;
pub mod domain;
pub mod engine;
pub mod fingerprint;
pub mod indicators;
pub mod records;
pub mod risk;
pub mod rng;

pub use config::{ConfigError, EngineConfig};
pub use data::synthetic;
pub use engine::{Engine, EngineError, RunResult};
pub use records::{MemorySink, RecordSink};

#[cfg(test)]
mod tests {
    use super::*;

    /// Compile-time check: data and result types can cross threads.
    ///
    /// The runner hands finished results to rayon workers; if any type fails
    /// this check, the build breaks immediately.
    #[allow(dead_code)]
    fn assert_send_sync() {
        fn require_send<T: Send>() {}
        fn require_sync<T: Sync>() {}

        // Domain types
        require_send::<domain::Bar>();
        require_sync::<domain::Bar>();
        require_send::<domain::Trade>();
        require_sync::<domain::Trade>();
        require_send::<domain::TradeId>();
        require_sync::<domain::TradeId>();
        require_send::<domain::RunId>();
        require_sync::<domain::RunId>();

        // Frames and records
        require_send::<data::Frame>();
        require_sync::<data::Frame>();
        require_send::<records::EventRecord>();
        require_sync::<records::EventRecord>();
        require_send::<records::FillRecord>();
        require_sync::<records::FillRecord>();
        require_send::<records::MemorySink>();
        require_sync::<records::MemorySink>();

        // Engine
        require_send::<engine::Engine>();
        require_send::<engine::RunResult>();
        require_sync::<engine::RunResult>();
        require_send::<risk::RiskLedger>();
        require_sync::<risk::RiskLedger>();

        // Config
        require_send::<config::EngineConfig>();
        require_sync::<config::EngineConfig>();
        require_send::<fingerprint::RunFingerprint>();
        require_sync::<fingerprint::RunFingerprint>();
    }
}
