//! Mutable replay state and the run result.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::lifecycle::OpenTrade;
use crate::domain::{Trade, TradeIdGen};
use crate::records::FillRecord;
use crate::risk::RiskLedger;

/// Equity marked at one bar close: realized equity plus the open remainder.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EquityPoint {
    pub timestamp: NaiveDateTime,
    pub equity: f64,
}

/// State that evolves bar by bar during the replay.
pub struct EngineState {
    pub ledger: RiskLedger,
    pub ids: TradeIdGen,
    /// At most one position at a time.
    pub open: Option<OpenTrade>,
    /// Entries opened per calendar day.
    pub entries_per_day: BTreeMap<NaiveDate, u32>,
    pub trades: Vec<Trade>,
    pub fills: Vec<FillRecord>,
    pub equity_curve: Vec<EquityPoint>,
    pub signal_count: usize,
    pub event_count: usize,
    pub rejected_count: usize,
}

impl EngineState {
    pub fn new(ledger: RiskLedger) -> Self {
        Self {
            ledger,
            ids: TradeIdGen::default(),
            open: None,
            entries_per_day: BTreeMap::new(),
            trades: Vec::new(),
            fills: Vec::new(),
            equity_curve: Vec::new(),
            signal_count: 0,
            event_count: 0,
            rejected_count: 0,
        }
    }

    pub fn entries_on(&self, day: NaiveDate) -> u32 {
        self.entries_per_day.get(&day).copied().unwrap_or(0)
    }

    /// Realized equity plus the mark-to-market of the open trade.
    pub fn marked_equity(&self, unrealized: f64) -> f64 {
        self.ledger.equity() + unrealized
    }

    pub fn into_result(self, bar_count: usize, warmup_bars: usize) -> RunResult {
        RunResult {
            final_equity: self.ledger.equity(),
            trades: self.trades,
            fills: self.fills,
            equity_curve: self.equity_curve,
            signal_count: self.signal_count,
            event_count: self.event_count,
            rejected_count: self.rejected_count,
            bar_count,
            warmup_bars,
            ledger: self.ledger,
        }
    }
}

/// Result of a complete replay.
#[derive(Debug, Clone)]
pub struct RunResult {
    /// Closed trades in exit order.
    pub trades: Vec<Trade>,
    /// Every entry, partial and exit fill.
    pub fills: Vec<FillRecord>,
    /// Marked equity at each M5 bar close.
    pub equity_curve: Vec<EquityPoint>,
    pub final_equity: f64,
    /// Total M5 bars processed.
    pub bar_count: usize,
    /// Longest indicator lookback across the configured columns.
    pub warmup_bars: usize,
    /// Non-NONE signals reported by the model.
    pub signal_count: usize,
    pub event_count: usize,
    /// Signals refused at admission.
    pub rejected_count: usize,
    /// Final ledger snapshot with per-day and per-week records.
    pub ledger: RiskLedger,
}

impl RunResult {
    pub fn total_pnl(&self) -> f64 {
        self.ledger.total_realized_pnl()
    }

    /// Largest fractional peak-to-trough fall of the marked equity curve.
    pub fn max_drawdown(&self) -> f64 {
        let mut peak = f64::NEG_INFINITY;
        let mut worst: f64 = 0.0;
        for point in &self.equity_curve {
            peak = peak.max(point.equity);
            if peak > 0.0 {
                worst = worst.max((peak - point.equity) / peak);
            }
        }
        worst
    }
}
