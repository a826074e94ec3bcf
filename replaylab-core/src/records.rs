//! Output records — the four fixed-column streams the engine emits.
//!
//! Every row populates every column; "not applicable" is an empty string.
//! Payloads are JSON text. Sinks only receive rows: nothing they do can flow
//! back into the replay.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::{Direction, Trade, TradeId};

pub const EVENT_COLUMNS: [&str; 7] = [
    "timestamp",
    "state",
    "event_type",
    "signal",
    "bias",
    "confirmation",
    "payload",
];

pub const SIGNAL_COLUMNS: [&str; 6] = ["timestamp", "strategy", "signal", "reason", "price", "payload"];

pub const FILL_COLUMNS: [&str; 8] = [
    "timestamp",
    "trade_id",
    "kind",
    "direction",
    "size",
    "mid_price",
    "fill_price",
    "pnl",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub timestamp: NaiveDateTime,
    pub state: String,
    pub event_type: String,
    pub signal: String,
    pub bias: String,
    pub confirmation: String,
    pub payload: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalRecord {
    pub timestamp: NaiveDateTime,
    pub strategy: String,
    pub signal: String,
    pub reason: String,
    pub price: f64,
    pub payload: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FillKind {
    Entry,
    Partial,
    Exit,
}

impl FillKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Entry => "ENTRY",
            Self::Partial => "PARTIAL",
            Self::Exit => "EXIT",
        }
    }
}

impl fmt::Display for FillKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FillRecord {
    pub timestamp: NaiveDateTime,
    pub trade_id: TradeId,
    pub kind: FillKind,
    pub direction: Direction,
    pub size: f64,
    pub mid_price: f64,
    pub fill_price: f64,
    /// Realized PnL of this fill; zero for entries.
    pub pnl: f64,
}

/// Receiver for the engine's output rows.
pub trait RecordSink {
    fn event(&mut self, record: &EventRecord);
    fn trade(&mut self, trade: &Trade);
    fn signal(&mut self, record: &SignalRecord);
    fn fill(&mut self, record: &FillRecord);
}

/// Keeps every row in memory.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemorySink {
    pub events: Vec<EventRecord>,
    pub trades: Vec<Trade>,
    pub signals: Vec<SignalRecord>,
    pub fills: Vec<FillRecord>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events_of(&self, event_type: &str) -> impl Iterator<Item = &EventRecord> {
        let event_type = event_type.to_string();
        self.events.iter().filter(move |e| e.event_type == event_type)
    }
}

impl RecordSink for MemorySink {
    fn event(&mut self, record: &EventRecord) {
        self.events.push(record.clone());
    }

    fn trade(&mut self, trade: &Trade) {
        self.trades.push(trade.clone());
    }

    fn signal(&mut self, record: &SignalRecord) {
        self.signals.push(record.clone());
    }

    fn fill(&mut self, record: &FillRecord) {
        self.fills.push(record.clone());
    }
}
