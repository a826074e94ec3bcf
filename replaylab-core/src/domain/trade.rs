//! Trade — one position from fill to final exit.

use super::ids::TradeId;
use super::signal::Direction;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Why a trade was closed. Mandatory on every closed trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExitReason {
    StopHit,
    TargetHit,
    TimeExit,
    MaCrossExit,
    BreakEvenStopHit,
}

impl ExitReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::StopHit => "STOP_HIT",
            Self::TargetHit => "TARGET_HIT",
            Self::TimeExit => "TIME_EXIT",
            Self::MaCrossExit => "MA_CROSS_EXIT",
            Self::BreakEvenStopHit => "BREAK_EVEN_STOP_HIT",
        }
    }

    pub const ALL: [ExitReason; 5] = [
        Self::StopHit,
        Self::TargetHit,
        Self::TimeExit,
        Self::MaCrossExit,
        Self::BreakEvenStopHit,
    ];
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A trade, created at fill and finalized exactly once at exit.
///
/// Prices come in pairs: `*_mid` is the bar price the decision was made at,
/// `*_fill` is the cost-adjusted price actually booked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    // ── Identification ──
    pub id: TradeId,
    pub strategy: String,
    pub setup_reason: String,
    pub direction: Direction,

    // ── Entry ──
    pub entry_bar: usize,
    pub entry_time: NaiveDateTime,
    pub entry_mid: f64,
    pub entry_fill: f64,

    // ── Levels ──
    pub initial_stop: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub tp1: Option<f64>,
    pub partial_fraction: f64,

    // ── Size and risk ──
    pub size: f64,
    pub remaining_fraction: f64,
    pub risk_amount: f64,

    // ── Partial-exit state ──
    pub tp1_hit: bool,
    pub break_even_moved: bool,

    // ── Excursion (R units) ──
    pub mae_r: f64,
    pub mfe_r: f64,

    // ── Duration ──
    pub bars_held: usize,
    pub minutes_held: i64,

    // ── Exit ──
    pub exit_time: Option<NaiveDateTime>,
    pub exit_mid: Option<f64>,
    pub exit_fill: Option<f64>,
    pub exit_reason: Option<ExitReason>,

    // ── Result ──
    pub realized_pnl: f64,
    pub r_multiple: f64,
}

impl Trade {
    pub fn is_open(&self) -> bool {
        self.exit_reason.is_none()
    }

    /// Price distance between the fill and the initial stop; the unit of R.
    pub fn risk_per_unit(&self) -> f64 {
        (self.entry_fill - self.initial_stop).abs()
    }

    /// Signed favorable move from the fill, in R units.
    pub fn r_at(&self, price: f64) -> f64 {
        let unit = self.risk_per_unit();
        if unit <= 0.0 {
            return 0.0;
        }
        (price - self.entry_fill) * self.direction.sign() / unit
    }

    /// Size still open.
    pub fn remaining_size(&self) -> f64 {
        self.size * self.remaining_fraction
    }

    pub fn is_winner(&self) -> bool {
        self.realized_pnl > 0.0
    }
}

/// Open long trade at 100 with a 98 stop, for tests.
#[cfg(test)]
pub(crate) fn sample_trade() -> Trade {
    let ts = chrono::NaiveDate::from_ymd_opt(2024, 3, 4)
        .unwrap()
        .and_hms_opt(10, 0, 0)
        .unwrap();
    Trade {
        id: TradeId(1),
        strategy: "staged".into(),
        setup_reason: "micro swing breakout".into(),
        direction: Direction::Long,
        entry_bar: 10,
        entry_time: ts,
        entry_mid: 100.0,
        entry_fill: 100.0,
        initial_stop: 98.0,
        stop_loss: 98.0,
        take_profit: 104.0,
        tp1: None,
        partial_fraction: 0.0,
        size: 50.0,
        remaining_fraction: 1.0,
        risk_amount: 100.0,
        tp1_hit: false,
        break_even_moved: false,
        mae_r: 0.0,
        mfe_r: 0.0,
        bars_held: 0,
        minutes_held: 0,
        exit_time: None,
        exit_mid: None,
        exit_fill: None,
        exit_reason: None,
        realized_pnl: 0.0,
        r_multiple: 0.0,
    }
}
