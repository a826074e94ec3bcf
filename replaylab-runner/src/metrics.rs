//! Summary metrics — pure functions over the closed-trade list.
//!
//! Every metric is a pure function: trades and/or the equity curve in, scalar
//! out. Nothing here feeds back into a replay.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use replaylab_core::domain::{ExitReason, Trade};
use replaylab_core::RunResult;

/// Headline statistics for a single replay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub trade_count: usize,
    pub winners: usize,
    pub losers: usize,
    pub win_rate: f64,
    /// Mean R multiple per trade.
    pub expectancy_r: f64,
    pub avg_win_r: f64,
    pub avg_loss_r: f64,
    /// Gross profit over gross loss; `None` without a losing trade.
    pub profit_factor: Option<f64>,
    pub total_pnl: f64,
    pub final_equity: f64,
    /// Fractional peak-to-trough fall of the marked equity curve.
    pub max_drawdown: f64,
    pub avg_bars_held: f64,
    pub signal_count: usize,
    pub rejected_count: usize,
    /// Closed trades per exit reason; every reason is present.
    pub exit_reasons: BTreeMap<String, usize>,
}

impl Summary {
    pub fn compute(result: &RunResult) -> Self {
        let trades = &result.trades;
        Self {
            trade_count: trades.len(),
            winners: trades.iter().filter(|t| t.is_winner()).count(),
            losers: trades.iter().filter(|t| t.realized_pnl < 0.0).count(),
            win_rate: win_rate(trades),
            expectancy_r: expectancy_r(trades),
            avg_win_r: mean(trades.iter().filter(|t| t.r_multiple > 0.0).map(|t| t.r_multiple)),
            avg_loss_r: mean(trades.iter().filter(|t| t.r_multiple < 0.0).map(|t| t.r_multiple)),
            profit_factor: profit_factor(trades),
            total_pnl: result.total_pnl(),
            final_equity: result.final_equity,
            max_drawdown: result.max_drawdown(),
            avg_bars_held: mean(trades.iter().map(|t| t.bars_held as f64)),
            signal_count: result.signal_count,
            rejected_count: result.rejected_count,
            exit_reasons: exit_reason_counts(trades),
        }
    }
}

// ─── Individual metric functions ────────────────────────────────────

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, n) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    if n == 0 {
        0.0
    } else {
        sum / n as f64
    }
}

/// Fraction of trades with positive realized PnL.
pub fn win_rate(trades: &[Trade]) -> f64 {
    if trades.is_empty() {
        return 0.0;
    }
    trades.iter().filter(|t| t.is_winner()).count() as f64 / trades.len() as f64
}

/// Mean R multiple. Zero with no trades.
pub fn expectancy_r(trades: &[Trade]) -> f64 {
    mean(trades.iter().map(|t| t.r_multiple))
}

pub fn profit_factor(trades: &[Trade]) -> Option<f64> {
    let gross_profit: f64 = trades.iter().map(|t| t.realized_pnl.max(0.0)).sum();
    let gross_loss: f64 = trades.iter().map(|t| (-t.realized_pnl).max(0.0)).sum();
    if gross_loss > 0.0 {
        Some(gross_profit / gross_loss)
    } else {
        None
    }
}

pub fn exit_reason_counts(trades: &[Trade]) -> BTreeMap<String, usize> {
    let mut counts: BTreeMap<String, usize> = ExitReason::ALL
        .iter()
        .map(|r| (r.as_str().to_string(), 0))
        .collect();
    for reason in trades.iter().filter_map(|t| t.exit_reason) {
        *counts.entry(reason.as_str().to_string()).or_default() += 1;
    }
    counts
}
