//! RiskLedger — equity, peak equity and per-day / per-week accounting.
//!
//! Two streams feed the period records:
//! - `register_fill_pnl` for every partial or final exit fill (`pnl`), which
//!   also moves equity;
//! - `register_trade_result` once per closed trade (`trade_pnl`, `r_multiple`,
//!   `trades`), which never moves equity.
//!
//! Periods are only ever appended in time order. Touching a period finalizes
//! every earlier one; writing into a finalized period is an error.

use chrono::{Datelike, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use super::sizing::{position_size, PositionSize};
use crate::domain::Trade;

/// ISO (year, week).
pub type WeekKey = (i32, u32);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("{period} is finalized; cannot record at {timestamp}")]
    PeriodFinalized {
        period: String,
        timestamp: NaiveDateTime,
    },
}

/// Accumulators for one calendar day or ISO week.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PeriodRecord {
    /// Equity just before the first fill booked into this period.
    pub start_equity: Option<f64>,
    /// Realized PnL from fills.
    pub pnl: f64,
    /// PnL of trades that closed in this period.
    pub trade_pnl: f64,
    pub r_multiple: f64,
    pub trades: u32,
    pub finalized: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RiskLedger {
    starting_balance: f64,
    risk_per_trade_pct: f64,
    equity: f64,
    peak_equity: f64,
    total_realized_pnl: f64,
    days: BTreeMap<NaiveDate, PeriodRecord>,
    weeks: BTreeMap<WeekKey, PeriodRecord>,
}

fn week_key(ts: NaiveDateTime) -> WeekKey {
    let week = ts.date().iso_week();
    (week.year(), week.week())
}

/// Whether `key` may still be written: it must not be finalized or older
/// than the newest period already recorded.
fn writable<K: Ord>(periods: &BTreeMap<K, PeriodRecord>, key: &K) -> bool {
    match periods.last_key_value() {
        Some((last, _)) if key < last => false,
        _ => !periods.get(key).is_some_and(|r| r.finalized),
    }
}

fn touch<K: Ord + Copy>(periods: &mut BTreeMap<K, PeriodRecord>, key: K) -> &mut PeriodRecord {
    for (_, record) in periods.range_mut(..key) {
        record.finalized = true;
    }
    periods.entry(key).or_default()
}

impl RiskLedger {
    pub fn new(starting_balance: f64, risk_per_trade_pct: f64) -> Self {
        Self {
            starting_balance,
            risk_per_trade_pct,
            equity: starting_balance,
            peak_equity: starting_balance,
            total_realized_pnl: 0.0,
            days: BTreeMap::new(),
            weeks: BTreeMap::new(),
        }
    }

    /// Size a position at current equity.
    pub fn position_size(&self, entry: f64, stop: f64) -> PositionSize {
        position_size(self.equity, self.risk_per_trade_pct, entry, stop)
    }

    /// Admission hook for ledger-level limits. None are configured, so every
    /// trade is allowed.
    pub fn can_open_trade(&self, _at: NaiveDateTime) -> bool {
        true
    }

    fn check(&self, ts: NaiveDateTime) -> Result<(NaiveDate, WeekKey), LedgerError> {
        let day = ts.date();
        let week = week_key(ts);
        if !writable(&self.days, &day) {
            return Err(LedgerError::PeriodFinalized {
                period: format!("day {day}"),
                timestamp: ts,
            });
        }
        if !writable(&self.weeks, &week) {
            return Err(LedgerError::PeriodFinalized {
                period: format!("week {}-W{:02}", week.0, week.1),
                timestamp: ts,
            });
        }
        Ok((day, week))
    }

    /// Book realized PnL from a fill.
    pub fn register_fill_pnl(&mut self, ts: NaiveDateTime, delta: f64) -> Result<(), LedgerError> {
        let (day, week) = self.check(ts)?;
        let before = self.equity;
        self.equity += delta;
        self.peak_equity = self.peak_equity.max(self.equity);
        self.total_realized_pnl += delta;

        for record in [touch(&mut self.days, day), touch(&mut self.weeks, week)] {
            record.start_equity.get_or_insert(before);
            record.pnl += delta;
        }
        Ok(())
    }

    /// Attribute a closed trade to its exit period. Returns the PnL used.
    pub fn register_trade_result(&mut self, trade: &Trade) -> Result<f64, LedgerError> {
        let pnl = if trade.exit_fill.is_some() {
            trade.realized_pnl
        } else {
            trade.risk_amount * trade.r_multiple
        };
        let ts = trade.exit_time.unwrap_or(trade.entry_time);
        let (day, week) = self.check(ts)?;

        let with_r = trade.risk_amount > 0.0;
        for record in [touch(&mut self.days, day), touch(&mut self.weeks, week)] {
            record.trade_pnl += pnl;
            record.trades += 1;
            if with_r {
                record.r_multiple += trade.r_multiple;
            }
        }
        Ok(pnl)
    }

    // ── Accessors ──

    pub fn starting_balance(&self) -> f64 {
        self.starting_balance
    }

    pub fn equity(&self) -> f64 {
        self.equity
    }

    pub fn peak_equity(&self) -> f64 {
        self.peak_equity
    }

    /// Fractional drawdown from the peak.
    pub fn drawdown(&self) -> f64 {
        if self.peak_equity <= 0.0 {
            return 0.0;
        }
        (self.peak_equity - self.equity) / self.peak_equity
    }

    pub fn total_realized_pnl(&self) -> f64 {
        self.total_realized_pnl
    }

    pub fn day(&self, date: NaiveDate) -> Option<&PeriodRecord> {
        self.days.get(&date)
    }

    pub fn week(&self, key: WeekKey) -> Option<&PeriodRecord> {
        self.weeks.get(&key)
    }

    pub fn days(&self) -> &BTreeMap<NaiveDate, PeriodRecord> {
        &self.days
    }

    pub fn weeks(&self) -> &BTreeMap<WeekKey, PeriodRecord> {
        &self.weeks
    }
}
