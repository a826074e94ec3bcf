//! Trade lifecycle — one open position from fill to final exit.
//!
//! Management starts on the bar after the entry bar. Per bar:
//!
//! 1. excursion (MAE/MFE in R) from the bar's extremes
//! 2. stop-loss, while break-even is not active
//! 3. first target: close `partial_fraction`, move the stop to entry
//!    (active from the next bar)
//! 4. full target
//! 5. holding-bar limit, at the close
//! 6. moving-average cross against the trade, at the close
//! 7. break-even stop, once active
//!
//! then the MFE-based break-even trigger. When one bar spans both stop and
//! target, the stop wins.

use chrono::NaiveDateTime;

use super::costs::CostModel;
use crate::components::signal::ExitRules;
use crate::data::{columns, FrameView};
use crate::domain::{Bar, Direction, ExitReason, Trade, TradeId};
use crate::records::FillKind;
use crate::risk::PositionSize;

/// Everything needed to open a trade, resolved at admission time.
#[derive(Debug, Clone, PartialEq)]
pub struct EntryOrder {
    pub id: TradeId,
    pub strategy: String,
    pub setup_reason: String,
    pub direction: Direction,
    pub bar_index: usize,
    pub timestamp: NaiveDateTime,
    pub mid: f64,
    pub fill: f64,
    pub stop: f64,
    pub target: f64,
    /// First target price and the fraction closed there.
    pub tp1: Option<(f64, f64)>,
    pub sizing: PositionSize,
}

/// A booked exit, partial or final.
#[derive(Debug, Clone, PartialEq)]
pub struct ExitFill {
    pub timestamp: NaiveDateTime,
    pub kind: FillKind,
    pub reason: Option<ExitReason>,
    pub mid: f64,
    pub fill: f64,
    pub size: f64,
    pub pnl: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LifecycleEvent {
    PartialExit(ExitFill),
    BreakEvenArmed { from_bar: usize, stop: f64, mfe_r: f64 },
    Closed(ExitFill),
}

#[derive(Debug, Clone)]
pub struct OpenTrade {
    pub trade: Trade,
    pub exits: ExitRules,
    /// First bar index at which the break-even stop is live.
    break_even_from: Option<usize>,
}

impl OpenTrade {
    pub fn new(order: EntryOrder, exits: ExitRules) -> Self {
        let (tp1, partial_fraction) = match order.tp1 {
            Some((price, fraction)) => (Some(price), fraction),
            None => (None, 0.0),
        };
        let trade = Trade {
            id: order.id,
            strategy: order.strategy,
            setup_reason: order.setup_reason,
            direction: order.direction,
            entry_bar: order.bar_index,
            entry_time: order.timestamp,
            entry_mid: order.mid,
            entry_fill: order.fill,
            initial_stop: order.stop,
            stop_loss: order.stop,
            take_profit: order.target,
            tp1,
            partial_fraction,
            size: order.sizing.size,
            remaining_fraction: 1.0,
            risk_amount: order.sizing.risk_amount,
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
        };
        Self {
            trade,
            exits,
            break_even_from: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.trade.is_open()
    }

    /// Mark-to-market value of the open remainder at `mid`.
    pub fn unrealized_pnl(&self, mid: f64, costs: &CostModel) -> f64 {
        let t = &self.trade;
        let exit = costs.exit_fill(mid, t.direction);
        (exit - t.entry_fill) * t.direction.sign() * t.remaining_size()
    }

    /// Advance one bar after the entry bar.
    pub fn on_bar(
        &mut self,
        bar_index: usize,
        bar: &Bar,
        ma_crossed: bool,
        costs: &CostModel,
    ) -> Vec<LifecycleEvent> {
        let mut events = Vec::new();
        if !self.is_open() {
            return events;
        }

        self.trade.bars_held += 1;
        self.trade.minutes_held = (bar.timestamp - self.trade.entry_time).num_minutes();
        self.update_excursion(bar);

        let direction = self.trade.direction;
        let break_even_live = self.break_even_from.is_some_and(|from| bar_index >= from);

        if !break_even_live && stop_touched(direction, bar, self.trade.stop_loss) {
            let fill = self.finish(bar.timestamp, self.trade.stop_loss, ExitReason::StopHit, costs);
            events.push(LifecycleEvent::Closed(fill));
            return events;
        }

        if let Some(tp1) = self.trade.tp1 {
            if !self.trade.tp1_hit && target_touched(direction, bar, tp1) {
                let fraction = self.trade.partial_fraction;
                let fill = self.close_fraction(bar.timestamp, tp1, fraction, FillKind::Partial, costs);
                self.trade.tp1_hit = true;
                events.push(LifecycleEvent::PartialExit(fill));
                events.push(self.arm_break_even(bar_index));
            }
        }

        let exit = if target_touched(direction, bar, self.trade.take_profit) {
            Some((self.trade.take_profit, ExitReason::TargetHit))
        } else if self
            .exits
            .max_hold_bars
            .is_some_and(|max| self.trade.bars_held >= max)
        {
            Some((bar.close, ExitReason::TimeExit))
        } else if self.exits.ma_cross_exit && ma_crossed {
            Some((bar.close, ExitReason::MaCrossExit))
        } else if break_even_live && stop_touched(direction, bar, self.trade.stop_loss) {
            Some((self.trade.stop_loss, ExitReason::BreakEvenStopHit))
        } else {
            None
        };
        if let Some((mid, reason)) = exit {
            let fill = self.finish(bar.timestamp, mid, reason, costs);
            events.push(LifecycleEvent::Closed(fill));
            return events;
        }

        if let Some(trigger) = self.exits.break_even_trigger_r {
            if !self.trade.break_even_moved && self.trade.mfe_r >= trigger {
                events.push(self.arm_break_even(bar_index));
            }
        }
        events
    }

    /// Close the remainder at `bar.close`, e.g. at end of data.
    pub fn force_close(&mut self, bar: &Bar, reason: ExitReason, costs: &CostModel) -> ExitFill {
        self.finish(bar.timestamp, bar.close, reason, costs)
    }

    fn update_excursion(&mut self, bar: &Bar) {
        let (adverse, favorable) = match self.trade.direction {
            Direction::Long => (bar.low, bar.high),
            Direction::Short => (bar.high, bar.low),
        };
        let t = &mut self.trade;
        let (mae, mfe) = (t.r_at(adverse), t.r_at(favorable));
        t.mae_r = t.mae_r.min(mae);
        t.mfe_r = t.mfe_r.max(mfe);
    }

    fn arm_break_even(&mut self, bar_index: usize) -> LifecycleEvent {
        let from_bar = bar_index + 1;
        self.trade.break_even_moved = true;
        self.trade.stop_loss = self.trade.entry_fill;
        self.break_even_from = Some(from_bar);
        LifecycleEvent::BreakEvenArmed {
            from_bar,
            stop: self.trade.stop_loss,
            mfe_r: self.trade.mfe_r,
        }
    }

    fn close_fraction(
        &mut self,
        ts: NaiveDateTime,
        mid: f64,
        fraction: f64,
        kind: FillKind,
        costs: &CostModel,
    ) -> ExitFill {
        let t = &mut self.trade;
        let fraction = fraction.min(t.remaining_fraction);
        let size = t.size * fraction;
        let fill = costs.exit_fill(mid, t.direction);
        let pnl = (fill - t.entry_fill) * t.direction.sign() * size;
        t.remaining_fraction -= fraction;
        t.realized_pnl += pnl;
        ExitFill {
            timestamp: ts,
            kind,
            reason: None,
            mid,
            fill,
            size,
            pnl,
        }
    }

    fn finish(&mut self, ts: NaiveDateTime, mid: f64, reason: ExitReason, costs: &CostModel) -> ExitFill {
        let remaining = self.trade.remaining_fraction;
        let mut fill = self.close_fraction(ts, mid, remaining, FillKind::Exit, costs);
        fill.reason = Some(reason);

        let t = &mut self.trade;
        t.remaining_fraction = 0.0;
        t.minutes_held = (ts - t.entry_time).num_minutes();
        t.exit_time = Some(ts);
        t.exit_mid = Some(mid);
        t.exit_fill = Some(fill.fill);
        t.exit_reason = Some(reason);
        t.r_multiple = if t.risk_amount > 0.0 {
            t.realized_pnl / t.risk_amount
        } else {
            0.0
        };
        fill
    }
}

fn stop_touched(direction: Direction, bar: &Bar, stop: f64) -> bool {
    match direction {
        Direction::Long => bar.low <= stop,
        Direction::Short => bar.high >= stop,
    }
}

fn target_touched(direction: Direction, bar: &Bar, target: f64) -> bool {
    match direction {
        Direction::Long => bar.high >= target,
        Direction::Short => bar.low <= target,
    }
}

/// Fast EMA crossed the slow EMA against `direction` on bar `i`.
pub fn ma_crossed_against(direction: Direction, m5: &FrameView<'_>, i: usize) -> bool {
    let Some(prev) = i.checked_sub(1) else {
        return false;
    };
    let (Some(fast), Some(slow), Some(prev_fast), Some(prev_slow)) = (
        m5.value(columns::EMA_FAST, i),
        m5.value(columns::EMA_SLOW, i),
        m5.value(columns::EMA_FAST, prev),
        m5.value(columns::EMA_SLOW, prev),
    ) else {
        return false;
    };
    match direction {
        Direction::Long => prev_fast >= prev_slow && fast < slow,
        Direction::Short => prev_fast <= prev_slow && fast > slow,
    }
}
