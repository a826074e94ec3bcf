//! Bar-by-bar replay loop — the heart of the simulation.
//!
//! Four phases per M5 bar:
//! 1. Manage: advance the open trade (bars after its entry bar only)
//! 2. Evaluate: run the signal model on look-ahead-safe views
//! 3. Admit: gate the model's plan and open the trade at the bar close
//! 4. Post-bar: mark equity
//!
//! An open trade left at the end of the data is closed at the final close.

use chrono::NaiveDateTime;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use super::costs::CostModel;
use super::lifecycle::{ma_crossed_against, EntryOrder, ExitFill, LifecycleEvent, OpenTrade};
use super::precompute::Frames;
use super::state::{EngineState, EquityPoint};
use crate::components::signal::{ExitRules, ModelInput, SignalModel, TargetRule, TradePlan};
use crate::config::{CostSanityConfig, EngineConfig};
use crate::data::closed_before;
use crate::domain::{Bar, ExitReason, Signal, Trade};
use crate::records::{EventRecord, FillKind, FillRecord, RecordSink, SignalRecord};
use crate::risk::LedgerError;

pub(crate) struct Replay<'a> {
    config: &'a EngineConfig,
    costs: CostModel,
    model: &'a mut dyn SignalModel,
    sink: &'a mut dyn RecordSink,
    state: EngineState,
}

impl<'a> Replay<'a> {
    pub(crate) fn new(
        config: &'a EngineConfig,
        costs: CostModel,
        model: &'a mut dyn SignalModel,
        sink: &'a mut dyn RecordSink,
        state: EngineState,
    ) -> Self {
        Self {
            config,
            costs,
            model,
            sink,
            state,
        }
    }

    pub(crate) fn run(mut self, frames: &Frames) -> Result<EngineState, LedgerError> {
        for i in 0..frames.m5.len() {
            self.step(frames, i)?;
        }
        self.close_at_end(frames)?;
        Ok(self.state)
    }

    fn step(&mut self, frames: &Frames, i: usize) -> Result<(), LedgerError> {
        let bar = &frames.m5.bars[i];

        // ─── Phase 1: Manage ───
        // The entry bar itself is never managed.
        self.manage_open_trade(frames, i, bar)?;

        // ─── Phase 2: Evaluate ───
        // Higher timeframes expose only bars closed strictly before this bar.
        let input = ModelInput {
            bar_index: i,
            bar,
            m5: frames.m5.view(i + 1),
            m15: frames.m15.view(closed_before(&frames.m15.bars, bar.timestamp)),
            h1: frames.h1.view(closed_before(&frames.h1.bars, bar.timestamp)),
        };
        let result = self.model.evaluate(&input);
        let signal = result.signal;
        for event in result.events {
            self.emit(bar.timestamp, event.event_type, signal, event.payload);
        }

        // ─── Phase 3: Admit ───
        if !signal.is_none() {
            self.record_signal(bar, signal, &result.reason, result.payload);
            if let Some(plan) = result.plan {
                match self.admit(&plan, &result.reason, i, bar) {
                    Ok(order) => self.open_trade(order, plan.exits, signal),
                    Err(reason) => self.reject(bar, signal, &reason),
                }
            }
        }

        // ─── Phase 4: Post-bar ───
        let unrealized = self
            .state
            .open
            .as_ref()
            .map_or(0.0, |open| open.unrealized_pnl(bar.close, &self.costs));
        let equity = self.state.marked_equity(unrealized);
        self.state.equity_curve.push(EquityPoint {
            timestamp: bar.timestamp,
            equity,
        });
        Ok(())
    }

    // ── Phase 1 ──

    fn manage_open_trade(&mut self, frames: &Frames, i: usize, bar: &Bar) -> Result<(), LedgerError> {
        let Some(open) = self.state.open.as_mut() else {
            return Ok(());
        };
        if i <= open.trade.entry_bar {
            return Ok(());
        }
        let crossed = open.exits.ma_cross_exit
            && ma_crossed_against(open.trade.direction, &frames.m5.view(i + 1), i);
        let events = open.on_bar(i, bar, crossed, &self.costs);

        for event in events {
            match event {
                LifecycleEvent::PartialExit(fill) => {
                    self.book_fill(&fill)?;
                    let payload = self.trade_payload(|t| {
                        json!({
                            "trade_id": t.id.0,
                            "fill_price": fill.fill,
                            "size": fill.size,
                            "pnl": fill.pnl,
                            "remaining_fraction": t.remaining_fraction,
                            "stop_loss": t.stop_loss,
                        })
                    });
                    self.emit(bar.timestamp, "PARTIAL_EXIT", Signal::None, payload);
                }
                LifecycleEvent::BreakEvenArmed { from_bar, stop, mfe_r } => {
                    let payload = self.trade_payload(|t| {
                        json!({
                            "trade_id": t.id.0,
                            "from_bar": from_bar,
                            "stop": stop,
                            "mfe_r": mfe_r,
                        })
                    });
                    self.emit(bar.timestamp, "BREAK_EVEN_ARMED", Signal::None, payload);
                }
                LifecycleEvent::Closed(fill) => self.close_trade(fill, false)?,
            }
        }
        Ok(())
    }

    fn trade_payload(&self, f: impl FnOnce(&Trade) -> Value) -> Value {
        self.state
            .open
            .as_ref()
            .map_or(Value::Null, |open| f(&open.trade))
    }

    /// Book an exit fill against the open trade.
    fn book_fill(&mut self, fill: &ExitFill) -> Result<(), LedgerError> {
        let Some(open) = self.state.open.as_ref() else {
            return Ok(());
        };
        let (trade_id, direction) = (open.trade.id, open.trade.direction);
        self.state.ledger.register_fill_pnl(fill.timestamp, fill.pnl)?;
        self.push_fill(FillRecord {
            timestamp: fill.timestamp,
            trade_id,
            kind: fill.kind,
            direction,
            size: fill.size,
            mid_price: fill.mid,
            fill_price: fill.fill,
            pnl: fill.pnl,
        });
        Ok(())
    }

    fn push_fill(&mut self, record: FillRecord) {
        self.sink.fill(&record);
        self.state.fills.push(record);
    }

    fn close_trade(&mut self, fill: ExitFill, end_of_data: bool) -> Result<(), LedgerError> {
        self.book_fill(&fill)?;
        let Some(open) = self.state.open.take() else {
            return Ok(());
        };
        let trade = open.trade;
        self.state.ledger.register_trade_result(&trade)?;
        self.sink.trade(&trade);

        let reason = trade.exit_reason.map_or("", |r| r.as_str());
        info!(
            trade_id = trade.id.0,
            direction = trade.direction.as_str(),
            reason,
            pnl = trade.realized_pnl,
            r = trade.r_multiple,
            bars_held = trade.bars_held,
            "trade closed"
        );
        self.emit(
            fill.timestamp,
            "TRADE_CLOSED",
            Signal::None,
            json!({
                "trade_id": trade.id.0,
                "direction": trade.direction.as_str(),
                "reason": reason,
                "exit_price": fill.fill,
                "pnl": trade.realized_pnl,
                "r_multiple": trade.r_multiple,
                "bars_held": trade.bars_held,
                "end_of_data": end_of_data,
            }),
        );
        self.model.on_position_closed(fill.timestamp);
        self.state.trades.push(trade);
        Ok(())
    }

    fn close_at_end(&mut self, frames: &Frames) -> Result<(), LedgerError> {
        let Some(last) = frames.m5.bars.last() else {
            return Ok(());
        };
        let Some(open) = self.state.open.as_mut() else {
            return Ok(());
        };
        let fill = open.force_close(last, ExitReason::TimeExit, &self.costs);
        self.close_trade(fill, true)
    }

    // ── Phase 3 ──

    fn record_signal(&mut self, bar: &Bar, signal: Signal, reason: &str, payload: Value) {
        self.state.signal_count += 1;
        let strategy = self.model.name().to_string();
        self.sink.signal(&SignalRecord {
            timestamp: bar.timestamp,
            strategy: strategy.clone(),
            signal: signal.as_str().to_string(),
            reason: reason.to_string(),
            price: bar.close,
            payload: payload.to_string(),
        });
        self.emit(
            bar.timestamp,
            "SIGNAL",
            signal,
            json!({
                "strategy": strategy,
                "reason": reason,
                "price": bar.close,
                "details": payload,
            }),
        );
    }

    /// Resolve a plan into an order, or the reason it may not be opened.
    fn admit(
        &mut self,
        plan: &TradePlan,
        reason: &str,
        i: usize,
        bar: &Bar,
    ) -> Result<EntryOrder, String> {
        if self.state.open.is_some() {
            return Err("position already open".into());
        }
        let day = bar.timestamp.date();
        if let Some(max) = self.config.max_trades_per_day {
            if self.state.entries_on(day) >= max {
                return Err(format!("max trades per day reached ({max})"));
            }
        }
        if !self.state.ledger.can_open_trade(bar.timestamp) {
            return Err("ledger refused new trade".into());
        }

        let direction = plan.direction;
        let sign = direction.sign();
        let fill = self.costs.entry_fill(bar.close, direction);
        let stop = plan.stop.resolve(direction, fill);
        if (fill - stop) * sign <= 0.0 {
            return Err(format!("stop {stop:.5} on wrong side of entry {fill:.5}"));
        }

        let sizing = self.state.ledger.position_size(fill, stop);
        let unit = sizing.stop_distance;
        let target = match plan.target {
            TargetRule::RMultiple(r) => fill + sign * r * unit,
            TargetRule::Distance(d) => fill + sign * d,
        };
        let tp1 = plan.tp1.map(|(r, fraction)| (fill + sign * r * unit, fraction));

        check_costs(&self.config.cost_sanity, &self.costs, plan.atr, fill, unit, target)?;
        if !(sizing.size.is_finite() && sizing.size > 0.0) {
            return Err("position size is zero".into());
        }

        Ok(EntryOrder {
            id: self.state.ids.next_id(),
            strategy: self.model.name().to_string(),
            setup_reason: reason.to_string(),
            direction,
            bar_index: i,
            timestamp: bar.timestamp,
            mid: bar.close,
            fill,
            stop,
            target,
            tp1,
            sizing,
        })
    }

    fn reject(&mut self, bar: &Bar, signal: Signal, reason: &str) {
        self.state.rejected_count += 1;
        warn!(ts = %bar.timestamp, signal = signal.as_str(), reason, "entry rejected");
        self.emit(
            bar.timestamp,
            "ENTRY_REJECTED",
            signal,
            json!({ "reason": reason, "price": bar.close }),
        );
    }

    fn open_trade(&mut self, order: EntryOrder, exits: ExitRules, signal: Signal) {
        let ts = order.timestamp;
        *self.state.entries_per_day.entry(ts.date()).or_default() += 1;
        let open = OpenTrade::new(order, exits);
        let t = &open.trade;

        info!(
            trade_id = t.id.0,
            direction = t.direction.as_str(),
            entry = t.entry_fill,
            stop = t.stop_loss,
            target = t.take_profit,
            size = t.size,
            "trade opened"
        );
        let entry = FillRecord {
            timestamp: ts,
            trade_id: t.id,
            kind: FillKind::Entry,
            direction: t.direction,
            size: t.size,
            mid_price: t.entry_mid,
            fill_price: t.entry_fill,
            pnl: 0.0,
        };
        let payload = json!({
            "trade_id": t.id.0,
            "direction": t.direction.as_str(),
            "setup": t.setup_reason,
            "entry_mid": t.entry_mid,
            "entry_fill": t.entry_fill,
            "stop_loss": t.stop_loss,
            "take_profit": t.take_profit,
            "tp1": t.tp1,
            "size": t.size,
            "risk_amount": t.risk_amount,
        });

        self.state.open = Some(open);
        self.push_fill(entry);
        self.model.on_position_opened(ts);
        self.emit(ts, "TRADE_OPENED", signal, payload);
    }

    // ── Records ──

    fn emit(&mut self, timestamp: NaiveDateTime, event_type: &str, signal: Signal, payload: Value) {
        let status = self.model.status();
        debug!(ts = %timestamp, event_type, state = %status.state, "event");
        self.sink.event(&EventRecord {
            timestamp,
            state: status.state,
            event_type: event_type.to_string(),
            signal: if signal.is_none() {
                String::new()
            } else {
                signal.as_str().to_string()
            },
            bias: status.bias,
            confirmation: status.confirmation,
            payload: payload.to_string(),
        });
        self.state.event_count += 1;
    }
}

/// Cost and distance bounds on a resolved entry.
fn check_costs(
    bounds: &CostSanityConfig,
    costs: &CostModel,
    atr: Option<f64>,
    fill: f64,
    stop_distance: f64,
    target: f64,
) -> Result<(), String> {
    if let (Some(max), Some(atr)) = (bounds.max_cost_atr_mult, atr) {
        let cost = costs.round_trip();
        if cost > max * atr {
            return Err(format!("round-trip cost {cost:.5} exceeds {max} x ATR {atr:.5}"));
        }
    }
    if fill <= 0.0 {
        return Ok(());
    }
    if let Some(max) = bounds.max_sl_frac {
        let frac = stop_distance / fill;
        if frac > max {
            return Err(format!("stop distance {frac:.5} of entry exceeds {max}"));
        }
    }
    if let Some(max) = bounds.max_tp_frac {
        let frac = (target - fill).abs() / fill;
        if frac > max {
            return Err(format!("target distance {frac:.5} of entry exceeds {max}"));
        }
    }
    Ok(())
}
