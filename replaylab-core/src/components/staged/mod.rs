//! Staged trend-following model: H1 bias → M15 confirmation → M5 entry.
//!
//! ```text
//! WAIT_H1_BIAS ──bias≠NONE──▶ WAIT_M15_CONFIRM ──OK──▶ WAIT_M5_ENTRY ──fill──▶ IN_TRADE
//!      ▲                             │ invalidated           │ expired            │ closed
//!      └─────────────────────────────┴───────────────────────┴────────────────────┘
//! ```
//!
//! A bias flip while waiting discards the armed contexts and returns to
//! WAIT_H1_BIAS, where the new bias re-arms immediately. Arming always needs
//! an H1 evaluation that has not been consumed yet.
//!
//! While waiting for confirmation, every H1 close replaces the armed context.
//! When its structural break has moved, the zone is rebuilt from the new
//! level and the M15 scan restarts after that H1 close. A flip seen during a
//! trade stays unconsumed, so the opposite bias arms as soon as the trade
//! closes.

pub mod bias;
pub mod confirmation;
pub mod entry;

pub use bias::{BiasContext, BiasEvaluator, BiasParams, BiasReason, StructuralBreak};
pub use confirmation::{
    ConfirmationContext, ConfirmationEvaluator, ConfirmationParams, ConfirmationReason, RetestZone,
};
pub use entry::{EntryEvaluator, EntryParams, EntryReason, EntrySetup};

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;
use tracing::debug;

use super::session::SessionWindows;
use super::signal::{
    ExitRules, ModelEvent, ModelInput, ModelStatus, SignalModel, SignalResult, StopRule,
    TargetRule, TradePlan,
};
use crate::config::StagedConfig;
use crate::data::columns;
use crate::domain::{Bias, Signal};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EnginePhase {
    WaitH1Bias,
    WaitM15Confirm,
    WaitM5Entry,
    InTrade,
}

impl EnginePhase {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::WaitH1Bias => "WAIT_H1_BIAS",
            Self::WaitM15Confirm => "WAIT_M15_CONFIRM",
            Self::WaitM5Entry => "WAIT_M5_ENTRY",
            Self::InTrade => "IN_TRADE",
        }
    }
}

impl fmt::Display for EnginePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Setup that survived arming: the bias it came from and its fixed zone.
#[derive(Debug, Clone)]
struct Armed {
    bias: BiasContext,
    zone: RetestZone,
    armed_at: NaiveDateTime,
    confirmation: Option<ConfirmationContext>,
    confirmed_at_bar: Option<usize>,
}

pub struct StagedModel {
    bias_eval: BiasEvaluator,
    confirm_eval: ConfirmationEvaluator,
    entry_eval: EntryEvaluator,
    windows: SessionWindows,
    target_r: f64,
    tp1: Option<(f64, f64)>,
    exits: ExitRules,
    entry_expiry_bars: Option<usize>,

    phase: EnginePhase,
    latest_bias: Option<BiasContext>,
    h1_seen: usize,
    bias_fresh: bool,
    armed: Option<Armed>,
    trade_bias: Option<Bias>,
}

impl StagedModel {
    pub fn new(config: &StagedConfig, windows: SessionWindows) -> Self {
        Self {
            bias_eval: BiasEvaluator::new(BiasParams {
                min_bars: config.min_bars,
                slope_lookback: config.slope_lookback,
                bias_dist_mult: config.bias_dist_mult,
                min_sep_mult: config.min_sep_mult,
                structure_lookback: config.structure_lookback,
                structure_window: config.structure_window,
            }),
            confirm_eval: ConfirmationEvaluator::new(ConfirmationParams {
                zone_atr_mult: config.zone_atr_mult,
                reversal_frac: config.reversal_frac,
            }),
            entry_eval: EntryEvaluator::new(EntryParams {
                swing_lookback: config.swing_lookback,
                buffer_atr_mult: config.buffer_atr_mult,
                min_buffer: config.min_buffer,
            }),
            windows,
            target_r: config.target_r,
            tp1: config.tp1_r.map(|r| (r, config.partial_fraction)),
            exits: ExitRules {
                max_hold_bars: config.max_hold_bars,
                ma_cross_exit: config.ma_cross_exit,
                break_even_trigger_r: config.break_even_trigger_r,
            },
            entry_expiry_bars: config.entry_expiry_bars,
            phase: EnginePhase::WaitH1Bias,
            latest_bias: None,
            h1_seen: 0,
            bias_fresh: false,
            armed: None,
            trade_bias: None,
        }
    }

    pub fn phase(&self) -> EnginePhase {
        self.phase
    }

    pub fn latest_bias(&self) -> Option<&BiasContext> {
        self.latest_bias.as_ref()
    }

    fn transition(&mut self, to: EnginePhase, reason: &str, events: &mut Vec<ModelEvent>) {
        if self.phase == to {
            return;
        }
        debug!(from = %self.phase, to = %to, reason, "staged phase change");
        events.push(ModelEvent {
            event_type: "STATE_CHANGE",
            payload: json!({ "from": self.phase.as_str(), "to": to.as_str(), "reason": reason }),
        });
        self.phase = to;
    }

    /// Re-evaluate bias when a new H1 bar has become visible.
    fn refresh_bias(&mut self, input: &ModelInput<'_>, events: &mut Vec<ModelEvent>) {
        if input.h1.len() <= self.h1_seen {
            return;
        }
        self.h1_seen = input.h1.len();
        let ctx = self.bias_eval.evaluate(&input.h1);
        events.push(ModelEvent {
            event_type: "BIAS_EVALUATED",
            payload: json!({
                "bias": ctx.bias.as_str(),
                "reason": ctx.reason.as_str(),
                "structural_break": ctx.structural_break,
                "h1_timestamp": ctx.timestamp,
            }),
        });

        let flipped = self
            .armed
            .as_ref()
            .is_some_and(|a| a.bias.bias != ctx.bias);
        self.bias_fresh = true;
        if flipped {
            self.armed = None;
            match self.phase {
                EnginePhase::WaitM15Confirm | EnginePhase::WaitM5Entry => {
                    self.transition(EnginePhase::WaitH1Bias, "BIAS_FLIP", events);
                }
                _ => events.push(ModelEvent {
                    event_type: "BIAS_FLIP",
                    payload: json!({ "phase": self.phase.as_str(), "bias": ctx.bias.as_str() }),
                }),
            }
        } else if self.phase == EnginePhase::WaitM15Confirm {
            self.rearm(&ctx, input, events);
        }

        self.latest_bias = Some(ctx);
    }

    /// Swap the armed context for a newer one of the same direction. A moved
    /// structural break rebuilds the zone; a vanished one disarms.
    fn rearm(&mut self, ctx: &BiasContext, input: &ModelInput<'_>, events: &mut Vec<ModelEvent>) {
        let Some(armed) = self.armed.as_mut() else {
            return;
        };
        self.bias_fresh = false;
        if armed.bias.structural_break == ctx.structural_break {
            armed.bias = ctx.clone();
            return;
        }

        match self.confirm_eval.build_zone(ctx, &input.m15) {
            Ok(zone) => {
                events.push(ModelEvent {
                    event_type: "BIAS_REARMED",
                    payload: json!({
                        "bias": ctx.bias.as_str(),
                        "structural_break": ctx.structural_break,
                        "previous_zone": armed.zone,
                        "zone": zone,
                        "h1_timestamp": ctx.timestamp,
                    }),
                });
                debug!(low = zone.low, high = zone.high, "staged zone rebuilt");
                *armed = Armed {
                    bias: ctx.clone(),
                    zone,
                    armed_at: ctx.timestamp.unwrap_or(input.bar.timestamp),
                    confirmation: None,
                    confirmed_at_bar: None,
                };
            }
            Err(reason) => {
                events.push(ModelEvent {
                    event_type: "CONFIRMATION",
                    payload: json!({ "confirmation": "NO", "reason": reason.as_str() }),
                });
                self.armed = None;
                self.transition(EnginePhase::WaitH1Bias, reason.as_str(), events);
            }
        }
    }

    /// WAIT_H1_BIAS: arm on a fresh non-NONE bias with a buildable zone.
    fn try_arm(&mut self, input: &ModelInput<'_>, events: &mut Vec<ModelEvent>) -> Result<(), String> {
        if !self.bias_fresh {
            return Err("WAIT_H1_BIAS".into());
        }
        self.bias_fresh = false;
        let Some(ctx) = self.latest_bias.clone() else {
            return Err("WAIT_H1_BIAS".into());
        };
        if ctx.bias.direction().is_none() {
            return Err(ctx.reason.as_str().into());
        }
        let zone = match self.confirm_eval.build_zone(&ctx, &input.m15) {
            Ok(zone) => zone,
            Err(reason) => {
                events.push(ModelEvent {
                    event_type: "CONFIRMATION",
                    payload: json!({ "confirmation": "NO", "reason": reason.as_str() }),
                });
                return Err(reason.as_str().into());
            }
        };
        let armed_at = ctx.timestamp.unwrap_or(input.bar.timestamp);
        self.armed = Some(Armed {
            bias: ctx,
            zone,
            armed_at,
            confirmation: None,
            confirmed_at_bar: None,
        });
        self.transition(EnginePhase::WaitM15Confirm, "BIAS_ARMED", events);
        Ok(())
    }

    /// WAIT_M15_CONFIRM: scan closed M15 bars for the retest.
    fn try_confirm(&mut self, input: &ModelInput<'_>, events: &mut Vec<ModelEvent>) -> Result<(), String> {
        let Some(armed) = self.armed.as_mut() else {
            self.transition(EnginePhase::WaitH1Bias, "NO_BIAS", events);
            return Err(ConfirmationReason::NoBias.as_str().into());
        };
        let ctx = self
            .confirm_eval
            .evaluate(&armed.bias, armed.zone, &input.m15, armed.armed_at);
        let reason = ctx.reason;
        let changed = armed.confirmation.as_ref().map(|c| c.reason) != Some(reason);
        armed.confirmation = Some(ctx.clone());
        if changed {
            events.push(ModelEvent {
                event_type: "CONFIRMATION",
                payload: json!({
                    "confirmation": ctx.confirmation.as_str(),
                    "reason": reason.as_str(),
                    "zone": ctx.zone,
                    "invalidated": ctx.invalidated,
                    "m15_timestamp": ctx.timestamp,
                }),
            });
        }

        if ctx.is_ok() {
            armed.confirmed_at_bar = Some(input.bar_index);
            self.transition(EnginePhase::WaitM5Entry, reason.as_str(), events);
            Ok(())
        } else {
            if ctx.invalidated {
                self.armed = None;
                self.transition(EnginePhase::WaitH1Bias, reason.as_str(), events);
            }
            Err(reason.as_str().into())
        }
    }

    /// WAIT_M5_ENTRY: look for the micro-swing breakout.
    fn try_entry(&mut self, input: &ModelInput<'_>, events: &mut Vec<ModelEvent>) -> SignalResult {
        let Some(armed) = self.armed.as_ref() else {
            self.transition(EnginePhase::WaitH1Bias, "NO_BIAS", events);
            return SignalResult::none("NO_CONFIRMATION");
        };
        let (Some(confirmation), Some(confirmed_at)) =
            (armed.confirmation.clone(), armed.confirmed_at_bar)
        else {
            return SignalResult::none("NO_CONFIRMATION");
        };

        if let Some(expiry) = self.entry_expiry_bars {
            if input.bar_index.saturating_sub(confirmed_at) > expiry {
                self.armed = None;
                self.transition(EnginePhase::WaitH1Bias, "ENTRY_EXPIRED", events);
                return SignalResult::none("ENTRY_EXPIRED");
            }
        }

        if let Some(blocked) = self.windows.gate(input.bar.timestamp).reason() {
            return SignalResult::none(blocked);
        }

        let Some(setup) = self.entry_eval.evaluate(&confirmation, &input.m5) else {
            return SignalResult::none(EntryReason::NotEnoughBars.as_str());
        };
        let payload = json!({
            "setup": &setup,
            "bias": &armed.bias,
            "confirmation": &confirmation,
        });
        let Some(direction) = setup.signal.direction() else {
            return SignalResult {
                payload,
                ..SignalResult::none(setup.reason.as_str())
            };
        };
        let Some(stop) = setup.stop_price() else {
            return SignalResult::none(setup.reason.as_str());
        };

        SignalResult {
            signal: setup.signal,
            reason: format!("micro swing breakout {}", direction.as_str().to_lowercase()),
            payload,
            plan: Some(TradePlan {
                direction,
                stop: StopRule::Price(stop),
                target: TargetRule::RMultiple(self.target_r),
                tp1: self.tp1,
                exits: self.exits,
                atr: input.m5.last_value(columns::ATR),
            }),
            events: Vec::new(),
        }
    }
}

impl SignalModel for StagedModel {
    fn name(&self) -> &str {
        "staged"
    }

    fn evaluate(&mut self, input: &ModelInput<'_>) -> SignalResult {
        let mut events = Vec::new();
        self.refresh_bias(input, &mut events);

        if self.phase == EnginePhase::InTrade {
            return SignalResult::none("IN_TRADE").with_events(events);
        }
        if self.phase == EnginePhase::WaitH1Bias {
            if let Err(reason) = self.try_arm(input, &mut events) {
                return SignalResult::none(reason).with_events(events);
            }
        }
        if self.phase == EnginePhase::WaitM15Confirm {
            if let Err(reason) = self.try_confirm(input, &mut events) {
                return SignalResult::none(reason).with_events(events);
            }
        }
        let result = self.try_entry(input, &mut events);
        if result.signal != Signal::None {
            debug!(signal = %result.signal, at = %input.bar.timestamp, "staged entry trigger");
        }
        result.with_events(events)
    }

    fn on_position_opened(&mut self, _at: NaiveDateTime) {
        self.trade_bias = self.armed.as_ref().map(|a| a.bias.bias);
        self.phase = EnginePhase::InTrade;
    }

    fn on_position_closed(&mut self, _at: NaiveDateTime) {
        let trade_bias = self.trade_bias.take();
        self.armed = None;
        self.bias_fresh = self.latest_bias.as_ref().is_some_and(|ctx| {
            ctx.bias.direction().is_some() && Some(ctx.bias) != trade_bias
        });
        self.phase = EnginePhase::WaitH1Bias;
    }

    fn status(&self) -> ModelStatus {
        let bias = self
            .armed
            .as_ref()
            .map(|a| a.bias.bias)
            .or_else(|| self.latest_bias.as_ref().map(|b| b.bias))
            .unwrap_or_default();
        let confirmation = self
            .armed
            .as_ref()
            .and_then(|a| a.confirmation.as_ref())
            .map(|c| c.confirmation.as_str())
            .unwrap_or("");
        ModelStatus {
            state: self.phase.as_str().to_string(),
            bias: bias.as_str().to_string(),
            confirmation: confirmation.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::indicator::IndicatorValues;
    use crate::data::Frame;
    use crate::domain::{Bar, Timeframe};
    use chrono::NaiveDate;

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 2)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn config() -> StagedConfig {
        StagedConfig {
            min_bars: 3,
            slope_lookback: 2,
            structure_lookback: 2,
            structure_window: 4,
            swing_lookback: 3,
            buffer_atr_mult: 0.2,
            entry_expiry_bars: Some(2),
            ..StagedConfig::default()
        }
    }

    fn frame(tf: Timeframe, start: NaiveDateTime, ohlc: &[(f64, f64, f64, f64)], atr: f64) -> Frame {
        let bars: Vec<Bar> = ohlc
            .iter()
            .enumerate()
            .map(|(i, &(o, h, l, c))| Bar::new(start + tf.duration() * i as i32, o, h, l, c))
            .collect();
        let mut indicators = IndicatorValues::new();
        indicators.insert(columns::ATR, vec![Some(atr); bars.len()]);
        Frame {
            timeframe: tf,
            bars,
            indicators,
        }
    }

    /// Long bias on the first four rows, flat on the fifth.
    fn h1() -> Frame {
        let closes = [100.0, 100.2, 100.4, 102.0, 100.0];
        let ohlc: Vec<_> = closes.iter().map(|&c| (c, c + 0.5, c - 0.5, c)).collect();
        let mut f = frame(Timeframe::H1, at(1, 0), &ohlc, 1.0);
        let fast = [100.0, 100.5, 101.0, 101.5, 100.05];
        f.indicators
            .insert(columns::EMA_FAST, fast.iter().copied().map(Some).collect());
        f.indicators.insert(columns::EMA_SLOW, vec![Some(100.0); 5]);
        f
    }

    /// The first four rows of `h1()` followed by a custom fifth H1 close.
    fn h1_then(close: f64, fast: f64) -> Frame {
        let closes = [100.0, 100.2, 100.4, 102.0, close];
        let ohlc: Vec<_> = closes.iter().map(|&c| (c, c + 0.5, c - 0.5, c)).collect();
        let mut f = frame(Timeframe::H1, at(1, 0), &ohlc, 1.0);
        let fast = [100.0, 100.5, 101.0, 101.5, fast];
        f.indicators
            .insert(columns::EMA_FAST, fast.iter().copied().map(Some).collect());
        f.indicators.insert(columns::EMA_SLOW, vec![Some(100.0); 5]);
        f
    }

    /// One bar at arming time, then a bullish retest of the zone [99.9, 101.9].
    fn m15() -> Frame {
        frame(
            Timeframe::M15,
            at(4, 0),
            &[(105.0, 106.0, 104.0, 105.5), (101.0, 102.8, 100.6, 102.6)],
            2.0,
        )
    }

    fn m5(last_close: f64) -> Frame {
        let closes = [100.0, 100.4, 100.2, last_close];
        let ohlc: Vec<_> = closes.iter().map(|&c| (c, c + 0.5, c - 0.5, c)).collect();
        frame(Timeframe::M5, at(4, 30), &ohlc, 1.0)
    }

    fn input<'a>(
        bar_index: usize,
        h1: &'a Frame,
        h1_rows: usize,
        m15: &'a Frame,
        m15_rows: usize,
        m5: &'a Frame,
    ) -> ModelInput<'a> {
        ModelInput {
            bar_index,
            bar: &m5.bars[3],
            m5: m5.view(4),
            m15: m15.view(m15_rows),
            h1: h1.view(h1_rows),
        }
    }

    fn model() -> StagedModel {
        StagedModel::new(&config(), SessionWindows::default())
    }

    fn has_change(result: &SignalResult, to: EnginePhase) -> bool {
        result
            .events
            .iter()
            .any(|e| e.event_type == "STATE_CHANGE" && e.payload["to"] == to.as_str())
    }

    #[test]
    fn full_cascade_on_one_bar() {
        let (h1, m15, m5) = (h1(), m15(), m5(101.2));
        let mut model = model();
        let result = model.evaluate(&input(3, &h1, 4, &m15, 2, &m5));

        assert_eq!(result.signal, Signal::Buy);
        assert_eq!(result.reason, "micro swing breakout long");
        let plan = result.plan.clone().unwrap();
        let StopRule::Price(stop) = plan.stop else {
            panic!("staged entries use a price stop");
        };
        assert!((stop - 99.3).abs() < 1e-12);
        assert_eq!(plan.target, TargetRule::RMultiple(2.0));
        assert_eq!(plan.tp1, Some((1.0, 0.5)));
        assert!(has_change(&result, EnginePhase::WaitM15Confirm));
        assert!(has_change(&result, EnginePhase::WaitM5Entry));
        assert_eq!(model.phase(), EnginePhase::WaitM5Entry);
        assert_eq!(model.status().bias, "LONG");
        assert_eq!(model.status().confirmation, "OK");
    }

    #[test]
    fn waits_for_m15_bar_after_arming() {
        let (h1, m15, m5) = (h1(), m15(), m5(101.2));
        let mut model = model();
        let result = model.evaluate(&input(3, &h1, 4, &m15, 1, &m5));
        assert_eq!(result.signal, Signal::None);
        assert_eq!(result.reason, "NOT_ENOUGH_BARS");
        assert_eq!(model.phase(), EnginePhase::WaitM15Confirm);

        let result = model.evaluate(&input(4, &h1, 4, &m15, 2, &m5));
        assert_eq!(result.signal, Signal::Buy);
    }

    #[test]
    fn bias_flip_discards_armed_setup() {
        let (h1, m15, m5) = (h1(), m15(), m5(101.2));
        let mut model = model();
        model.evaluate(&input(3, &h1, 4, &m15, 1, &m5));
        assert_eq!(model.phase(), EnginePhase::WaitM15Confirm);

        let result = model.evaluate(&input(4, &h1, 5, &m15, 2, &m5));
        assert_eq!(result.signal, Signal::None);
        assert_eq!(result.reason, "FLAT");
        assert!(has_change(&result, EnginePhase::WaitH1Bias));
        assert_eq!(model.phase(), EnginePhase::WaitH1Bias);
        assert_eq!(model.status().bias, "NONE");
    }

    #[test]
    fn entry_expires_after_configured_bars() {
        let (h1, m15, m5) = (h1(), m15(), m5(101.0));
        let mut model = model();
        let result = model.evaluate(&input(3, &h1, 4, &m15, 2, &m5));
        assert_eq!(result.reason, "NO_BREAKOUT");
        assert_eq!(model.phase(), EnginePhase::WaitM5Entry);

        let result = model.evaluate(&input(5, &h1, 4, &m15, 2, &m5));
        assert_eq!(result.reason, "NO_BREAKOUT");
        let result = model.evaluate(&input(6, &h1, 4, &m15, 2, &m5));
        assert_eq!(result.reason, "ENTRY_EXPIRED");
        assert_eq!(model.phase(), EnginePhase::WaitH1Bias);
    }

    #[test]
    fn blocked_window_suppresses_entry() {
        let (h1, m15, m5) = (h1(), m15(), m5(101.2));
        let blocked = SessionWindows::new(vec![], vec!["04:00-05:00".parse().unwrap()]);
        let mut model = StagedModel::new(&config(), blocked);
        let result = model.evaluate(&input(3, &h1, 4, &m15, 2, &m5));
        assert_eq!(result.signal, Signal::None);
        assert_eq!(result.reason, "blocked: excluded window");
    }

    #[test]
    fn position_lifecycle_resets_to_bias_wait() {
        let (h1, m15, m5) = (h1(), m15(), m5(101.2));
        let mut model = model();
        model.evaluate(&input(3, &h1, 4, &m15, 2, &m5));
        model.on_position_opened(m5.bars[3].timestamp);
        assert_eq!(model.status().state, "IN_TRADE");
        let result = model.evaluate(&input(4, &h1, 4, &m15, 2, &m5));
        assert_eq!(result.reason, "IN_TRADE");

        model.on_position_closed(m5.bars[3].timestamp);
        assert_eq!(model.phase(), EnginePhase::WaitH1Bias);
        // No fresh H1 close since the trade: nothing re-arms.
        let result = model.evaluate(&input(5, &h1, 4, &m15, 2, &m5));
        assert_eq!(result.reason, "WAIT_H1_BIAS");
    }

    #[test]
    fn newer_break_rebuilds_zone_and_restarts_scan() {
        let (h1, m15, m5) = (h1_then(103.5, 102.0), m15(), m5(101.2));
        let mut model = model();
        model.evaluate(&input(3, &h1, 4, &m15, 1, &m5));
        assert_eq!(model.phase(), EnginePhase::WaitM15Confirm);
        assert!((model.armed.as_ref().unwrap().zone.low - 99.9).abs() < 1e-12);

        // The 05:00 close breaks the 04:00 high of 102.5.
        let result = model.evaluate(&input(4, &h1, 5, &m15, 1, &m5));
        let rearmed = result
            .events
            .iter()
            .find(|e| e.event_type == "BIAS_REARMED")
            .expect("zone follows the newer break");
        assert!((rearmed.payload["zone"]["low"].as_f64().unwrap() - 101.5).abs() < 1e-12);
        assert!((rearmed.payload["previous_zone"]["low"].as_f64().unwrap() - 99.9).abs() < 1e-12);
        let armed = model.armed.as_ref().unwrap();
        assert!((armed.zone.high - 103.5).abs() < 1e-12);
        assert_eq!(armed.armed_at, at(5, 0));
        assert_eq!(model.phase(), EnginePhase::WaitM15Confirm);

        // The 04:15 retest predates the new context and no longer confirms.
        let result = model.evaluate(&input(5, &h1, 5, &m15, 2, &m5));
        assert_eq!(result.signal, Signal::None);
        assert_eq!(result.reason, "NOT_ENOUGH_BARS");
        assert_eq!(model.phase(), EnginePhase::WaitM15Confirm);
    }

    #[test]
    fn unchanged_break_keeps_zone() {
        let (h1, m15, m5) = (h1_then(101.8, 101.8), m15(), m5(101.2));
        let mut model = model();
        model.evaluate(&input(3, &h1, 4, &m15, 1, &m5));

        let result = model.evaluate(&input(4, &h1, 5, &m15, 1, &m5));
        assert!(result.events.iter().all(|e| e.event_type != "BIAS_REARMED"));
        let armed = model.armed.as_ref().unwrap();
        assert_eq!(armed.bias.timestamp, Some(at(5, 0)));
        assert_eq!(armed.armed_at, at(4, 0));
        assert!((armed.zone.low - 99.9).abs() < 1e-12);

        let result = model.evaluate(&input(5, &h1, 5, &m15, 2, &m5));
        assert_eq!(result.signal, Signal::Buy);
    }

    #[test]
    fn flip_during_trade_arms_after_close() {
        let (h1, m15, m5) = (h1_then(97.0, 99.0), m15(), m5(101.2));
        let mut model = model();
        assert_eq!(model.evaluate(&input(3, &h1, 4, &m15, 2, &m5)).signal, Signal::Buy);
        model.on_position_opened(m5.bars[3].timestamp);

        let result = model.evaluate(&input(4, &h1, 5, &m15, 2, &m5));
        assert_eq!(result.reason, "IN_TRADE");
        assert!(result.events.iter().any(|e| e.event_type == "BIAS_FLIP"));

        model.on_position_closed(m5.bars[3].timestamp);
        let result = model.evaluate(&input(5, &h1, 5, &m15, 2, &m5));
        assert!(has_change(&result, EnginePhase::WaitM15Confirm));
        assert_eq!(model.phase(), EnginePhase::WaitM15Confirm);
        assert_eq!(model.status().bias, "SHORT");
    }
}
