//! Session-windowed alternate evaluators — per-bar, no multi-stage state.
//!
//! Each evaluator reads only the M5 view. The volatility reference is the ATR
//! of the bar *before* the one being evaluated. `SessionModel` applies the
//! time-window gate first and turns a signal into a `TradePlan` with
//! ATR-multiple stop and target distances.

pub mod mean_reversion;
pub mod opening_range;
pub mod shock;

pub use mean_reversion::MeanReversion;
pub use opening_range::OpeningRange;
pub use shock::Shock;

use serde_json::{json, Value};

use super::session::SessionWindows;
use super::signal::{
    ExitRules, ModelInput, ModelStatus, SignalModel, SignalResult, StopRule, TargetRule, TradePlan,
};
use crate::config::{AlternateConfig, AlternateModel, ConfigError};
use crate::data::{columns, FrameView};
use crate::domain::Signal;

/// Output of one alternate evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct AltSignal {
    pub signal: Signal,
    pub reason: String,
    /// Previous-bar ATR the setup was measured against.
    pub atr: Option<f64>,
    pub payload: Value,
}

impl AltSignal {
    pub fn none(reason: impl Into<String>) -> Self {
        Self {
            signal: Signal::None,
            reason: reason.into(),
            atr: None,
            payload: Value::Null,
        }
    }
}

pub trait AlternateEvaluator: Send + Sync {
    fn name(&self) -> &'static str;

    /// Evaluate the last bar of `m5`.
    fn evaluate(&self, m5: &FrameView<'_>) -> AltSignal;
}

/// ATR of the bar before `i`, the shared volatility reference.
pub(crate) fn prior_atr(m5: &FrameView<'_>, i: usize) -> Option<f64> {
    i.checked_sub(1)
        .and_then(|prev| m5.value(columns::ATR, prev))
        .filter(|atr| *atr > 0.0)
}

/// Instantiate the configured variant.
pub fn build_evaluator(alt: &AlternateConfig) -> Result<Box<dyn AlternateEvaluator>, ConfigError> {
    Ok(match alt.signal_model {
        AlternateModel::MeanReversion => Box::new(MeanReversion {
            deviation_threshold: alt.deviation_threshold,
            extreme_frac: alt.extreme_frac,
        }),
        AlternateModel::Shock => Box::new(Shock {
            shock_threshold: alt.shock_threshold,
            close_extreme_frac: alt.close_extreme_frac,
            target_atr_mult: alt.target_atr_mult,
        }),
        AlternateModel::OpeningRange => Box::new(OpeningRange {
            range_window: alt.orb_window()?,
            buffer_atr_mult: alt.orb_buffer_atr_mult,
        }),
    })
}

/// `SignalModel` for the session family.
pub struct SessionModel {
    evaluator: Box<dyn AlternateEvaluator>,
    windows: SessionWindows,
    stop_atr_mult: f64,
    target_atr_mult: f64,
    exits: ExitRules,
}

impl SessionModel {
    pub fn new(
        evaluator: Box<dyn AlternateEvaluator>,
        alt: &AlternateConfig,
        windows: SessionWindows,
    ) -> Self {
        Self {
            evaluator,
            windows,
            stop_atr_mult: alt.stop_atr_mult,
            target_atr_mult: alt.target_atr_mult,
            exits: ExitRules {
                max_hold_bars: alt.max_hold_bars,
                ma_cross_exit: alt.ma_cross_exit,
                break_even_trigger_r: alt.break_even_trigger_r,
            },
        }
    }

    pub fn from_config(alt: &AlternateConfig, windows: SessionWindows) -> Result<Self, ConfigError> {
        Ok(Self::new(build_evaluator(alt)?, alt, windows))
    }
}

impl SignalModel for SessionModel {
    fn name(&self) -> &str {
        self.evaluator.name()
    }

    fn evaluate(&mut self, input: &ModelInput<'_>) -> SignalResult {
        if let Some(blocked) = self.windows.gate(input.bar.timestamp).reason() {
            return SignalResult {
                payload: json!({ "time": input.bar.timestamp.time().format("%H:%M").to_string() }),
                ..SignalResult::none(blocked)
            };
        }

        let alt = self.evaluator.evaluate(&input.m5);
        let plan = match (alt.signal.direction(), alt.atr) {
            (Some(direction), Some(atr)) => Some(TradePlan {
                direction,
                stop: StopRule::Distance(self.stop_atr_mult * atr),
                target: TargetRule::Distance(self.target_atr_mult * atr),
                tp1: None,
                exits: self.exits,
                atr: Some(atr),
            }),
            _ => None,
        };
        SignalResult {
            signal: if plan.is_some() { alt.signal } else { Signal::None },
            reason: alt.reason,
            payload: alt.payload,
            plan,
            events: Vec::new(),
        }
    }

    fn status(&self) -> ModelStatus {
        ModelStatus {
            state: "SESSION".to_string(),
            bias: String::new(),
            confirmation: String::new(),
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

    /// Quiet bars at ~100 with ATR 1, then a bar that drops 4 and closes near its low.
    fn shock_frame(hour: u32) -> Frame {
        let base = NaiveDate::from_ymd_opt(2024, 1, 2)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap();
        let mut bars: Vec<Bar> = (0..3)
            .map(|i| {
                Bar::new(base + chrono::Duration::minutes(5 * i), 100.0, 100.5, 99.5, 100.0)
            })
            .collect();
        bars.push(Bar::new(
            base + chrono::Duration::minutes(15),
            100.0,
            100.2,
            96.0,
            96.3,
        ));
        let mut indicators = IndicatorValues::new();
        indicators.insert(columns::ATR, vec![Some(1.0); bars.len()]);
        Frame {
            timeframe: Timeframe::M5,
            bars,
            indicators,
        }
    }

    fn shock_model() -> SessionModel {
        let alt = AlternateConfig {
            signal_model: AlternateModel::Shock,
            entry_windows: vec!["09:00-12:00".into()],
            ..AlternateConfig::default()
        };
        let config = crate::config::EngineConfig::default();
        let windows = config.alternate_windows(&alt).unwrap();
        SessionModel::from_config(&alt, windows).unwrap()
    }

    fn evaluate(model: &mut SessionModel, frame: &Frame) -> SignalResult {
        let i = frame.len() - 1;
        model.evaluate(&ModelInput {
            bar_index: i,
            bar: &frame.bars[i],
            m5: frame.view(frame.len()),
            m15: frame.view(0),
            h1: frame.view(0),
        })
    }

    #[test]
    fn shock_inside_window_buys() {
        let frame = shock_frame(10);
        let result = evaluate(&mut shock_model(), &frame);
        assert_eq!(result.signal, Signal::Buy);
        assert_eq!(result.reason, "shock mean-reversion long");
        let plan = result.plan.unwrap();
        assert_eq!(plan.stop, StopRule::Distance(1.5));
        assert_eq!(plan.target, TargetRule::Distance(2.0));
        assert_eq!(result.payload["target_distance"], 2.0);
    }

    #[test]
    fn same_shock_outside_window_is_blocked() {
        let frame = shock_frame(14);
        let result = evaluate(&mut shock_model(), &frame);
        assert_eq!(result.signal, Signal::None);
        assert_eq!(result.reason, "blocked: outside entry window");
        assert!(result.plan.is_none());
    }

    #[test]
    fn excluded_window_wins_inside_entry_window() {
        let alt = AlternateConfig {
            signal_model: AlternateModel::Shock,
            entry_windows: vec!["09:00-12:00".into()],
            excluded_windows: vec!["10:00-10:30".into()],
            ..AlternateConfig::default()
        };
        let windows = crate::config::EngineConfig::default()
            .alternate_windows(&alt)
            .unwrap();
        let mut model = SessionModel::from_config(&alt, windows).unwrap();
        let result = evaluate(&mut model, &shock_frame(10));
        assert_eq!(result.reason, "blocked: excluded window");
    }

    #[test]
    fn model_names_follow_variant() {
        for (variant, name) in [
            (AlternateModel::MeanReversion, "mean_reversion"),
            (AlternateModel::Shock, "shock"),
            (AlternateModel::OpeningRange, "opening_range"),
        ] {
            let alt = AlternateConfig {
                signal_model: variant,
                ..AlternateConfig::default()
            };
            let model = SessionModel::from_config(&alt, SessionWindows::default()).unwrap();
            assert_eq!(model.name(), name);
            assert_eq!(model.status().state, "SESSION");
        }
    }
}
