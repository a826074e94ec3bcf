//! Signal models — the per-bar decision interface the engine drives.
//!
//! The strategy family is chosen once when the engine is built; the bar loop
//! only ever talks to a `Box<dyn SignalModel>`. Models see market data
//! through bounded `FrameView`s and never see the ledger or the open trade,
//! only the lifecycle notifications `on_position_opened` / `on_position_closed`.

use chrono::NaiveDateTime;
use serde_json::Value;

use crate::data::FrameView;
use crate::domain::{Bar, Direction, Signal};

/// Everything a model may look at for one M5 bar.
#[derive(Debug, Clone, Copy)]
pub struct ModelInput<'a> {
    pub bar_index: usize,
    pub bar: &'a Bar,
    /// M5 rows up to and including the current bar.
    pub m5: FrameView<'a>,
    /// M15 rows closed strictly before the current bar's timestamp.
    pub m15: FrameView<'a>,
    /// H1 rows closed strictly before the current bar's timestamp.
    pub h1: FrameView<'a>,
}

/// Where the protective stop goes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StopRule {
    /// Absolute price level.
    Price(f64),
    /// Fixed distance from the fill price.
    Distance(f64),
}

impl StopRule {
    pub fn resolve(self, direction: Direction, fill: f64) -> f64 {
        match self {
            Self::Price(p) => p,
            Self::Distance(d) => fill - direction.sign() * d,
        }
    }
}

/// How the take-profit level is derived from the fill price.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TargetRule {
    /// Multiple of the fill-to-stop distance.
    RMultiple(f64),
    /// Fixed price distance.
    Distance(f64),
}

/// Exit rules handed to the lifecycle manager with a new trade.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ExitRules {
    pub max_hold_bars: Option<usize>,
    pub ma_cross_exit: bool,
    pub break_even_trigger_r: Option<f64>,
}

/// A tradeable setup: what to open if admission allows it.
#[derive(Debug, Clone, PartialEq)]
pub struct TradePlan {
    pub direction: Direction,
    pub stop: StopRule,
    pub target: TargetRule,
    /// First target in R and the fraction closed there.
    pub tp1: Option<(f64, f64)>,
    pub exits: ExitRules,
    /// Volatility at signal time, for cost sanity checks.
    pub atr: Option<f64>,
}

/// A state change or diagnostic the engine turns into an event record.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelEvent {
    pub event_type: &'static str,
    pub payload: Value,
}

/// What a model reports for one bar.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalResult {
    pub signal: Signal,
    pub reason: String,
    /// Diagnostics only; never read back for control flow.
    pub payload: Value,
    pub plan: Option<TradePlan>,
    pub events: Vec<ModelEvent>,
}

impl SignalResult {
    pub fn none(reason: impl Into<String>) -> Self {
        Self {
            signal: Signal::None,
            reason: reason.into(),
            payload: Value::Null,
            plan: None,
            events: Vec::new(),
        }
    }

    pub fn with_events(mut self, events: Vec<ModelEvent>) -> Self {
        self.events = events;
        self
    }
}

/// Strategy state columns copied onto every event record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelStatus {
    pub state: String,
    pub bias: String,
    pub confirmation: String,
}

pub trait SignalModel: Send {
    /// Strategy name recorded on signals and trades.
    fn name(&self) -> &str;

    /// Evaluate the current bar.
    fn evaluate(&mut self, input: &ModelInput<'_>) -> SignalResult;

    /// The engine opened a trade from this model's last plan.
    fn on_position_opened(&mut self, _at: NaiveDateTime) {}

    /// The open trade was fully closed.
    fn on_position_closed(&mut self, _at: NaiveDateTime) {}

    fn status(&self) -> ModelStatus;
}
