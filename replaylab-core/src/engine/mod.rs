//! Simulation engine — one sequential pass over M5 bars.
//!
//! `Engine::new` validates the configuration and picks the signal model once.
//! `Engine::run` precomputes the M5/M15/H1 frames and then runs the four-phase
//! bar loop:
//!
//! 1. Manage: advance the open trade
//! 2. Evaluate: run the signal model
//! 3. Admit: gate and open a new trade
//! 4. Post-bar: mark equity

pub mod costs;
pub mod lifecycle;
pub mod loop_runner;
pub mod precompute;
pub mod state;

pub use costs::CostModel;
pub use lifecycle::{ma_crossed_against, EntryOrder, ExitFill, LifecycleEvent, OpenTrade};
pub use precompute::{build_frames, compute_warmup, Frames, IndicatorSpec};
pub use state::{EngineState, EquityPoint, RunResult};

use chrono::NaiveDateTime;
use thiserror::Error;
use tracing::info;

use crate::components::alternate::SessionModel;
use crate::components::signal::SignalModel;
use crate::components::staged::StagedModel;
use crate::config::{ConfigError, EngineConfig, StrategyFamily};
use crate::domain::Bar;
use crate::records::RecordSink;
use crate::risk::{LedgerError, RiskLedger};
use loop_runner::Replay;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("bar {index} at {timestamp} is not after the previous bar")]
    Unsorted {
        index: usize,
        timestamp: NaiveDateTime,
    },
    #[error("bar {index} at {timestamp} has inconsistent OHLC values")]
    InvalidBar {
        index: usize,
        timestamp: NaiveDateTime,
    },
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

pub struct Engine {
    config: EngineConfig,
    model: Box<dyn SignalModel>,
    indicators: IndicatorSpec,
    costs: CostModel,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("model", &self.model.name())
            .field("indicators", &self.indicators)
            .field("costs", &self.costs)
            .finish()
    }
}

impl Engine {
    pub fn new(config: EngineConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let model: Box<dyn SignalModel> = match config.strategy_family {
            StrategyFamily::Staged => Box::new(StagedModel::new(&config.staged, config.staged_windows()?)),
            StrategyFamily::Session => {
                let alt = config
                    .alternate
                    .as_ref()
                    .ok_or(ConfigError::MissingSection("alternate"))?;
                Box::new(SessionModel::from_config(alt, config.alternate_windows(alt)?)?)
            }
        };
        Ok(Self::assemble(config, model))
    }

    /// Drive the replay with a caller-supplied model. Frames still carry the
    /// indicator columns of `config.strategy_family`.
    pub fn with_model(config: EngineConfig, model: Box<dyn SignalModel>) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::assemble(config, model))
    }

    fn assemble(config: EngineConfig, model: Box<dyn SignalModel>) -> Self {
        Self {
            indicators: IndicatorSpec::for_config(&config),
            costs: CostModel::new(config.spread_usd, config.slippage_usd),
            model,
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Name of the signal model chosen at construction.
    pub fn model_name(&self) -> &str {
        self.model.name()
    }

    /// Replay `bars` (M5, strictly increasing timestamps), writing every
    /// record to `sink`.
    pub fn run(mut self, bars: &[Bar], sink: &mut dyn RecordSink) -> Result<RunResult, EngineError> {
        check_bars(bars)?;

        let frames = build_frames(bars, &self.indicators);
        let warmup_bars = compute_warmup(&self.indicators);
        info!(
            model = self.model.name(),
            m5 = frames.m5.len(),
            m15 = frames.m15.len(),
            h1 = frames.h1.len(),
            warmup_bars,
            "replay starting"
        );

        let ledger = RiskLedger::new(self.config.starting_balance, self.config.risk_per_trade_pct);
        let state = Replay::new(
            &self.config,
            self.costs,
            self.model.as_mut(),
            sink,
            EngineState::new(ledger),
        )
        .run(&frames)?;

        let result = state.into_result(bars.len(), warmup_bars);
        info!(
            trades = result.trades.len(),
            signals = result.signal_count,
            rejected = result.rejected_count,
            final_equity = result.final_equity,
            "replay finished"
        );
        Ok(result)
    }
}

fn check_bars(bars: &[Bar]) -> Result<(), EngineError> {
    for (index, bar) in bars.iter().enumerate() {
        if !bar.is_sane() {
            return Err(EngineError::InvalidBar {
                index,
                timestamp: bar.timestamp,
            });
        }
        if index > 0 && bar.timestamp <= bars[index - 1].timestamp {
            return Err(EngineError::Unsorted {
                index,
                timestamp: bar.timestamp,
            });
        }
    }
    Ok(())
}
