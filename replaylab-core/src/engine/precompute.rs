//! Frame precomputation.
//!
//! M15 and H1 bars are aggregated from the M5 input once, and every
//! indicator column is computed before the bar loop begins. The loop only
//! ever reads through bounded views of these frames.

use crate::components::indicator::Indicator;
use crate::config::{EngineConfig, StrategyFamily};
use crate::data::{aggregate, columns, Frame};
use crate::domain::{Bar, Timeframe};
use crate::indicators::{Atr, Ema, Sma};

/// Indicator periods shared by the three timeframes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndicatorSpec {
    pub ema_fast: usize,
    pub ema_slow: usize,
    pub atr: usize,
    /// Reference moving average for the session evaluators.
    pub ma: Option<usize>,
}

impl IndicatorSpec {
    pub fn for_config(config: &EngineConfig) -> Self {
        match (config.strategy_family, &config.alternate) {
            (StrategyFamily::Session, Some(alt)) => Self {
                ema_fast: alt.ema_fast,
                ema_slow: alt.ema_slow,
                atr: alt.atr_period,
                ma: Some(alt.ma_period),
            },
            _ => Self {
                ema_fast: config.staged.ema_fast,
                ema_slow: config.staged.ema_slow,
                atr: config.staged.atr_period,
                ma: None,
            },
        }
    }

    pub fn columns(&self) -> Vec<(&'static str, Box<dyn Indicator>)> {
        let mut cols: Vec<(&'static str, Box<dyn Indicator>)> = vec![
            (columns::EMA_FAST, Box::new(Ema::new(self.ema_fast))),
            (columns::EMA_SLOW, Box::new(Ema::new(self.ema_slow))),
            (columns::ATR, Box::new(Atr::new(self.atr))),
        ];
        if let Some(period) = self.ma {
            cols.push((columns::MA, Box::new(Sma::new(period))));
        }
        cols
    }
}

/// The three timeframes of one replay.
#[derive(Debug, Clone)]
pub struct Frames {
    pub m5: Frame,
    pub m15: Frame,
    pub h1: Frame,
}

/// Aggregate the higher timeframes and compute every indicator column.
pub fn build_frames(bars: &[Bar], spec: &IndicatorSpec) -> Frames {
    let cols = spec.columns();
    let m15 = aggregate(bars, Timeframe::M15);
    let h1 = aggregate(bars, Timeframe::H1);
    Frames {
        m5: Frame::build(Timeframe::M5, bars.to_vec(), &cols),
        m15: Frame::build(Timeframe::M15, m15, &cols),
        h1: Frame::build(Timeframe::H1, h1, &cols),
    }
}

/// The warmup is the maximum lookback across all configured indicators.
pub fn compute_warmup(spec: &IndicatorSpec) -> usize {
    spec.columns()
        .iter()
        .map(|(_, indicator)| indicator.lookback())
        .max()
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AlternateConfig;
    use crate::indicators::make_bars;

    #[test]
    fn staged_spec_has_no_ma_column() {
        let spec = IndicatorSpec::for_config(&EngineConfig::default());
        assert_eq!((spec.ema_fast, spec.ema_slow, spec.atr, spec.ma), (20, 50, 14, None));
        assert_eq!(spec.columns().len(), 3);
    }

    #[test]
    fn session_spec_uses_alternate_periods() {
        let config = EngineConfig {
            strategy_family: StrategyFamily::Session,
            alternate: Some(AlternateConfig::default()),
            ..EngineConfig::default()
        };
        let spec = IndicatorSpec::for_config(&config);
        assert_eq!(spec.ma, Some(20));
        assert_eq!(spec.ema_fast, 9);
        assert_eq!(compute_warmup(&spec), 20);
    }

    #[test]
    fn frames_aggregate_and_share_columns() {
        let bars = make_bars(&[100.0; 24]);
        let spec = IndicatorSpec {
            ema_fast: 2,
            ema_slow: 3,
            atr: 2,
            ma: None,
        };
        let frames = build_frames(&bars, &spec);
        assert_eq!(frames.m5.len(), 24);
        assert_eq!(frames.m15.len(), 8);
        assert_eq!(frames.h1.len(), 2);
        for frame in [&frames.m5, &frames.m15, &frames.h1] {
            let view = frame.view(frame.len());
            assert!(view.has_column(columns::ATR));
            assert!(!view.has_column(columns::MA));
        }
    }
}
