//! H1 bias — directional classification from trend averages and volatility.
//!
//! Guards run in a fixed order and each degrades to `Bias::None` with a
//! reason code. The flatness filter sits after the guards and before the
//! directional test, so a compressed fast/slow spread always reads `FLAT`.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::data::{columns, FrameView};
use crate::domain::{Bias, Direction};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BiasReason {
    NotEnoughBars,
    ColumnsMissing,
    EmaNa,
    AtrNa,
    Flat,
    BiasLong,
    BiasShort,
    BiasNone,
}

impl BiasReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotEnoughBars => "NOT_ENOUGH_BARS",
            Self::ColumnsMissing => "COLUMNS_MISSING",
            Self::EmaNa => "EMA_NA",
            Self::AtrNa => "ATR_NA",
            Self::Flat => "FLAT",
            Self::BiasLong => "BIAS_LONG",
            Self::BiasShort => "BIAS_SHORT",
            Self::BiasNone => "BIAS_NONE",
        }
    }
}

impl fmt::Display for BiasReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The swing-structure violation that anchors the retest zone.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StructuralBreak {
    pub direction: Direction,
    /// The prior extreme that was broken.
    pub level: f64,
    /// Close time of the bar that broke it.
    pub timestamp: NaiveDateTime,
}

/// Result of one H1 evaluation. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BiasContext {
    pub bias: Bias,
    pub structural_break: Option<StructuralBreak>,
    /// Close time of the H1 bar this context was computed at.
    pub timestamp: Option<NaiveDateTime>,
    pub reason: BiasReason,
}

impl BiasContext {
    fn neutral(reason: BiasReason, timestamp: Option<NaiveDateTime>) -> Self {
        Self {
            bias: Bias::None,
            structural_break: None,
            timestamp,
            reason,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BiasParams {
    pub min_bars: usize,
    pub slope_lookback: usize,
    pub bias_dist_mult: f64,
    pub min_sep_mult: f64,
    pub structure_lookback: usize,
    pub structure_window: usize,
}

#[derive(Debug, Clone)]
pub struct BiasEvaluator {
    params: BiasParams,
}

impl BiasEvaluator {
    pub fn new(params: BiasParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &BiasParams {
        &self.params
    }

    pub fn evaluate(&self, h1: &FrameView<'_>) -> BiasContext {
        let p = &self.params;
        let timestamp = h1.last().map(|b| b.timestamp);

        let required = p.min_bars.max(p.slope_lookback + 1);
        if h1.len() < required {
            return BiasContext::neutral(BiasReason::NotEnoughBars, timestamp);
        }
        let Some(last) = h1.last_index() else {
            return BiasContext::neutral(BiasReason::NotEnoughBars, timestamp);
        };

        if [columns::EMA_FAST, columns::EMA_SLOW, columns::ATR]
            .iter()
            .any(|c| !h1.has_column(c))
        {
            return BiasContext::neutral(BiasReason::ColumnsMissing, timestamp);
        }

        let reference = last - p.slope_lookback;
        let (Some(fast), Some(slow), Some(fast_ref)) = (
            h1.value(columns::EMA_FAST, last),
            h1.value(columns::EMA_SLOW, last),
            h1.value(columns::EMA_FAST, reference),
        ) else {
            return BiasContext::neutral(BiasReason::EmaNa, timestamp);
        };
        let Some(atr) = h1.value(columns::ATR, last) else {
            return BiasContext::neutral(BiasReason::AtrNa, timestamp);
        };

        if (fast - slow).abs() < p.min_sep_mult * atr {
            return BiasContext::neutral(BiasReason::Flat, timestamp);
        }

        let close = h1.bars()[last].close;
        let distance = p.bias_dist_mult * atr;
        let direction = if fast > slow && close > slow + distance && fast > fast_ref {
            Direction::Long
        } else if fast < slow && close < slow - distance && fast < fast_ref {
            Direction::Short
        } else {
            return BiasContext::neutral(BiasReason::BiasNone, timestamp);
        };

        let (bias, reason) = match direction {
            Direction::Long => (Bias::Long, BiasReason::BiasLong),
            Direction::Short => (Bias::Short, BiasReason::BiasShort),
        };
        BiasContext {
            bias,
            structural_break: self.structural_break(h1, direction),
            timestamp,
            reason,
        }
    }

    /// Most recent bar within `structure_window` rows whose close broke the
    /// extreme of its preceding `structure_lookback` bars.
    fn structural_break(&self, h1: &FrameView<'_>, direction: Direction) -> Option<StructuralBreak> {
        let bars = h1.bars();
        let lookback = self.params.structure_lookback;
        let last = bars.len().checked_sub(1)?;
        let earliest = lookback.max((last + 1).saturating_sub(self.params.structure_window));

        (earliest..=last).rev().find_map(|j| {
            let prior = &bars[j - lookback..j];
            let bar = &bars[j];
            let level = match direction {
                Direction::Long => prior.iter().map(|b| b.high).fold(f64::MIN, f64::max),
                Direction::Short => prior.iter().map(|b| b.low).fold(f64::MAX, f64::min),
            };
            let broke = match direction {
                Direction::Long => bar.close > level,
                Direction::Short => bar.close < level,
            };
            broke.then_some(StructuralBreak {
                direction,
                level,
                timestamp: bar.timestamp,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::indicator::IndicatorValues;
    use crate::data::Frame;
    use crate::domain::{Bar, Timeframe};
    use chrono::{Duration, NaiveDate};

    fn params() -> BiasParams {
        BiasParams {
            min_bars: 3,
            slope_lookback: 2,
            bias_dist_mult: 0.5,
            min_sep_mult: 0.2,
            structure_lookback: 2,
            structure_window: 4,
        }
    }

    fn frame(closes: &[f64], fast: Vec<Option<f64>>, slow: Vec<Option<f64>>, atr: f64) -> Frame {
        let base = NaiveDate::from_ymd_opt(2024, 1, 2)
            .unwrap()
            .and_hms_opt(1, 0, 0)
            .unwrap();
        let bars: Vec<Bar> = closes
            .iter()
            .enumerate()
            .map(|(i, &c)| Bar::new(base + Duration::hours(i as i64), c, c + 0.5, c - 0.5, c))
            .collect();
        let mut indicators = IndicatorValues::new();
        indicators.insert(columns::EMA_FAST, fast);
        indicators.insert(columns::EMA_SLOW, slow);
        indicators.insert(columns::ATR, vec![Some(atr); closes.len()]);
        Frame {
            timeframe: Timeframe::H1,
            bars,
            indicators,
        }
    }

    fn some(v: &[f64]) -> Vec<Option<f64>> {
        v.iter().copied().map(Some).collect()
    }

    #[test]
    fn not_enough_bars() {
        let f = frame(&[100.0, 101.0], some(&[1.0, 1.0]), some(&[1.0, 1.0]), 1.0);
        let ctx = BiasEvaluator::new(params()).evaluate(&f.view(2));
        assert_eq!(ctx.bias, Bias::None);
        assert_eq!(ctx.reason, BiasReason::NotEnoughBars);
    }

    #[test]
    fn columns_missing() {
        let mut f = frame(&[100.0; 4], some(&[1.0; 4]), some(&[1.0; 4]), 1.0);
        f.indicators = IndicatorValues::new();
        let ctx = BiasEvaluator::new(params()).evaluate(&f.view(4));
        assert_eq!(ctx.reason, BiasReason::ColumnsMissing);
    }

    #[test]
    fn ema_na_at_slope_reference() {
        let fast = vec![None, None, Some(103.0), Some(104.0)];
        let f = frame(&[100.0, 101.0, 102.0, 106.0], fast, some(&[100.0; 4]), 1.0);
        let ctx = BiasEvaluator::new(params()).evaluate(&f.view(4));
        assert_eq!(ctx.reason, BiasReason::EmaNa);
    }

    #[test]
    fn long_bias_with_structural_break() {
        let closes = [100.0, 100.2, 100.4, 102.0];
        let fast = some(&[100.0, 100.5, 101.0, 101.5]);
        let f = frame(&closes, fast, some(&[100.0; 4]), 1.0);
        let ctx = BiasEvaluator::new(params()).evaluate(&f.view(4));
        assert_eq!(ctx.bias, Bias::Long);
        assert_eq!(ctx.reason, BiasReason::BiasLong);
        let sb = ctx.structural_break.unwrap();
        assert_eq!(sb.direction, Direction::Long);
        // Bar 3 closed at 102 above max(high[1], high[2]) = 100.9
        assert!((sb.level - 100.9).abs() < 1e-12);
        assert_eq!(sb.timestamp, f.bars[3].timestamp);
    }

    #[test]
    fn short_bias_mirror() {
        let closes = [100.0, 99.8, 99.6, 98.0];
        let fast = some(&[100.0, 99.5, 99.0, 98.5]);
        let f = frame(&closes, fast, some(&[100.0; 4]), 1.0);
        let ctx = BiasEvaluator::new(params()).evaluate(&f.view(4));
        assert_eq!(ctx.bias, Bias::Short);
        assert!(ctx.structural_break.is_some());
    }

    #[test]
    fn flat_dominates_directional_test() {
        // fast rising and close far above slow, but |fast - slow| = 0.1 < 0.2 * 1.0
        let closes = [100.0, 100.2, 100.4, 110.0];
        let fast = some(&[99.0, 99.5, 99.9, 100.1]);
        let f = frame(&closes, fast, some(&[100.0; 4]), 1.0);
        let ctx = BiasEvaluator::new(params()).evaluate(&f.view(4));
        assert_eq!(ctx.bias, Bias::None);
        assert_eq!(ctx.reason, BiasReason::Flat);
    }

    #[test]
    fn bias_none_when_slope_disagrees() {
        let closes = [100.0, 100.2, 100.4, 102.0];
        let fast = some(&[102.0, 101.8, 101.6, 101.5]);
        let f = frame(&closes, fast, some(&[100.0; 4]), 1.0);
        let ctx = BiasEvaluator::new(params()).evaluate(&f.view(4));
        assert_eq!(ctx.reason, BiasReason::BiasNone);
    }

    #[test]
    fn view_bounds_what_bias_sees() {
        let closes = [100.0, 100.2, 100.4, 102.0, 90.0];
        let fast = some(&[100.0, 100.5, 101.0, 101.5, 101.6]);
        let f = frame(&closes, fast, some(&[100.0; 5]), 1.0);
        let ctx = BiasEvaluator::new(params()).evaluate(&f.view(4));
        assert_eq!(ctx.bias, Bias::Long);
        assert_eq!(ctx.timestamp, Some(f.bars[3].timestamp));
    }
}
