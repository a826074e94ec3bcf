//! Mean reversion — fade a stretched close back toward its moving average.

use serde_json::json;

use super::{prior_atr, AltSignal, AlternateEvaluator};
use crate::data::{columns, FrameView};
use crate::domain::Signal;

#[derive(Debug, Clone)]
pub struct MeanReversion {
    /// |close − ma| must exceed this many ATR.
    pub deviation_threshold: f64,
    /// Close must sit within this fraction of the bar's far extreme.
    pub extreme_frac: f64,
}

impl AlternateEvaluator for MeanReversion {
    fn name(&self) -> &'static str {
        "mean_reversion"
    }

    fn evaluate(&self, m5: &FrameView<'_>) -> AltSignal {
        let (Some(i), Some(bar)) = (m5.last_index(), m5.last()) else {
            return AltSignal::none("NOT_ENOUGH_BARS");
        };
        let Some(atr) = prior_atr(m5, i) else {
            return AltSignal::none("ATR_NA");
        };
        let Some(ma) = m5.value(columns::MA, i) else {
            return AltSignal::none("MA_NA");
        };

        let deviation = bar.close - ma;
        let limit = self.deviation_threshold * atr;
        let location = bar.close_location();
        let (signal, reason) = if deviation < -limit && location <= self.extreme_frac {
            (Signal::Buy, "mean-reversion long")
        } else if deviation > limit && location >= 1.0 - self.extreme_frac {
            (Signal::Sell, "mean-reversion short")
        } else {
            (Signal::None, "NO_SETUP")
        };

        AltSignal {
            signal,
            reason: reason.to_string(),
            atr: Some(atr),
            payload: json!({
                "setup": reason,
                "ma": ma,
                "atr": atr,
                "deviation": deviation,
                "deviation_atr": deviation / atr,
                "close_location": location,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::indicator::IndicatorValues;
    use crate::data::Frame;
    use crate::domain::{Bar, Timeframe};
    use crate::indicators::make_bars;

    /// Three bars at the average, then the bar under test.
    fn frame(o: f64, h: f64, l: f64, c: f64) -> Frame {
        let mut bars = make_bars(&[100.0, 100.0, 100.0]);
        bars.push(Bar::new(bars[2].timestamp + Timeframe::M5.duration(), o, h, l, c));
        let mut indicators = IndicatorValues::new();
        indicators.insert(columns::ATR, vec![Some(1.0); 4]);
        indicators.insert(columns::MA, vec![Some(100.0); 4]);
        Frame {
            timeframe: Timeframe::M5,
            bars,
            indicators,
        }
    }

    fn evaluator() -> MeanReversion {
        MeanReversion {
            deviation_threshold: 2.0,
            extreme_frac: 0.3,
        }
    }

    #[test]
    fn stretched_close_near_low_buys() {
        let f = frame(98.5, 98.6, 97.0, 97.2);
        let out = evaluator().evaluate(&f.view(4));
        assert_eq!(out.signal, Signal::Buy);
        assert_eq!(out.reason, "mean-reversion long");
        assert_eq!(out.atr, Some(1.0));
    }

    #[test]
    fn stretched_close_near_high_sells() {
        let f = frame(101.5, 103.0, 101.4, 102.9);
        let out = evaluator().evaluate(&f.view(4));
        assert_eq!(out.signal, Signal::Sell);
        assert_eq!(out.reason, "mean-reversion short");
    }

    #[test]
    fn stretch_without_extreme_close_is_no_setup() {
        // 2.5 ATR below the average but closing mid-range.
        let f = frame(98.0, 98.5, 96.5, 97.5);
        let out = evaluator().evaluate(&f.view(4));
        assert_eq!(out.signal, Signal::None);
        assert_eq!(out.reason, "NO_SETUP");
    }

    #[test]
    fn first_bar_has_no_prior_atr() {
        let f = frame(98.5, 98.6, 97.0, 97.2);
        assert_eq!(evaluator().evaluate(&f.view(1)).reason, "ATR_NA");
        assert_eq!(evaluator().evaluate(&f.view(0)).reason, "NOT_ENOUGH_BARS");
    }
}
