//! Shock reaction — fade an outsized bar that closes at its extreme.

use serde_json::json;

use super::{prior_atr, AltSignal, AlternateEvaluator};
use crate::data::FrameView;
use crate::domain::Signal;

#[derive(Debug, Clone)]
pub struct Shock {
    pub shock_threshold: f64,
    pub close_extreme_frac: f64,
    pub target_atr_mult: f64,
}

impl AlternateEvaluator for Shock {
    fn name(&self) -> &'static str {
        "shock"
    }

    fn evaluate(&self, m5: &FrameView<'_>) -> AltSignal {
        let (Some(i), Some(bar)) = (m5.last_index(), m5.last()) else {
            return AltSignal::none("NOT_ENOUGH_BARS");
        };
        let Some(atr) = prior_atr(m5, i) else {
            return AltSignal::none("ATR_NA");
        };

        let range = bar.range();
        let band = self.close_extreme_frac * range;
        let (signal, reason) = if range <= self.shock_threshold * atr {
            (Signal::None, "NO_SHOCK")
        } else if bar.close - bar.low <= band {
            (Signal::Buy, "shock mean-reversion long")
        } else if bar.high - bar.close <= band {
            (Signal::Sell, "shock mean-reversion short")
        } else {
            (Signal::None, "SHOCK_CLOSE_NOT_EXTREME")
        };

        AltSignal {
            signal,
            reason: reason.to_string(),
            atr: Some(atr),
            payload: json!({
                "setup": reason,
                "atr": atr,
                "range": range,
                "range_atr": range / atr,
                "close_location": bar.close_location(),
                "target_distance": self.target_atr_mult * atr,
            }),
        }
    }
}
