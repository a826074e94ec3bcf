//! M5 entry trigger — micro-swing breakout past a volatility buffer.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::confirmation::ConfirmationContext;
use crate::data::{columns, FrameView};
use crate::domain::{Direction, Signal};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntryReason {
    NoConfirmation,
    NotEnoughBars,
    NoBreakout,
    Breakout,
}

impl EntryReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NoConfirmation => "NO_CONFIRMATION",
            Self::NotEnoughBars => "NOT_ENOUGH_BARS",
            Self::NoBreakout => "NO_BREAKOUT",
            Self::Breakout => "BREAKOUT",
        }
    }
}

/// Transient entry evaluation, valid only for the bar that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntrySetup {
    pub signal: Signal,
    /// Close of the triggering bar.
    pub trigger_price: f64,
    pub swing_high: f64,
    pub swing_low: f64,
    pub buffer: f64,
    pub timestamp: NaiveDateTime,
    pub bar_index: usize,
    pub reason: EntryReason,
}

impl EntrySetup {
    /// Protective stop beyond the opposite side of the micro swing.
    pub fn stop_price(&self) -> Option<f64> {
        match self.signal {
            Signal::Buy => Some(self.swing_low - self.buffer),
            Signal::Sell => Some(self.swing_high + self.buffer),
            Signal::None => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EntryParams {
    pub swing_lookback: usize,
    pub buffer_atr_mult: f64,
    pub min_buffer: f64,
}

#[derive(Debug, Clone)]
pub struct EntryEvaluator {
    params: EntryParams,
}

impl EntryEvaluator {
    pub fn new(params: EntryParams) -> Self {
        Self { params }
    }

    /// Evaluate the last bar of `m5` against the micro swing of the bars before it.
    pub fn evaluate(&self, confirmation: &ConfirmationContext, m5: &FrameView<'_>) -> Option<EntrySetup> {
        let i = m5.last_index()?;
        let bar = m5.last()?;
        let mut setup = EntrySetup {
            signal: Signal::None,
            trigger_price: bar.close,
            swing_high: f64::NAN,
            swing_low: f64::NAN,
            buffer: 0.0,
            timestamp: bar.timestamp,
            bar_index: i,
            reason: EntryReason::NoConfirmation,
        };

        let direction = match confirmation.direction() {
            Some(d) if confirmation.is_ok() => d,
            _ => return Some(setup),
        };

        let lookback = self.params.swing_lookback;
        if i < lookback {
            setup.reason = EntryReason::NotEnoughBars;
            return Some(setup);
        }
        let window = &m5.bars()[i - lookback..i];
        setup.swing_high = window.iter().map(|b| b.high).fold(f64::MIN, f64::max);
        setup.swing_low = window.iter().map(|b| b.low).fold(f64::MAX, f64::min);
        setup.buffer = m5
            .value(columns::ATR, i)
            .map_or(self.params.min_buffer, |atr| self.params.buffer_atr_mult * atr);

        let fired = match direction {
            Direction::Long => bar.close > setup.swing_high + setup.buffer,
            Direction::Short => bar.close < setup.swing_low - setup.buffer,
        };
        if fired {
            setup.signal = Signal::from_direction(direction);
            setup.reason = EntryReason::Breakout;
        } else {
            setup.reason = EntryReason::NoBreakout;
        }
        Some(setup)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::indicator::IndicatorValues;
    use crate::components::staged::confirmation::{ConfirmationReason, RetestZone};
    use crate::data::Frame;
    use crate::domain::{Bar, Confirmation, Timeframe};
    use chrono::{Duration, NaiveDate};

    fn confirmed(direction: Direction) -> ConfirmationContext {
        ConfirmationContext {
            confirmation: Confirmation::Ok,
            zone: Some(RetestZone {
                direction,
                low: 99.0,
                high: 101.0,
            }),
            invalidated: false,
            timestamp: None,
            bias_timestamp: None,
            reason: ConfirmationReason::Confirmed,
        }
    }

    fn m5(closes: &[f64]) -> Frame {
        let base = NaiveDate::from_ymd_opt(2024, 1, 2)
            .unwrap()
            .and_hms_opt(11, 0, 0)
            .unwrap();
        let bars: Vec<Bar> = closes
            .iter()
            .enumerate()
            .map(|(i, &c)| Bar::new(base + Duration::minutes(5 * i as i64), c, c + 0.5, c - 0.5, c))
            .collect();
        let mut indicators = IndicatorValues::new();
        indicators.insert(columns::ATR, vec![Some(1.0); bars.len()]);
        Frame {
            timeframe: Timeframe::M5,
            bars,
            indicators,
        }
    }

    fn evaluator() -> EntryEvaluator {
        EntryEvaluator::new(EntryParams {
            swing_lookback: 3,
            buffer_atr_mult: 0.2,
            min_buffer: 0.0,
        })
    }

    #[test]
    fn buy_on_break_of_swing_high_plus_buffer() {
        let f = m5(&[100.0, 100.4, 100.2, 101.2]);
        let setup = evaluator().evaluate(&confirmed(Direction::Long), &f.view(4)).unwrap();
        assert_eq!(setup.signal, Signal::Buy);
        assert_eq!(setup.reason, EntryReason::Breakout);
        assert!((setup.swing_high - 100.9).abs() < 1e-12);
        assert!((setup.swing_low - 99.5).abs() < 1e-12);
        assert!((setup.buffer - 0.2).abs() < 1e-12);
        assert_eq!(setup.trigger_price, 101.2);
        assert_eq!(setup.bar_index, 3);
        assert!((setup.stop_price().unwrap() - 99.3).abs() < 1e-12);
    }

    #[test]
    fn break_inside_buffer_does_not_fire() {
        let f = m5(&[100.0, 100.4, 100.2, 101.0]);
        let setup = evaluator().evaluate(&confirmed(Direction::Long), &f.view(4)).unwrap();
        assert_eq!(setup.signal, Signal::None);
        assert_eq!(setup.reason, EntryReason::NoBreakout);
    }

    #[test]
    fn sell_mirror() {
        let f = m5(&[100.0, 99.6, 99.8, 98.8]);
        let setup = evaluator().evaluate(&confirmed(Direction::Short), &f.view(4)).unwrap();
        assert_eq!(setup.signal, Signal::Sell);
        assert!((setup.stop_price().unwrap() - (100.5 + 0.2)).abs() < 1e-12);
    }

    #[test]
    fn min_buffer_applies_only_without_atr() {
        let evaluator = EntryEvaluator::new(EntryParams {
            swing_lookback: 3,
            buffer_atr_mult: 0.2,
            min_buffer: 0.5,
        });
        let mut f = m5(&[100.0, 100.4, 100.2, 101.2]);
        let setup = evaluator.evaluate(&confirmed(Direction::Long), &f.view(4)).unwrap();
        assert!((setup.buffer - 0.2).abs() < 1e-12);
        assert_eq!(setup.signal, Signal::Buy);

        f.indicators.insert(columns::ATR, vec![None; 4]);
        let setup = evaluator.evaluate(&confirmed(Direction::Long), &f.view(4)).unwrap();
        assert!((setup.buffer - 0.5).abs() < 1e-12);
        assert_eq!(setup.signal, Signal::None);
        assert_eq!(setup.reason, EntryReason::NoBreakout);
    }

    #[test]
    fn needs_confirmation_and_history() {
        let f = m5(&[100.0, 100.4, 100.2, 101.2]);
        let mut not_ok = confirmed(Direction::Long);
        not_ok.confirmation = Confirmation::No;
        let setup = evaluator().evaluate(&not_ok, &f.view(4)).unwrap();
        assert_eq!(setup.reason, EntryReason::NoConfirmation);

        let setup = evaluator().evaluate(&confirmed(Direction::Long), &f.view(2)).unwrap();
        assert_eq!(setup.reason, EntryReason::NotEnoughBars);
        assert!(evaluator().evaluate(&confirmed(Direction::Long), &f.view(0)).is_none());
    }
}
