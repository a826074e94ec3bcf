//! Opening-range breakout.
//!
//! The range is the high/low of the same-day bars that open inside
//! `range_window`. Once the window has passed, the first close beyond the
//! range (plus an ATR buffer) fires; later breaks on the same day are
//! reported as `ORB_ALREADY_FIRED`. Everything is derived from the visible
//! view on every call, so the evaluator holds no state between bars.

use serde_json::json;

use super::{prior_atr, AltSignal, AlternateEvaluator};
use crate::components::session::TimeWindow;
use crate::data::FrameView;
use crate::domain::{Bar, Signal};

#[derive(Debug, Clone)]
pub struct OpeningRange {
    pub range_window: TimeWindow,
    pub buffer_atr_mult: f64,
}

#[derive(Debug, Clone, Copy)]
struct DayRange {
    high: f64,
    low: f64,
    /// Index of the last bar inside the window.
    end: usize,
}

impl OpeningRange {
    /// First index of the calendar day of bar `i`.
    fn day_start(bars: &[Bar], i: usize) -> usize {
        let day = bars[i].timestamp.date();
        bars[..i]
            .iter()
            .rposition(|b| b.timestamp.date() != day)
            .map_or(0, |p| p + 1)
    }

    fn range(&self, bars: &[Bar], from: usize, to: usize) -> Option<DayRange> {
        bars[from..to]
            .iter()
            .enumerate()
            .filter(|(_, b)| self.range_window.contains(b.timestamp.time()))
            .fold(None, |acc: Option<DayRange>, (k, b)| {
                Some(match acc {
                    None => DayRange {
                        high: b.high,
                        low: b.low,
                        end: from + k,
                    },
                    Some(r) => DayRange {
                        high: r.high.max(b.high),
                        low: r.low.min(b.low),
                        end: from + k,
                    },
                })
            })
    }

    fn breakout(&self, m5: &FrameView<'_>, range: &DayRange, j: usize) -> Option<(Signal, f64)> {
        let atr = prior_atr(m5, j)?;
        let buffer = self.buffer_atr_mult * atr;
        let close = m5.bars()[j].close;
        if close > range.high + buffer {
            Some((Signal::Buy, buffer))
        } else if close < range.low - buffer {
            Some((Signal::Sell, buffer))
        } else {
            None
        }
    }
}

impl AlternateEvaluator for OpeningRange {
    fn name(&self) -> &'static str {
        "opening_range"
    }

    fn evaluate(&self, m5: &FrameView<'_>) -> AltSignal {
        let (Some(i), Some(bar)) = (m5.last_index(), m5.last()) else {
            return AltSignal::none("NOT_ENOUGH_BARS");
        };
        if self.range_window.contains(bar.timestamp.time()) {
            return AltSignal::none("ORB_RANGE_BUILDING");
        }
        let bars = m5.bars();
        let start = Self::day_start(bars, i);
        let Some(range) = self.range(bars, start, i) else {
            return AltSignal::none("ORB_NO_RANGE");
        };
        let Some(atr) = prior_atr(m5, i) else {
            return AltSignal::none("ATR_NA");
        };

        if (range.end + 1..i).any(|j| self.breakout(m5, &range, j).is_some()) {
            return AltSignal::none("ORB_ALREADY_FIRED");
        }

        let payload = |setup: &str, buffer: f64| {
            json!({
                "setup": setup,
                "range_high": range.high,
                "range_low": range.low,
                "range_width": range.high - range.low,
                "buffer": buffer,
                "atr": atr,
            })
        };
        match self.breakout(m5, &range, i) {
            Some((signal, buffer)) => {
                let reason = match signal {
                    Signal::Buy => "orb breakout long",
                    _ => "orb breakout short",
                };
                AltSignal {
                    signal,
                    reason: reason.to_string(),
                    atr: Some(atr),
                    payload: payload(reason, buffer),
                }
            }
            None => AltSignal {
                payload: payload("NO_BREAKOUT", self.buffer_atr_mult * atr),
                atr: Some(atr),
                ..AltSignal::none("NO_BREAKOUT")
            },
        }
    }
}
