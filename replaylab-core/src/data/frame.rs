//! Per-timeframe frames: bars plus precomputed indicator columns, and the
//! bounded view the evaluators read through.

use crate::components::indicator::{Indicator, IndicatorValues};
use crate::domain::{Bar, Timeframe};

/// Column names the evaluators look up.
pub mod columns {
    pub const EMA_FAST: &str = "ema_fast";
    pub const EMA_SLOW: &str = "ema_slow";
    pub const ATR: &str = "atr";
    pub const MA: &str = "ma";
}

/// Bars of one timeframe with their indicator columns.
#[derive(Debug, Clone)]
pub struct Frame {
    pub timeframe: Timeframe,
    pub bars: Vec<Bar>,
    pub indicators: IndicatorValues,
}

impl Frame {
    /// Precompute every `(column, indicator)` pair over `bars`.
    ///
    /// Indicators are causal, so the value at row `i` equals what an
    /// incremental computation over `bars[..=i]` would produce.
    pub fn build(
        timeframe: Timeframe,
        bars: Vec<Bar>,
        columns: &[(&str, Box<dyn Indicator>)],
    ) -> Self {
        let mut indicators = IndicatorValues::new();
        for (column, indicator) in columns {
            let series = indicator.compute(&bars);
            debug_assert_eq!(
                series.len(),
                bars.len(),
                "indicator '{}' produced {} values for {} bars ({timeframe})",
                indicator.name(),
                series.len(),
                bars.len(),
            );
            indicators.insert(*column, series);
        }
        Self {
            timeframe,
            bars,
            indicators,
        }
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    /// View of the first `visible` rows.
    pub fn view(&self, visible: usize) -> FrameView<'_> {
        FrameView {
            frame: self,
            len: visible.min(self.bars.len()),
        }
    }
}

/// Read-only prefix of a frame. Rows past `len` are unreachable.
#[derive(Debug, Clone, Copy)]
pub struct FrameView<'a> {
    frame: &'a Frame,
    len: usize,
}

impl<'a> FrameView<'a> {
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn timeframe(&self) -> Timeframe {
        self.frame.timeframe
    }

    pub fn bars(&self) -> &'a [Bar] {
        &self.frame.bars[..self.len]
    }

    pub fn bar(&self, i: usize) -> Option<&'a Bar> {
        self.bars().get(i)
    }

    pub fn last(&self) -> Option<&'a Bar> {
        self.bars().last()
    }

    pub fn last_index(&self) -> Option<usize> {
        self.len.checked_sub(1)
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.frame.indicators.has_column(column)
    }

    /// Indicator value at row `i`, `None` for rows outside the view.
    pub fn value(&self, column: &str, i: usize) -> Option<f64> {
        if i >= self.len {
            return None;
        }
        self.frame.indicators.get(column, i)
    }

    /// Indicator value at the last visible row.
    pub fn last_value(&self, column: &str) -> Option<f64> {
        self.last_index().and_then(|i| self.value(column, i))
    }
}
