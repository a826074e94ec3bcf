//! Indicator trait and the per-timeframe column store.
//!
//! Indicators are pure functions: bar history in, nullable numeric series out.
//! They are precomputed once per timeframe before the bar loop. `None` means
//! "not yet computed" and is never conflated with a computed zero.

use crate::domain::Bar;
use std::collections::HashMap;

/// A nullable indicator series, one value per bar.
pub type Series = Vec<Option<f64>>;

/// A causal per-bar series over one timeframe.
///
/// The value at index `t` reads bars `0..=t` only, so computing over a
/// truncated slice reproduces the prefix of the full computation.
pub trait Indicator: Send + Sync {
    /// Column-style name, e.g. `ema_20`.
    fn name(&self) -> &str;

    /// Number of leading `None` values.
    fn lookback(&self) -> usize;

    /// One value per input bar.
    fn compute(&self, bars: &[Bar]) -> Series;
}

/// Container for precomputed indicator columns, keyed by column name.
#[derive(Debug, Clone, Default)]
pub struct IndicatorValues {
    series: HashMap<String, Series>,
}

impl IndicatorValues {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a named column.
    pub fn insert(&mut self, name: impl Into<String>, values: Series) {
        self.series.insert(name.into(), values);
    }

    /// Value of a column at a bar index. `None` when the column is missing,
    /// the index is out of range or the value is not yet computed.
    pub fn get(&self, name: &str, bar_index: usize) -> Option<f64> {
        self.series
            .get(name)
            .and_then(|v| v.get(bar_index).copied().flatten())
            .filter(|v| v.is_finite())
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.series.contains_key(name)
    }

    pub fn get_series(&self, name: &str) -> Option<&[Option<f64>]> {
        self.series.get(name).map(|v| v.as_slice())
    }

    /// Number of columns stored.
    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }
}
