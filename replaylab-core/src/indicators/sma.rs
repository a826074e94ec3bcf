//! Simple Moving Average (SMA).
//!
//! Rolling mean of closes. First valid value at index period-1.

use crate::components::indicator::{Indicator, Series};
use crate::domain::Bar;

#[derive(Debug, Clone)]
pub struct Sma {
    period: usize,
    name: String,
}

impl Sma {
    pub fn new(period: usize) -> Self {
        let period = period.max(1);
        Self {
            period,
            name: format!("sma_{period}"),
        }
    }
}

impl Indicator for Sma {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.period.saturating_sub(1)
    }

    fn compute(&self, bars: &[Bar]) -> Series {
        let n = bars.len();
        let mut result = vec![None; n];
        if n < self.period {
            return result;
        }

        // Windows containing a non-finite close stay None.
        for end in (self.period - 1)..n {
            let window = &bars[end + 1 - self.period..=end];
            if window.iter().all(|b| b.close.is_finite()) {
                let sum: f64 = window.iter().map(|b| b.close).sum();
                result[end] = Some(sum / self.period as f64);
            }
        }

        result
    }
}
