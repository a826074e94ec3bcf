//! Average True Range (ATR), Wilder style.
//!
//! True Range: TR[0] = high-low, TR[t] = max(high-low, |high-prev_close|, |low-prev_close|).
//! ATR[0] is undefined, ATR[1] = mean(TR[0], TR[1]),
//! ATR[t] = (ATR[t-1] * (period-1) + TR[t]) / period thereafter.

use crate::components::indicator::{Indicator, Series};
use crate::domain::Bar;

#[derive(Debug, Clone)]
pub struct Atr {
    period: usize,
    name: String,
}

impl Atr {
    /// Periods below 1 are clamped to 1; config validation rejects them earlier.
    pub fn new(period: usize) -> Self {
        let period = period.max(1);
        Self {
            period,
            name: format!("atr_{period}"),
        }
    }
}

/// True Range series. Non-finite inputs yield `None` at that bar.
pub fn true_range(bars: &[Bar]) -> Series {
    bars.iter()
        .enumerate()
        .map(|(i, bar)| {
            if bar.is_void() {
                return None;
            }
            let hl = bar.high - bar.low;
            if i == 0 {
                return Some(hl);
            }
            let pc = bars[i - 1].close;
            if !pc.is_finite() {
                return None;
            }
            Some(hl.max((bar.high - pc).abs()).max((bar.low - pc).abs()))
        })
        .collect()
}

/// Wilder smoothing of a true-range series, seeded by the mean of the first
/// two values. A gap ends the series.
pub fn wilder_volatility(tr: &[Option<f64>], period: usize) -> Series {
    let n = tr.len();
    let mut result = vec![None; n];
    if n < 2 || period == 0 {
        return result;
    }

    let (Some(tr0), Some(tr1)) = (tr[0], tr[1]) else {
        return result;
    };
    let mut prev = (tr0 + tr1) / 2.0;
    result[1] = Some(prev);

    let p = period as f64;
    for i in 2..n {
        let Some(value) = tr[i] else {
            return result;
        };
        prev = (prev * (p - 1.0) + value) / p;
        result[i] = Some(prev);
    }

    result
}

impl Indicator for Atr {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        1
    }

    fn compute(&self, bars: &[Bar]) -> Series {
        wilder_volatility(&true_range(bars), self.period)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{assert_approx, DEFAULT_EPSILON};

    fn make_ohlc_bars(data: &[(f64, f64, f64, f64)]) -> Vec<Bar> {
        let base = chrono::NaiveDate::from_ymd_opt(2024, 1, 2)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        data.iter()
            .enumerate()
            .map(|(i, &(open, high, low, close))| {
                Bar::new(
                    base + chrono::Duration::minutes(5 * i as i64),
                    open,
                    high,
                    low,
                    close,
                )
            })
            .collect()
    }

    #[test]
    fn true_range_basic() {
        let bars = make_ohlc_bars(&[
            (100.0, 105.0, 95.0, 102.0),  // TR = 10
            (102.0, 108.0, 100.0, 106.0), // TR = max(8, 6, 2) = 8
            (106.0, 107.0, 98.0, 99.0),   // TR = max(9, 1, 8) = 9
        ]);
        let tr = true_range(&bars);
        assert_approx(tr[0].unwrap(), 10.0, DEFAULT_EPSILON);
        assert_approx(tr[1].unwrap(), 8.0, DEFAULT_EPSILON);
        assert_approx(tr[2].unwrap(), 9.0, DEFAULT_EPSILON);
    }

    #[test]
    fn true_range_gap_up() {
        let bars = make_ohlc_bars(&[
            (98.0, 102.0, 97.0, 100.0),
            (110.0, 115.0, 108.0, 112.0), // TR = max(7, 15, 8) = 15
        ]);
        assert_approx(true_range(&bars)[1].unwrap(), 15.0, DEFAULT_EPSILON);
    }

    #[test]
    fn atr_period_3_known_values() {
        let bars = make_ohlc_bars(&[
            (100.0, 105.0, 95.0, 102.0),  // TR = 10
            (102.0, 108.0, 100.0, 106.0), // TR = 8
            (106.0, 107.0, 98.0, 99.0),   // TR = 9
            (99.0, 103.0, 97.0, 101.0),   // TR = 6
        ]);
        let result = Atr::new(3).compute(&bars);

        assert_eq!(result[0], None);
        // mean(10, 8) = 9
        assert_approx(result[1].unwrap(), 9.0, DEFAULT_EPSILON);
        // (9*2 + 9)/3 = 9
        assert_approx(result[2].unwrap(), 9.0, DEFAULT_EPSILON);
        // (9*2 + 6)/3 = 8
        assert_approx(result[3].unwrap(), 8.0, DEFAULT_EPSILON);
    }

    #[test]
    fn atr_single_bar_is_undefined() {
        let bars = make_ohlc_bars(&[(100.0, 101.0, 99.0, 100.0)]);
        assert_eq!(Atr::new(14).compute(&bars), vec![None]);
    }

    #[test]
    fn atr_gap_in_tr_stops_series() {
        let tr = vec![Some(2.0), Some(4.0), None, Some(1.0)];
        let result = wilder_volatility(&tr, 2);
        assert_eq!(result[1], Some(3.0));
        assert_eq!(result[2], None);
        assert_eq!(result[3], None);
    }
}
