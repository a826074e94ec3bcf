//! Concrete indicator implementations.
//!
//! All indicators implement the `Indicator` trait from `components::indicator`
//! and are precomputed once per timeframe before the bar loop.

pub mod atr;
pub mod ema;
pub mod sma;

pub use atr::{true_range, wilder_volatility, Atr};
pub use ema::{ema_of_series, Ema};
pub use sma::Sma;

/// M5 bars built from a close path. Each bar opens at the previous close
/// and spans one point either side of its body.
#[cfg(test)]
pub fn make_bars(closes: &[f64]) -> Vec<crate::domain::Bar> {
    use crate::domain::Bar;
    let base = chrono::NaiveDate::from_ymd_opt(2024, 1, 2)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap();
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| {
            let open = if i == 0 { close } else { closes[i - 1] };
            let mut bar = Bar::new(
                base + chrono::Duration::minutes(5 * i as i64),
                open,
                open.max(close) + 1.0,
                open.min(close) - 1.0,
                close,
            );
            bar.volume = 1000.0;
            bar
        })
        .collect()
}

/// Panics unless `actual` is within `epsilon` of `expected`.
#[cfg(test)]
pub fn assert_approx(actual: f64, expected: f64, epsilon: f64) {
    assert!(
        (actual - expected).abs() < epsilon,
        "value mismatch: actual={actual}, expected={expected}, diff={}, epsilon={epsilon}",
        (actual - expected).abs()
    );
}

/// Tolerance for exact-arithmetic indicator checks.
#[cfg(test)]
pub const DEFAULT_EPSILON: f64 = 1e-10;
