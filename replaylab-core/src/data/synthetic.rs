//! Synthetic M5 data for demos, tests and benches.
//!
//! Both generators are fully determined by their seed. Days are weekdays
//! only, 288 bars each (00:00 to 23:55).

use chrono::{Datelike, NaiveDate, NaiveTime, Weekday};
use rand::rngs::StdRng;
use rand::Rng;

use crate::domain::{Bar, Timeframe};
use crate::rng::RngHierarchy;

const BARS_PER_DAY: usize = 288;

/// Closes of the six range-window bars relative to the 08:00 open.
const RANGE_OFFSETS: [f64; 6] = [0.1, -0.1, 0.15, -0.15, 0.05, 0.0];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SyntheticConfig {
    pub start: NaiveDate,
    /// Trading days to generate; weekends are skipped.
    pub days: usize,
    pub base_price: f64,
    pub seed: u64,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            start: NaiveDate::from_ymd_opt(2024, 1, 2).unwrap_or_default(),
            days: 5,
            base_price: 100.0,
            seed: 42,
        }
    }
}

fn trading_days(config: &SyntheticConfig) -> impl Iterator<Item = NaiveDate> {
    config
        .start
        .iter_days()
        .filter(|d| !matches!(d.weekday(), Weekday::Sat | Weekday::Sun))
        .take(config.days)
}

/// Bar from `open` to `close` with wicks of up to `wick` on each side.
fn bar_between(rng: &mut StdRng, day: NaiveDate, k: usize, open: f64, close: f64, wick: f64) -> Bar {
    let ts = day.and_time(NaiveTime::MIN) + Timeframe::M5.duration() * k as i32;
    let high = open.max(close) + rng.gen_range(0.0..=wick);
    let low = open.min(close) - rng.gen_range(0.0..=wick);
    let mut bar = Bar::new(ts, open, high, low, close);
    bar.volume = rng.gen_range(500.0..1500.0_f64).round();
    bar
}

/// Days shaped for an 08:00-08:30 opening range: a quiet night, a tight
/// range inside the window, then a trend leg of 18 bars in a random
/// direction starting at 08:30, then quiet drift.
///
/// The leg moves 0.15 per bar with at most 0.03 noise, so its second bar
/// always closes beyond the range (range extremes sit within 0.2 of the
/// 08:00 open).
pub fn opening_range_days(config: &SyntheticConfig) -> Vec<Bar> {
    let seeds = RngHierarchy::new(config.seed);
    let mut bars = Vec::with_capacity(config.days * BARS_PER_DAY);
    let mut price = config.base_price;

    for (d, day) in trading_days(config).enumerate() {
        let mut rng = seeds.rng_for("opening_range", d as u64);
        let direction = if rng.gen_bool(0.5) { 1.0 } else { -1.0 };
        let mut anchor = price;

        for k in 0..BARS_PER_DAY {
            let minute = k * 5;
            let open = price;
            let (close, wick) = match minute {
                m if m < 8 * 60 => (price + rng.gen_range(-0.05..=0.05), 0.05),
                m if m < 8 * 60 + 30 => {
                    if m == 8 * 60 {
                        anchor = price;
                    }
                    (anchor + RANGE_OFFSETS[(m - 8 * 60) / 5], 0.05)
                }
                m if m < 8 * 60 + 30 + 18 * 5 => {
                    (price + direction * 0.15 + rng.gen_range(-0.03..=0.03), 0.03)
                }
                _ => (price + rng.gen_range(-0.04..=0.04), 0.04),
            };
            bars.push(bar_between(&mut rng, day, k, open, close, wick));
            price = close;
        }
    }
    bars
}

/// Persistent drift with pullback waves of 48 bars, for the staged family.
pub fn trending_days(config: &SyntheticConfig, drift: f64) -> Vec<Bar> {
    let seeds = RngHierarchy::new(config.seed);
    let mut bars = Vec::with_capacity(config.days * BARS_PER_DAY);
    let mut price = config.base_price;
    let mut n = 0usize;

    for (d, day) in trading_days(config).enumerate() {
        let mut rng = seeds.rng_for("trending", d as u64);
        for k in 0..BARS_PER_DAY {
            let phase = (n % 48) as f64 / 48.0 * std::f64::consts::TAU;
            let wave = 0.04 * phase.cos();
            let close = price + drift + wave + rng.gen_range(-0.05..=0.05);
            bars.push(bar_between(&mut rng, day, k, price, close, 0.06));
            price = close;
            n += 1;
        }
    }
    bars
}
