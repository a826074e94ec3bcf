//! Fixed-fractional risk sizing.
//!
//! ```text
//! risk_amount   = equity × risk_pct
//! stop_distance = max(|entry − stop|, EPSILON)
//! size          = risk_amount / stop_distance
//! ```

use serde::{Deserialize, Serialize};

/// Floor for the stop distance.
pub const EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PositionSize {
    pub size: f64,
    pub risk_amount: f64,
    pub stop_distance: f64,
}

pub fn position_size(equity: f64, risk_pct: f64, entry: f64, stop: f64) -> PositionSize {
    let stop_distance = (entry - stop).abs().max(EPSILON);
    let risk_amount = (equity * risk_pct).max(0.0);
    PositionSize {
        size: risk_amount / stop_distance,
        risk_amount,
        stop_distance,
    }
}
