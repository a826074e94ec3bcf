//! Cost model — half spread plus slippage against the trader on every fill.

use crate::domain::Direction;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CostModel {
    /// Full quoted spread in price units.
    pub spread: f64,
    /// Adverse slippage per fill in price units.
    pub slippage: f64,
}

impl CostModel {
    pub fn new(spread: f64, slippage: f64) -> Self {
        Self { spread, slippage }
    }

    pub fn frictionless() -> Self {
        Self::default()
    }

    /// Cost paid on one side of a round trip.
    pub fn per_side(&self) -> f64 {
        self.spread / 2.0 + self.slippage
    }

    /// Spread plus slippage on both sides.
    pub fn round_trip(&self) -> f64 {
        2.0 * self.per_side()
    }

    /// Longs buy higher, shorts sell lower.
    pub fn entry_fill(&self, mid: f64, direction: Direction) -> f64 {
        mid + direction.sign() * self.per_side()
    }

    /// Mirror of `entry_fill`.
    pub fn exit_fill(&self, mid: f64, direction: Direction) -> f64 {
        mid - direction.sign() * self.per_side()
    }
}
