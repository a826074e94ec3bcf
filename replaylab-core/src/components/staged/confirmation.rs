//! M15 confirmation — retest of the structural-break level.
//!
//! The zone is `level ± zone_atr_mult × ATR(M15)`, fixed each time the stage is
//! armed. M15 bars closed after the arming time are scanned in order: a close
//! through the far side of the zone invalidates the setup; a bar that touches
//! the zone and closes as a qualifying reversal candle inside it confirms.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::bias::BiasContext;
use crate::data::{columns, FrameView};
use crate::domain::{Bar, Confirmation, Direction};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConfirmationReason {
    NoBias,
    NoStructure,
    NotEnoughBars,
    AtrNa,
    WaitTouch,
    WaitReversal,
    ZoneInvalidated,
    Confirmed,
}

impl ConfirmationReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NoBias => "NO_BIAS",
            Self::NoStructure => "NO_STRUCTURE",
            Self::NotEnoughBars => "NOT_ENOUGH_BARS",
            Self::AtrNa => "ATR_NA",
            Self::WaitTouch => "WAIT_TOUCH",
            Self::WaitReversal => "WAIT_REVERSAL",
            Self::ZoneInvalidated => "ZONE_INVALIDATED",
            Self::Confirmed => "CONFIRMED",
        }
    }
}

impl fmt::Display for ConfirmationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetestZone {
    pub direction: Direction,
    pub low: f64,
    pub high: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfirmationContext {
    pub confirmation: Confirmation,
    pub zone: Option<RetestZone>,
    pub invalidated: bool,
    /// Close time of the confirming (or invalidating) M15 bar.
    pub timestamp: Option<NaiveDateTime>,
    /// H1 close time of the bias context this was derived from.
    pub bias_timestamp: Option<NaiveDateTime>,
    pub reason: ConfirmationReason,
}

impl ConfirmationContext {
    pub fn rejected(reason: ConfirmationReason, bias: &BiasContext) -> Self {
        Self {
            confirmation: Confirmation::No,
            zone: None,
            invalidated: false,
            timestamp: None,
            bias_timestamp: bias.timestamp,
            reason,
        }
    }

    pub fn direction(&self) -> Option<Direction> {
        self.zone.map(|z| z.direction)
    }

    pub fn is_ok(&self) -> bool {
        self.confirmation == Confirmation::Ok
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConfirmationParams {
    pub zone_atr_mult: f64,
    pub reversal_frac: f64,
}

#[derive(Debug, Clone)]
pub struct ConfirmationEvaluator {
    params: ConfirmationParams,
}

impl ConfirmationEvaluator {
    pub fn new(params: ConfirmationParams) -> Self {
        Self { params }
    }

    /// Build the retest zone for an active bias from the latest visible M15 ATR.
    pub fn build_zone(
        &self,
        bias: &BiasContext,
        m15: &FrameView<'_>,
    ) -> Result<RetestZone, ConfirmationReason> {
        let direction = bias.bias.direction().ok_or(ConfirmationReason::NoBias)?;
        let level = bias
            .structural_break
            .filter(|sb| sb.direction == direction)
            .ok_or(ConfirmationReason::NoStructure)?
            .level;
        if m15.is_empty() {
            return Err(ConfirmationReason::NotEnoughBars);
        }
        let atr = m15
            .last_value(columns::ATR)
            .ok_or(ConfirmationReason::AtrNa)?;
        let half = self.params.zone_atr_mult * atr;
        Ok(RetestZone {
            direction,
            low: level - half,
            high: level + half,
        })
    }

    /// Scan M15 bars closed after `armed_at` against `zone`.
    pub fn evaluate(
        &self,
        bias: &BiasContext,
        zone: RetestZone,
        m15: &FrameView<'_>,
        armed_at: NaiveDateTime,
    ) -> ConfirmationContext {
        let mut ctx = ConfirmationContext {
            confirmation: Confirmation::No,
            zone: Some(zone),
            invalidated: false,
            timestamp: None,
            bias_timestamp: bias.timestamp,
            reason: ConfirmationReason::NotEnoughBars,
        };

        let mut touched = false;
        let mut scanned = 0usize;
        for bar in m15.bars().iter().filter(|b| b.timestamp > armed_at) {
            scanned += 1;
            if closes_through(bar, &zone) {
                ctx.invalidated = true;
                ctx.timestamp = Some(bar.timestamp);
                ctx.reason = ConfirmationReason::ZoneInvalidated;
                return ctx;
            }
            if touches(bar, &zone) {
                touched = true;
                if self.is_reversal(bar, &zone) {
                    ctx.confirmation = Confirmation::Ok;
                    ctx.timestamp = Some(bar.timestamp);
                    ctx.reason = ConfirmationReason::Confirmed;
                    return ctx;
                }
            }
        }

        if scanned > 0 {
            ctx.reason = if touched {
                ConfirmationReason::WaitReversal
            } else {
                ConfirmationReason::WaitTouch
            };
        }
        ctx
    }

    fn is_reversal(&self, bar: &Bar, zone: &RetestZone) -> bool {
        let range = bar.range();
        if range <= 0.0 {
            return false;
        }
        let frac = self.params.reversal_frac;
        match zone.direction {
            Direction::Long => {
                bar.is_bullish() && bar.close >= zone.low && (bar.close - bar.low) >= frac * range
            }
            Direction::Short => {
                bar.is_bearish()
                    && bar.close <= zone.high
                    && (bar.high - bar.close) >= frac * range
            }
        }
    }
}

fn touches(bar: &Bar, zone: &RetestZone) -> bool {
    match zone.direction {
        Direction::Long => bar.low <= zone.high,
        Direction::Short => bar.high >= zone.low,
    }
}

fn closes_through(bar: &Bar, zone: &RetestZone) -> bool {
    match zone.direction {
        Direction::Long => bar.close < zone.low,
        Direction::Short => bar.close > zone.high,
    }
}
