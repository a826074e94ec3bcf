//! Engine configuration — TOML-loadable, validated before the engine starts.
//!
//! Every section carries serde defaults so a config file only needs the keys
//! it changes. `EngineConfig::validate` runs inside `Engine::new`; a config
//! that fails validation never reaches the bar loop.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::components::session::{parse_windows, SessionWindows, TimeWindow};

/// Fatal configuration errors, raised at construction time.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid time window '{window}': {reason}")]
    InvalidWindow { window: String, reason: String },
    #[error("missing config section [{0}] required by strategy_family")]
    MissingSection(&'static str),
    #[error("{field} = {value} is out of range (expected {expected})")]
    OutOfRange {
        field: &'static str,
        value: f64,
        expected: &'static str,
    },
}

/// Which signal model drives the replay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyFamily {
    /// H1 bias → M15 confirmation → M5 entry.
    #[default]
    Staged,
    /// Stateless, session-windowed per-bar evaluators.
    Session,
}

/// Alternate evaluator variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlternateModel {
    #[default]
    MeanReversion,
    Shock,
    OpeningRange,
}

impl AlternateModel {
    pub fn name(self) -> &'static str {
        match self {
            Self::MeanReversion => "mean_reversion",
            Self::Shock => "shock",
            Self::OpeningRange => "opening_range",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub starting_balance: f64,
    /// Fraction of current equity risked per trade (0.01 = 1%).
    pub risk_per_trade_pct: f64,
    pub strategy_family: StrategyFamily,
    /// Entries per calendar day; unlimited when absent.
    pub max_trades_per_day: Option<u32>,
    /// Full quoted spread in price units; half is paid on each side.
    pub spread_usd: f64,
    /// Adverse slippage per fill in price units.
    pub slippage_usd: f64,
    pub sessions: SessionConfig,
    pub cost_sanity: CostSanityConfig,
    pub staged: StagedConfig,
    pub alternate: Option<AlternateConfig>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            starting_balance: 10_000.0,
            risk_per_trade_pct: 0.01,
            strategy_family: StrategyFamily::Staged,
            max_trades_per_day: None,
            spread_usd: 0.0,
            slippage_usd: 0.0,
            sessions: SessionConfig::default(),
            cost_sanity: CostSanityConfig::default(),
            staged: StagedConfig::default(),
            alternate: None,
        }
    }
}

/// Regime session windows plus global blocked windows.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Entry windows for the staged (trend) family. Empty admits all day.
    pub trend: Vec<String>,
    /// Entry windows for the session (range) family when the alternate block
    /// names none of its own.
    pub range: Vec<String>,
    /// Never enter inside these windows, whatever the family.
    pub blocked: Vec<String>,
}

/// Entry admission bounds on costs and distances. Each bound is off when absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CostSanityConfig {
    /// Max round-trip cost (spread + 2 × slippage) as a multiple of ATR.
    pub max_cost_atr_mult: Option<f64>,
    /// Max stop distance as a fraction of entry price.
    pub max_sl_frac: Option<f64>,
    /// Max target distance as a fraction of entry price.
    pub max_tp_frac: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StagedConfig {
    // ── Indicators (shared by H1, M15, M5) ──
    pub ema_fast: usize,
    pub ema_slow: usize,
    pub atr_period: usize,

    // ── H1 bias ──
    pub min_bars: usize,
    pub slope_lookback: usize,
    pub bias_dist_mult: f64,
    pub min_sep_mult: f64,
    pub structure_lookback: usize,
    pub structure_window: usize,

    // ── M15 confirmation ──
    pub zone_atr_mult: f64,
    pub reversal_frac: f64,

    // ── M5 entry ──
    pub swing_lookback: usize,
    pub buffer_atr_mult: f64,
    pub min_buffer: f64,
    /// M5 bars to wait for a trigger after confirmation before re-arming.
    pub entry_expiry_bars: Option<usize>,

    // ── Exits ──
    pub target_r: f64,
    pub tp1_r: Option<f64>,
    pub partial_fraction: f64,
    pub max_hold_bars: Option<usize>,
    pub ma_cross_exit: bool,
    pub break_even_trigger_r: Option<f64>,
}

impl Default for StagedConfig {
    fn default() -> Self {
        Self {
            ema_fast: 20,
            ema_slow: 50,
            atr_period: 14,
            min_bars: 50,
            slope_lookback: 3,
            bias_dist_mult: 0.25,
            min_sep_mult: 0.1,
            structure_lookback: 10,
            structure_window: 24,
            zone_atr_mult: 0.5,
            reversal_frac: 0.6,
            swing_lookback: 6,
            buffer_atr_mult: 0.1,
            min_buffer: 0.0,
            entry_expiry_bars: Some(36),
            target_r: 2.0,
            tp1_r: Some(1.0),
            partial_fraction: 0.5,
            max_hold_bars: Some(96),
            ma_cross_exit: false,
            break_even_trigger_r: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlternateConfig {
    pub signal_model: AlternateModel,

    // ── Indicators ──
    pub ma_period: usize,
    pub atr_period: usize,
    pub ema_fast: usize,
    pub ema_slow: usize,

    // ── Thresholds ──
    /// Mean-reversion: |close - ma| must exceed this many ATR.
    pub deviation_threshold: f64,
    /// Mean-reversion: close must sit within this fraction of the far extreme.
    pub extreme_frac: f64,
    /// Shock: bar range must exceed this many ATR.
    pub shock_threshold: f64,
    /// Shock: close must sit within this fraction of the low (buy) or high (sell).
    pub close_extreme_frac: f64,
    /// Opening range: window that builds the reference range each day.
    pub orb_range_window: String,
    /// Opening range: breakout must clear the range by this many ATR.
    pub orb_buffer_atr_mult: f64,

    // ── Exits ──
    pub stop_atr_mult: f64,
    pub target_atr_mult: f64,
    pub max_hold_bars: Option<usize>,
    pub break_even_trigger_r: Option<f64>,
    pub ma_cross_exit: bool,

    // ── Windows ──
    pub entry_windows: Vec<String>,
    pub excluded_windows: Vec<String>,
}

impl Default for AlternateConfig {
    fn default() -> Self {
        Self {
            signal_model: AlternateModel::MeanReversion,
            ma_period: 20,
            atr_period: 14,
            ema_fast: 9,
            ema_slow: 21,
            deviation_threshold: 2.0,
            extreme_frac: 0.3,
            shock_threshold: 2.5,
            close_extreme_frac: 0.25,
            orb_range_window: "08:00-08:30".into(),
            orb_buffer_atr_mult: 0.0,
            stop_atr_mult: 1.5,
            target_atr_mult: 2.0,
            max_hold_bars: Some(24),
            break_even_trigger_r: None,
            ma_cross_exit: false,
            entry_windows: Vec::new(),
            excluded_windows: Vec::new(),
        }
    }
}

impl EngineConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the engine cannot run unambiguously.
    pub fn validate(&self) -> Result<(), ConfigError> {
        positive("starting_balance", self.starting_balance)?;
        in_range("risk_per_trade_pct", self.risk_per_trade_pct, 0.0, 1.0, "0 < x <= 1", false)?;
        non_negative("spread_usd", self.spread_usd)?;
        non_negative("slippage_usd", self.slippage_usd)?;
        if let Some(n) = self.max_trades_per_day {
            positive("max_trades_per_day", f64::from(n))?;
        }
        if let Some(v) = self.cost_sanity.max_cost_atr_mult {
            positive("cost_sanity.max_cost_atr_mult", v)?;
        }
        if let Some(v) = self.cost_sanity.max_sl_frac {
            positive("cost_sanity.max_sl_frac", v)?;
        }
        if let Some(v) = self.cost_sanity.max_tp_frac {
            positive("cost_sanity.max_tp_frac", v)?;
        }

        parse_windows(&self.sessions.trend)?;
        parse_windows(&self.sessions.range)?;
        parse_windows(&self.sessions.blocked)?;

        match self.strategy_family {
            StrategyFamily::Staged => self.staged.validate(),
            StrategyFamily::Session => self
                .alternate
                .as_ref()
                .ok_or(ConfigError::MissingSection("alternate"))?
                .validate(),
        }
    }

    /// Entry windows for the staged family.
    pub fn staged_windows(&self) -> Result<SessionWindows, ConfigError> {
        Ok(SessionWindows::new(
            parse_windows(&self.sessions.trend)?,
            parse_windows(&self.sessions.blocked)?,
        ))
    }

    /// Entry windows for the session family: the alternate block's own
    /// windows, falling back to the range-regime windows.
    pub fn alternate_windows(&self, alt: &AlternateConfig) -> Result<SessionWindows, ConfigError> {
        let allow = if alt.entry_windows.is_empty() {
            parse_windows(&self.sessions.range)?
        } else {
            parse_windows(&alt.entry_windows)?
        };
        let mut deny = parse_windows(&alt.excluded_windows)?;
        deny.extend(parse_windows(&self.sessions.blocked)?);
        Ok(SessionWindows::new(allow, deny))
    }
}

impl StagedConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        period("staged.ema_fast", self.ema_fast)?;
        period("staged.ema_slow", self.ema_slow)?;
        period("staged.atr_period", self.atr_period)?;
        period("staged.slope_lookback", self.slope_lookback)?;
        period("staged.structure_lookback", self.structure_lookback)?;
        period("staged.structure_window", self.structure_window)?;
        period("staged.swing_lookback", self.swing_lookback)?;
        non_negative("staged.bias_dist_mult", self.bias_dist_mult)?;
        non_negative("staged.min_sep_mult", self.min_sep_mult)?;
        non_negative("staged.zone_atr_mult", self.zone_atr_mult)?;
        in_range("staged.reversal_frac", self.reversal_frac, 0.0, 1.0, "0 <= x <= 1", true)?;
        non_negative("staged.buffer_atr_mult", self.buffer_atr_mult)?;
        non_negative("staged.min_buffer", self.min_buffer)?;
        positive("staged.target_r", self.target_r)?;
        if let Some(tp1) = self.tp1_r {
            positive("staged.tp1_r", tp1)?;
            if tp1 >= self.target_r {
                return Err(ConfigError::OutOfRange {
                    field: "staged.tp1_r",
                    value: tp1,
                    expected: "below staged.target_r",
                });
            }
            in_range("staged.partial_fraction", self.partial_fraction, 0.0, 1.0, "0 < x < 1", false)?;
            if self.partial_fraction >= 1.0 {
                return Err(ConfigError::OutOfRange {
                    field: "staged.partial_fraction",
                    value: self.partial_fraction,
                    expected: "0 < x < 1",
                });
            }
        }
        if let Some(bars) = self.max_hold_bars {
            period("staged.max_hold_bars", bars)?;
        }
        if let Some(r) = self.break_even_trigger_r {
            positive("staged.break_even_trigger_r", r)?;
        }
        Ok(())
    }
}

impl AlternateConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        period("alternate.ma_period", self.ma_period)?;
        period("alternate.atr_period", self.atr_period)?;
        period("alternate.ema_fast", self.ema_fast)?;
        period("alternate.ema_slow", self.ema_slow)?;
        non_negative("alternate.deviation_threshold", self.deviation_threshold)?;
        in_range("alternate.extreme_frac", self.extreme_frac, 0.0, 1.0, "0 <= x <= 1", true)?;
        non_negative("alternate.shock_threshold", self.shock_threshold)?;
        in_range(
            "alternate.close_extreme_frac",
            self.close_extreme_frac,
            0.0,
            1.0,
            "0 <= x <= 1",
            true,
        )?;
        non_negative("alternate.orb_buffer_atr_mult", self.orb_buffer_atr_mult)?;
        positive("alternate.stop_atr_mult", self.stop_atr_mult)?;
        positive("alternate.target_atr_mult", self.target_atr_mult)?;
        if let Some(bars) = self.max_hold_bars {
            period("alternate.max_hold_bars", bars)?;
        }
        if let Some(r) = self.break_even_trigger_r {
            positive("alternate.break_even_trigger_r", r)?;
        }
        parse_windows(&self.entry_windows)?;
        parse_windows(&self.excluded_windows)?;
        if self.signal_model == AlternateModel::OpeningRange {
            let window = self.orb_window()?;
            if window.start == window.end {
                return Err(ConfigError::InvalidWindow {
                    window: self.orb_range_window.clone(),
                    reason: "opening range needs distinct start and end".into(),
                });
            }
        }
        Ok(())
    }

    pub fn orb_window(&self) -> Result<TimeWindow, ConfigError> {
        self.orb_range_window.parse()
    }
}

// ── Validation helpers ──

fn positive(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            field,
            value,
            expected: "> 0",
        })
    }
}

fn non_negative(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            field,
            value,
            expected: ">= 0",
        })
    }
}

fn period(field: &'static str, value: usize) -> Result<(), ConfigError> {
    if value >= 1 {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            field,
            value: value as f64,
            expected: ">= 1",
        })
    }
}

/// `lo < value <= hi`, or `lo <= value <= hi` when `inclusive_lo`.
fn in_range(
    field: &'static str,
    value: f64,
    lo: f64,
    hi: f64,
    expected: &'static str,
    inclusive_lo: bool,
) -> Result<(), ConfigError> {
    let above_lo = if inclusive_lo { value >= lo } else { value > lo };
    if value.is_finite() && above_lo && value <= hi {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            field,
            value,
            expected,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        EngineConfig::default().validate().unwrap();
    }

    #[test]
    fn parse_partial_toml_fills_defaults() {
        let config = EngineConfig::from_toml_str(
            r#"
            starting_balance = 25000.0
            risk_per_trade_pct = 0.005

            [staged]
            ema_fast = 10
            "#,
        )
        .unwrap();
        assert_eq!(config.starting_balance, 25_000.0);
        assert_eq!(config.staged.ema_fast, 10);
        assert_eq!(config.staged.ema_slow, 50);
        assert_eq!(config.strategy_family, StrategyFamily::Staged);
    }

    #[test]
    fn session_family_requires_alternate_section() {
        let err = EngineConfig::from_toml_str(r#"strategy_family = "session""#).unwrap_err();
        assert!(matches!(err, ConfigError::MissingSection("alternate")));
    }

    #[test]
    fn session_family_with_alternate_block() {
        let config = EngineConfig::from_toml_str(
            r#"
            strategy_family = "session"

            [alternate]
            signal_model = "shock"
            entry_windows = ["08:00-11:00"]
            "#,
        )
        .unwrap();
        let alt = config.alternate.as_ref().unwrap();
        assert_eq!(alt.signal_model, AlternateModel::Shock);
        assert_eq!(config.alternate_windows(alt).unwrap().allow.len(), 1);
    }

    #[test]
    fn malformed_window_is_fatal() {
        let err = EngineConfig::from_toml_str(
            r#"
            [sessions]
            blocked = ["noon-ish"]
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidWindow { .. }));
    }

    #[test]
    fn out_of_range_values_are_fatal() {
        let mut config = EngineConfig::default();
        config.risk_per_trade_pct = 1.5;
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.staged.tp1_r = Some(3.0);
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.staged.ema_fast = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn degenerate_opening_range_is_fatal() {
        let err = EngineConfig::from_toml_str(
            r#"
            strategy_family = "session"

            [alternate]
            signal_model = "opening_range"
            orb_range_window = "08:00-08:00"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidWindow { ref window, .. } if window == "08:00-08:00"));

        // Only the opening-range model reads the range window.
        let config = EngineConfig::from_toml_str(
            r#"
            strategy_family = "session"

            [alternate]
            signal_model = "shock"
            orb_range_window = "08:00-08:00"
            "#,
        );
        assert!(config.is_ok());
    }

    #[test]
    fn alternate_windows_fall_back_to_range_sessions() {
        let mut config = EngineConfig::default();
        config.sessions.range = vec!["13:00-15:00".into()];
        config.sessions.blocked = vec!["14:00-14:15".into()];
        let alt = AlternateConfig {
            excluded_windows: vec!["13:00-13:05".into()],
            ..AlternateConfig::default()
        };
        let windows = config.alternate_windows(&alt).unwrap();
        assert_eq!(windows.allow.len(), 1);
        assert_eq!(windows.deny.len(), 2);
    }

    #[test]
    fn config_roundtrips_through_toml() {
        let mut config = EngineConfig::default();
        config.alternate = Some(AlternateConfig::default());
        let text = toml::to_string(&config).unwrap();
        let back = EngineConfig::from_toml_str(&text).unwrap();
        assert_eq!(config, back);
    }
}
