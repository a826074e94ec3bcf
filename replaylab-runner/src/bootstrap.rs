//! Bootstrap confidence interval on expectancy (mean R per trade).
//!
//! Trades are resampled with replacement. Each resample draws from its own
//! RNG stream derived from the master seed and the resample index, so the
//! result does not depend on how rayon schedules the work.

use rand::Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use replaylab_core::rng::RngHierarchy;

/// Fewest trades a resample can meaningfully be drawn from.
pub const MIN_TRADES: usize = 5;

const STREAM: &str = "bootstrap";

// ─── Configuration ───────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BootstrapConfig {
    /// Number of resamples (default 1000).
    pub n_resamples: usize,
    /// Master seed.
    pub seed: u64,
    /// Two-sided confidence level, e.g. 0.90.
    pub confidence: f64,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            n_resamples: 1000,
            seed: 42,
            confidence: 0.90,
        }
    }
}

// ─── Result types ────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BootstrapResult {
    /// Mean R of the observed trades.
    pub expectancy_r: f64,
    pub ci_lower: f64,
    pub ci_upper: f64,
    pub median: f64,
    /// Share of resamples with positive mean R.
    pub prob_positive: f64,
    pub confidence: f64,
    pub n_resamples: usize,
    pub sample_size: usize,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("insufficient data: {sample_size} trades < minimum {}", MIN_TRADES)]
    InsufficientData { sample_size: usize },
    #[error("confidence {0} must lie strictly between 0 and 1")]
    InvalidConfidence(f64),
    #[error("n_resamples must be positive")]
    NoResamples,
}

// ─── Bootstrap ───────────────────────────────────────────────────────

/// Percentile CI of mean R over `r_multiples`.
pub fn bootstrap_expectancy(
    r_multiples: &[f64],
    config: &BootstrapConfig,
) -> Result<BootstrapResult, BootstrapError> {
    let n = r_multiples.len();
    if n < MIN_TRADES {
        return Err(BootstrapError::InsufficientData { sample_size: n });
    }
    if !(config.confidence > 0.0 && config.confidence < 1.0) {
        return Err(BootstrapError::InvalidConfidence(config.confidence));
    }
    if config.n_resamples == 0 {
        return Err(BootstrapError::NoResamples);
    }

    let hierarchy = RngHierarchy::new(config.seed);
    let mut means: Vec<f64> = (0..config.n_resamples)
        .into_par_iter()
        .map(|i| {
            let mut rng = hierarchy.rng_for(STREAM, i as u64);
            let sum: f64 = (0..n).map(|_| r_multiples[rng.gen_range(0..n)]).sum();
            sum / n as f64
        })
        .collect();
    means.sort_by(f64::total_cmp);

    let tail = (1.0 - config.confidence) / 2.0 * 100.0;
    let positive = means.iter().filter(|&&m| m > 0.0).count();

    Ok(BootstrapResult {
        expectancy_r: r_multiples.iter().sum::<f64>() / n as f64,
        ci_lower: percentile_sorted(&means, tail),
        ci_upper: percentile_sorted(&means, 100.0 - tail),
        median: percentile_sorted(&means, 50.0),
        prob_positive: positive as f64 / means.len() as f64,
        confidence: config.confidence,
        n_resamples: means.len(),
        sample_size: n,
    })
}

/// Linear-interpolated percentile of an ascending slice; `p` in 0..=100.
fn percentile_sorted(sorted: &[f64], p: f64) -> f64 {
    let n = sorted.len();
    if n == 0 {
        return 0.0;
    }
    if n == 1 {
        return sorted[0];
    }
    let rank = (p / 100.0) * (n - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = (lo + 1).min(n - 1);
    let frac = rank - lo as f64;
    sorted[lo] * (1.0 - frac) + sorted[hi] * frac
}
