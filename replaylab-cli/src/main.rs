//! ReplayLab CLI — replay, synthetic data and bootstrap commands.
//!
//! Commands:
//! - `run` — replay M5 bars from CSV under a TOML config, write records and artifacts
//! - `synth` — write a synthetic opening-range M5 dataset
//! - `bootstrap` — confidence interval on expectancy from a trades.csv tape

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

use replaylab_core::synthetic::{opening_range_days, trending_days, SyntheticConfig};
use replaylab_runner::{
    bootstrap_expectancy, load_trade_r_multiples, run_backtest, write_bars_csv, BootstrapConfig,
    Summary,
};

#[derive(Parser)]
#[command(
    name = "replaylab",
    about = "ReplayLab CLI — multi-timeframe bar-replay backtester"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a bar file under a TOML config.
    Run {
        /// Path to a TOML config file.
        #[arg(long)]
        config: PathBuf,

        /// M5 bar CSV (timestamp,open,high,low,close[,volume,bid,ask,spread]).
        #[arg(long)]
        bars: PathBuf,

        /// Output directory; each run gets a subdirectory named by its hash.
        #[arg(long, default_value = "results")]
        output_dir: PathBuf,
    },
    /// Write a synthetic M5 dataset (weekdays, 288 bars per day).
    Synth {
        /// Number of trading days.
        #[arg(long, default_value_t = 5)]
        days: usize,

        /// Output CSV path.
        #[arg(long)]
        out: PathBuf,

        /// First calendar day (YYYY-MM-DD). Defaults to 2024-01-02.
        #[arg(long)]
        start: Option<NaiveDate>,

        /// RNG seed for the noise.
        #[arg(long, default_value_t = 42)]
        seed: u64,

        /// Per-bar drift; switches from opening-range days to a trending series.
        #[arg(long)]
        drift: Option<f64>,
    },
    /// Bootstrap a confidence interval on mean R from a trades.csv tape.
    Bootstrap {
        /// Path to trades.csv written by `run`.
        #[arg(long)]
        trades: PathBuf,

        #[arg(long, default_value_t = 1000)]
        resamples: usize,

        #[arg(long, default_value_t = 42)]
        seed: u64,

        /// Two-sided confidence level.
        #[arg(long, default_value_t = 0.90)]
        confidence: f64,

        /// Print the result as JSON.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            bars,
            output_dir,
        } => run_cmd(config, bars, output_dir),
        Commands::Synth {
            days,
            out,
            start,
            seed,
            drift,
        } => synth_cmd(days, out, start, seed, drift),
        Commands::Bootstrap {
            trades,
            resamples,
            seed,
            confidence,
            json,
        } => bootstrap_cmd(trades, resamples, seed, confidence, json),
    }
}

fn run_cmd(config: PathBuf, bars: PathBuf, output_dir: PathBuf) -> Result<()> {
    let outcome = run_backtest(&config, &bars, &output_dir)
        .with_context(|| format!("replay of {} failed", bars.display()))?;

    println!("Run {}", outcome.fingerprint.run_hash);
    println!("  model:         {}", outcome.fingerprint.model);
    println!("  bars:          {}", outcome.result.bar_count);
    print_summary(&outcome.summary);
    println!("Artifacts saved to: {}", outcome.run_dir.display());
    Ok(())
}

fn print_summary(s: &Summary) {
    println!("  signals:       {} ({} rejected)", s.signal_count, s.rejected_count);
    println!("  trades:        {}", s.trade_count);
    println!("  win rate:      {:.1}%", s.win_rate * 100.0);
    println!("  expectancy:    {:.3} R", s.expectancy_r);
    match s.profit_factor {
        Some(pf) => println!("  profit factor: {pf:.2}"),
        None => println!("  profit factor: n/a"),
    }
    println!("  total PnL:     {:.2}", s.total_pnl);
    println!("  final equity:  {:.2}", s.final_equity);
    println!("  max drawdown:  {:.2}%", s.max_drawdown * 100.0);
    for (reason, n) in s.exit_reasons.iter().filter(|&(_, &n)| n > 0) {
        println!("    {reason:<20} {n}");
    }
}

fn synth_cmd(
    days: usize,
    out: PathBuf,
    start: Option<NaiveDate>,
    seed: u64,
    drift: Option<f64>,
) -> Result<()> {
    if days == 0 {
        bail!("--days must be at least 1");
    }
    let mut config = SyntheticConfig {
        days,
        seed,
        ..SyntheticConfig::default()
    };
    if let Some(start) = start {
        config.start = start;
    }

    let bars = match drift {
        Some(drift) => trending_days(&config, drift),
        None => opening_range_days(&config),
    };
    write_bars_csv(&bars, &out).with_context(|| format!("failed to write {}", out.display()))?;
    info!(days, seed, bars = bars.len(), "synthetic dataset written");
    println!("Wrote {} bars ({} days) to {}", bars.len(), days, out.display());
    Ok(())
}

fn bootstrap_cmd(trades: PathBuf, resamples: usize, seed: u64, confidence: f64, json: bool) -> Result<()> {
    let rs = load_trade_r_multiples(&trades)?;
    let config = BootstrapConfig {
        n_resamples: resamples,
        seed,
        confidence,
    };
    let result = bootstrap_expectancy(&rs, &config)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }
    println!("Bootstrap over {} trades ({} resamples)", result.sample_size, result.n_resamples);
    println!("  expectancy:    {:.3} R", result.expectancy_r);
    println!(
        "  {:.0}% CI:        [{:.3}, {:.3}] R",
        result.confidence * 100.0,
        result.ci_lower,
        result.ci_upper
    );
    println!("  median:        {:.3} R", result.median);
    println!("  P(mean > 0):   {:.1}%", result.prob_positive * 100.0);
    Ok(())
}
