//! xbtlab CLI: run and validate inverse-contract backtests.
//!
//! Commands:
//! - `run`: replay one or more strategy configs over a bar file and signal tables
//! - `validate`: parse and check strategy configs without touching data

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use xbtlab_core::signals::Timeframe;
use xbtlab_runner::{load_market_data, run_batch, save_artifacts, RunResult, StrategyConfig};

#[derive(Parser)]
#[command(
    name = "xbtlab",
    about = "xbtlab CLI: single-position inverse-contract backtester"
)]
struct Cli {
    /// Emit logs as JSON lines.
    #[arg(long, global = true, default_value_t = false)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay strategies over a bar file and signal tables.
    Run {
        /// Strategy TOML file. Repeat to run several strategies in parallel.
        #[arg(long = "config", required = true)]
        configs: Vec<PathBuf>,

        /// Bar CSV: timestamp,open,high,low,close,volume[,turnover].
        #[arg(long)]
        bars: PathBuf,

        /// Signal table as TIMEFRAME=PATH (e.g. 1h=signals_1h.csv). Repeatable.
        #[arg(long = "signals", value_parser = parse_signal_arg)]
        signals: Vec<(Timeframe, PathBuf)>,

        /// Output directory for run artifacts.
        #[arg(long, default_value = "results")]
        output_dir: PathBuf,

        /// Print summaries only; write no artifacts.
        #[arg(long, default_value_t = false)]
        no_artifacts: bool,
    },
    /// Parse and validate strategy configs.
    Validate {
        /// Strategy TOML file. Repeatable.
        #[arg(long = "config", required = true)]
        configs: Vec<PathBuf>,
    },
}

fn parse_signal_arg(s: &str) -> Result<(Timeframe, PathBuf), String> {
    let (tf, path) = s
        .split_once('=')
        .ok_or_else(|| format!("expected TIMEFRAME=PATH, got '{s}'"))?;
    let timeframe = tf.parse::<Timeframe>()?;
    if path.is_empty() {
        return Err(format!("missing path for timeframe {timeframe}"));
    }
    Ok((timeframe, PathBuf::from(path)))
}

fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_json);

    match cli.command {
        Commands::Run {
            configs,
            bars,
            signals,
            output_dir,
            no_artifacts,
        } => run_cmd(&configs, bars, &signals, output_dir, no_artifacts),
        Commands::Validate { configs } => validate_cmd(&configs),
    }
}

fn load_configs(paths: &[PathBuf]) -> Result<Vec<StrategyConfig>> {
    paths
        .iter()
        .map(|p| StrategyConfig::load(p).with_context(|| format!("config {}", p.display())))
        .collect()
}

fn run_cmd(
    config_paths: &[PathBuf],
    bars: PathBuf,
    signals: &[(Timeframe, PathBuf)],
    output_dir: PathBuf,
    no_artifacts: bool,
) -> Result<()> {
    let strategies = load_configs(config_paths)?;
    for strategy in &strategies {
        let missing: Vec<Timeframe> = strategy
            .timeframes()
            .into_iter()
            .filter(|tf| !signals.iter().any(|(loaded, _)| loaded == tf))
            .collect();
        if !missing.is_empty() {
            bail!(
                "strategy '{}' needs signal tables for {:?}; pass --signals TIMEFRAME=PATH",
                strategy.name,
                missing.iter().map(|tf| tf.as_str()).collect::<Vec<_>>()
            );
        }
    }

    let data = load_market_data(&bars, signals)?;
    info!(
        bars = data.bars.len(),
        tables = data.tables.len(),
        dataset_hash = %data.dataset_hash,
        "market data loaded"
    );

    let mut failures = 0usize;
    for (path, outcome) in config_paths.iter().zip(run_batch(&strategies, &data)) {
        match outcome {
            Ok(result) => {
                print_summary(&result);
                if !no_artifacts {
                    let run_dir = save_artifacts(&result, &output_dir)?;
                    println!("Artifacts saved to: {}", run_dir.display());
                }
            }
            Err(e) => {
                failures += 1;
                error!(config = %path.display(), error = %e, "run failed");
                eprintln!("Error for {}: {e}", path.display());
            }
        }
    }

    if failures > 0 {
        bail!("{failures} of {} runs failed", config_paths.len());
    }
    Ok(())
}

fn validate_cmd(paths: &[PathBuf]) -> Result<()> {
    let strategies = load_configs(paths)?;
    for (path, strategy) in paths.iter().zip(&strategies) {
        let timeframes: Vec<&str> = strategy.timeframes().into_iter().map(Timeframe::as_str).collect();
        println!(
            "{}: ok ('{}', signals {:?}, timeframes {:?})",
            path.display(),
            strategy.name,
            strategy.signal_names(),
            timeframes
        );
    }
    Ok(())
}

fn print_summary(result: &RunResult) {
    let report = &result.report;
    println!();
    println!("=== {} ===", result.strategy.name);
    println!("run id:       {}", result.run_id);
    println!("bars:         {}", report.bars_processed);
    println!("entries:      {}", report.entries);
    println!("{}", report.summary);
    if let Some(pos) = &report.final_position {
        println!("open position: {} @ {:.2}", pos.side, pos.entry);
    }
    if !report.faults.is_empty() {
        println!("faults:       {}", report.faults.len());
        for fault in report.faults.iter().take(10) {
            println!("  {fault}");
        }
    }
}
