//! cyclebench entry point.
//!
//! Samples the CPU cycle counter across one sleep and a monotonic timer
//! across a second sleep of the same length, then prints both.

mod report;

use anyhow::{Context, Result};
use clap::Parser;
use cyclebench_common::config::{BenchConfig, CounterSource, DEFAULT_DELAY};
use cyclebench_runtime::measure::measure;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

/// cyclebench command-line arguments.
#[derive(Parser, Debug)]
#[command(
    name = "cyclebench",
    about = "Compare a CPU cycle counter with a monotonic timer across a sleep",
    version,
    long_about = None
)]
struct Args {
    /// Sleep length in microseconds. Unparsable values fall back to 1.
    #[arg(value_name = "DELAY_US", allow_negative_numbers = true)]
    delay: Option<String>,

    /// Path to a configuration file (TOML).
    #[arg(long, short = 'c', value_name = "FILE")]
    config: Option<PathBuf>,

    /// Counter backend (auto, tsc, perf, simulated).
    #[arg(long, value_name = "SOURCE")]
    source: Option<CounterSource>,

    /// Pin the measuring thread to this CPU.
    #[arg(long, value_name = "N")]
    cpu: Option<usize>,

    /// Print the measurement as JSON.
    #[arg(long)]
    json: bool,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, short = 'l', default_value = "warn")]
    log_level: String,
}

fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args.log_level);

    let config = load_config(&args)?;
    info!(?config, "Configuration resolved");

    let stdout = std::io::stdout();
    let mut out = stdout.lock();

    if !args.json {
        report::write_banner(&mut out)?;
        out.flush()?;
    }

    let measurement = measure(&config).context("Measurement failed")?;

    if args.json {
        report::write_json(&mut out, &measurement)?;
    } else {
        report::write_text(&mut out, &measurement)?;
    }

    Ok(())
}

/// Initialize logging on stderr; stdout carries only the report.
fn init_logging(level: &str) {
    let filter = format!(
        "cyclebench={level},cyclebench_runtime={level},cyclebench_common={level}"
    );

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&filter)),
        )
        .with_writer(std::io::stderr)
        .with_target(true)
        .init();
}

/// Resolve the run configuration.
///
/// Priority (highest first): command-line flags, `--config` file, built-in
/// defaults. The positional delay overrides the file's `delay` only when
/// present.
fn load_config(args: &Args) -> Result<BenchConfig> {
    let mut config = match &args.config {
        Some(config_path) => {
            info!(?config_path, "Loading config from command-line argument");
            BenchConfig::from_file(config_path)
                .with_context(|| format!("Failed to load config from {}", config_path.display()))?
        }
        None => BenchConfig::default(),
    };

    if let Some(raw) = &args.delay {
        config.delay = parse_delay(raw);
    }
    if let Some(source) = args.source {
        config.counter.source = source;
    }
    if args.cpu.is_some() {
        config.realtime.cpu = args.cpu;
    }

    Ok(config)
}

/// Parse a delay in microseconds the way `atoi` reads it: optional leading
/// whitespace and `+`, then the longest run of digits. Anything that yields
/// no digits, is negative, or overflows falls back to [`DEFAULT_DELAY`].
fn parse_delay(raw: &str) -> Duration {
    let trimmed = raw.trim_start();
    let unsigned = trimmed.strip_prefix('+').unwrap_or(trimmed);
    let digits_end = unsigned
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(unsigned.len());

    match unsigned[..digits_end].parse::<u64>() {
        Ok(us) => Duration::from_micros(us),
        Err(_) => {
            warn!(value = raw, "Unparsable delay, using default");
            DEFAULT_DELAY
        }
    }
}
