//! tickstat CLI: run session configs, generate synthetic tapes, fingerprint configs.
//!
//! Commands:
//! - `run`: evaluate one or more TOML session configs (several configs run as parallel panes)
//! - `synth`: write a seeded synthetic trade tape as CSV
//! - `fingerprint`: print the BLAKE3 fingerprint of a config

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tickstat_core::domain::Security;
use tickstat_runner::{
    load_series, run_panes, run_session, synthetic_series, write_trades_csv, SessionConfig,
    SessionReport,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "tickstat",
    about = "tickstat CLI: incremental indicators and trade statistics over tick data"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate session configs and write a JSON report.
    Run {
        /// Path to a TOML session config. Repeat to run several panes over the first config's data.
        #[arg(long, required = true)]
        config: Vec<PathBuf>,

        /// Evaluate every Nth bar (the last bar is always evaluated).
        #[arg(long, default_value_t = 1)]
        stride: usize,

        /// Write the report here instead of stdout.
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Generate a synthetic trade tape as CSV.
    Synth {
        /// Number of bars.
        #[arg(long)]
        bars: usize,

        /// RNG seed.
        #[arg(long, default_value_t = 42)]
        seed: u64,

        /// Trades per bar.
        #[arg(long, default_value_t = 50)]
        trades_per_bar: usize,

        /// Security identifier.
        #[arg(long, default_value = "ES")]
        security: String,

        /// Tick size of the security.
        #[arg(long, default_value_t = 0.25)]
        tick_size: f64,

        /// Bar length in seconds.
        #[arg(long, default_value_t = 60)]
        bar_seconds: i64,

        /// Starting price.
        #[arg(long, default_value_t = 4_500.0)]
        start_price: f64,

        /// Output CSV path.
        #[arg(long)]
        out: PathBuf,
    },
    /// Print the fingerprint of a session config.
    Fingerprint {
        /// Path to a TOML session config.
        #[arg(long)]
        config: PathBuf,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            stride,
            output,
        } => run_cmd(&config, stride, output.as_deref()),
        Commands::Synth {
            bars,
            seed,
            trades_per_bar,
            security,
            tick_size,
            bar_seconds,
            start_price,
            out,
        } => {
            let security = Security::new(security, tick_size)?;
            let series = synthetic_series(
                security,
                bars,
                trades_per_bar,
                seed,
                bar_seconds,
                start_price,
            )?;
            write_trades_csv(&out, &series)?;
            println!(
                "Wrote {} trades in {} bars to {}",
                series.trade_count(),
                series.bars().len(),
                out.display()
            );
            Ok(())
        }
        Commands::Fingerprint { config } => {
            let config = SessionConfig::load(&config)
                .with_context(|| format!("loading {}", config.display()))?;
            println!("{}", config.fingerprint()?);
            Ok(())
        }
    }
}

fn run_cmd(paths: &[PathBuf], stride: usize, output: Option<&Path>) -> Result<()> {
    if stride == 0 {
        bail!("--stride must be at least 1");
    }
    let configs = paths
        .iter()
        .map(|p| SessionConfig::load(p).with_context(|| format!("loading {}", p.display())))
        .collect::<Result<Vec<_>>>()?;
    let Some(first) = configs.first() else {
        bail!("at least one --config is required");
    };

    let security = first.security.security()?;
    let series = load_series(&first.data, security)?;

    let reports = if configs.len() == 1 {
        vec![run_session(first, &series, stride)?]
    } else {
        info!(panes = configs.len(), "data taken from {}", paths[0].display());
        run_panes(&configs, &series, stride)?
    };

    for report in &reports {
        print_summary(report);
    }

    let json = if reports.len() == 1 {
        serde_json::to_string_pretty(&reports[0])?
    } else {
        serde_json::to_string_pretty(&reports)?
    };
    match output {
        Some(path) => {
            std::fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
            eprintln!("Report saved to: {}", path.display());
        }
        None => println!("{json}"),
    }
    Ok(())
}

fn print_summary(report: &SessionReport) {
    eprintln!();
    eprintln!("=== Session {} ===", &report.fingerprint[..12.min(report.fingerprint.len())]);
    eprintln!(
        "Security: {}  Bars: {}  Trades: {}  Evaluated: {} (stride {})",
        report.security,
        report.bars,
        report.trades,
        report.indices.len(),
        report.stride
    );
    eprintln!(
        "Aggregations built: {} histogram, {} statistics",
        report.cache.histograms_built, report.cache.statistics_built
    );
    for column in &report.columns {
        let last = column
            .values
            .last()
            .copied()
            .flatten()
            .map(|v| format!("{v:.4}"))
            .unwrap_or_else(|| "n/a".to_string());
        eprintln!("  {:<24} last = {last}", column.name);
    }
}
