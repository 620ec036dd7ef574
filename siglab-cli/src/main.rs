//! SigLab CLI: audit runs, statistics over exported audits, config checks.
//!
//! Commands:
//! - `run`: replay bars through the configured entry/exit composites and
//!   write the audit trail, summary and report
//! - `stats`: recompute statistics from an audit CSV or JSONL file
//! - `validate`: parse and validate a run configuration without running it

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use siglab_core::components::{required_indicators, CompositeSignal, ConditionRegistry};
use siglab_core::config::ConditionSpec;
use siglab_runner::report::format_statistics;
use siglab_runner::{
    load_audit_csv, load_bars_csv, run_audit, save_run_artifacts, JsonlEvaluations, RunConfig,
    RunSummary, StatisticsAnalyzer,
};

#[derive(Parser)]
#[command(
    name = "siglab",
    about = "SigLab CLI: multi-condition signal evaluation and audit"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay bars through the configured composites and write the audit.
    Run {
        /// Path to a TOML run configuration.
        #[arg(long)]
        config: PathBuf,

        /// OHLCV CSV with a timestamp,open,high,low,close,volume header.
        #[arg(long)]
        bars: PathBuf,

        /// Overrides `run.output_dir` from the config.
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },
    /// Compute statistics from an exported audit (.csv or .jsonl).
    Stats {
        /// Audit file to analyze.
        #[arg(long)]
        audit: PathBuf,

        /// Near-miss strength threshold in [0, 1].
        #[arg(long, default_value_t = 0.75)]
        near_miss: f64,

        /// Print statistics as JSON instead of text.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Parse and validate a run configuration.
    Validate {
        /// Path to a TOML run configuration.
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
            bars,
            output_dir,
        } => run_cmd(&config, &bars, output_dir),
        Commands::Stats {
            audit,
            near_miss,
            json,
        } => stats_cmd(&audit, near_miss, json),
        Commands::Validate { config } => validate_cmd(&config),
    }
}

fn run_cmd(config_path: &Path, bars_path: &Path, output_dir: Option<PathBuf>) -> Result<()> {
    let mut config = RunConfig::load(config_path)
        .with_context(|| format!("loading config {}", config_path.display()))?;
    if let Some(dir) = output_dir {
        config.run.output_dir = dir;
    }
    let bars = load_bars_csv(bars_path)
        .with_context(|| format!("loading bars {}", bars_path.display()))?;

    // Custom conditions need code; the CLI registry is empty.
    let registry = ConditionRegistry::new();
    let summary = run_audit(&config, &bars, &registry).context("audit run failed")?;

    print_summary(&summary);
    let (summary_path, report_path) = save_run_artifacts(&summary, &config.run.output_dir)?;
    println!("Summary: {}", summary_path.display());
    println!("Report:  {}", report_path.display());
    Ok(())
}

fn stats_cmd(audit: &Path, near_miss: f64, json: bool) -> Result<()> {
    let analyzer = StatisticsAnalyzer::new(near_miss)?;
    let stats = match audit.extension().and_then(|e| e.to_str()) {
        Some("csv") => {
            let evaluations = load_audit_csv(audit)
                .with_context(|| format!("reading audit CSV {}", audit.display()))?;
            analyzer.analyze(&evaluations)
        }
        Some("jsonl") => analyzer
            .try_analyze(JsonlEvaluations::open(audit)?)
            .with_context(|| format!("reading audit JSONL {}", audit.display()))?,
        _ => bail!(
            "unsupported audit file '{}': expected .csv or .jsonl",
            audit.display()
        ),
    };
    info!(evaluations = stats.total_evaluations, "audit analyzed");

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
    } else {
        print!("{}", format_statistics(&stats));
    }
    Ok(())
}

fn validate_cmd(config_path: &Path) -> Result<()> {
    let config = RunConfig::load(config_path)
        .with_context(|| format!("loading config {}", config_path.display()))?;

    let registry = ConditionRegistry::new();
    let signals = config.signals();
    for (i, signal) in signals.iter().enumerate() {
        // Custom conditions cannot be built without their code; validation
        // above already checked their parameters.
        let has_custom = signal
            .resolve()?
            .iter()
            .any(|c| matches!(c.spec, ConditionSpec::Custom { .. }));
        let warmup = if has_custom {
            None
        } else {
            Some(CompositeSignal::from_config(signal, &registry)?.warmup_bars())
        };
        println!(
            "{:<6} {} ({}, {} components, warmup {}) hash {}",
            if i == 0 { "entry" } else { "exit" },
            signal.name,
            signal.logic,
            signal.components.len(),
            warmup.map_or_else(|| "n/a".to_string(), |w| w.to_string()),
            &signal.config_hash()[..12],
        );
    }
    let indicators: Vec<String> = required_indicators(&signals)?
        .iter()
        .map(|i| i.name().to_string())
        .collect();
    if indicators.is_empty() {
        println!("indicators: none");
    } else {
        println!("indicators: {}", indicators.join(", "));
    }
    println!("config OK ({})", config_path.display());
    Ok(())
}

fn print_summary(summary: &RunSummary) {
    println!("=== Audit: {} ===", summary.bar_identity);
    println!("Bars:        {}", summary.bar_count);
    println!("Warmup:      {}", summary.warmup_bars);
    println!(
        "Positions:   {} opened, {} closed",
        summary.positions_opened, summary.positions_closed
    );
    for key in &summary.missing_indicators {
        println!("Missing:     {key} (threshold never passes)");
    }
    for signal in std::iter::once(&summary.entry).chain(summary.exit.as_ref()) {
        println!();
        println!("--- {} ({}) ---", signal.name, signal.logic);
        print!("{}", format_statistics(&signal.statistics));
        println!("audit: {}", signal.audit_csv.display());
    }
}
