//! Run artifacts: summary JSON and a Markdown report.
//!
//! The summary carries a `schema_version`; unknown versions are rejected on
//! load.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};

use crate::runner::{RunSummary, SignalRunSummary, SCHEMA_VERSION};
use crate::statistics::SignalStatistics;

const SUMMARY_FILE: &str = "summary.json";
const REPORT_FILE: &str = "report.md";

// ─── JSON ───────────────────────────────────────────────────────────

pub fn export_summary_json(summary: &RunSummary) -> Result<String> {
    serde_json::to_string_pretty(summary).context("failed to serialize RunSummary to JSON")
}

/// Deserialize a `RunSummary`, rejecting unknown schema versions.
pub fn import_summary_json(json: &str) -> Result<RunSummary> {
    let summary: RunSummary =
        serde_json::from_str(json).context("failed to deserialize RunSummary from JSON")?;
    if summary.schema_version > SCHEMA_VERSION {
        bail!(
            "unsupported schema version {} (max supported: {})",
            summary.schema_version,
            SCHEMA_VERSION
        );
    }
    Ok(summary)
}

/// Write `summary.json` and `report.md` into `output_dir`.
///
/// Returns the paths written, summary first.
pub fn save_run_artifacts(summary: &RunSummary, output_dir: &Path) -> Result<(PathBuf, PathBuf)> {
    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("failed to create output dir: {}", output_dir.display()))?;

    let summary_path = output_dir.join(SUMMARY_FILE);
    std::fs::write(&summary_path, export_summary_json(summary)?)
        .with_context(|| format!("failed to write {}", summary_path.display()))?;

    let report_path = output_dir.join(REPORT_FILE);
    std::fs::write(&report_path, generate_report(summary))
        .with_context(|| format!("failed to write {}", report_path.display()))?;

    Ok((summary_path, report_path))
}

pub fn load_summary(path: &Path) -> Result<RunSummary> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    import_summary_json(&json)
}

// ─── Markdown ───────────────────────────────────────────────────────

/// Markdown report for one audit run.
pub fn generate_report(summary: &RunSummary) -> String {
    let mut md = String::with_capacity(2048);

    md.push_str("# Signal Audit Report\n\n");

    md.push_str("## Run\n\n");
    md.push_str("| Field | Value |\n");
    md.push_str("| --- | --- |\n");
    md.push_str(&format!("| Bar Identity | {} |\n", summary.bar_identity));
    md.push_str(&format!(
        "| Bars | {} ({} warmup) |\n",
        summary.bar_count, summary.warmup_bars
    ));
    md.push_str(&format!(
        "| Timestamps | {} to {} |\n",
        summary.first_timestamp, summary.last_timestamp
    ));
    md.push_str(&format!(
        "| Positions | {} opened, {} closed |\n",
        summary.positions_opened, summary.positions_closed
    ));
    md.push_str(&format!("| Config Hash | {} |\n", summary.run_config_hash));
    md.push('\n');

    if !summary.missing_indicators.is_empty() {
        md.push_str("## Data Quality\n\n");
        for key in &summary.missing_indicators {
            md.push_str(&format!(
                "- indicator `{key}` was not supplied; its thresholds never passed\n"
            ));
        }
        md.push('\n');
    }

    md.push_str(&format_signal("Entry", &summary.entry));
    if let Some(exit) = &summary.exit {
        md.push_str(&format_signal("Exit", exit));
    }
    md
}

/// Compact text summary for one signal's statistics (used by `siglab stats`).
pub fn format_statistics(stats: &SignalStatistics) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "evaluations: {}  triggered: {}  signal rate: {:.2}%\n",
        stats.total_evaluations,
        stats.total_triggered,
        stats.signal_rate * 100.0
    ));
    out.push_str(&format!(
        "near misses: {} (strength >= {:.2})\n",
        stats.near_miss_count, stats.near_miss_threshold
    ));
    out.push_str(&format!(
        "primary blocker: {}\n",
        stats.primary_blocker.as_deref().unwrap_or("none")
    ));
    let width = stats.components.iter().map(String::len).max().unwrap_or(0);
    for name in &stats.components {
        out.push_str(&format!(
            "  {name:<width$}  trigger {:>6.2}%  blocking {:>6.2}%\n",
            stats.trigger_rate(name).unwrap_or(0.0) * 100.0,
            stats.blocking_rate(name).unwrap_or(0.0) * 100.0,
        ));
    }
    out
}

fn format_signal(role: &str, signal: &SignalRunSummary) -> String {
    let stats = &signal.statistics;
    let mut md = String::new();
    md.push_str(&format!("## {role} Signal: {}\n\n", signal.name));

    md.push_str("| Metric | Value |\n");
    md.push_str("| --- | --- |\n");
    md.push_str(&format!("| Logic | {} |\n", signal.logic));
    md.push_str(&format!("| Evaluations | {} |\n", stats.total_evaluations));
    md.push_str(&format!("| Triggered | {} |\n", stats.total_triggered));
    md.push_str(&format!(
        "| Signal Rate | {:.2}% |\n",
        stats.signal_rate * 100.0
    ));
    md.push_str(&format!(
        "| Near Misses | {} (strength >= {:.2}) |\n",
        stats.near_miss_count, stats.near_miss_threshold
    ));
    md.push_str(&format!(
        "| Primary Blocker | {} |\n",
        stats.primary_blocker.as_deref().unwrap_or("none")
    ));
    md.push_str(&format!("| Chunks Merged | {} |\n", signal.chunk_count));
    md.push_str(&format!("| Audit CSV | {} |\n", signal.audit_csv.display()));
    md.push('\n');

    if !stats.components.is_empty() {
        md.push_str("| Component | Trigger Rate | Blocking Rate |\n");
        md.push_str("| --- | ---: | ---: |\n");
        for name in &stats.components {
            md.push_str(&format!(
                "| {name} | {:.2}% | {:.2}% |\n",
                stats.trigger_rate(name).unwrap_or(0.0) * 100.0,
                stats.blocking_rate(name).unwrap_or(0.0) * 100.0,
            ));
        }
        md.push('\n');
    }
    md
}
