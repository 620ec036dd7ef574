//! Replay driver: bars → composites → collectors → statistics.
//!
//! The entry composite is evaluated on every bar. An entry signal opens a
//! simulated position; from the next bar on, the exit composite (if any) is
//! evaluated while the position is open and closes it when it fires. Both
//! composites are notified of every open/close so reference-event
//! conditions such as the time stop can count bars held.
//!
//! Each signal gets its own collector; all artifacts land in the configured
//! output directory.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use siglab_core::components::{
    external_indicator_keys, required_indicators, BarContext, CompositeSignal, ConditionRegistry,
    FactoryError, IndicatorValues,
};
use siglab_core::config::{CompositeSignalConfig, SignalLogic};
use siglab_core::domain::{Bar, SignalEvaluation};

use crate::collector::{CollectorConfig, CollectorError, EvaluationCollector, FinalizedAudit};
use crate::config::{RunConfig, RunConfigError};
use crate::export::{AuditError, ExportFormat};
use crate::statistics::{SignalStatistics, StatisticsAnalyzer};

/// Errors from the runner.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("config error: {0}")]
    Config(#[from] RunConfigError),
    #[error("composition error: {0}")]
    Composition(#[from] FactoryError),
    #[error("collector error: {0}")]
    Collector(#[from] CollectorError),
    #[error("audit error: {0}")]
    Audit(#[from] AuditError),
    #[error("no bars to replay")]
    NoBars,
}

/// Current schema version for persisted run summaries.
pub const SCHEMA_VERSION: u32 = 1;

/// Outcome of one audited signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalRunSummary {
    pub name: String,
    pub logic: SignalLogic,
    pub config_hash: String,
    pub components: Vec<String>,
    pub evaluations: usize,
    pub chunk_count: usize,
    pub audit_jsonl: PathBuf,
    pub audit_csv: PathBuf,
    pub statistics: SignalStatistics,
}

/// Complete result of one audit run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Schema version for forward-compatible deserialization.
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub run_config_hash: String,
    pub bar_identity: String,
    pub bar_count: usize,
    pub warmup_bars: usize,
    pub first_timestamp: i64,
    pub last_timestamp: i64,
    pub positions_opened: usize,
    pub positions_closed: usize,
    /// External indicator keys the configuration reads but nobody supplied.
    pub missing_indicators: Vec<String>,
    pub entry: SignalRunSummary,
    pub exit: Option<SignalRunSummary>,
}

fn default_schema_version() -> u32 {
    SCHEMA_VERSION
}

/// Run an audit with built-in indicators only.
pub fn run_audit(
    config: &RunConfig,
    bars: &[Bar],
    registry: &ConditionRegistry,
) -> Result<RunSummary, RunError> {
    run_audit_with_indicators(config, bars, registry, IndicatorValues::new())
}

/// Run an audit with externally supplied indicator series.
///
/// Built-in indicators are precomputed on top of `external`; an external
/// series with the same key as a built-in one is replaced.
pub fn run_audit_with_indicators(
    config: &RunConfig,
    bars: &[Bar],
    registry: &ConditionRegistry,
    external: IndicatorValues,
) -> Result<RunSummary, RunError> {
    config.validate()?;
    let (first, last) = match (bars.first(), bars.last()) {
        (Some(first), Some(last)) => (first.timestamp, last.timestamp),
        _ => return Err(RunError::NoBars),
    };

    let mut entry = CompositeSignal::from_config(&config.entry, registry)?;
    let mut exit = config
        .exit
        .as_ref()
        .map(|c| CompositeSignal::from_config(c, registry))
        .transpose()?;

    let signals = config.signals();
    let mut indicators = external;
    for indicator in required_indicators(&signals).map_err(FactoryError::from)? {
        indicators.insert(indicator.name(), indicator.compute(bars));
    }
    let missing: Vec<String> = external_indicator_keys(&signals)
        .map_err(FactoryError::from)?
        .into_iter()
        .filter(|key| !indicators.contains(key))
        .collect();
    for key in &missing {
        warn!(indicator = %key, "indicator not supplied; threshold will report insufficient data");
    }

    let settings = &config.run;
    let collector_for = |name: &str| {
        EvaluationCollector::new(
            CollectorConfig::new(name, &settings.output_dir)
                .with_flush_threshold(settings.flush_threshold),
        )
    };
    let mut entry_collector = collector_for(&config.entry.name)?;
    let mut exit_collector = match &config.exit {
        Some(exit_config) => Some(collector_for(&exit_config.name)?),
        None => None,
    };

    let warmup_bars = entry
        .warmup_bars()
        .max(exit.as_ref().map_or(0, |e| e.warmup_bars()));
    info!(
        bars = bars.len(),
        warmup_bars,
        entry = %config.entry.name,
        exit = config.exit.as_ref().map_or("-", |e| e.name.as_str()),
        "audit run started"
    );

    let mut open_since: Option<usize> = None;
    let mut opened = 0usize;
    let mut closed = 0usize;

    for bar_index in 0..bars.len() {
        let Some(ctx) = BarContext::new(bars, bar_index, &indicators) else {
            continue;
        };
        let entry_eval = entry.evaluate(&ctx, &settings.bar_identity);
        let entry_fired = entry_eval.signal();
        entry_collector.record(entry_eval)?;

        match open_since {
            None if entry_fired => {
                open_since = Some(bar_index);
                opened += 1;
                entry.notify_position_opened(bar_index);
                if let Some(exit) = exit.as_mut() {
                    exit.notify_position_opened(bar_index);
                }
            }
            Some(_) => {
                if let (Some(exit), Some(collector)) = (exit.as_mut(), exit_collector.as_mut()) {
                    let exit_eval = exit.evaluate(&ctx, &settings.bar_identity);
                    let exit_fired = exit_eval.signal();
                    collector.record(exit_eval)?;
                    if exit_fired {
                        open_since = None;
                        closed += 1;
                        entry.notify_position_closed();
                        exit.notify_position_closed();
                    }
                }
            }
            None => {}
        }
    }

    let analyzer = StatisticsAnalyzer::new(settings.near_miss_threshold)
        .map_err(|e| RunConfigError::NearMissOutOfRange(e.0))?;
    let entry_summary = summarize(
        &config.entry,
        entry_collector.finalize()?,
        &settings.output_dir,
        &analyzer,
    )?;
    let exit_summary = match (&config.exit, exit_collector.as_mut()) {
        (Some(exit_config), Some(collector)) => Some(summarize(
            exit_config,
            collector.finalize()?,
            &settings.output_dir,
            &analyzer,
        )?),
        _ => None,
    };

    info!(
        bars = bars.len(),
        positions_opened = opened,
        positions_closed = closed,
        entry_signal_rate = entry_summary.statistics.signal_rate,
        "audit run complete"
    );

    Ok(RunSummary {
        schema_version: SCHEMA_VERSION,
        run_config_hash: config.config_hash(),
        bar_identity: settings.bar_identity.clone(),
        bar_count: bars.len(),
        warmup_bars,
        first_timestamp: first,
        last_timestamp: last,
        positions_opened: opened,
        positions_closed: closed,
        missing_indicators: missing,
        entry: entry_summary,
        exit: exit_summary,
    })
}

/// Export the CSV next to the merged JSONL and compute statistics.
fn summarize(
    config: &CompositeSignalConfig,
    audit: FinalizedAudit,
    output_dir: &Path,
    analyzer: &StatisticsAnalyzer,
) -> Result<SignalRunSummary, RunError> {
    let csv_path = output_dir.join(format!(
        "{}.audit.{}",
        config.name,
        ExportFormat::Csv.extension()
    ));
    audit.export(ExportFormat::Csv, &csv_path)?;
    let statistics = analyzer.analyze_audit(&audit)?;
    Ok(SignalRunSummary {
        name: config.name.clone(),
        logic: config.logic,
        config_hash: config.config_hash(),
        components: audit.component_names().to_vec(),
        evaluations: audit.evaluation_count(),
        chunk_count: audit.chunk_count(),
        audit_jsonl: audit.path().to_path_buf(),
        audit_csv: csv_path,
        statistics,
    })
}

/// Evaluate one composite over all bars without collecting; used by tests
/// and quick checks where an audit trail on disk is not wanted.
pub fn evaluate_all(
    composite: &mut CompositeSignal,
    bars: &[Bar],
    indicators: &IndicatorValues,
    bar_identity: &str,
) -> Vec<SignalEvaluation> {
    (0..bars.len())
        .filter_map(|i| BarContext::new(bars, i, indicators))
        .map(|ctx| composite.evaluate(&ctx, bar_identity))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use siglab_core::config::{ComponentConfig, ConditionKind, ConfigError};
    use tempfile::TempDir;

    fn bars(n: usize) -> Vec<Bar> {
        (0..n)
            .map(|i| {
                let close = 100.0 + i as f64;
                Bar {
                    timestamp: i as i64,
                    open: close - 0.5,
                    high: close + 0.25,
                    low: close - 1.0,
                    close,
                    volume: 1_000.0,
                }
            })
            .collect()
    }

    fn config(dir: &Path) -> RunConfig {
        // Rising closes: breakout over the prior 3 bars fires every bar after warmup.
        let entry = CompositeSignalConfig::new("entry", SignalLogic::And)
            .with_component(ComponentConfig::new(ConditionKind::Breakout).param("lookback", 3.0));
        let exit = CompositeSignalConfig::new("exit", SignalLogic::Or)
            .with_component(ComponentConfig::new(ConditionKind::TimeStop).param("max_bars", 2.0));
        let mut config = RunConfig::new(entry).with_exit(exit);
        config.run.output_dir = dir.to_path_buf();
        config.run.flush_threshold = 4;
        config
    }

    #[test]
    fn empty_bars_rejected() {
        let tmp = TempDir::new().unwrap();
        let result = run_audit(&config(tmp.path()), &[], &ConditionRegistry::new());
        assert!(matches!(result, Err(RunError::NoBars)));
    }

    #[test]
    fn entry_every_bar_exit_only_while_open() {
        let tmp = TempDir::new().unwrap();
        let bars = bars(12);
        let summary = run_audit(&config(tmp.path()), &bars, &ConditionRegistry::new()).unwrap();

        assert_eq!(summary.entry.evaluations, 12);
        // Bars 0..=2 warm up the prior-3-bar high; the entry fires from bar 3 on.
        // Opens at 3, 6, 9; the 2-bar time stop closes at 5, 8, 11.
        assert_eq!(summary.positions_opened, 3);
        assert_eq!(summary.positions_closed, 3);
        let exit = summary.exit.as_ref().unwrap();
        assert_eq!(exit.evaluations, 6);
        assert_eq!(exit.statistics.total_triggered, 3);
        assert_eq!(summary.entry.chunk_count, 3);
        assert!(summary.entry.audit_csv.exists());
        assert!(exit.audit_jsonl.exists());
        assert_eq!(summary.schema_version, SCHEMA_VERSION);
    }

    #[test]
    fn missing_external_indicator_is_reported() {
        let tmp = TempDir::new().unwrap();
        let entry = CompositeSignalConfig::new("entry", SignalLogic::And).with_component(
            ComponentConfig::new(ConditionKind::Threshold).param("key", "funding_rate"),
        );
        let mut config = RunConfig::new(entry);
        config.run.output_dir = tmp.path().to_path_buf();

        let summary = run_audit(&config, &bars(5), &ConditionRegistry::new()).unwrap();
        assert_eq!(summary.missing_indicators, vec!["funding_rate".to_string()]);
        assert_eq!(summary.entry.statistics.total_triggered, 0);

        let mut supplied = IndicatorValues::new();
        supplied.insert("funding_rate", vec![10.0; 5]);
        let summary =
            run_audit_with_indicators(&config, &bars(5), &ConditionRegistry::new(), supplied)
                .unwrap();
        assert!(summary.missing_indicators.is_empty());
        // Default threshold: below 30.
        assert_eq!(summary.entry.statistics.total_triggered, 5);
    }

    #[test]
    fn oversized_window_is_a_config_error() {
        let tmp = TempDir::new().unwrap();
        let entry = CompositeSignalConfig::new("entry", SignalLogic::And).with_component(
            ComponentConfig::new(ConditionKind::Threshold)
                .param("indicator", "roc")
                .param("period", 1e20),
        );
        let mut config = RunConfig::new(entry);
        config.run.output_dir = tmp.path().join("out");

        let result = run_audit(&config, &bars(5), &ConditionRegistry::new());
        assert!(matches!(
            result,
            Err(RunError::Config(RunConfigError::Signal(ConfigError::OutOfRange { .. })))
        ));
        assert!(!tmp.path().join("out").exists());
    }

    #[test]
    fn path_like_signal_name_fails_before_any_output() {
        let tmp = TempDir::new().unwrap();
        let mut config = config(&tmp.path().join("out"));
        config.entry.name = "sub/entry".into();

        let result = run_audit(&config, &bars(12), &ConditionRegistry::new());
        assert!(matches!(
            result,
            Err(RunError::Config(RunConfigError::Signal(ConfigError::UnsafeSignalName { .. })))
        ));
        assert!(!tmp.path().join("out").exists());
    }

    #[test]
    fn stale_chunks_fail_before_replay() {
        let tmp = TempDir::new().unwrap();
        let stale = tmp.path().join("exit.chunk-000001.jsonl");
        std::fs::write(&stale, "").unwrap();

        let result = run_audit(&config(tmp.path()), &bars(12), &ConditionRegistry::new());
        match result {
            Err(RunError::Collector(CollectorError::StaleChunks { paths })) => {
                assert_eq!(paths, vec![stale.clone()])
            }
            other => panic!("expected stale chunks, got {other:?}"),
        }
        // The leftover is reported, not overwritten or removed.
        assert!(stale.exists());
        assert_eq!(std::fs::read_to_string(&stale).unwrap(), "");
    }
}
