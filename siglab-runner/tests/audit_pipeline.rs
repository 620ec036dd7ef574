//! Integration tests for the audit pipeline: composite → collector →
//! merged audit → statistics and CSV export.

use std::path::Path;

use proptest::prelude::*;
use tempfile::TempDir;

use siglab_core::components::{
    BarContext, CompositeSignal, ConditionRegistry, CustomCondition, IndicatorValues,
};
use siglab_core::config::{ComponentConfig, CompositeSignalConfig, ConditionKind, SignalLogic};
use siglab_core::domain::{Bar, ComponentResult};
use siglab_runner::{
    load_audit_csv, load_bars_csv, run_audit, CollectorConfig, CollectorState,
    EvaluationCollector, ExportFormat, RunConfig, StatisticsAnalyzer,
};

fn make_bars(n: usize) -> Vec<Bar> {
    (0..n)
        .map(|i| {
            let close = 100.0 + (i as f64 * 0.3).sin() * 5.0 + i as f64 * 0.05;
            Bar {
                timestamp: 1_704_153_600_000_000_000 + i as i64 * 86_400_000_000_000,
                open: close - 0.2,
                high: close + 1.0,
                low: close - 1.0,
                close,
                volume: 1_000.0 + (i % 7) as f64 * 100.0,
            }
        })
        .collect()
}

fn always_passes(name: &str) -> CustomCondition {
    CustomCondition::new(name, |ctx: &BarContext<'_>| {
        ComponentResult::passed("", ctx.bar().close, "always")
    })
}

fn always_fails(name: &str) -> CustomCondition {
    CustomCondition::new(name, |ctx: &BarContext<'_>| {
        ComponentResult::failed("", ctx.bar().close, "never")
    })
}

fn chunk_files(dir: &Path) -> usize {
    std::fs::read_dir(dir)
        .unwrap()
        .filter_map(Result::ok)
        .filter(|e| e.file_name().to_string_lossy().contains(".chunk-"))
        .count()
}

#[test]
fn always_failing_component_is_the_primary_blocker() {
    let tmp = TempDir::new().unwrap();
    let bars = make_bars(1_000);
    let indicators = IndicatorValues::new();
    let mut composite = CompositeSignal::builder("entry", SignalLogic::And)
        .with_condition(always_passes("trend_filter"))
        .with_condition(always_fails("rsi_threshold"))
        .with_condition(always_passes("volume_confirm"))
        .build()
        .unwrap();
    let mut collector = EvaluationCollector::new(
        CollectorConfig::new("entry", tmp.path()).with_flush_threshold(200),
    )
    .unwrap();

    for i in 0..bars.len() {
        let ctx = BarContext::new(&bars, i, &indicators).unwrap();
        collector.record(composite.evaluate(&ctx, "SYN.1D")).unwrap();
        assert!(collector.buffered_len() < 200);
    }

    assert_eq!(collector.chunk_count(), 5);
    assert_eq!(chunk_files(tmp.path()), 5);
    assert_eq!(collector.buffered_len(), 0);

    let audit = collector.finalize().unwrap();
    assert_eq!(collector.state(), CollectorState::Finalized);
    assert_eq!(audit.evaluation_count(), 1_000);
    assert_eq!(audit.chunk_count(), 5);
    assert_eq!(chunk_files(tmp.path()), 0);

    let stats = StatisticsAnalyzer::default().analyze_audit(&audit).unwrap();
    assert_eq!(stats.total_evaluations, 1_000);
    assert_eq!(stats.total_triggered, 0);
    assert_eq!(stats.blocking_rate("rsi_threshold"), Some(1.0));
    assert_eq!(stats.blocking_rate("trend_filter"), Some(0.0));
    assert_eq!(stats.primary_blocker.as_deref(), Some("rsi_threshold"));
    // 2 of 3 passed: strength 0.667 < 0.75.
    assert_eq!(stats.near_miss_count, 0);
}

#[test]
fn run_audit_with_registered_conditions() {
    let tmp = TempDir::new().unwrap();
    let mut registry = ConditionRegistry::new();
    registry.register("always", || {
        |ctx: &BarContext<'_>| ComponentResult::passed("", ctx.bar().close, "always")
    });
    registry.register("never", || {
        |ctx: &BarContext<'_>| ComponentResult::failed("", ctx.bar().close, "never")
    });

    let entry = CompositeSignalConfig::new("entry", SignalLogic::And)
        .with_component(
            ComponentConfig::new(ConditionKind::Custom)
                .named("trend_filter")
                .param("function", "always"),
        )
        .with_component(
            ComponentConfig::new(ConditionKind::Custom)
                .named("rsi_threshold")
                .param("function", "never"),
        );
    let mut config = RunConfig::new(entry);
    config.run.output_dir = tmp.path().to_path_buf();
    config.run.flush_threshold = 200;

    let summary = run_audit(&config, &make_bars(1_000), &registry).unwrap();
    assert_eq!(summary.entry.evaluations, 1_000);
    assert_eq!(summary.entry.chunk_count, 5);
    assert_eq!(summary.positions_opened, 0);
    assert!(summary.exit.is_none());
    let stats = &summary.entry.statistics;
    assert_eq!(stats.blocking_rate("rsi_threshold"), Some(1.0));
    assert_eq!(stats.primary_blocker.as_deref(), Some("rsi_threshold"));
    // 1 of 2 passed is not a near miss at 0.75.
    assert_eq!(stats.near_miss_count, 0);
}

#[test]
fn unknown_custom_function_fails_before_any_bar() {
    let tmp = TempDir::new().unwrap();
    let entry = CompositeSignalConfig::new("entry", SignalLogic::Or).with_component(
        ComponentConfig::new(ConditionKind::Custom).param("function", "missing"),
    );
    let mut config = RunConfig::new(entry);
    config.run.output_dir = tmp.path().join("out");

    assert!(run_audit(&config, &make_bars(10), &ConditionRegistry::new()).is_err());
    assert!(!tmp.path().join("out").exists());
}

#[test]
fn csv_export_reads_back_identically() {
    let tmp = TempDir::new().unwrap();
    let bars = make_bars(120);
    let toml = format!(
        r#"
[run]
bar_identity = "SYN.1D"
flush_threshold = 32
output_dir = "{}"

[entry]
name = "entry"
logic = "and"

[[entry.components]]
type = "trend_filter"
params = {{ period = 20 }}

[[entry.components]]
type = "threshold"
name = "rsi_threshold"
params = {{ indicator = "rsi", period = 14, threshold = 70 }}
"#,
        tmp.path().display()
    );
    let config = RunConfig::from_toml(&toml).unwrap();
    let summary = run_audit(&config, &bars, &ConditionRegistry::new()).unwrap();

    let from_csv = load_audit_csv(&summary.entry.audit_csv).unwrap();
    assert_eq!(from_csv.len(), 120);
    // Warmup rows carry NaN values and still read back.
    assert!(from_csv[0].components()[0].value().is_nan());

    let audit_path = &summary.entry.audit_jsonl;
    let from_jsonl: Vec<_> = siglab_runner::JsonlEvaluations::open(audit_path)
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(from_csv, from_jsonl);
    assert_eq!(from_csv[0].bar_identity(), "SYN.1D");

    let recomputed = StatisticsAnalyzer::default().analyze(&from_csv);
    assert_eq!(recomputed, summary.entry.statistics);
    assert_eq!(ExportFormat::Csv.extension(), "csv");
}

#[test]
fn bars_csv_to_summary_artifacts() {
    let tmp = TempDir::new().unwrap();
    let bars_path = tmp.path().join("bars.csv");
    let mut csv = String::from("timestamp,open,high,low,close,volume\n");
    for (i, bar) in make_bars(60).iter().enumerate() {
        csv.push_str(&format!(
            "2024-01-{:02}T00:00:{:02}Z,{},{},{},{},{}\n",
            1 + i / 60,
            i % 60,
            bar.open,
            bar.high,
            bar.low,
            bar.close,
            bar.volume
        ));
    }
    std::fs::write(&bars_path, csv).unwrap();
    let bars = load_bars_csv(&bars_path).unwrap();
    assert_eq!(bars.len(), 60);

    let entry = CompositeSignalConfig::new("breakout_entry", SignalLogic::Or)
        .with_component(ComponentConfig::new(ConditionKind::Breakout).param("lookback", 5.0))
        .with_component(ComponentConfig::new(ConditionKind::VolumeConfirmation).param("period", 5.0));
    let exit = CompositeSignalConfig::new("time_exit", SignalLogic::Or)
        .with_component(ComponentConfig::new(ConditionKind::TimeStop).param("max_bars", 3.0));
    let mut config = RunConfig::new(entry).with_exit(exit);
    config.run.output_dir = tmp.path().join("audit");

    let summary = run_audit(&config, &bars, &ConditionRegistry::new()).unwrap();
    assert_eq!(summary.bar_count, 60);
    assert_eq!(summary.warmup_bars, 5);
    assert!(summary.positions_opened >= summary.positions_closed);
    assert!(summary.positions_opened - summary.positions_closed <= 1);
    let exit = summary.exit.as_ref().unwrap();
    // Every close is an exit signal.
    assert_eq!(exit.statistics.total_triggered, summary.positions_closed);

    let (summary_path, report_path) =
        siglab_runner::save_run_artifacts(&summary, &config.run.output_dir).unwrap();
    assert_eq!(siglab_runner::load_summary(&summary_path).unwrap(), summary);
    let report = std::fs::read_to_string(report_path).unwrap();
    assert!(report.contains("## Entry Signal: breakout_entry"));
    assert!(report.contains("## Exit Signal: time_exit"));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    /// The buffer never exceeds the threshold, and chunk count is the number
    /// of full buffers before finalize.
    #[test]
    fn buffer_stays_bounded(n in 1usize..300, threshold in 1usize..64) {
        let tmp = TempDir::new().unwrap();
        let bars = make_bars(n);
        let indicators = IndicatorValues::new();
        let mut composite = CompositeSignal::builder("s", SignalLogic::Or)
            .with_condition(always_passes("a"))
            .build()
            .unwrap();
        let mut collector = EvaluationCollector::new(
            CollectorConfig::new("s", tmp.path()).with_flush_threshold(threshold),
        )
        .unwrap();

        for i in 0..n {
            let ctx = BarContext::new(&bars, i, &indicators).unwrap();
            collector.record(composite.evaluate(&ctx, "P")).unwrap();
            prop_assert!(collector.buffered_len() < threshold);
        }
        prop_assert_eq!(collector.chunk_count(), n / threshold);
        prop_assert_eq!(collector.recorded_count(), n);

        let audit = collector.finalize().unwrap();
        prop_assert_eq!(audit.evaluation_count(), n);
        prop_assert_eq!(audit.chunk_count(), n.div_ceil(threshold));
        prop_assert_eq!(audit.evaluations().unwrap().count(), n);
    }
}
