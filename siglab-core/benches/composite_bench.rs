//! Criterion benchmarks for the per-bar evaluation path.
//!
//! Benchmarks:
//! 1. Indicator precompute for a typical entry composite
//! 2. Composite evaluation over a full bar series (AND and OR)

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use siglab_core::components::{
    required_indicators, BarContext, CompositeSignal, ConditionRegistry, IndicatorValues,
};
use siglab_core::config::{ComponentConfig, CompositeSignalConfig, ConditionKind, SignalLogic};
use siglab_core::domain::Bar;

// ── Helpers ──────────────────────────────────────────────────────────

fn make_bars(n: usize) -> Vec<Bar> {
    (0..n)
        .map(|i| {
            let close = 100.0 + (i as f64 * 0.1).sin() * 10.0;
            Bar {
                timestamp: i as i64 * 86_400_000_000_000,
                open: close - 0.3,
                high: close + 1.5,
                low: close - 1.5,
                close,
                volume: 1_000_000.0 + (i % 500) as f64 * 1_000.0,
            }
        })
        .collect()
}

fn entry_config(logic: SignalLogic) -> CompositeSignalConfig {
    CompositeSignalConfig::new("bench_entry", logic)
        .with_component(ComponentConfig::new(ConditionKind::TrendFilter).param("period", 50.0))
        .with_component(ComponentConfig::new(ConditionKind::Threshold).param("threshold", 40.0))
        .with_component(ComponentConfig::new(ConditionKind::Breakout))
        .with_component(ComponentConfig::new(ConditionKind::VolumeConfirmation))
        .with_component(ComponentConfig::new(ConditionKind::RetracementLevel))
}

// ── Benchmarks ───────────────────────────────────────────────────────

fn bench_precompute(c: &mut Criterion) {
    let bars = make_bars(5_000);
    let config = entry_config(SignalLogic::And);
    let indicators = required_indicators(&[&config]).unwrap();
    c.bench_function("precompute_entry_indicators_5k", |b| {
        b.iter(|| IndicatorValues::precompute(black_box(&indicators), black_box(&bars)))
    });
}

fn bench_evaluate(c: &mut Criterion) {
    let bars = make_bars(5_000);
    let registry = ConditionRegistry::new();
    let mut group = c.benchmark_group("composite_evaluate_5k");
    for logic in [SignalLogic::And, SignalLogic::Or] {
        let config = entry_config(logic);
        let indicators = required_indicators(&[&config]).unwrap();
        let iv = IndicatorValues::precompute(&indicators, &bars);
        group.bench_with_input(BenchmarkId::from_parameter(logic), &logic, |b, _| {
            b.iter(|| {
                let mut composite = CompositeSignal::from_config(&config, &registry).unwrap();
                let mut fired = 0usize;
                for i in 0..bars.len() {
                    if let Some(ctx) = BarContext::new(&bars, i, &iv) {
                        if composite.evaluate(&ctx, "BENCH").signal() {
                            fired += 1;
                        }
                    }
                }
                black_box(fired)
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_precompute, bench_evaluate);
criterion_main!(benches);
