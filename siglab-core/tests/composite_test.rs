//! Integration tests for composite signals built from configuration.
//!
//! Covers the documented AND/OR scenarios, construction failures, and a full
//! indicator-backed pass over a synthetic bar series.

use siglab_core::components::{
    required_indicators, BarContext, CompositeSignal, ConditionRegistry, CustomCondition,
    FactoryError, IndicatorValues,
};
use siglab_core::config::{
    ComponentConfig, CompositeSignalConfig, ConditionKind, ConfigError, SignalLogic,
};
use siglab_core::domain::{Bar, ComponentResult, SignalEvaluation};

// ── Helpers ──────────────────────────────────────────────────────────

const DAY_NS: i64 = 86_400_000_000_000;

fn trending_bars(n: usize) -> Vec<Bar> {
    (0..n)
        .map(|i| {
            let close = 100.0 + i as f64 * 0.5 + (i as f64 * 0.3).sin() * 2.0;
            Bar {
                timestamp: i as i64 * DAY_NS,
                open: close - 0.2,
                high: close + 1.0,
                low: close - 1.0,
                close,
                volume: 1_000.0 + (i % 7) as f64 * 150.0,
            }
        })
        .collect()
}

fn fixed(name: &str, triggered: bool) -> CustomCondition {
    CustomCondition::new(name, move |_ctx: &BarContext<'_>| {
        ComponentResult::new("", if triggered { 1.0 } else { 0.0 }, triggered, "fixed")
    })
}

fn evaluate_fixed(logic: SignalLogic, outcomes: &[(&str, bool)]) -> SignalEvaluation {
    let mut builder = CompositeSignal::builder("test", logic);
    for (name, triggered) in outcomes {
        builder = builder.with_condition(fixed(name, *triggered));
    }
    let mut composite = builder.build().unwrap();
    let bars = trending_bars(1);
    let iv = IndicatorValues::new();
    let ctx = BarContext::new(&bars, 0, &iv).unwrap();
    composite.evaluate(&ctx, "SPY.1D")
}

fn assert_invariants(eval: &SignalEvaluation, logic: SignalLogic) {
    let passed = eval.components().iter().filter(|c| c.triggered()).count();
    assert_eq!(eval.passed_count(), passed);
    assert_eq!(eval.strength(), passed as f64 / eval.total_count() as f64);
    if eval.signal() {
        assert!(eval.blocking_component().is_none());
    }
    match logic {
        SignalLogic::And if !eval.signal() => {
            let first_failing = eval.components().iter().find(|c| !c.triggered());
            assert_eq!(eval.blocking_component(), first_failing.map(|c| c.name()));
        }
        SignalLogic::Or => {
            assert_eq!(eval.signal(), passed >= 1);
            assert!(eval.blocking_component().is_none());
        }
        SignalLogic::And => {}
    }
}

// ── Documented scenarios ─────────────────────────────────────────────

#[test]
fn and_with_one_failure_blocks_on_it() {
    let eval = evaluate_fixed(
        SignalLogic::And,
        &[
            ("trend_filter", true),
            ("rsi_threshold", true),
            ("volume_confirm", true),
            ("fib_level", false),
        ],
    );
    assert!(!eval.signal());
    assert_eq!(eval.strength(), 0.75);
    assert_eq!(eval.blocking_component(), Some("fib_level"));
    assert!(eval.is_near_miss());
}

#[test]
fn and_with_all_passing_fires() {
    let eval = evaluate_fixed(
        SignalLogic::And,
        &[
            ("trend_filter", true),
            ("rsi_threshold", true),
            ("volume_confirm", true),
            ("fib_level", true),
        ],
    );
    assert!(eval.signal());
    assert_eq!(eval.strength(), 1.0);
    assert_eq!(eval.blocking_component(), None);
    assert!(!eval.is_near_miss());
}

#[test]
fn or_with_one_pass_fires() {
    let eval = evaluate_fixed(SignalLogic::Or, &[("a", false), ("b", true)]);
    assert!(eval.signal());
    assert_eq!(eval.strength(), 0.5);
    assert_eq!(eval.blocking_component(), None);
}

#[test]
fn components_keep_declared_order() {
    let eval = evaluate_fixed(SignalLogic::And, &[("z", false), ("a", false), ("m", true)]);
    let names: Vec<&str> = eval.components().iter().map(|c| c.name()).collect();
    assert_eq!(names, vec!["z", "a", "m"]);
    assert_eq!(eval.blocking_component(), Some("z"));
}

// ── Construction failures ────────────────────────────────────────────

#[test]
fn zero_components_rejected_before_any_bar() {
    let config = CompositeSignalConfig::new("entry", SignalLogic::And);
    let err = CompositeSignal::from_config(&config, &ConditionRegistry::new()).unwrap_err();
    assert!(matches!(
        err,
        FactoryError::Config(ConfigError::NoComponents { .. })
    ));
}

#[test]
fn eleven_components_rejected() {
    let mut config = CompositeSignalConfig::new("entry", SignalLogic::And);
    for i in 0..11 {
        config = config.with_component(
            ComponentConfig::new(ConditionKind::TimeStop).named(format!("stop_{i}")),
        );
    }
    let err = CompositeSignal::from_config(&config, &ConditionRegistry::new()).unwrap_err();
    assert!(matches!(
        err,
        FactoryError::Config(ConfigError::TooManyComponents { count: 11, max: 10, .. })
    ));
}

#[test]
fn out_of_range_tolerance_rejected() {
    let config = CompositeSignalConfig::new("entry", SignalLogic::And).with_component(
        ComponentConfig::new(ConditionKind::RetracementLevel).param("tolerance", 1.5),
    );
    let err = CompositeSignal::from_config(&config, &ConditionRegistry::new()).unwrap_err();
    assert!(matches!(
        err,
        FactoryError::Config(ConfigError::OutOfRange { ref param, .. }) if param == "tolerance"
    ));
}

// ── Full pass over indicator-backed conditions ───────────────────────

const ENTRY_TOML: &str = r#"
name = "trend_entry"
logic = "and"

[[components]]
type = "trend_filter"
name = "trend"
params = { period = 10, ma = "ema", direction = "above" }

[[components]]
type = "threshold"
name = "rsi_threshold"
params = { indicator = "rsi", period = 5, threshold = 70, direction = "below" }

[[components]]
type = "breakout"
params = { lookback = 5 }

[[components]]
type = "volume_confirmation"
params = { period = 5, multiplier = 1.1 }
"#;

#[test]
fn toml_config_runs_over_bars() {
    let config: CompositeSignalConfig = toml::from_str(ENTRY_TOML).unwrap();
    let registry = ConditionRegistry::new();
    let mut composite = CompositeSignal::from_config(&config, &registry).unwrap();
    assert_eq!(
        composite.component_names(),
        vec!["trend", "rsi_threshold", "breakout_2", "volume_confirmation_3"]
    );

    let bars = trending_bars(120);
    let indicators = required_indicators(&[&config]).unwrap();
    let iv = IndicatorValues::precompute(&indicators, &bars);

    let mut evaluations = Vec::new();
    for i in 0..bars.len() {
        let ctx = BarContext::new(&bars, i, &iv).unwrap();
        evaluations.push(composite.evaluate(&ctx, "SYN.1D"));
    }

    // First bar: nothing has warmed up, every component reports NaN.
    let first = &evaluations[0];
    assert!(!first.signal());
    assert_eq!(first.strength(), 0.0);
    assert_eq!(first.blocking_component(), Some("trend"));
    for component in first.components() {
        assert!(component.value().is_nan(), "{} should be NaN", component.name());
        assert!(component.reason().contains("insufficient data"));
    }

    // After warmup every component carries a real reading.
    let late = &evaluations[composite.warmup_bars() + 1];
    assert!(late.components().iter().all(|c| !c.value().is_nan()));

    for eval in &evaluations {
        assert_invariants(eval, SignalLogic::And);
        assert_eq!(eval.bar_identity(), "SYN.1D");
    }
    assert!(evaluations
        .windows(2)
        .all(|w| w[0].timestamp() <= w[1].timestamp()));
}

#[test]
fn custom_condition_from_registry_keeps_own_state() {
    let mut registry = ConditionRegistry::new();
    registry.register("every_other", || {
        let mut calls = 0usize;
        move |_ctx: &BarContext<'_>| {
            calls += 1;
            ComponentResult::new("", calls as f64, calls % 2 == 0, "alternates")
        }
    });
    let config = CompositeSignalConfig::new("alt", SignalLogic::Or).with_component(
        ComponentConfig::new(ConditionKind::Custom)
            .named("alt_check")
            .param("function", "every_other"),
    );
    let mut first = CompositeSignal::from_config(&config, &registry).unwrap();
    let mut second = CompositeSignal::from_config(&config, &registry).unwrap();

    let bars = trending_bars(3);
    let iv = IndicatorValues::new();
    let ctx = BarContext::new(&bars, 0, &iv).unwrap();

    assert!(!first.evaluate(&ctx, "X").signal());
    assert!(first.evaluate(&ctx, "X").signal());
    // Separate instance, separate counter.
    let eval = second.evaluate(&ctx, "X");
    assert!(!eval.signal());
    assert_eq!(eval.components()[0].name(), "alt_check");
    assert_eq!(eval.components()[0].value(), 1.0);
}

#[test]
#[should_panic(expected = "custom condition bug")]
fn custom_condition_panic_propagates() {
    let mut composite = CompositeSignal::builder("entry", SignalLogic::And)
        .with_condition(CustomCondition::new("broken", |_ctx: &BarContext<'_>| {
            panic!("custom condition bug")
        }))
        .build()
        .unwrap();
    let bars = trending_bars(1);
    let iv = IndicatorValues::new();
    let ctx = BarContext::new(&bars, 0, &iv).unwrap();
    composite.evaluate(&ctx, "X");
}
