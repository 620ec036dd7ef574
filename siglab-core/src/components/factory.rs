//! Factory system: converts validated component configs into runtime
//! conditions, and resolves the indicators those conditions read.
//!
//! - `create_condition`: one `ResolvedComponent` → `Box<dyn Condition>`.
//! - `ConditionRegistry`: named constructors for `type = "custom"` components.
//! - `required_indicators`: deduplicated indicator set for a list of composites.

use std::collections::{HashMap, HashSet};
use std::fmt;

use crate::config::{
    BreakoutDirection, CompositeSignalConfig, ConditionSpec, ConfigError, IndicatorKind,
    IndicatorSource, ResolvedComponent,
};
use crate::domain::ComponentResult;
use crate::indicators::{Atr, Channel, MovingAverage, Roc, Rsi};

use super::condition::{
    Breakout, Condition, CustomCondition, RetracementLevel, Threshold, TimeStop, TrendFilter,
    VolumeConfirmation,
};
use super::indicator::{BarContext, Indicator};

// ─── Error type ──────────────────────────────────────────────────────

/// Errors that can occur during composite construction.
#[derive(Debug, thiserror::Error)]
pub enum FactoryError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("component '{component}': no custom condition registered as '{function}'")]
    UnknownCustom { component: String, function: String },
}

// ─── Custom registry ────────────────────────────────────────────────

type Constructor = Box<dyn Fn(&str) -> CustomCondition + Send + Sync>;

/// Named constructors for custom conditions.
///
/// Each composite build calls the constructor again, so closure state is
/// never shared between composites (entry and exit get separate instances).
#[derive(Default)]
pub struct ConditionRegistry {
    constructors: HashMap<String, Constructor>,
}

impl ConditionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `make` under `function`. `make` returns a fresh evaluation
    /// closure for every component instance.
    pub fn register<M, F>(&mut self, function: impl Into<String>, make: M)
    where
        M: Fn() -> F + Send + Sync + 'static,
        F: FnMut(&BarContext<'_>) -> ComponentResult + Send + 'static,
    {
        self.constructors.insert(
            function.into(),
            Box::new(move |name: &str| CustomCondition::new(name, make())),
        );
    }

    pub fn contains(&self, function: &str) -> bool {
        self.constructors.contains_key(function)
    }

    fn build(&self, component: &str, function: &str) -> Result<CustomCondition, FactoryError> {
        self.constructors
            .get(function)
            .map(|make| make(component))
            .ok_or_else(|| FactoryError::UnknownCustom {
                component: component.to_string(),
                function: function.to_string(),
            })
    }
}

impl fmt::Debug for ConditionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.constructors.keys().collect();
        names.sort();
        f.debug_struct("ConditionRegistry")
            .field("functions", &names)
            .finish()
    }
}

// ─── Condition factory ──────────────────────────────────────────────

/// Lookback of a built-in indicator, used as the threshold condition's warmup.
fn builtin_lookback(kind: IndicatorKind, period: usize) -> usize {
    match kind {
        IndicatorKind::Rsi | IndicatorKind::Roc => period,
        IndicatorKind::Atr | IndicatorKind::Sma | IndicatorKind::Ema => period.saturating_sub(1),
    }
}

/// Create a condition from a validated component.
pub fn create_condition(
    component: &ResolvedComponent,
    registry: &ConditionRegistry,
) -> Result<Box<dyn Condition>, FactoryError> {
    let name = component.name.as_str();
    let condition: Box<dyn Condition> = match &component.spec {
        ConditionSpec::TrendFilter { period, ma, side } => {
            Box::new(TrendFilter::new(name, *period, *ma, *side))
        }
        ConditionSpec::Threshold {
            source,
            threshold,
            comparison,
        } => {
            let warmup = match source {
                IndicatorSource::Builtin { kind, period } => builtin_lookback(*kind, *period),
                IndicatorSource::External(_) => 0,
            };
            Box::new(Threshold::new(name, source.key(), *threshold, *comparison).with_warmup(warmup))
        }
        ConditionSpec::Breakout {
            lookback,
            direction,
        } => Box::new(Breakout::new(name, *lookback, *direction)),
        ConditionSpec::VolumeConfirmation { period, multiplier } => {
            Box::new(VolumeConfirmation::new(name, *period, *multiplier))
        }
        ConditionSpec::RetracementLevel {
            lookback,
            level,
            tolerance,
            direction,
        } => Box::new(RetracementLevel::new(
            name, *lookback, *level, *tolerance, *direction,
        )),
        ConditionSpec::TimeStop { max_bars } => Box::new(TimeStop::new(name, *max_bars)),
        ConditionSpec::Custom { function } => Box::new(registry.build(name, function)?),
    };
    Ok(condition)
}

// ─── Required indicators resolver ───────────────────────────────────

/// Indicators needed by one condition spec.
fn indicators_for(spec: &ConditionSpec) -> Vec<Box<dyn Indicator>> {
    match spec {
        ConditionSpec::TrendFilter { period, ma, .. } => {
            vec![Box::new(MovingAverage::of_close(*ma, *period))]
        }
        ConditionSpec::Threshold {
            source: IndicatorSource::Builtin { kind, period },
            ..
        } => {
            let ind: Box<dyn Indicator> = match kind {
                IndicatorKind::Rsi => Box::new(Rsi::new(*period)),
                IndicatorKind::Roc => Box::new(Roc::new(*period)),
                IndicatorKind::Atr => Box::new(Atr::new(*period)),
                IndicatorKind::Sma => Box::new(MovingAverage::sma(*period)),
                IndicatorKind::Ema => Box::new(MovingAverage::ema(*period)),
            };
            vec![ind]
        }
        ConditionSpec::Breakout {
            lookback,
            direction: BreakoutDirection::Up,
        } => vec![Box::new(Channel::upper(*lookback))],
        ConditionSpec::Breakout {
            lookback,
            direction: BreakoutDirection::Down,
        } => vec![Box::new(Channel::lower(*lookback))],
        ConditionSpec::VolumeConfirmation { period, .. } => {
            vec![Box::new(MovingAverage::volume(*period))]
        }
        ConditionSpec::RetracementLevel { lookback, .. } => vec![
            Box::new(Channel::upper(*lookback)),
            Box::new(Channel::lower(*lookback)),
        ],
        // External thresholds are supplied by the replay engine; time stops
        // and custom conditions read no precomputed series.
        ConditionSpec::Threshold { .. } | ConditionSpec::TimeStop { .. } | ConditionSpec::Custom { .. } => {
            Vec::new()
        }
    }
}

/// Determine which indicators a set of composites needs, deduplicated by key.
pub fn required_indicators(
    configs: &[&CompositeSignalConfig],
) -> Result<Vec<Box<dyn Indicator>>, ConfigError> {
    let mut seen = HashSet::new();
    let mut indicators = Vec::new();
    for config in configs {
        for component in config.resolve()? {
            for ind in indicators_for(&component.spec) {
                if seen.insert(ind.name().to_string()) {
                    indicators.push(ind);
                }
            }
        }
    }
    Ok(indicators)
}

/// Indicator keys that must be supplied externally (threshold `key` params).
pub fn external_indicator_keys(
    configs: &[&CompositeSignalConfig],
) -> Result<Vec<String>, ConfigError> {
    let mut keys = Vec::new();
    for config in configs {
        for component in config.resolve()? {
            if let ConditionSpec::Threshold {
                source: IndicatorSource::External(key),
                ..
            } = component.spec
            {
                if !keys.contains(&key) {
                    keys.push(key);
                }
            }
        }
    }
    Ok(keys)
}
