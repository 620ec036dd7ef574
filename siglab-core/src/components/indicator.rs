//! Indicator trait, precomputed indicator container, and the per-bar context.
//!
//! Indicators are pure functions: bar history in, numeric series out.
//! They are precomputed once before the bar loop. Conditions never compute
//! indicators themselves; they read them by name through `BarContext`.

use crate::domain::Bar;
use std::collections::HashMap;

/// Trait for indicators.
///
/// Indicators take a full bar series and produce a numeric output series of
/// the same length. The first `lookback()` values are `f64::NAN` (warmup).
///
/// # Look-ahead contamination guard
/// No indicator value at bar t may depend on price data from bar t+1 or later.
pub trait Indicator: Send + Sync {
    /// Indicator key (e.g., "sma_20", "rsi_14").
    fn name(&self) -> &str;

    /// Number of bars needed before the indicator produces valid output.
    fn lookback(&self) -> usize;

    /// Compute the indicator for the entire bar series.
    fn compute(&self, bars: &[Bar]) -> Vec<f64>;
}

/// Container for named indicator series.
///
/// Filled either by precomputing built-in indicators or by the replay engine
/// inserting its own series (externally supplied indicator state).
#[derive(Debug, Clone, Default)]
pub struct IndicatorValues {
    series: HashMap<String, Vec<f64>>,
}

impl IndicatorValues {
    pub fn new() -> Self {
        Self::default()
    }

    /// Precompute every indicator over `bars`.
    pub fn precompute(indicators: &[Box<dyn Indicator>], bars: &[Bar]) -> Self {
        let mut values = Self::new();
        for indicator in indicators {
            values.insert(indicator.name(), indicator.compute(bars));
        }
        values
    }

    /// Insert a named indicator series.
    pub fn insert(&mut self, name: impl Into<String>, values: Vec<f64>) {
        self.series.insert(name.into(), values);
    }

    /// Value at a bar index; `None` if the series is unknown or too short.
    pub fn get(&self, name: &str, bar_index: usize) -> Option<f64> {
        self.series
            .get(name)
            .and_then(|v| v.get(bar_index).copied())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.series.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }
}

/// Read-only view of one bar in the replay: the bar, everything before it,
/// and the indicator state.
///
/// Conditions only see `bars[..=bar_index]`; later bars are not reachable.
#[derive(Debug, Clone, Copy)]
pub struct BarContext<'a> {
    history: &'a [Bar],
    indicators: &'a IndicatorValues,
}

impl<'a> BarContext<'a> {
    /// Context for `bars[bar_index]`. Returns `None` if the index is out of range.
    pub fn new(bars: &'a [Bar], bar_index: usize, indicators: &'a IndicatorValues) -> Option<Self> {
        if bar_index >= bars.len() {
            return None;
        }
        Some(Self {
            history: &bars[..=bar_index],
            indicators,
        })
    }

    /// The bar being evaluated.
    pub fn bar(&self) -> &'a Bar {
        // history is never empty: `new` rejects out-of-range indices
        &self.history[self.history.len() - 1]
    }

    pub fn bar_index(&self) -> usize {
        self.history.len() - 1
    }

    pub fn timestamp(&self) -> i64 {
        self.bar().timestamp
    }

    /// All bars up to and including the current one.
    pub fn history(&self) -> &'a [Bar] {
        self.history
    }

    /// Indicator value at the current bar.
    pub fn indicator(&self, name: &str) -> Option<f64> {
        self.indicators.get(name, self.bar_index())
    }

    /// Indicator value `bars_back` bars before the current one.
    pub fn indicator_back(&self, name: &str, bars_back: usize) -> Option<f64> {
        let index = self.bar_index().checked_sub(bars_back)?;
        self.indicators.get(name, index)
    }

    pub fn indicators(&self) -> &'a IndicatorValues {
        self.indicators
    }
}
