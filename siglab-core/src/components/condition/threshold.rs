//! Threshold: an indicator reading compared with a fixed level.
//!
//! `Below` passes when value < threshold (e.g. RSI oversold),
//! `Above` passes when value > threshold.

use crate::components::indicator::BarContext;
use crate::config::{Comparison, ConditionKind};
use crate::domain::ComponentResult;

use super::{warm_value, Condition};

#[derive(Debug, Clone)]
pub struct Threshold {
    name: String,
    indicator_key: String,
    pub threshold: f64,
    pub comparison: Comparison,
    warmup: usize,
}

impl Threshold {
    pub fn new(
        name: impl Into<String>,
        indicator_key: impl Into<String>,
        threshold: f64,
        comparison: Comparison,
    ) -> Self {
        Self {
            name: name.into(),
            indicator_key: indicator_key.into(),
            threshold,
            comparison,
            warmup: 0,
        }
    }

    /// Record the indicator's lookback (informational only).
    pub fn with_warmup(mut self, bars: usize) -> Self {
        self.warmup = bars;
        self
    }

    pub fn indicator_key(&self) -> &str {
        &self.indicator_key
    }
}

impl Condition for Threshold {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ConditionKind {
        ConditionKind::Threshold
    }

    fn warmup_bars(&self) -> usize {
        self.warmup
    }

    fn evaluate(&mut self, ctx: &BarContext<'_>) -> ComponentResult {
        let value = match warm_value(ctx, &self.indicator_key, 0) {
            Ok(v) => v,
            Err(detail) => return ComponentResult::insufficient_data(&self.name, detail),
        };

        let key = &self.indicator_key;
        let t = self.threshold;
        let (passed, op) = match self.comparison {
            Comparison::Below if value < t => (true, "<"),
            Comparison::Below => (false, ">="),
            Comparison::Above if value > t => (true, ">"),
            Comparison::Above => (false, "<="),
        };
        ComponentResult::new(
            &self.name,
            value,
            passed,
            format!("{key} {value:.4} {op} {t}"),
        )
    }
}
