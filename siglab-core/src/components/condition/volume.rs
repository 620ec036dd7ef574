//! Volume confirmation: current volume against the average of the
//! previous N bars, scaled by a multiplier.

use crate::components::indicator::BarContext;
use crate::config::ConditionKind;
use crate::domain::ComponentResult;

use super::{warm_value, Condition};

#[derive(Debug, Clone)]
pub struct VolumeConfirmation {
    name: String,
    pub period: usize,
    pub multiplier: f64,
    indicator_key: String,
}

impl VolumeConfirmation {
    pub fn new(name: impl Into<String>, period: usize, multiplier: f64) -> Self {
        assert!(period >= 1, "period must be >= 1");
        assert!(multiplier > 0.0, "multiplier must be > 0");
        Self {
            name: name.into(),
            period,
            multiplier,
            indicator_key: format!("volume_sma_{period}"),
        }
    }

    pub fn indicator_key(&self) -> &str {
        &self.indicator_key
    }
}

impl Condition for VolumeConfirmation {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ConditionKind {
        ConditionKind::VolumeConfirmation
    }

    fn warmup_bars(&self) -> usize {
        self.period
    }

    fn evaluate(&mut self, ctx: &BarContext<'_>) -> ComponentResult {
        let average = match warm_value(ctx, &self.indicator_key, 1) {
            Ok(avg) if avg > 0.0 => avg,
            Ok(_) => return ComponentResult::insufficient_data(&self.name, "zero average volume"),
            Err(detail) => return ComponentResult::insufficient_data(&self.name, detail),
        };
        let volume = ctx.bar().volume;
        if volume.is_nan() {
            return ComponentResult::insufficient_data(&self.name, "void bar");
        }

        let ratio = volume / average;
        let m = self.multiplier;
        if volume >= m * average {
            ComponentResult::passed(&self.name, ratio, format!("volume {ratio:.2}x avg >= {m}x"))
        } else {
            ComponentResult::failed(&self.name, ratio, format!("volume {ratio:.2}x avg < {m}x"))
        }
    }
}
