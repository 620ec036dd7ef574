//! Condition components: independent pass/fail checks evaluated per bar.
//!
//! Every condition consumes the current `BarContext` and produces exactly one
//! `ComponentResult`. Missing or warming-up indicator state is a normal
//! negative outcome (`ComponentResult::insufficient_data`), never an error.

pub mod breakout;
pub mod custom;
pub mod retracement;
pub mod threshold;
pub mod time_stop;
pub mod trend_filter;
pub mod volume;

pub use breakout::Breakout;
pub use custom::CustomCondition;
pub use retracement::RetracementLevel;
pub use threshold::Threshold;
pub use time_stop::TimeStop;
pub use trend_filter::TrendFilter;
pub use volume::VolumeConfirmation;

use crate::config::ConditionKind;
use crate::domain::ComponentResult;

use super::indicator::BarContext;

/// Trait for condition components.
///
/// `evaluate` takes `&mut self` so that conditions which are stateful by
/// nature (the time stop) own their state. Stateless conditions ignore it.
///
/// # Architecture invariant
/// Conditions see bars only through `BarContext`, which hides future bars.
pub trait Condition: Send {
    /// Component name, unique within one composite.
    fn name(&self) -> &str;

    fn kind(&self) -> ConditionKind;

    /// Bars of history needed before this condition can pass.
    fn warmup_bars(&self) -> usize {
        0
    }

    fn evaluate(&mut self, ctx: &BarContext<'_>) -> ComponentResult;

    /// A position was opened on `bar_index` (reference event for time-based conditions).
    fn on_position_opened(&mut self, _bar_index: usize) {}

    fn on_position_closed(&mut self) {}
}

/// Read a warmed-up indicator value at the current bar, or explain why not.
pub(crate) fn warm_value(ctx: &BarContext<'_>, key: &str, bars_back: usize) -> Result<f64, String> {
    match ctx.indicator_back(key, bars_back) {
        Some(v) if !v.is_nan() => Ok(v),
        Some(_) => Err(format!("{key} not warmed up")),
        None if !ctx.indicators().contains(key) => Err(format!("{key} unavailable")),
        None => Err(format!("{key} has no value {bars_back} bar(s) back")),
    }
}

/// Current close, unless the bar is void.
pub(crate) fn close_of(ctx: &BarContext<'_>) -> Result<f64, String> {
    let close = ctx.bar().close;
    if close.is_nan() {
        Err("void bar".to_string())
    } else {
        Ok(close)
    }
}
