//! Time stop: passes once a position has been open for `max_bars` bars.
//!
//! The reference event is the position opening, delivered through
//! `on_position_opened`. The opening bar counts as 0 elapsed bars. With no
//! open position the result is negative with a NaN value.

use crate::components::indicator::BarContext;
use crate::config::ConditionKind;
use crate::domain::ComponentResult;

use super::Condition;

#[derive(Debug, Clone)]
pub struct TimeStop {
    name: String,
    pub max_bars: usize,
    opened_at: Option<usize>,
}

impl TimeStop {
    pub fn new(name: impl Into<String>, max_bars: usize) -> Self {
        assert!(max_bars > 0, "max_bars must be > 0");
        Self {
            name: name.into(),
            max_bars,
            opened_at: None,
        }
    }

    /// Bar index of the tracked reference event, if any.
    pub fn opened_at(&self) -> Option<usize> {
        self.opened_at
    }
}

impl Condition for TimeStop {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ConditionKind {
        ConditionKind::TimeStop
    }

    fn evaluate(&mut self, ctx: &BarContext<'_>) -> ComponentResult {
        let Some(opened_at) = self.opened_at else {
            return ComponentResult::failed(&self.name, f64::NAN, "no reference event (flat)");
        };
        let elapsed = ctx.bar_index().saturating_sub(opened_at);
        let max = self.max_bars;
        if elapsed >= max {
            ComponentResult::passed(&self.name, elapsed as f64, format!("held {elapsed} >= {max} bars"))
        } else {
            ComponentResult::failed(&self.name, elapsed as f64, format!("held {elapsed} < {max} bars"))
        }
    }

    fn on_position_opened(&mut self, bar_index: usize) {
        self.opened_at = Some(bar_index);
    }

    fn on_position_closed(&mut self) {
        self.opened_at = None;
    }
}
