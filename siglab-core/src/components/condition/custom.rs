//! Custom condition: wraps a caller-supplied closure.
//!
//! The closure's result is renamed to the configured component name so the
//! audit trail stays consistent. Panics inside the closure propagate: a bug
//! in a custom condition aborts the run instead of masquerading as a false
//! signal.

use std::fmt;

use crate::components::indicator::BarContext;
use crate::config::ConditionKind;
use crate::domain::ComponentResult;

use super::Condition;

/// Evaluation closure for a custom condition.
pub type ConditionFn = Box<dyn FnMut(&BarContext<'_>) -> ComponentResult + Send>;

pub struct CustomCondition {
    name: String,
    warmup: usize,
    func: ConditionFn,
}

impl CustomCondition {
    pub fn new<F>(name: impl Into<String>, func: F) -> Self
    where
        F: FnMut(&BarContext<'_>) -> ComponentResult + Send + 'static,
    {
        Self {
            name: name.into(),
            warmup: 0,
            func: Box::new(func),
        }
    }

    pub fn with_warmup(mut self, bars: usize) -> Self {
        self.warmup = bars;
        self
    }
}

impl fmt::Debug for CustomCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomCondition")
            .field("name", &self.name)
            .field("warmup", &self.warmup)
            .finish_non_exhaustive()
    }
}

impl Condition for CustomCondition {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ConditionKind {
        ConditionKind::Custom
    }

    fn warmup_bars(&self) -> usize {
        self.warmup
    }

    fn evaluate(&mut self, ctx: &BarContext<'_>) -> ComponentResult {
        (self.func)(ctx).renamed(&self.name)
    }
}
