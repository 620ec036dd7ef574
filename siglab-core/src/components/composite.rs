//! Composite signal generator: evaluates an ordered list of conditions per
//! bar and combines them under AND/OR logic into one `SignalEvaluation`.
//!
//! Every condition is evaluated on every bar, in declared order, even once
//! the combined outcome is already decided: the audit trail needs all
//! component results. Only the boolean decision short-circuits.

use std::collections::HashSet;
use std::fmt;

use tracing::trace;

use crate::config::{
    check_component_count, is_file_safe_name, CompositeSignalConfig, ConfigError, SignalLogic,
};
use crate::domain::SignalEvaluation;

use super::condition::Condition;
use super::factory::{create_condition, ConditionRegistry, FactoryError};
use super::indicator::BarContext;

/// A built composite signal. Owns its conditions (and their state).
pub struct CompositeSignal {
    name: String,
    logic: SignalLogic,
    conditions: Vec<Box<dyn Condition>>,
}

impl CompositeSignal {
    /// Validate `config` and build every condition it declares.
    pub fn from_config(
        config: &CompositeSignalConfig,
        registry: &ConditionRegistry,
    ) -> Result<Self, FactoryError> {
        let conditions = config
            .resolve()?
            .iter()
            .map(|component| create_condition(component, registry))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            name: config.name.clone(),
            logic: config.logic,
            conditions,
        })
    }

    /// Programmatic assembly; validated at `build()`.
    pub fn builder(name: impl Into<String>, logic: SignalLogic) -> CompositeSignalBuilder {
        CompositeSignalBuilder {
            name: name.into(),
            logic,
            conditions: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn logic(&self) -> SignalLogic {
        self.logic
    }

    pub fn len(&self) -> usize {
        self.conditions.len()
    }

    /// Always false for a built composite; present for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// Component names in declared order.
    pub fn component_names(&self) -> Vec<&str> {
        self.conditions.iter().map(|c| c.name()).collect()
    }

    /// Bars of history needed before every condition can pass.
    pub fn warmup_bars(&self) -> usize {
        self.conditions
            .iter()
            .map(|c| c.warmup_bars())
            .max()
            .unwrap_or(0)
    }

    /// Evaluate all conditions on the current bar and combine them.
    pub fn evaluate(&mut self, ctx: &BarContext<'_>, bar_identity: &str) -> SignalEvaluation {
        let components = self
            .conditions
            .iter_mut()
            .map(|condition| condition.evaluate(ctx))
            .collect();
        let evaluation = SignalEvaluation::combine_nonempty(
            ctx.timestamp(),
            bar_identity.to_string(),
            components,
            self.logic,
        );
        trace!(
            signal = %self.name,
            bar = ctx.bar_index(),
            fired = evaluation.signal(),
            strength = evaluation.strength(),
            "composite evaluated"
        );
        evaluation
    }

    /// Forward a position-opened reference event to every condition.
    pub fn notify_position_opened(&mut self, bar_index: usize) {
        for condition in &mut self.conditions {
            condition.on_position_opened(bar_index);
        }
    }

    pub fn notify_position_closed(&mut self) {
        for condition in &mut self.conditions {
            condition.on_position_closed();
        }
    }
}

impl fmt::Debug for CompositeSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompositeSignal")
            .field("name", &self.name)
            .field("logic", &self.logic)
            .field("components", &self.component_names())
            .finish()
    }
}

/// Builder for `CompositeSignal` from already-constructed conditions.
pub struct CompositeSignalBuilder {
    name: String,
    logic: SignalLogic,
    conditions: Vec<Box<dyn Condition>>,
}

impl CompositeSignalBuilder {
    pub fn with_condition(mut self, condition: impl Condition + 'static) -> Self {
        self.conditions.push(Box::new(condition));
        self
    }

    pub fn with_boxed(mut self, condition: Box<dyn Condition>) -> Self {
        self.conditions.push(condition);
        self
    }

    /// Same checks as config validation: name, component count, unique names.
    pub fn build(self) -> Result<CompositeSignal, ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::EmptySignalName);
        }
        if !is_file_safe_name(&self.name) {
            return Err(ConfigError::UnsafeSignalName { name: self.name });
        }
        check_component_count(&self.name, self.conditions.len())?;
        let mut seen = HashSet::new();
        for (position, condition) in self.conditions.iter().enumerate() {
            if condition.name().trim().is_empty() {
                return Err(ConfigError::EmptyComponentName {
                    signal: self.name.clone(),
                    position,
                });
            }
            if !seen.insert(condition.name()) {
                return Err(ConfigError::DuplicateComponentName {
                    signal: self.name.clone(),
                    name: condition.name().to_string(),
                });
            }
        }
        Ok(CompositeSignal {
            name: self.name,
            logic: self.logic,
            conditions: self.conditions,
        })
    }
}
