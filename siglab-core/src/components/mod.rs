//! Signal components: per-bar conditions, the composite that combines them,
//! and the factory that builds both from configuration.
//!
//! Plus the indicator trait and the `BarContext` view conditions read from.

pub mod composite;
pub mod condition;
pub mod factory;
pub mod indicator;

pub use composite::{CompositeSignal, CompositeSignalBuilder};
pub use condition::{
    Breakout, Condition, CustomCondition, RetracementLevel, Threshold, TimeStop, TrendFilter,
    VolumeConfirmation,
};
pub use factory::{
    create_condition, external_indicator_keys, required_indicators, ConditionRegistry,
    FactoryError,
};
pub use indicator::{BarContext, Indicator, IndicatorValues};
