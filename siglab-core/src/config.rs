//! Composite signal configuration: declarative model plus eager validation.
//!
//! - `CompositeSignalConfig`: name, AND/OR logic, 1..=10 component configs.
//! - `ComponentConfig`: condition type, optional name, closed parameter map.
//! - `ConditionSpec`: typed, range-checked parameters for one condition.
//!
//! Validation happens once, before any bar is evaluated. `resolve()` turns a
//! config into named `ConditionSpec`s or the first `ConfigError` it finds.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Upper bound on components per composite.
pub const MAX_COMPONENTS: usize = 10;

/// Upper bound on any bar-count parameter (periods, lookbacks, `max_bars`).
pub const MAX_WINDOW: usize = 100_000;

// ─── Error type ──────────────────────────────────────────────────────

/// Configuration errors. All are fatal and raised at construction time.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("signal name must not be empty")]
    EmptySignalName,
    #[error("signal name '{name}' may only use ASCII letters, digits, '_', '-' and '.', and must not start with '.'")]
    UnsafeSignalName { name: String },
    #[error("signal '{signal}' has no components")]
    NoComponents { signal: String },
    #[error("signal '{signal}' has {count} components (max {max})")]
    TooManyComponents {
        signal: String,
        count: usize,
        max: usize,
    },
    #[error("signal '{signal}': component at position {position} has an empty name")]
    EmptyComponentName { signal: String, position: usize },
    #[error("signal '{signal}': duplicate component name '{name}'")]
    DuplicateComponentName { signal: String, name: String },
    #[error("component '{component}': unknown parameter '{param}'")]
    UnknownParam { component: String, param: String },
    #[error("component '{component}': missing required parameter '{param}'")]
    MissingParam { component: String, param: String },
    #[error("component '{component}': parameter '{param}' must be a {expected}")]
    WrongParamType {
        component: String,
        param: String,
        expected: &'static str,
    },
    #[error("component '{component}': parameter '{param}' = {value} {requirement}")]
    OutOfRange {
        component: String,
        param: String,
        value: f64,
        requirement: &'static str,
    },
    #[error("component '{component}': parameter '{param}' = '{value}' (allowed: {allowed})")]
    InvalidChoice {
        component: String,
        param: String,
        value: String,
        allowed: &'static str,
    },
}

// ─── Declarative model ───────────────────────────────────────────────

/// Combination policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalLogic {
    And,
    Or,
}

impl fmt::Display for SignalLogic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::And => write!(f, "AND"),
            Self::Or => write!(f, "OR"),
        }
    }
}

/// Supported condition kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionKind {
    TrendFilter,
    Threshold,
    Breakout,
    VolumeConfirmation,
    RetracementLevel,
    TimeStop,
    Custom,
}

impl ConditionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TrendFilter => "trend_filter",
            Self::Threshold => "threshold",
            Self::Breakout => "breakout",
            Self::VolumeConfirmation => "volume_confirmation",
            Self::RetracementLevel => "retracement_level",
            Self::TimeStop => "time_stop",
            Self::Custom => "custom",
        }
    }
}

/// A single parameter value: numeric or string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Number(f64),
    Text(String),
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        Self::Number(v)
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

/// Configuration of one condition component.
///
/// Uses `BTreeMap` for deterministic key ordering during serialization → hashing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentConfig {
    #[serde(rename = "type")]
    pub kind: ConditionKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub params: BTreeMap<String, ParamValue>,
}

impl ComponentConfig {
    pub fn new(kind: ConditionKind) -> Self {
        Self {
            kind,
            name: None,
            params: BTreeMap::new(),
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Configured name, or `{type}_{position}` when absent.
    pub fn resolved_name(&self, position: usize) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None => format!("{}_{}", self.kind.as_str(), position),
        }
    }

    /// Parse and range-check parameters for this component's kind.
    pub fn spec(&self, component: &str) -> Result<ConditionSpec, ConfigError> {
        let mut p = ParamReader::new(self, component);
        let spec = match self.kind {
            ConditionKind::TrendFilter => ConditionSpec::TrendFilter {
                period: p.whole("period", 50, 1)?,
                ma: match p.text("ma", "sma")? {
                    "sma" => MaKind::Sma,
                    "ema" => MaKind::Ema,
                    other => return Err(p.invalid_choice("ma", other, "sma, ema")),
                },
                side: match p.text("direction", "above")? {
                    "above" => TrendSide::Above,
                    "below" => TrendSide::Below,
                    other => return Err(p.invalid_choice("direction", other, "above, below")),
                },
            },
            ConditionKind::Threshold => {
                let source = match p.optional_text("key")? {
                    Some(key) => IndicatorSource::External(key.to_string()),
                    None => {
                        let kind = match p.text("indicator", "rsi")? {
                            "rsi" => IndicatorKind::Rsi,
                            "roc" => IndicatorKind::Roc,
                            "atr" => IndicatorKind::Atr,
                            "sma" => IndicatorKind::Sma,
                            "ema" => IndicatorKind::Ema,
                            other => {
                                return Err(p.invalid_choice(
                                    "indicator",
                                    other,
                                    "rsi, roc, atr, sma, ema",
                                ))
                            }
                        };
                        IndicatorSource::Builtin {
                            kind,
                            period: p.whole("period", 14, 1)?,
                        }
                    }
                };
                ConditionSpec::Threshold {
                    source,
                    threshold: p.finite("threshold", 30.0)?,
                    comparison: match p.text("direction", "below")? {
                        "below" => Comparison::Below,
                        "above" => Comparison::Above,
                        other => return Err(p.invalid_choice("direction", other, "below, above")),
                    },
                }
            }
            ConditionKind::Breakout => ConditionSpec::Breakout {
                lookback: p.whole("lookback", 20, 1)?,
                direction: match p.text("direction", "up")? {
                    "up" => BreakoutDirection::Up,
                    "down" => BreakoutDirection::Down,
                    other => return Err(p.invalid_choice("direction", other, "up, down")),
                },
            },
            ConditionKind::VolumeConfirmation => ConditionSpec::VolumeConfirmation {
                period: p.whole("period", 20, 1)?,
                multiplier: p.positive("multiplier", 1.5)?,
            },
            ConditionKind::RetracementLevel => ConditionSpec::RetracementLevel {
                lookback: p.whole("lookback", 50, 2)?,
                level: p.fraction("level", 0.618)?,
                tolerance: p.fraction("tolerance", 0.01)?,
                direction: match p.text("direction", "from_high")? {
                    "from_high" => RetracementDirection::FromHigh,
                    "from_low" => RetracementDirection::FromLow,
                    other => {
                        return Err(p.invalid_choice("direction", other, "from_high, from_low"))
                    }
                },
            },
            ConditionKind::TimeStop => ConditionSpec::TimeStop {
                max_bars: p.whole("max_bars", 20, 1)?,
            },
            ConditionKind::Custom => ConditionSpec::Custom {
                function: p.required_text("function")?.to_string(),
            },
        };
        p.finish()?;
        Ok(spec)
    }
}

/// Declarative composite signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositeSignalConfig {
    pub name: String,
    pub logic: SignalLogic,
    pub components: Vec<ComponentConfig>,
}

/// A component after validation: final name plus typed parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedComponent {
    pub name: String,
    pub spec: ConditionSpec,
}

impl CompositeSignalConfig {
    pub fn new(name: impl Into<String>, logic: SignalLogic) -> Self {
        Self {
            name: name.into(),
            logic,
            components: Vec::new(),
        }
    }

    pub fn with_component(mut self, component: ComponentConfig) -> Self {
        self.components.push(component);
        self
    }

    /// Validate everything and return the components with resolved names.
    pub fn resolve(&self) -> Result<Vec<ResolvedComponent>, ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::EmptySignalName);
        }
        if !is_file_safe_name(&self.name) {
            return Err(ConfigError::UnsafeSignalName {
                name: self.name.clone(),
            });
        }
        check_component_count(&self.name, self.components.len())?;

        let mut seen = HashSet::new();
        let mut resolved = Vec::with_capacity(self.components.len());
        for (position, component) in self.components.iter().enumerate() {
            let name = component.resolved_name(position);
            if name.trim().is_empty() {
                return Err(ConfigError::EmptyComponentName {
                    signal: self.name.clone(),
                    position,
                });
            }
            if !seen.insert(name.clone()) {
                return Err(ConfigError::DuplicateComponentName {
                    signal: self.name.clone(),
                    name,
                });
            }
            let spec = component.spec(&name)?;
            resolved.push(ResolvedComponent { name, spec });
        }
        Ok(resolved)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.resolve().map(|_| ())
    }

    /// Deterministic content hash (blake3 over canonical JSON).
    pub fn config_hash(&self) -> String {
        // BTreeMap params keep the JSON stable
        let json = serde_json::to_string(self).unwrap_or_default();
        blake3::hash(json.as_bytes()).to_hex().to_string()
    }
}

/// Signal names become audit file names, so they stay inside one directory
/// entry: ASCII alphanumerics plus `_`, `-`, `.`, with no leading dot.
pub fn is_file_safe_name(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

/// Shared by config validation and the programmatic builder.
pub(crate) fn check_component_count(signal: &str, count: usize) -> Result<(), ConfigError> {
    if count == 0 {
        return Err(ConfigError::NoComponents {
            signal: signal.to_string(),
        });
    }
    if count > MAX_COMPONENTS {
        return Err(ConfigError::TooManyComponents {
            signal: signal.to_string(),
            count,
            max: MAX_COMPONENTS,
        });
    }
    Ok(())
}

// ─── Typed parameters ───────────────────────────────────────────────

/// Moving average flavour for the trend filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaKind {
    Sma,
    Ema,
}

/// Side of the moving average the price must be on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrendSide {
    Above,
    Below,
}

/// Threshold comparison direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    /// Passes when value < threshold.
    Below,
    /// Passes when value > threshold.
    Above,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakoutDirection {
    Up,
    Down,
}

/// Which swing extreme the retracement is measured from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetracementDirection {
    FromHigh,
    FromLow,
}

/// Built-in indicators a threshold condition can read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndicatorKind {
    Rsi,
    Roc,
    Atr,
    Sma,
    Ema,
}

impl IndicatorKind {
    pub fn prefix(&self) -> &'static str {
        match self {
            Self::Rsi => "rsi",
            Self::Roc => "roc",
            Self::Atr => "atr",
            Self::Sma => "sma",
            Self::Ema => "ema",
        }
    }
}

/// Where a threshold condition gets its reading from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndicatorSource {
    /// Computed by this crate before the bar loop.
    Builtin { kind: IndicatorKind, period: usize },
    /// Supplied by the replay engine under this name.
    External(String),
}

impl IndicatorSource {
    /// Lookup key in `IndicatorValues`.
    pub fn key(&self) -> String {
        match self {
            Self::Builtin { kind, period } => format!("{}_{period}", kind.prefix()),
            Self::External(key) => key.clone(),
        }
    }
}

/// Typed parameters of one condition.
#[derive(Debug, Clone, PartialEq)]
pub enum ConditionSpec {
    TrendFilter {
        period: usize,
        ma: MaKind,
        side: TrendSide,
    },
    Threshold {
        source: IndicatorSource,
        threshold: f64,
        comparison: Comparison,
    },
    Breakout {
        lookback: usize,
        direction: BreakoutDirection,
    },
    VolumeConfirmation {
        period: usize,
        multiplier: f64,
    },
    RetracementLevel {
        lookback: usize,
        level: f64,
        tolerance: f64,
        direction: RetracementDirection,
    },
    TimeStop {
        max_bars: usize,
    },
    Custom {
        function: String,
    },
}

// ─── Parameter reader ───────────────────────────────────────────────

/// Reads parameters from a `ComponentConfig`, tracking which keys were used
/// so that `finish()` can reject unknown ones.
struct ParamReader<'a> {
    config: &'a ComponentConfig,
    component: &'a str,
    used: BTreeSet<&'static str>,
}

impl<'a> ParamReader<'a> {
    fn new(config: &'a ComponentConfig, component: &'a str) -> Self {
        Self {
            config,
            component,
            used: BTreeSet::new(),
        }
    }

    fn raw(&mut self, key: &'static str) -> Option<&'a ParamValue> {
        self.used.insert(key);
        self.config.params.get(key)
    }

    fn number(&mut self, key: &'static str, default: f64) -> Result<f64, ConfigError> {
        match self.raw(key) {
            None => Ok(default),
            Some(ParamValue::Number(v)) => Ok(*v),
            Some(ParamValue::Text(_)) => Err(self.wrong_type(key, "number")),
        }
    }

    fn finite(&mut self, key: &'static str, default: f64) -> Result<f64, ConfigError> {
        let v = self.number(key, default)?;
        if !v.is_finite() {
            return Err(self.out_of_range(key, v, "must be finite"));
        }
        Ok(v)
    }

    fn positive(&mut self, key: &'static str, default: f64) -> Result<f64, ConfigError> {
        let v = self.number(key, default)?;
        if !(v.is_finite() && v > 0.0) {
            return Err(self.out_of_range(key, v, "must be > 0"));
        }
        Ok(v)
    }

    fn fraction(&mut self, key: &'static str, default: f64) -> Result<f64, ConfigError> {
        let v = self.number(key, default)?;
        if !(0.0..=1.0).contains(&v) {
            return Err(self.out_of_range(key, v, "must be within [0, 1]"));
        }
        Ok(v)
    }

    fn whole(&mut self, key: &'static str, default: usize, min: usize) -> Result<usize, ConfigError> {
        let v = self.number(key, default as f64)?;
        if !v.is_finite() || v.fract() != 0.0 {
            return Err(self.out_of_range(key, v, "must be a whole number"));
        }
        if v < min as f64 {
            return Err(self.out_of_range(
                key,
                v,
                if min <= 1 { "must be >= 1" } else { "must be >= 2" },
            ));
        }
        if v > MAX_WINDOW as f64 {
            return Err(self.out_of_range(key, v, "must be <= 100000"));
        }
        Ok(v as usize)
    }

    fn optional_text(&mut self, key: &'static str) -> Result<Option<&'a str>, ConfigError> {
        match self.raw(key) {
            None => Ok(None),
            Some(ParamValue::Text(s)) => Ok(Some(s.as_str())),
            Some(ParamValue::Number(_)) => Err(self.wrong_type(key, "string")),
        }
    }

    fn text(&mut self, key: &'static str, default: &'static str) -> Result<&'a str, ConfigError> {
        Ok(self.optional_text(key)?.unwrap_or(default))
    }

    fn required_text(&mut self, key: &'static str) -> Result<&'a str, ConfigError> {
        self.optional_text(key)?
            .ok_or_else(|| ConfigError::MissingParam {
                component: self.component.to_string(),
                param: key.to_string(),
            })
    }

    fn finish(self) -> Result<(), ConfigError> {
        match self
            .config
            .params
            .keys()
            .find(|k| !self.used.contains(k.as_str()))
        {
            Some(unknown) => Err(ConfigError::UnknownParam {
                component: self.component.to_string(),
                param: unknown.clone(),
            }),
            None => Ok(()),
        }
    }

    fn wrong_type(&self, key: &str, expected: &'static str) -> ConfigError {
        ConfigError::WrongParamType {
            component: self.component.to_string(),
            param: key.to_string(),
            expected,
        }
    }

    fn out_of_range(&self, key: &str, value: f64, requirement: &'static str) -> ConfigError {
        ConfigError::OutOfRange {
            component: self.component.to_string(),
            param: key.to_string(),
            value,
            requirement,
        }
    }

    fn invalid_choice(&self, key: &str, value: &str, allowed: &'static str) -> ConfigError {
        ConfigError::InvalidChoice {
            component: self.component.to_string(),
            param: key.to_string(),
            value: value.to_string(),
            allowed,
        }
    }
}
