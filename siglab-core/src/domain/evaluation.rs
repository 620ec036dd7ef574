//! Evaluation value types: one condition outcome and one composite outcome.
//!
//! Both types are immutable once built: fields are private and only readable
//! through accessors. `SignalEvaluation` derives `strength`, `signal` and
//! `blocking_component` from its components at construction, so the
//! strength/blocking invariants hold for every instance, including ones read
//! back from disk (deserialization goes through `EvaluationRecord` and is
//! re-validated).

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::SignalLogic;

/// Reasons longer than this (in chars) are truncated at construction.
pub const MAX_REASON_LEN: usize = 160;

/// Default strength at or above which a failed evaluation counts as a near-miss.
pub const DEFAULT_NEAR_MISS_THRESHOLD: f64 = 0.75;

/// Near-miss rule: the composite failed, but at least `threshold` of its
/// components passed.
pub fn is_near_miss(strength: f64, signal: bool, threshold: f64) -> bool {
    !signal && strength >= threshold
}

// ─── ComponentResult ─────────────────────────────────────────────────

/// Outcome of one condition component on one bar.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentResult {
    name: String,
    /// NaN when the underlying indicator has not warmed up.
    #[serde(with = "non_finite")]
    value: f64,
    triggered: bool,
    reason: String,
}

impl ComponentResult {
    pub fn new(
        name: impl Into<String>,
        value: f64,
        triggered: bool,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            value,
            triggered,
            reason: truncate_reason(reason.into()),
        }
    }

    pub fn passed(name: impl Into<String>, value: f64, reason: impl Into<String>) -> Self {
        Self::new(name, value, true, reason)
    }

    pub fn failed(name: impl Into<String>, value: f64, reason: impl Into<String>) -> Self {
        Self::new(name, value, false, reason)
    }

    /// Negative outcome for a component whose inputs are not available yet.
    pub fn insufficient_data(name: impl Into<String>, detail: impl AsRef<str>) -> Self {
        Self::new(
            name,
            f64::NAN,
            false,
            format!("insufficient data: {}", detail.as_ref()),
        )
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn triggered(&self) -> bool {
        self.triggered
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }

    /// Same outcome under a different name. Used by the composite to apply
    /// configured names to results produced by custom closures.
    pub(crate) fn renamed(mut self, name: &str) -> Self {
        if self.name != name {
            self.name = name.to_string();
        }
        self
    }
}

impl PartialEq for ComponentResult {
    /// NaN values compare equal to each other so that warm-up results survive
    /// a disk round-trip comparison.
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.triggered == other.triggered
            && self.reason == other.reason
            && (self.value == other.value || (self.value.is_nan() && other.value.is_nan()))
    }
}

fn truncate_reason(reason: String) -> String {
    if reason.chars().count() <= MAX_REASON_LEN {
        return reason;
    }
    reason.chars().take(MAX_REASON_LEN).collect()
}

// ─── SignalEvaluation ───────────────────────────────────────────────

/// Invariant violations detected when rebuilding an evaluation from raw parts.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InvariantViolation {
    #[error("evaluation has no components")]
    NoComponents,
    #[error("strength {recorded} does not match {passed}/{total}")]
    StrengthMismatch {
        recorded: f64,
        passed: usize,
        total: usize,
    },
    #[error("signal is true but blocking component '{0}' is set")]
    BlockerOnPassingSignal(String),
    #[error("signal is true but no component passed")]
    PassingSignalWithoutPass,
    #[error("signal is false but every component passed")]
    FailingSignalWithAllPassed,
    #[error("blocking component '{recorded}' is not the first failing component ({expected:?})")]
    BlockerMismatch {
        recorded: String,
        expected: Option<String>,
    },
    #[error("signal is false without a blocker, but {0} component(s) passed")]
    MissingBlocker(usize),
}

/// Composite outcome for one bar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "EvaluationRecord")]
pub struct SignalEvaluation {
    timestamp: i64,
    bar_identity: String,
    components: Vec<ComponentResult>,
    signal: bool,
    strength: f64,
    blocking_component: Option<String>,
}

impl SignalEvaluation {
    /// Combine component results under `logic`.
    ///
    /// Fails only if `components` is empty.
    pub fn combine(
        timestamp: i64,
        bar_identity: impl Into<String>,
        components: Vec<ComponentResult>,
        logic: SignalLogic,
    ) -> Result<Self, InvariantViolation> {
        if components.is_empty() {
            return Err(InvariantViolation::NoComponents);
        }
        Ok(Self::combine_nonempty(
            timestamp,
            bar_identity.into(),
            components,
            logic,
        ))
    }

    /// Caller guarantees `components` is non-empty.
    pub(crate) fn combine_nonempty(
        timestamp: i64,
        bar_identity: String,
        components: Vec<ComponentResult>,
        logic: SignalLogic,
    ) -> Self {
        debug_assert!(!components.is_empty());
        let total = components.len();
        let passed = components.iter().filter(|c| c.triggered).count();

        let signal = match logic {
            SignalLogic::And => passed == total,
            SignalLogic::Or => passed >= 1,
        };

        let blocking_component = match logic {
            SignalLogic::And if !signal => first_failing(&components).map(str::to_string),
            _ => None,
        };

        Self {
            timestamp,
            bar_identity,
            components,
            signal,
            strength: strength_of(passed, total),
            blocking_component,
        }
    }

    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    pub fn bar_identity(&self) -> &str {
        &self.bar_identity
    }

    /// Component results in declaration order.
    pub fn components(&self) -> &[ComponentResult] {
        &self.components
    }

    pub fn component(&self, name: &str) -> Option<&ComponentResult> {
        self.components.iter().find(|c| c.name == name)
    }

    pub fn signal(&self) -> bool {
        self.signal
    }

    pub fn strength(&self) -> f64 {
        self.strength
    }

    pub fn blocking_component(&self) -> Option<&str> {
        self.blocking_component.as_deref()
    }

    pub fn passed_count(&self) -> usize {
        self.components.iter().filter(|c| c.triggered).count()
    }

    pub fn total_count(&self) -> usize {
        self.components.len()
    }

    pub fn is_near_miss(&self) -> bool {
        self.is_near_miss_at(DEFAULT_NEAR_MISS_THRESHOLD)
    }

    pub fn is_near_miss_at(&self, threshold: f64) -> bool {
        is_near_miss(self.strength, self.signal, threshold)
    }

    /// True if both evaluations carry the same component names in the same order.
    pub fn same_layout(&self, other: &SignalEvaluation) -> bool {
        self.components.len() == other.components.len()
            && self
                .components
                .iter()
                .zip(&other.components)
                .all(|(a, b)| a.name == b.name)
    }
}

fn strength_of(passed: usize, total: usize) -> f64 {
    passed as f64 / total as f64
}

fn first_failing(components: &[ComponentResult]) -> Option<&str> {
    components
        .iter()
        .find(|c| !c.triggered)
        .map(|c| c.name.as_str())
}

// ─── EvaluationRecord ───────────────────────────────────────────────

/// Unvalidated evaluation fields, as read from a chunk file or audit CSV.
///
/// Convert with `SignalEvaluation::try_from` to get the invariants checked.
#[derive(Debug, Clone, Deserialize)]
pub struct EvaluationRecord {
    pub timestamp: i64,
    pub bar_identity: String,
    pub components: Vec<ComponentResult>,
    pub signal: bool,
    pub strength: f64,
    pub blocking_component: Option<String>,
}

impl TryFrom<EvaluationRecord> for SignalEvaluation {
    type Error = InvariantViolation;

    fn try_from(record: EvaluationRecord) -> Result<Self, Self::Error> {
        if record.components.is_empty() {
            return Err(InvariantViolation::NoComponents);
        }
        let total = record.components.len();
        let passed = record.components.iter().filter(|c| c.triggered).count();

        if record.strength != strength_of(passed, total) {
            return Err(InvariantViolation::StrengthMismatch {
                recorded: record.strength,
                passed,
                total,
            });
        }

        if record.signal {
            if let Some(name) = record.blocking_component {
                return Err(InvariantViolation::BlockerOnPassingSignal(name));
            }
            if passed == 0 {
                return Err(InvariantViolation::PassingSignalWithoutPass);
            }
        } else {
            if passed == total {
                return Err(InvariantViolation::FailingSignalWithAllPassed);
            }
            match &record.blocking_component {
                // AND policy: blocker must be the first failing component.
                Some(recorded) => {
                    let expected = first_failing(&record.components);
                    if expected != Some(recorded.as_str()) {
                        return Err(InvariantViolation::BlockerMismatch {
                            recorded: recorded.clone(),
                            expected: expected.map(str::to_string),
                        });
                    }
                }
                // OR policy: a failed signal means nothing passed.
                None if passed > 0 => return Err(InvariantViolation::MissingBlocker(passed)),
                None => {}
            }
        }

        Ok(Self {
            timestamp: record.timestamp,
            bar_identity: record.bar_identity,
            components: record.components,
            signal: record.signal,
            strength: record.strength,
            blocking_component: record.blocking_component,
        })
    }
}

/// JSON has no NaN or infinity: NaN is written as `null`, infinities as
/// the strings `"inf"` / `"-inf"`, and each reads back as itself.
mod non_finite {
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Wire {
        Number(f64),
        Text(String),
    }

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        if value.is_nan() {
            serializer.serialize_none()
        } else if value.is_infinite() {
            serializer.serialize_str(if *value > 0.0 { "inf" } else { "-inf" })
        } else {
            serializer.serialize_f64(*value)
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        match Option::<Wire>::deserialize(deserializer)? {
            None => Ok(f64::NAN),
            Some(Wire::Number(v)) => Ok(v),
            Some(Wire::Text(text)) => match text.as_str() {
                "inf" => Ok(f64::INFINITY),
                "-inf" => Ok(f64::NEG_INFINITY),
                "NaN" => Ok(f64::NAN),
                other => Err(D::Error::custom(format!(
                    "expected a number, null, \"inf\" or \"-inf\", found \"{other}\""
                ))),
            },
        }
    }
}
