//! Post-run statistics over an evaluation history.
//!
//! All rates share one denominator, the total number of evaluations, so a
//! component's trigger rate and blocking rate are directly comparable.
//! The analyzer holds no state beyond its near-miss threshold; analyzing the
//! same history twice yields identical results.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use siglab_core::domain::{SignalEvaluation, DEFAULT_NEAR_MISS_THRESHOLD};

use crate::collector::FinalizedAudit;
use crate::export::AuditError;

/// Near-miss threshold outside `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
#[error("near-miss threshold {0} is outside [0, 1]")]
pub struct InvalidThreshold(pub f64);

/// Aggregate metrics for one signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalStatistics {
    pub total_evaluations: usize,
    pub total_triggered: usize,
    /// `total_triggered / total_evaluations`; 0 for an empty history.
    pub signal_rate: f64,
    /// Component names in declared order.
    pub components: Vec<String>,
    pub trigger_rates: BTreeMap<String, f64>,
    pub blocking_rates: BTreeMap<String, f64>,
    pub near_miss_count: usize,
    pub near_miss_threshold: f64,
    /// Highest blocking rate; earliest declared component wins ties.
    /// `None` when nothing ever blocked.
    pub primary_blocker: Option<String>,
}

impl SignalStatistics {
    pub fn trigger_rate(&self, component: &str) -> Option<f64> {
        self.trigger_rates.get(component).copied()
    }

    pub fn blocking_rate(&self, component: &str) -> Option<f64> {
        self.blocking_rates.get(component).copied()
    }

    pub fn near_miss_rate(&self) -> f64 {
        ratio(self.near_miss_count, self.total_evaluations)
    }
}

fn ratio(count: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        count as f64 / total as f64
    }
}

/// Computes `SignalStatistics` from evaluations.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatisticsAnalyzer {
    near_miss_threshold: f64,
}

impl Default for StatisticsAnalyzer {
    fn default() -> Self {
        Self {
            near_miss_threshold: DEFAULT_NEAR_MISS_THRESHOLD,
        }
    }
}

impl StatisticsAnalyzer {
    pub fn new(near_miss_threshold: f64) -> Result<Self, InvalidThreshold> {
        if !(0.0..=1.0).contains(&near_miss_threshold) {
            return Err(InvalidThreshold(near_miss_threshold));
        }
        Ok(Self {
            near_miss_threshold,
        })
    }

    pub fn near_miss_threshold(&self) -> f64 {
        self.near_miss_threshold
    }

    pub fn analyze<'a, I>(&self, evaluations: I) -> SignalStatistics
    where
        I: IntoIterator<Item = &'a SignalEvaluation>,
    {
        let mut tally = Tally::default();
        for evaluation in evaluations {
            tally.add(evaluation, self.near_miss_threshold);
        }
        tally.finish(self.near_miss_threshold)
    }

    /// Fallible stream variant, for evaluations read back from disk.
    pub fn try_analyze<I, E>(&self, evaluations: I) -> Result<SignalStatistics, E>
    where
        I: IntoIterator<Item = Result<SignalEvaluation, E>>,
    {
        let mut tally = Tally::default();
        for evaluation in evaluations {
            tally.add(&evaluation?, self.near_miss_threshold);
        }
        Ok(tally.finish(self.near_miss_threshold))
    }

    /// Stream a finalized audit from disk; memory use is independent of its length.
    pub fn analyze_audit(&self, audit: &FinalizedAudit) -> Result<SignalStatistics, AuditError> {
        let mut stats = self.try_analyze(audit.evaluations()?)?;
        // Components recorded nowhere in the history still get a 0 rate.
        for name in audit.component_names() {
            if !stats.components.contains(name) {
                stats.components.push(name.clone());
                stats.trigger_rates.insert(name.clone(), 0.0);
                stats.blocking_rates.insert(name.clone(), 0.0);
            }
        }
        Ok(stats)
    }
}

#[derive(Default)]
struct Tally {
    components: Vec<String>,
    triggered: HashMap<String, usize>,
    blocked: HashMap<String, usize>,
    total: usize,
    fired: usize,
    near_misses: usize,
}

impl Tally {
    fn add(&mut self, evaluation: &SignalEvaluation, near_miss_threshold: f64) {
        self.total += 1;
        if evaluation.signal() {
            self.fired += 1;
        }
        if evaluation.is_near_miss_at(near_miss_threshold) {
            self.near_misses += 1;
        }
        for component in evaluation.components() {
            let name = component.name();
            if !self.triggered.contains_key(name) {
                self.components.push(name.to_string());
                self.triggered.insert(name.to_string(), 0);
            }
            if component.triggered() {
                if let Some(count) = self.triggered.get_mut(name) {
                    *count += 1;
                }
            }
        }
        if let Some(blocker) = evaluation.blocking_component() {
            *self.blocked.entry(blocker.to_string()).or_insert(0) += 1;
        }
    }

    fn finish(self, near_miss_threshold: f64) -> SignalStatistics {
        let rate_of = |counts: &HashMap<String, usize>, name: &str| {
            ratio(counts.get(name).copied().unwrap_or(0), self.total)
        };
        let trigger_rates: BTreeMap<String, f64> = self
            .components
            .iter()
            .map(|name| (name.clone(), rate_of(&self.triggered, name)))
            .collect();
        let blocking_rates: BTreeMap<String, f64> = self
            .components
            .iter()
            .map(|name| (name.clone(), rate_of(&self.blocked, name)))
            .collect();

        let mut primary_blocker: Option<(&String, f64)> = None;
        for name in &self.components {
            let rate = blocking_rates[name];
            if rate > primary_blocker.map_or(0.0, |(_, best)| best) {
                primary_blocker = Some((name, rate));
            }
        }

        SignalStatistics {
            total_evaluations: self.total,
            total_triggered: self.fired,
            signal_rate: ratio(self.fired, self.total),
            primary_blocker: primary_blocker.map(|(name, _)| name.clone()),
            components: self.components.clone(),
            trigger_rates,
            blocking_rates,
            near_miss_count: self.near_misses,
            near_miss_threshold,
        }
    }
}
