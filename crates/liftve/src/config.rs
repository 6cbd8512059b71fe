//! Engine configuration and run statistics.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{FoveError, Result};
use crate::operators::OperatorKind;

/// Settings threaded through one elimination run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Refuse any operator whose log-cost exceeds this
    pub max_log_cost: Option<f64>,

    /// Stop after this many operator applications
    pub max_steps: Option<usize>,

    /// Largest entry-wise difference for two potentials to count as equal
    /// when merging
    pub merge_tolerance: f64,

    /// Merge parfactors back together after the initial shattering
    pub compact_after_shatter: bool,

    /// Dump whole parfactor sets at debug level
    pub log_parfactors: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_log_cost: None,
            max_steps: None,
            merge_tolerance: 1e-9,
            compact_after_shatter: false,
            log_parfactors: false,
        }
    }
}

impl EngineConfig {
    pub fn with_max_log_cost(mut self, budget: f64) -> Self {
        self.max_log_cost = Some(budget);
        self
    }

    pub fn with_max_steps(mut self, steps: usize) -> Self {
        self.max_steps = Some(steps);
        self
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| FoveError::InvalidConfig(e.to_string()))
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| FoveError::InvalidConfig(e.to_string()))
    }
}

/// What an elimination run did.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EliminationStats {
    /// Operator applications per kind
    pub applications: BTreeMap<OperatorKind, usize>,
    /// Largest log-cost among the applied operators
    pub max_log_cost: f64,
    /// Log of the summed cost of every applied operator
    pub log_total_cost: f64,
    /// Parfactors left after shattering
    pub shattered_parfactors: usize,
}

impl EliminationStats {
    pub fn steps(&self) -> usize {
        self.applications.values().sum()
    }

    pub(crate) fn record(&mut self, kind: OperatorKind, log_cost: f64) {
        let first = self.steps() == 0;
        *self.applications.entry(kind).or_default() += 1;
        if first {
            self.max_log_cost = log_cost;
            self.log_total_cost = log_cost;
        } else {
            self.max_log_cost = self.max_log_cost.max(log_cost);
            self.log_total_cost = log_add(self.log_total_cost, log_cost);
        }
    }
}

/// ln(e^a + e^b) without overflow.
fn log_add(a: f64, b: f64) -> f64 {
    let (hi, lo) = if a >= b { (a, b) } else { (b, a) };
    if lo == f64::NEG_INFINITY {
        return hi;
    }
    hi + (lo - hi).exp().ln_1p()
}
