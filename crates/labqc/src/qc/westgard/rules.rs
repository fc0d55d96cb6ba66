use std::fmt;

use serde::{Deserialize, Serialize};

use crate::qc::domain::{MeasurementStatus, StatisticalBaseline};

/// Westgard rules understood by the evaluator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RuleId {
    /// One point beyond ±3σ.
    #[serde(rename = "1-3s")]
    OneThreeS,
    /// One point beyond ±2σ.
    #[serde(rename = "1-2s")]
    OneTwoS,
    /// Two consecutive points beyond the same ±2σ limit.
    #[serde(rename = "2-2s")]
    TwoTwoS,
}

impl RuleId {
    pub fn as_str(self) -> &'static str {
        match self {
            RuleId::OneThreeS => "1-3s",
            RuleId::OneTwoS => "1-2s",
            RuleId::TwoTwoS => "2-2s",
        }
    }

    /// Status a rule imposes on the measurement when it fires.
    pub fn severity(self) -> MeasurementStatus {
        match self {
            RuleId::OneTwoS => MeasurementStatus::Warning,
            RuleId::OneThreeS | RuleId::TwoTwoS => MeasurementStatus::Error,
        }
    }
}

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// ±2σ and ±3σ control limits derived from a baseline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControlLimits {
    pub upper_2s: f64,
    pub lower_2s: f64,
    pub upper_3s: f64,
    pub lower_3s: f64,
}

impl ControlLimits {
    /// Returns `None` when the baseline cannot support rule evaluation.
    pub fn from_baseline(baseline: &StatisticalBaseline) -> Option<Self> {
        if !baseline.is_usable() {
            return None;
        }

        let mean = baseline.mean;
        let sd = baseline.standard_deviation;
        Some(Self {
            upper_2s: mean + 2.0 * sd,
            lower_2s: mean - 2.0 * sd,
            upper_3s: mean + 3.0 * sd,
            lower_3s: mean - 3.0 * sd,
        })
    }

    fn beyond_3s(&self, value: f64) -> bool {
        value > self.upper_3s || value < self.lower_3s
    }

    fn beyond_2s(&self, value: f64) -> bool {
        value > self.upper_2s || value < self.lower_2s
    }

    fn same_side_beyond_2s(&self, first: f64, second: f64) -> bool {
        (first > self.upper_2s && second > self.upper_2s)
            || (first < self.lower_2s && second < self.lower_2s)
    }
}

/// Everything a rule check may look at. `history` is ordered oldest to newest and does
/// not include `value`.
#[derive(Debug, Clone, Copy)]
pub struct RuleInput<'a> {
    pub value: f64,
    pub history: &'a [f64],
    pub limits: &'a ControlLimits,
}

pub type RuleCheck = fn(&RuleInput<'_>) -> Option<RuleId>;

/// Checks run in this order; the order is the detection order reported to callers.
pub(crate) const RULE_CHECKS: &[RuleCheck] = &[single_point, two_two_s];

/// Magnitude check. `1-3s` supersedes `1-2s`, so at most one of them fires.
pub(crate) fn single_point(input: &RuleInput<'_>) -> Option<RuleId> {
    if input.limits.beyond_3s(input.value) {
        Some(RuleId::OneThreeS)
    } else if input.limits.beyond_2s(input.value) {
        Some(RuleId::OneTwoS)
    } else {
        None
    }
}

/// Pattern check against the most recent prior point.
pub(crate) fn two_two_s(input: &RuleInput<'_>) -> Option<RuleId> {
    let last = *input.history.last()?;
    input
        .limits
        .same_side_beyond_2s(input.value, last)
        .then_some(RuleId::TwoTwoS)
}
