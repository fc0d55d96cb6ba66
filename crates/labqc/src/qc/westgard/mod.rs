//! Westgard multi-rule evaluation of a single QC measurement.
//!
//! The evaluator is a pure function of the new value, the prior values of the same
//! series and the configured baseline. It is cheap to construct and safe to share
//! between threads.

mod rules;

pub use rules::{ControlLimits, RuleCheck, RuleId, RuleInput};

use serde::Serialize;

use crate::qc::domain::{MeasurementStatus, StatisticalBaseline};

/// Classification of one measurement: the worst severity among the fired rules and the
/// rules themselves in detection order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MeasurementEvaluation {
    status: MeasurementStatus,
    triggered_rules: Vec<RuleId>,
}

impl MeasurementEvaluation {
    /// Evaluation of a measurement that fired nothing.
    pub fn ok() -> Self {
        Self {
            status: MeasurementStatus::Ok,
            triggered_rules: Vec::new(),
        }
    }

    /// Builds an evaluation from rules in detection order. Duplicates are dropped and the
    /// status is derived from the rules, so the two can never disagree.
    pub fn from_rules<I>(rules: I) -> Self
    where
        I: IntoIterator<Item = RuleId>,
    {
        let mut triggered_rules = Vec::new();
        let mut status = MeasurementStatus::Ok;

        for rule in rules {
            if triggered_rules.contains(&rule) {
                continue;
            }
            status = status.worst(rule.severity());
            triggered_rules.push(rule);
        }

        Self {
            status,
            triggered_rules,
        }
    }

    pub fn status(&self) -> MeasurementStatus {
        self.status
    }

    pub fn triggered_rules(&self) -> &[RuleId] {
        &self.triggered_rules
    }

    pub fn is_ok(&self) -> bool {
        self.status == MeasurementStatus::Ok
    }
}

/// Stateless evaluator applying an ordered list of rule checks.
#[derive(Debug, Clone)]
pub struct WestgardEvaluator {
    checks: Vec<RuleCheck>,
}

impl Default for WestgardEvaluator {
    fn default() -> Self {
        Self::standard()
    }
}

impl WestgardEvaluator {
    /// `1-3s`, `1-2s` and `2-2s`, in that detection order.
    pub fn standard() -> Self {
        Self {
            checks: rules::RULE_CHECKS.to_vec(),
        }
    }

    pub fn evaluate(
        &self,
        value: f64,
        history: &[f64],
        baseline: Option<&StatisticalBaseline>,
    ) -> MeasurementEvaluation {
        let Some(limits) = baseline.and_then(ControlLimits::from_baseline) else {
            return MeasurementEvaluation::ok();
        };

        let input = RuleInput {
            value,
            history,
            limits: &limits,
        };

        MeasurementEvaluation::from_rules(self.checks.iter().filter_map(|check| check(&input)))
    }
}

/// Evaluate with the standard rule set.
pub fn evaluate_measurement(
    value: f64,
    history: &[f64],
    baseline: Option<&StatisticalBaseline>,
) -> MeasurementEvaluation {
    WestgardEvaluator::standard().evaluate(value, history, baseline)
}
