//! Per-report reduction of analyte evaluations.

use serde::Serialize;
use serde_json::{Map, Value};

use super::domain::{parse_measurement, AnalyteCode, MeasurementStatus, StatisticalBaseline};
use super::westgard::{MeasurementEvaluation, RuleId, WestgardEvaluator};

/// Outcome of evaluating one analyte of a report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalyteEvaluation {
    pub analyte: AnalyteCode,
    pub value: f64,
    pub status: MeasurementStatus,
    pub triggered_rules: Vec<RuleId>,
    /// False when no usable baseline was configured, so no rule could be checked.
    pub baseline_available: bool,
}

impl AnalyteEvaluation {
    pub fn new(
        analyte: AnalyteCode,
        value: f64,
        evaluation: MeasurementEvaluation,
        baseline_available: bool,
    ) -> Self {
        Self {
            analyte,
            value,
            status: evaluation.status(),
            triggered_rules: evaluation.triggered_rules().to_vec(),
            baseline_available,
        }
    }
}

/// Worst-case status of a report and every rule that fired, qualified by analyte.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportEvaluation {
    overall_status: MeasurementStatus,
    all_triggered_rules: Vec<String>,
    analytes: Vec<AnalyteEvaluation>,
}

impl ReportEvaluation {
    pub fn from_analytes(analytes: Vec<AnalyteEvaluation>) -> Self {
        let mut overall_status = MeasurementStatus::Ok;
        let mut all_triggered_rules = Vec::new();

        for analyte in &analytes {
            overall_status = overall_status.worst(analyte.status);
            all_triggered_rules.extend(
                analyte
                    .triggered_rules
                    .iter()
                    .map(|rule| format!("{rule} for {}", analyte.analyte)),
            );
        }

        Self {
            overall_status,
            all_triggered_rules,
            analytes,
        }
    }

    pub fn overall_status(&self) -> MeasurementStatus {
        self.overall_status
    }

    pub fn all_triggered_rules(&self) -> &[String] {
        &self.all_triggered_rules
    }

    pub fn analytes(&self) -> &[AnalyteEvaluation] {
        &self.analytes
    }

    pub fn requires_review(&self) -> bool {
        self.overall_status != MeasurementStatus::Ok
    }
}

/// Submitted values split into numeric measurements (in submission order) and the
/// analytes that were dropped because their value was empty, not a number, or a
/// repeat of an analyte already seen under another spelling.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilteredValues {
    pub accepted: Vec<(AnalyteCode, f64)>,
    pub skipped: Vec<AnalyteCode>,
}

impl FilteredValues {
    pub fn is_empty(&self) -> bool {
        self.accepted.is_empty()
    }
}

pub fn filter_values(values: &Map<String, Value>) -> FilteredValues {
    let mut filtered = FilteredValues::default();

    for (analyte, raw) in values {
        let code = AnalyteCode::new(analyte);
        if code.as_str().is_empty() {
            continue;
        }
        let duplicate = filtered.accepted.iter().any(|(seen, _)| seen == &code);
        match parse_measurement(raw) {
            Some(value) if !duplicate => filtered.accepted.push((code, value)),
            _ => filtered.skipped.push(code),
        }
    }

    filtered
}

/// Evaluates every accepted value and reduces the results.
///
/// Returns `None` when there is nothing to evaluate; the evaluator is not invoked in
/// that case. `history` must yield values oldest first.
pub fn evaluate_report<B, H>(
    evaluator: &WestgardEvaluator,
    values: &[(AnalyteCode, f64)],
    mut baseline: B,
    mut history: H,
) -> Option<ReportEvaluation>
where
    B: FnMut(&AnalyteCode) -> Option<StatisticalBaseline>,
    H: FnMut(&AnalyteCode) -> Vec<f64>,
{
    if values.is_empty() {
        return None;
    }

    let analytes = values
        .iter()
        .map(|(analyte, value)| {
            let baseline = baseline(analyte);
            let prior = history(analyte);
            let evaluation = evaluator.evaluate(*value, &prior, baseline.as_ref());
            let usable = baseline.as_ref().is_some_and(StatisticalBaseline::is_usable);
            AnalyteEvaluation::new(analyte.clone(), *value, evaluation, usable)
        })
        .collect();

    Some(ReportEvaluation::from_analytes(analytes))
}
