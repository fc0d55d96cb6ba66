use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::QcConfig;

use super::domain::{AnalyteCode, ControlKey, QcSubmission, SeriesKey, StatisticalBaseline};
use super::report::{evaluate_report, filter_values};
use super::repository::{
    LotParameterStore, QcRecord, QcRecordId, QcRecordRepository, RepositoryError,
};
use super::review::{ReviewDecision, ReviewEntry, ReviewError, ReviewRequest};
use super::statistics::DescriptiveStatistics;
use super::westgard::WestgardEvaluator;

/// Service composing the lot parameters, record storage and the Westgard evaluator.
pub struct QcService<L, R> {
    lots: Arc<L>,
    records: Arc<R>,
    evaluator: Arc<WestgardEvaluator>,
    config: QcConfig,
}

static RECORD_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_record_id() -> QcRecordId {
    let id = RECORD_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    QcRecordId(format!("qc-{id:06}"))
}

/// A record together with its review trail.
#[derive(Debug, Clone, Serialize)]
pub struct QcRecordView {
    #[serde(flatten)]
    pub record: QcRecord,
    pub requires_review: bool,
    pub reviews: Vec<ReviewEntry>,
}

/// Computed statistics of a series next to its configured baseline.
#[derive(Debug, Clone, Serialize)]
pub struct SeriesStatistics {
    pub series: SeriesKey,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub baseline: Option<StatisticalBaseline>,
    pub statistics: DescriptiveStatistics,
    /// Values the statistics were computed from, oldest first.
    pub values: Vec<f64>,
}

impl<L, R> QcService<L, R>
where
    L: LotParameterStore + 'static,
    R: QcRecordRepository + 'static,
{
    pub fn new(lots: Arc<L>, records: Arc<R>, config: QcConfig) -> Self {
        Self::with_evaluator(lots, records, WestgardEvaluator::standard(), config)
    }

    pub fn with_evaluator(
        lots: Arc<L>,
        records: Arc<R>,
        evaluator: WestgardEvaluator,
        config: QcConfig,
    ) -> Self {
        Self {
            lots,
            records,
            evaluator: Arc::new(evaluator),
            config,
        }
    }

    /// Evaluate and persist a QC run.
    ///
    /// Returns `Ok(None)` without touching storage when no submitted value is numeric.
    pub fn submit(&self, submission: QcSubmission) -> Result<Option<QcRecord>, QcServiceError> {
        let control = submission.control_key();
        let filtered = filter_values(&submission.values);

        if !filtered.skipped.is_empty() {
            let skipped: Vec<&str> = filtered.skipped.iter().map(AnalyteCode::as_str).collect();
            warn!(
                equipment = %control.equipment.0,
                lot = %control.lot.0,
                skipped = ?skipped,
                "ignoring analytes without a numeric value"
            );
        }

        if filtered.is_empty() {
            debug!(equipment = %control.equipment.0, lot = %control.lot.0, "nothing to evaluate");
            return Ok(None);
        }

        let measured_at = submission.measured_at.unwrap_or_else(Utc::now);
        let history =
            self.history_by_analyte(&control, Some(measured_at), self.config.history_window)?;
        let mut baselines = HashMap::new();
        for (analyte, _) in &filtered.accepted {
            let baseline = self.lots.baseline(&control.series(analyte.clone()))?;
            if baseline.is_none() {
                debug!(analyte = %analyte, "no baseline configured; rules skipped");
            }
            baselines.insert(analyte.clone(), baseline);
        }

        let Some(evaluation) = evaluate_report(
            &self.evaluator,
            &filtered.accepted,
            |analyte| baselines.get(analyte).cloned().flatten(),
            |analyte| history.get(analyte).cloned().unwrap_or_default(),
        ) else {
            return Ok(None);
        };

        let record = QcRecord {
            id: next_record_id(),
            control,
            operator: submission
                .operator
                .map(|operator| operator.trim().to_string())
                .filter(|operator| !operator.is_empty()),
            measured_at,
            evaluation,
            skipped: filtered.skipped,
        };

        let stored = self.records.insert(record)?;
        info!(
            record = %stored.id,
            status = stored.evaluation.overall_status().label(),
            rules = stored.evaluation.all_triggered_rules().len(),
            "qc report recorded"
        );

        Ok(Some(stored))
    }

    /// Fetch a record and its review trail.
    pub fn get(&self, id: &QcRecordId) -> Result<QcRecordView, QcServiceError> {
        let record = self
            .records
            .fetch(id)?
            .ok_or(RepositoryError::NotFound)?;
        let reviews = self.records.reviews(id)?;

        Ok(QcRecordView {
            requires_review: record.evaluation.requires_review() && reviews.is_empty(),
            record,
            reviews,
        })
    }

    /// Record a reviewer's decision on a run. Each run is reviewed at most once.
    pub fn review(
        &self,
        id: &QcRecordId,
        request: ReviewRequest,
    ) -> Result<ReviewEntry, QcServiceError> {
        if self.records.fetch(id)?.is_none() {
            return Err(RepositoryError::NotFound.into());
        }
        if !self.records.reviews(id)?.is_empty() {
            return Err(ReviewError::AlreadyReviewed(id.clone()).into());
        }

        let entry = request.into_entry(id.clone(), Utc::now())?;
        let stored = match self.records.append_review(entry) {
            Ok(stored) => stored,
            Err(RepositoryError::Conflict) => {
                return Err(ReviewError::AlreadyReviewed(id.clone()).into())
            }
            Err(err) => return Err(err.into()),
        };
        info!(
            record = %stored.record_id,
            decision = stored.decision.label(),
            reviewer = %stored.reviewer,
            "qc report reviewed"
        );

        Ok(stored)
    }

    /// Flagged runs that nobody has reviewed yet, newest first.
    pub fn pending_review(&self, limit: usize) -> Result<Vec<QcRecord>, QcServiceError> {
        let mut pending = Vec::new();
        let mut window = limit;

        // Reviewed runs are filtered here, so widen the window until enough are found
        // or the repository runs out.
        loop {
            let flagged = self.records.flagged(window)?;
            let exhausted = flagged.len() < window;
            pending.clear();
            for record in flagged {
                if self.records.reviews(&record.id)?.is_empty() {
                    pending.push(record);
                    if pending.len() == limit {
                        return Ok(pending);
                    }
                }
            }
            if exhausted || limit == 0 {
                return Ok(pending);
            }
            window = window.saturating_mul(2);
        }
    }

    /// Statistics over the accepted history of one analyte.
    ///
    /// `window` caps the number of recent runs considered and defaults to the configured
    /// history window.
    pub fn series_statistics(
        &self,
        series: &SeriesKey,
        window: Option<usize>,
    ) -> Result<SeriesStatistics, QcServiceError> {
        let window = window.unwrap_or(self.config.history_window);
        let values = self
            .history_by_analyte(&series.control, None, window)?
            .remove(&series.analyte)
            .unwrap_or_default();
        let baseline = self.lots.baseline(series)?;

        Ok(SeriesStatistics {
            series: series.clone(),
            baseline,
            statistics: DescriptiveStatistics::from_values(&values),
            values,
        })
    }

    /// One bounded fetch for the control key, split per analyte, oldest value first.
    /// With `before` set only runs measured earlier count. Runs a reviewer rejected are
    /// not history.
    fn history_by_analyte(
        &self,
        control: &ControlKey,
        before: Option<DateTime<Utc>>,
        window: usize,
    ) -> Result<HashMap<AnalyteCode, Vec<f64>>, QcServiceError> {
        let mut recent = match before {
            Some(before) => self.records.recent_before(control, before, window)?,
            None => self.records.recent(control, window)?,
        };
        recent.reverse();
        recent.sort_by_key(|record| record.measured_at);

        let mut rejected = HashSet::new();
        for record in &recent {
            if !record.evaluation.requires_review() {
                continue;
            }
            let reviews = self.records.reviews(&record.id)?;
            if reviews
                .iter()
                .any(|entry| entry.decision == ReviewDecision::Rejected)
            {
                rejected.insert(record.id.clone());
            }
        }

        let mut history: HashMap<AnalyteCode, Vec<f64>> = HashMap::new();
        for record in recent.iter().filter(|record| !rejected.contains(&record.id)) {
            for result in record.evaluation.analytes() {
                history
                    .entry(result.analyte.clone())
                    .or_default()
                    .push(result.value);
            }
        }

        Ok(history)
    }
}

/// Error raised by the QC service.
#[derive(Debug, thiserror::Error)]
pub enum QcServiceError {
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Review(#[from] ReviewError),
}
