use chrono::{DateTime, Utc};
use labqc::error::AppError;
use labqc::qc::{
    ControlKey, LotParameterTable, QcRecord, QcRecordId, QcRecordRepository, RepositoryError,
    ReviewEntry,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};
use tracing::info;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Process-local record store. Records are kept in insertion order; each record holds at
/// most one review.
#[derive(Default, Clone)]
pub(crate) struct InMemoryQcRecords {
    records: Arc<Mutex<Vec<QcRecord>>>,
    reviews: Arc<Mutex<HashMap<QcRecordId, Vec<ReviewEntry>>>>,
}

fn newest_first(records: &mut [QcRecord]) {
    records.sort_by(|a, b| b.measured_at.cmp(&a.measured_at));
}

impl InMemoryQcRecords {
    fn select(
        &self,
        control: &ControlKey,
        before: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Vec<QcRecord> {
        let guard = self.records.lock().expect("record mutex poisoned");
        let mut matching: Vec<QcRecord> = guard
            .iter()
            .filter(|record| &record.control == control)
            .filter(|record| before.map_or(true, |before| record.measured_at < before))
            .cloned()
            .collect();
        newest_first(&mut matching);
        matching.truncate(limit);
        matching
    }
}

impl QcRecordRepository for InMemoryQcRecords {
    fn insert(&self, record: QcRecord) -> Result<QcRecord, RepositoryError> {
        let mut guard = self.records.lock().expect("record mutex poisoned");
        if guard.iter().any(|stored| stored.id == record.id) {
            return Err(RepositoryError::Conflict);
        }
        guard.push(record.clone());
        Ok(record)
    }

    fn fetch(&self, id: &QcRecordId) -> Result<Option<QcRecord>, RepositoryError> {
        let guard = self.records.lock().expect("record mutex poisoned");
        Ok(guard.iter().find(|record| &record.id == id).cloned())
    }

    fn recent(&self, control: &ControlKey, limit: usize) -> Result<Vec<QcRecord>, RepositoryError> {
        Ok(self.select(control, None, limit))
    }

    fn recent_before(
        &self,
        control: &ControlKey,
        before: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<QcRecord>, RepositoryError> {
        Ok(self.select(control, Some(before), limit))
    }

    fn flagged(&self, limit: usize) -> Result<Vec<QcRecord>, RepositoryError> {
        let guard = self.records.lock().expect("record mutex poisoned");
        let mut flagged: Vec<QcRecord> = guard
            .iter()
            .filter(|record| record.evaluation.requires_review())
            .cloned()
            .collect();
        newest_first(&mut flagged);
        flagged.truncate(limit);
        Ok(flagged)
    }

    fn append_review(&self, entry: ReviewEntry) -> Result<ReviewEntry, RepositoryError> {
        if self.fetch(&entry.record_id)?.is_none() {
            return Err(RepositoryError::NotFound);
        }
        let mut guard = self.reviews.lock().expect("review mutex poisoned");
        let stored = guard.entry(entry.record_id.clone()).or_default();
        if !stored.is_empty() {
            return Err(RepositoryError::Conflict);
        }
        stored.push(entry.clone());
        Ok(entry)
    }

    fn reviews(&self, id: &QcRecordId) -> Result<Vec<ReviewEntry>, RepositoryError> {
        let guard = self.reviews.lock().expect("review mutex poisoned");
        Ok(guard.get(id).cloned().unwrap_or_default())
    }
}

/// Load the lot sheet when one is configured; without one every analyte evaluates `ok`.
pub(crate) fn load_lot_parameters(path: Option<&Path>) -> Result<LotParameterTable, AppError> {
    match path {
        Some(path) => {
            let table = LotParameterTable::from_path(path)?;
            info!(path = %path.display(), baselines = table.len(), "lot parameters loaded");
            Ok(table)
        }
        None => Ok(LotParameterTable::new()),
    }
}

pub(crate) fn parse_measurement_arg(raw: &str) -> Result<f64, String> {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
        .ok_or_else(|| format!("'{raw}' is not a finite number"))
}
