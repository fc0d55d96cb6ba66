use std::sync::{Arc, Barrier, Mutex};

use axum::response::Response;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::{Map, Value};

use crate::config::QcConfig;
use crate::qc::domain::{
    AnalyteCode, ControlKey, ControlLevel, EquipmentId, LotNumber, QcSubmission,
    StatisticalBaseline,
};
use crate::qc::import::LotParameterTable;
use crate::qc::repository::{QcRecord, QcRecordId, QcRecordRepository, RepositoryError};
use crate::qc::review::ReviewEntry;
use crate::qc::service::QcService;

pub(super) fn control() -> ControlKey {
    ControlKey {
        equipment: EquipmentId("AU480-01".to_string()),
        lot: LotNumber("L-2291".to_string()),
        level: ControlLevel::Normal,
    }
}

pub(super) fn other_lot() -> ControlKey {
    ControlKey {
        lot: LotNumber("L-3310".to_string()),
        ..control()
    }
}

/// GLU μ=100 σ=5, UREA μ=40 σ=2, K has no dispersion configured.
pub(super) fn lots() -> LotParameterTable {
    let mut table = LotParameterTable::new();
    for key in [control(), other_lot()] {
        table.insert(
            key.series(AnalyteCode::new("GLU")),
            StatisticalBaseline {
                mean: 100.0,
                standard_deviation: 5.0,
                unit: Some("mg/dL".to_string()),
            },
        );
        table.insert(
            key.series(AnalyteCode::new("UREA")),
            StatisticalBaseline::new(40.0, 2.0),
        );
        table.insert(
            key.series(AnalyteCode::new("K")),
            StatisticalBaseline::new(4.2, 0.0),
        );
    }
    table
}

pub(super) fn at(day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, day, hour, 0, 0)
        .single()
        .expect("valid timestamp")
}

pub(super) fn values(raw: Value) -> Map<String, Value> {
    match raw {
        Value::Object(map) => map,
        other => panic!("expected object, got {other}"),
    }
}

pub(super) fn submission_for(
    key: ControlKey,
    measured_at: DateTime<Utc>,
    raw: Value,
) -> QcSubmission {
    QcSubmission {
        equipment: key.equipment,
        lot: key.lot,
        level: key.level,
        operator: Some("tech.alvarez".to_string()),
        measured_at: Some(measured_at),
        values: values(raw),
    }
}

pub(super) fn submission(measured_at: DateTime<Utc>, raw: Value) -> QcSubmission {
    submission_for(control(), measured_at, raw)
}

pub(super) fn build_service() -> (
    QcService<LotParameterTable, MemoryRecords>,
    Arc<MemoryRecords>,
) {
    build_service_with(MemoryRecords::default(), QcConfig::default())
}

pub(super) fn build_service_with(
    records: MemoryRecords,
    config: QcConfig,
) -> (
    QcService<LotParameterTable, MemoryRecords>,
    Arc<MemoryRecords>,
) {
    let records = Arc::new(records);
    let service = QcService::new(Arc::new(lots()), records.clone(), config);
    (service, records)
}

#[derive(Default, Clone)]
pub(super) struct MemoryRecords {
    records: Arc<Mutex<Vec<QcRecord>>>,
    reviews: Arc<Mutex<Vec<ReviewEntry>>>,
    /// Return `recent` in id order instead of newest first.
    unordered_recent: bool,
    /// When set, the next `reviews` callers wait for each other before reading.
    review_gate: Arc<Mutex<Option<Arc<Barrier>>>>,
}

impl MemoryRecords {
    pub(super) fn unordered() -> Self {
        Self {
            unordered_recent: true,
            ..Self::default()
        }
    }

    pub(super) fn stored(&self) -> Vec<QcRecord> {
        self.records.lock().expect("records mutex poisoned").clone()
    }

    /// Make the next `parties` review lookups rendezvous, so each sees the state
    /// before any of them writes.
    pub(super) fn hold_reviews_for(&self, parties: usize) {
        *self.review_gate.lock().expect("gate mutex poisoned") =
            Some(Arc::new(Barrier::new(parties)));
    }

    fn select(
        &self,
        control: &ControlKey,
        before: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Vec<QcRecord> {
        let guard = self.records.lock().expect("records mutex poisoned");
        let mut matching: Vec<QcRecord> = guard
            .iter()
            .filter(|record| &record.control == control)
            .filter(|record| before.map_or(true, |before| record.measured_at < before))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.measured_at.cmp(&a.measured_at));
        matching.truncate(limit);
        if self.unordered_recent {
            matching.sort_by(|a, b| a.id.cmp(&b.id));
        }
        matching
    }
}

impl QcRecordRepository for MemoryRecords {
    fn insert(&self, record: QcRecord) -> Result<QcRecord, RepositoryError> {
        let mut guard = self.records.lock().expect("records mutex poisoned");
        if guard.iter().any(|stored| stored.id == record.id) {
            return Err(RepositoryError::Conflict);
        }
        guard.push(record.clone());
        Ok(record)
    }

    fn fetch(&self, id: &QcRecordId) -> Result<Option<QcRecord>, RepositoryError> {
        let guard = self.records.lock().expect("records mutex poisoned");
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
        let guard = self.records.lock().expect("records mutex poisoned");
        let mut flagged: Vec<QcRecord> = guard
            .iter()
            .filter(|record| record.evaluation.requires_review())
            .cloned()
            .collect();
        flagged.sort_by(|a, b| b.measured_at.cmp(&a.measured_at));
        flagged.truncate(limit);
        Ok(flagged)
    }

    fn append_review(&self, entry: ReviewEntry) -> Result<ReviewEntry, RepositoryError> {
        let mut guard = self.reviews.lock().expect("reviews mutex poisoned");
        if guard.iter().any(|stored| stored.record_id == entry.record_id) {
            return Err(RepositoryError::Conflict);
        }
        guard.push(entry.clone());
        Ok(entry)
    }

    fn reviews(&self, id: &QcRecordId) -> Result<Vec<ReviewEntry>, RepositoryError> {
        let gate = self.review_gate.lock().expect("gate mutex poisoned").clone();
        if let Some(gate) = gate {
            gate.wait();
            *self.review_gate.lock().expect("gate mutex poisoned") = None;
        }
        let guard = self.reviews.lock().expect("reviews mutex poisoned");
        Ok(guard
            .iter()
            .filter(|entry| &entry.record_id == id)
            .cloned()
            .collect())
    }
}

pub(super) struct UnavailableRecords;

impl QcRecordRepository for UnavailableRecords {
    fn insert(&self, _record: QcRecord) -> Result<QcRecord, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn fetch(&self, _id: &QcRecordId) -> Result<Option<QcRecord>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn recent(
        &self,
        _control: &ControlKey,
        _limit: usize,
    ) -> Result<Vec<QcRecord>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn recent_before(
        &self,
        _control: &ControlKey,
        _before: DateTime<Utc>,
        _limit: usize,
    ) -> Result<Vec<QcRecord>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn flagged(&self, _limit: usize) -> Result<Vec<QcRecord>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn append_review(&self, _entry: ReviewEntry) -> Result<ReviewEntry, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn reviews(&self, _id: &QcRecordId) -> Result<Vec<ReviewEntry>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body readable");
    serde_json::from_slice(&bytes).expect("valid json")
}
