use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{AnalyteCode, ControlKey, SeriesKey, StatisticalBaseline};
use super::report::ReportEvaluation;
use super::review::ReviewEntry;

/// Identifier generated for each persisted QC report.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct QcRecordId(pub String);

impl fmt::Display for QcRecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Immutable record of an evaluated QC run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QcRecord {
    pub id: QcRecordId,
    pub control: ControlKey,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operator: Option<String>,
    pub measured_at: DateTime<Utc>,
    pub evaluation: ReportEvaluation,
    /// Analytes submitted without a usable numeric value.
    pub skipped: Vec<AnalyteCode>,
}

impl QcRecord {
    pub fn value_for(&self, analyte: &AnalyteCode) -> Option<f64> {
        self.evaluation
            .analytes()
            .iter()
            .find(|result| &result.analyte == analyte)
            .map(|result| result.value)
    }
}

/// Source of configured lot baselines.
pub trait LotParameterStore: Send + Sync {
    fn baseline(&self, series: &SeriesKey) -> Result<Option<StatisticalBaseline>, RepositoryError>;
}

/// Append-only storage for QC records and their review decisions.
pub trait QcRecordRepository: Send + Sync {
    /// Persist a new record; fails with `Conflict` if the id is taken.
    fn insert(&self, record: QcRecord) -> Result<QcRecord, RepositoryError>;
    fn fetch(&self, id: &QcRecordId) -> Result<Option<QcRecord>, RepositoryError>;
    /// Up to `limit` records for the control key, newest first.
    fn recent(&self, control: &ControlKey, limit: usize) -> Result<Vec<QcRecord>, RepositoryError>;
    /// Like `recent`, restricted to records measured strictly before `before`.
    fn recent_before(
        &self,
        control: &ControlKey,
        before: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<QcRecord>, RepositoryError>;
    /// Up to `limit` records whose overall status is not `ok`, newest first.
    fn flagged(&self, limit: usize) -> Result<Vec<QcRecord>, RepositoryError>;
    /// Store the review of a record. A record takes a single review: a second entry for
    /// the same record fails with `Conflict`, checked atomically with the write.
    fn append_review(&self, entry: ReviewEntry) -> Result<ReviewEntry, RepositoryError>;
    fn reviews(&self, id: &QcRecordId) -> Result<Vec<ReviewEntry>, RepositoryError>;
}

/// Error enumeration for repository failures.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}
