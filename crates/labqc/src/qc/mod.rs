//! Laboratory quality control: Westgard evaluation of control runs, report tracking and
//! reviewer validation.

pub mod domain;
pub mod import;
pub mod report;
pub mod repository;
pub mod review;
pub mod router;
pub mod service;
pub mod statistics;
pub mod westgard;

#[cfg(test)]
mod tests;

pub use domain::{
    parse_measurement, AnalyteCode, ControlKey, ControlLevel, EquipmentId, LotNumber,
    MeasurementStatus, QcSubmission, SeriesKey, StatisticalBaseline,
};
pub use import::{read_runs, read_runs_from_path, ImportError, LotParameterTable};
pub use report::{
    evaluate_report, filter_values, AnalyteEvaluation, FilteredValues, ReportEvaluation,
};
pub use repository::{
    LotParameterStore, QcRecord, QcRecordId, QcRecordRepository, RepositoryError,
};
pub use review::{ReviewDecision, ReviewEntry, ReviewError, ReviewRequest};
pub use router::qc_router;
pub use service::{QcRecordView, QcService, QcServiceError, SeriesStatistics};
pub use statistics::DescriptiveStatistics;
pub use westgard::{evaluate_measurement, MeasurementEvaluation, RuleId, WestgardEvaluator};
