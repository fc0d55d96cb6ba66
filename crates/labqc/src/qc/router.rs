use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;

use super::domain::{
    AnalyteCode, ControlKey, ControlLevel, EquipmentId, LotNumber, QcSubmission,
    StatisticalBaseline,
};
use super::repository::{LotParameterStore, QcRecordId, QcRecordRepository, RepositoryError};
use super::review::{ReviewError, ReviewRequest};
use super::service::{QcService, QcServiceError};
use super::westgard::evaluate_measurement;

const DEFAULT_PENDING_LIMIT: usize = 50;

/// Router builder exposing HTTP endpoints for QC evaluation, reports and review.
pub fn qc_router<L, R>(service: Arc<QcService<L, R>>) -> Router
where
    L: LotParameterStore + 'static,
    R: QcRecordRepository + 'static,
{
    Router::new()
        .route("/api/v1/qc/evaluate", post(evaluate_handler))
        .route("/api/v1/qc/reports", post(submit_handler::<L, R>))
        .route("/api/v1/qc/reports/:record_id", get(record_handler::<L, R>))
        .route(
            "/api/v1/qc/reports/:record_id/review",
            post(review_handler::<L, R>),
        )
        .route("/api/v1/qc/reviews/pending", get(pending_handler::<L, R>))
        .route("/api/v1/qc/statistics", get(statistics_handler::<L, R>))
        .with_state(service)
}

/// Stateless evaluation of one value; `history` is oldest first.
#[derive(Debug, Deserialize)]
pub(crate) struct EvaluateRequest {
    pub(crate) value: f64,
    #[serde(default)]
    pub(crate) history: Vec<f64>,
    #[serde(default)]
    pub(crate) baseline: Option<StatisticalBaseline>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct PendingQuery {
    pub(crate) limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct StatisticsQuery {
    pub(crate) equipment: String,
    pub(crate) lot: String,
    pub(crate) level: String,
    pub(crate) analyte: String,
    pub(crate) window: Option<usize>,
}

pub(crate) async fn evaluate_handler(Json(request): Json<EvaluateRequest>) -> Response {
    let evaluation =
        evaluate_measurement(request.value, &request.history, request.baseline.as_ref());
    (StatusCode::OK, Json(evaluation)).into_response()
}

pub(crate) async fn submit_handler<L, R>(
    State(service): State<Arc<QcService<L, R>>>,
    Json(submission): Json<QcSubmission>,
) -> Response
where
    L: LotParameterStore + 'static,
    R: QcRecordRepository + 'static,
{
    match service.submit(submission) {
        Ok(Some(record)) => (StatusCode::CREATED, Json(record)).into_response(),
        Ok(None) => {
            let payload = json!({
                "error": "nothing to evaluate: no analyte carried a numeric value",
            });
            (StatusCode::UNPROCESSABLE_ENTITY, Json(payload)).into_response()
        }
        Err(err) => service_error_response(err),
    }
}

pub(crate) async fn record_handler<L, R>(
    State(service): State<Arc<QcService<L, R>>>,
    Path(record_id): Path<String>,
) -> Response
where
    L: LotParameterStore + 'static,
    R: QcRecordRepository + 'static,
{
    match service.get(&QcRecordId(record_id)) {
        Ok(view) => (StatusCode::OK, Json(view)).into_response(),
        Err(err) => service_error_response(err),
    }
}

pub(crate) async fn review_handler<L, R>(
    State(service): State<Arc<QcService<L, R>>>,
    Path(record_id): Path<String>,
    Json(request): Json<ReviewRequest>,
) -> Response
where
    L: LotParameterStore + 'static,
    R: QcRecordRepository + 'static,
{
    match service.review(&QcRecordId(record_id), request) {
        Ok(entry) => (StatusCode::CREATED, Json(entry)).into_response(),
        Err(err) => service_error_response(err),
    }
}

pub(crate) async fn pending_handler<L, R>(
    State(service): State<Arc<QcService<L, R>>>,
    Query(query): Query<PendingQuery>,
) -> Response
where
    L: LotParameterStore + 'static,
    R: QcRecordRepository + 'static,
{
    let limit = query.limit.unwrap_or(DEFAULT_PENDING_LIMIT);
    match service.pending_review(limit) {
        Ok(records) => (StatusCode::OK, Json(records)).into_response(),
        Err(err) => service_error_response(err),
    }
}

pub(crate) async fn statistics_handler<L, R>(
    State(service): State<Arc<QcService<L, R>>>,
    Query(query): Query<StatisticsQuery>,
) -> Response
where
    L: LotParameterStore + 'static,
    R: QcRecordRepository + 'static,
{
    let Some(level) = ControlLevel::parse(&query.level) else {
        let payload = json!({
            "error": format!("unknown control level '{}'", query.level),
        });
        return (StatusCode::BAD_REQUEST, Json(payload)).into_response();
    };

    let series = ControlKey {
        equipment: EquipmentId(query.equipment),
        lot: LotNumber(query.lot),
        level,
    }
    .series(AnalyteCode::new(&query.analyte));

    match service.series_statistics(&series, query.window) {
        Ok(statistics) => (StatusCode::OK, Json(statistics)).into_response(),
        Err(err) => service_error_response(err),
    }
}

fn service_error_response(err: QcServiceError) -> Response {
    let status = match &err {
        QcServiceError::Repository(RepositoryError::NotFound) => StatusCode::NOT_FOUND,
        QcServiceError::Repository(RepositoryError::Conflict)
        | QcServiceError::Review(ReviewError::AlreadyReviewed(_)) => StatusCode::CONFLICT,
        QcServiceError::Review(_) => StatusCode::UNPROCESSABLE_ENTITY,
        QcServiceError::Repository(RepositoryError::Unavailable(_)) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };

    let payload = json!({
        "error": err.to_string(),
    });
    (status, Json(payload)).into_response()
}
