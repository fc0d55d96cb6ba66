use super::common::*;
use axum::body::Body;
use axum::extract::State;
use axum::http::{header, Request, StatusCode};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

use crate::config::QcConfig;
use crate::qc::import::LotParameterTable;
use crate::qc::router::{qc_router, submit_handler};
use crate::qc::service::QcService;

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            serde_json::to_vec(&body).expect("body serializes"),
        ))
        .expect("request builds")
}

fn get_request(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).expect("request builds")
}

fn report_body(values: Value) -> Value {
    json!({
        "equipment": "AU480-01",
        "lot": "L-2291",
        "level": "2",
        "operator": "tech.alvarez",
        "values": values,
    })
}

#[tokio::test]
async fn evaluate_route_classifies_a_single_value() {
    let (service, _) = build_service();
    let router = qc_router(Arc::new(service));

    let response = router
        .oneshot(json_request(
            "POST",
            "/api/v1/qc/evaluate",
            json!({
                "value": 112,
                "history": [111],
                "baseline": { "mean": 100, "standard_deviation": 5 },
            }),
        ))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::OK);
    let payload = read_json_body(response).await;
    assert_eq!(payload["status"], json!("error"));
    assert_eq!(payload["triggered_rules"], json!(["1-2s", "2-2s"]));
}

#[tokio::test]
async fn evaluate_route_without_baseline_is_ok() {
    let (service, _) = build_service();
    let router = qc_router(Arc::new(service));

    let response = router
        .oneshot(json_request(
            "POST",
            "/api/v1/qc/evaluate",
            json!({ "value": 5000 }),
        ))
        .await
        .expect("route executes");

    let payload = read_json_body(response).await;
    assert_eq!(payload["status"], json!("ok"));
    assert_eq!(payload["triggered_rules"], json!([]));
}

#[tokio::test]
async fn submit_then_fetch_report() {
    let (service, _) = build_service();
    let router = qc_router(Arc::new(service));

    let response = router
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/v1/qc/reports",
            report_body(json!({ "GLU": 116, "UREA": "40" })),
        ))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::CREATED);
    let created = read_json_body(response).await;
    assert_eq!(created["evaluation"]["overall_status"], json!("error"));
    assert_eq!(
        created["evaluation"]["all_triggered_rules"],
        json!(["1-3s for GLU"])
    );
    let id = created["id"].as_str().expect("id present").to_string();

    let response = router
        .oneshot(get_request(&format!("/api/v1/qc/reports/{id}")))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::OK);
    let fetched = read_json_body(response).await;
    assert_eq!(fetched["id"], json!(id));
    assert_eq!(fetched["requires_review"], json!(true));
    assert_eq!(fetched["reviews"], json!([]));
}

#[tokio::test]
async fn submit_with_no_numeric_values_is_unprocessable() {
    let (service, records) = build_service();
    let response = submit_handler(
        State(Arc::new(service)),
        axum::Json(
            serde_json::from_value(report_body(json!({ "GLU": null, "UREA": "" })))
                .expect("submission parses"),
        ),
    )
    .await;

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert!(records.stored().is_empty());
}

#[tokio::test]
async fn submit_returns_internal_error_on_repository_failure() {
    let service = Arc::new(QcService::new(
        Arc::new(LotParameterTable::new()),
        Arc::new(UnavailableRecords),
        QcConfig::default(),
    ));

    let response = submit_handler(
        State(service),
        axum::Json(
            serde_json::from_value(report_body(json!({ "GLU": 100 })))
                .expect("submission parses"),
        ),
    )
    .await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn unknown_report_is_not_found() {
    let (service, _) = build_service();
    let router = qc_router(Arc::new(service));

    let response = router
        .oneshot(get_request("/api/v1/qc/reports/qc-does-not-exist"))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn review_route_records_once_then_conflicts() {
    let (service, _) = build_service();
    let service = Arc::new(service);
    let record = service
        .submit(submission(at(1, 8), json!({ "GLU": 120 })))
        .expect("run")
        .expect("report produced");
    let router = qc_router(service);
    let uri = format!("/api/v1/qc/reports/{}/review", record.id);

    let response = router
        .clone()
        .oneshot(json_request(
            "POST",
            &uri,
            json!({ "decision": "rejected", "reviewer": "dr.okafor" }),
        ))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let response = router
        .clone()
        .oneshot(json_request(
            "POST",
            &uri,
            json!({ "decision": "accepted", "reviewer": "dr.okafor", "note": "recalibrated" }),
        ))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::CREATED);
    let entry = read_json_body(response).await;
    assert_eq!(entry["decision"], json!("accepted"));
    assert_eq!(entry["record_id"], json!(record.id.0));

    let response = router
        .clone()
        .oneshot(json_request(
            "POST",
            &uri,
            json!({ "decision": "accepted", "reviewer": "dr.okafor" }),
        ))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let response = router
        .oneshot(get_request("/api/v1/qc/reviews/pending"))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(read_json_body(response).await, json!([]));
}

#[tokio::test]
async fn statistics_route_reports_series_values() {
    let (service, _) = build_service();
    let service = Arc::new(service);
    for (day, value) in [(1, 98.0), (2, 102.0)] {
        service
            .submit(submission(at(day, 8), json!({ "GLU": value })))
            .expect("run");
    }
    let router = qc_router(service);

    let response = router
        .clone()
        .oneshot(get_request(
            "/api/v1/qc/statistics?equipment=AU480-01&lot=L-2291&level=2&analyte=glu",
        ))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::OK);
    let payload = read_json_body(response).await;
    assert_eq!(payload["values"], json!([98.0, 102.0]));
    assert_eq!(payload["statistics"]["mean"], json!(100.0));
    assert_eq!(payload["baseline"]["unit"], json!("mg/dL"));

    let response = router
        .oneshot(get_request(
            "/api/v1/qc/statistics?equipment=AU480-01&lot=L-2291&level=9&analyte=glu",
        ))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
