use crate::cli::ServeArgs;
use crate::infra::{load_lot_parameters, AppState, InMemoryQcRecords};
use crate::routes::with_qc_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use labqc::config::AppConfig;
use labqc::error::AppError;
use labqc::qc::QcService;
use labqc::telemetry;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::info;

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let lots = Arc::new(load_lot_parameters(args.lots.as_deref())?);
    if lots.is_empty() {
        info!("no lot sheet configured; every analyte evaluates ok until baselines exist");
    }
    let records = Arc::new(InMemoryQcRecords::default());
    let qc_service = Arc::new(QcService::new(lots, records, config.qc.clone()));

    let app = with_qc_routes(qc_service)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        history_window = config.qc.history_window,
        "laboratory qc service ready"
    );

    axum::serve(listener, app).await?;
    Ok(())
}
