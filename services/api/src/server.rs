use crate::cli::ServeArgs;
use crate::infra::{engine_settings, AppState, InMemoryDossierRepository, InMemoryEventOutbox};
use crate::routes::with_engine_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use dossier_engine::config::AppConfig;
use dossier_engine::error::AppError;
use dossier_engine::telemetry;
use dossier_engine::workflows::dossier::{DossierOrchestrator, StandardTemplateRegistry};
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

    let repository = Arc::new(InMemoryDossierRepository::default());
    let outbox = Arc::new(InMemoryEventOutbox::default());
    let orchestrator = Arc::new(DossierOrchestrator::new(
        repository,
        outbox,
        Arc::new(StandardTemplateRegistry::new()),
        engine_settings(&config.engine),
    ));

    let app = with_engine_routes(orchestrator)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "dossier workflow engine ready");

    axum::serve(listener, app).await?;
    Ok(())
}
