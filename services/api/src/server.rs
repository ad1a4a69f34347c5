use crate::cli::ServeArgs;
use crate::infra::{AppState, GateBackend, StudentRegistry};
use crate::routes::with_enrollment_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use enrollment_wizard::config::AppConfig;
use enrollment_wizard::error::AppError;
use enrollment_wizard::telemetry;
use enrollment_wizard::workflows::enrollment::{
    EnrollmentService, FileDraftStore, HttpUniquenessGate, WizardSettings,
};
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

    let wizard = &config.wizard;
    let registry = Arc::new(StudentRegistry::default());
    let gate = match &wizard.gate_url {
        Some(url) => {
            info!(%url, "checking email uniqueness against remote registry");
            GateBackend::Http(HttpUniquenessGate::new(url.clone(), wizard.gate_timeout)?)
        }
        None => GateBackend::Registry(Arc::clone(&registry)),
    };
    tokio::fs::create_dir_all(&wizard.draft_dir).await?;
    let store = Arc::new(FileDraftStore::new(wizard.draft_dir.clone()));

    let enrollment_service = Arc::new(EnrollmentService::new(
        store,
        Arc::new(gate),
        Arc::clone(&registry),
        WizardSettings::from(wizard),
        wizard.gov_id_options.clone(),
    ));

    let app = with_enrollment_routes(enrollment_service)
        .layer(Extension(registry))
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, draft_dir = %config.wizard.draft_dir.display(), "enrollment wizard ready");

    axum::serve(listener, app).await?;
    Ok(())
}
