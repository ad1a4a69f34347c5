use crate::infra::{AppState, StudentRegistry};
use axum::extract::Query;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Extension;
use axum::Json;
use enrollment_wizard::workflows::enrollment::{
    enrollment_router, DraftStore, EnrollmentHost, EnrollmentService, ExistsResponse,
    UniquenessGate, EXISTS_PATH,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
pub(crate) struct ExistsQuery {
    #[serde(default)]
    pub(crate) email: String,
}

pub(crate) fn with_enrollment_routes<S, G, H>(
    service: Arc<EnrollmentService<S, G, H>>,
) -> axum::Router
where
    S: DraftStore + 'static,
    G: UniquenessGate + 'static,
    H: EnrollmentHost + 'static,
{
    enrollment_router(service)
        .route("/health", axum::routing::get(healthcheck))
        .route("/ready", axum::routing::get(readiness_endpoint))
        .route("/metrics", axum::routing::get(metrics_endpoint))
        .route(EXISTS_PATH, axum::routing::get(student_exists_endpoint))
}

pub(crate) async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub(crate) async fn readiness_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(std::sync::atomic::Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

pub(crate) async fn metrics_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

/// Registry lookup used by wizards that point their gate at this service.
pub(crate) async fn student_exists_endpoint(
    Extension(registry): Extension<Arc<StudentRegistry>>,
    Query(query): Query<ExistsQuery>,
) -> Json<ExistsResponse> {
    Json(ExistsResponse {
        exists: registry.contains_email(&query.email),
    })
}
