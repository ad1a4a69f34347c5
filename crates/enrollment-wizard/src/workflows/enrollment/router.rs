use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, patch, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::controller::{EnrollmentHost, WizardError, WizardSnapshot};
use super::drafts::DraftStore;
use super::encoder::{FileSelection, FileSource};
use super::gate::UniquenessGate;
use super::service::{EnrollmentService, EnrollmentServiceError, SessionId};

pub const FILE_NAME_HEADER: &str = "x-file-name";

#[derive(Debug, Deserialize)]
pub(crate) struct FieldEdit {
    pub(crate) field: String,
    pub(crate) value: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CategorySelection {
    pub(crate) label: String,
}

#[derive(Debug, Serialize)]
struct SessionView<T: Serialize> {
    session_id: SessionId,
    #[serde(flatten)]
    outcome: Option<T>,
    snapshot: WizardSnapshot,
}

fn view<T: Serialize>(id: SessionId, outcome: Option<T>, snapshot: WizardSnapshot) -> Response {
    let body = SessionView {
        session_id: id,
        outcome,
        snapshot: snapshot.redacted(),
    };
    (StatusCode::OK, Json(body)).into_response()
}

/// Router builder exposing wizard sessions over HTTP.
pub fn enrollment_router<S, G, H>(service: Arc<EnrollmentService<S, G, H>>) -> Router
where
    S: DraftStore + 'static,
    G: UniquenessGate + 'static,
    H: EnrollmentHost + 'static,
{
    Router::new()
        .route(
            "/api/v1/enrollment/sessions",
            post(start_handler::<S, G, H>),
        )
        .route(
            "/api/v1/enrollment/sessions/:session_id",
            get(snapshot_handler::<S, G, H>),
        )
        .route(
            "/api/v1/enrollment/sessions/:session_id/fields",
            patch(field_handler::<S, G, H>),
        )
        .route(
            "/api/v1/enrollment/sessions/:session_id/category",
            post(category_handler::<S, G, H>),
        )
        .route(
            "/api/v1/enrollment/sessions/:session_id/image",
            post(image_handler::<S, G, H>),
        )
        .route(
            "/api/v1/enrollment/sessions/:session_id/advance",
            post(advance_handler::<S, G, H>),
        )
        .route(
            "/api/v1/enrollment/sessions/:session_id/retreat",
            post(retreat_handler::<S, G, H>),
        )
        .route(
            "/api/v1/enrollment/sessions/:session_id/save",
            post(save_handler::<S, G, H>),
        )
        .route(
            "/api/v1/enrollment/sessions/:session_id/submit",
            post(submit_handler::<S, G, H>),
        )
        .route(
            "/api/v1/enrollment/sessions/:session_id/notification",
            delete(dismiss_handler::<S, G, H>),
        )
        .route(
            "/api/v1/enrollment/gov-id-options",
            get(options_handler::<S, G, H>),
        )
        .with_state(service)
}

type Service<S, G, H> = State<Arc<EnrollmentService<S, G, H>>>;

pub(crate) async fn start_handler<S, G, H>(State(service): Service<S, G, H>) -> Response
where
    S: DraftStore + 'static,
    G: UniquenessGate + 'static,
    H: EnrollmentHost + 'static,
{
    let (id, snapshot) = service.start();
    let body = SessionView::<()> {
        session_id: id,
        outcome: None,
        snapshot: snapshot.redacted(),
    };
    (StatusCode::CREATED, Json(body)).into_response()
}

pub(crate) async fn snapshot_handler<S, G, H>(
    State(service): Service<S, G, H>,
    Path(session_id): Path<String>,
) -> Response
where
    S: DraftStore + 'static,
    G: UniquenessGate + 'static,
    H: EnrollmentHost + 'static,
{
    let id = SessionId(session_id);
    match service.snapshot(&id) {
        Ok(snapshot) => view::<()>(id, None, snapshot),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn field_handler<S, G, H>(
    State(service): Service<S, G, H>,
    Path(session_id): Path<String>,
    Json(edit): Json<FieldEdit>,
) -> Response
where
    S: DraftStore + 'static,
    G: UniquenessGate + 'static,
    H: EnrollmentHost + 'static,
{
    let id = SessionId(session_id);
    match service.edit_field(&id, &edit.field, &edit.value) {
        Ok(snapshot) => view::<()>(id, None, snapshot),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn category_handler<S, G, H>(
    State(service): Service<S, G, H>,
    Path(session_id): Path<String>,
    Json(selection): Json<CategorySelection>,
) -> Response
where
    S: DraftStore + 'static,
    G: UniquenessGate + 'static,
    H: EnrollmentHost + 'static,
{
    let id = SessionId(session_id);
    match service.select_category(&id, &selection.label) {
        Ok(snapshot) => view::<()>(id, None, snapshot),
        Err(err) => error_response(err),
    }
}

/// Body is the raw file; the name travels in `x-file-name`. An empty body is
/// an empty selection.
pub(crate) async fn image_handler<S, G, H>(
    State(service): Service<S, G, H>,
    Path(session_id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response
where
    S: DraftStore + 'static,
    G: UniquenessGate + 'static,
    H: EnrollmentHost + 'static,
{
    let id = SessionId(session_id);
    let selection = if body.is_empty() {
        FileSelection::default()
    } else {
        let name = headers
            .get(FILE_NAME_HEADER)
            .and_then(|value| value.to_str().ok())
            .unwrap_or("upload")
            .to_string();
        FileSelection::single(FileSource::Bytes {
            name,
            content: body.to_vec(),
        })
    };

    match service.attach_image(&id, selection).await {
        Ok((outcome, snapshot)) => view(id, Some(outcome), snapshot),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn advance_handler<S, G, H>(
    State(service): Service<S, G, H>,
    Path(session_id): Path<String>,
) -> Response
where
    S: DraftStore + 'static,
    G: UniquenessGate + 'static,
    H: EnrollmentHost + 'static,
{
    let id = SessionId(session_id);
    match service.advance(&id).await {
        Ok((outcome, snapshot)) => view(id, Some(outcome), snapshot),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn retreat_handler<S, G, H>(
    State(service): Service<S, G, H>,
    Path(session_id): Path<String>,
) -> Response
where
    S: DraftStore + 'static,
    G: UniquenessGate + 'static,
    H: EnrollmentHost + 'static,
{
    let id = SessionId(session_id);
    match service.retreat(&id) {
        Ok(snapshot) => view::<()>(id, None, snapshot),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn save_handler<S, G, H>(
    State(service): Service<S, G, H>,
    Path(session_id): Path<String>,
) -> Response
where
    S: DraftStore + 'static,
    G: UniquenessGate + 'static,
    H: EnrollmentHost + 'static,
{
    let id = SessionId(session_id);
    match service.save_and_close(&id) {
        Ok((outcome, snapshot)) => view(id, Some(outcome), snapshot),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn submit_handler<S, G, H>(
    State(service): Service<S, G, H>,
    Path(session_id): Path<String>,
) -> Response
where
    S: DraftStore + 'static,
    G: UniquenessGate + 'static,
    H: EnrollmentHost + 'static,
{
    let id = SessionId(session_id);
    match service.submit(&id) {
        Ok(snapshot) => view::<()>(id, None, snapshot),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn dismiss_handler<S, G, H>(
    State(service): Service<S, G, H>,
    Path(session_id): Path<String>,
) -> Response
where
    S: DraftStore + 'static,
    G: UniquenessGate + 'static,
    H: EnrollmentHost + 'static,
{
    let id = SessionId(session_id);
    match service.dismiss_notification(&id) {
        Ok(snapshot) => view::<()>(id, None, snapshot),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn options_handler<S, G, H>(State(service): Service<S, G, H>) -> Response
where
    S: DraftStore + 'static,
    G: UniquenessGate + 'static,
    H: EnrollmentHost + 'static,
{
    let payload = json!({ "options": service.gov_id_options() });
    (StatusCode::OK, Json(payload)).into_response()
}

fn error_response(err: EnrollmentServiceError) -> Response {
    let status = match &err {
        EnrollmentServiceError::UnknownSession { .. } => StatusCode::NOT_FOUND,
        EnrollmentServiceError::UnknownCategory { .. }
        | EnrollmentServiceError::Field(_)
        | EnrollmentServiceError::Wizard(WizardError::Field(_)) => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        EnrollmentServiceError::Wizard(WizardError::SessionFinished { .. }) => StatusCode::GONE,
        EnrollmentServiceError::Wizard(
            WizardError::StepIncomplete { .. }
            | WizardError::GateCheckPending
            | WizardError::NotAtFinalStep { .. },
        ) => StatusCode::CONFLICT,
    };
    let payload = json!({ "error": err.to_string() });
    (status, Json(payload)).into_response()
}
