use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;

use super::domain::{ActorRef, DossierError, DossierId, StepId, StepStatus};
use super::events::EventSink;
use super::quote::QuoteProposal;
use super::repository::DossierRepository;
use super::service::{DossierOrchestrator, NewDossier, OrchestratorError};
use super::settlement::AuditInput;

/// Router builder exposing the orchestrator operations over HTTP. The actor
/// arrives pre-resolved in the request body; authorization proper is the
/// caller's concern.
pub fn dossier_router<R, E>(service: Arc<DossierOrchestrator<R, E>>) -> Router
where
    R: DossierRepository + 'static,
    E: EventSink + 'static,
{
    Router::new()
        .route("/api/v1/dossiers", post(register_handler::<R, E>))
        .route("/api/v1/dossiers/:id", get(snapshot_handler::<R, E>))
        .route(
            "/api/v1/dossiers/:id/assign-expert",
            post(assign_expert_handler::<R, E>),
        )
        .route("/api/v1/dossiers/:id/start", post(start_work_handler::<R, E>))
        .route(
            "/api/v1/dossiers/:id/steps/:step_id",
            post(step_update_handler::<R, E>),
        )
        .route(
            "/api/v1/dossiers/:id/quote/propose",
            post(quote_propose_handler::<R, E>),
        )
        .route(
            "/api/v1/dossiers/:id/quote/accept",
            post(quote_accept_handler::<R, E>),
        )
        .route(
            "/api/v1/dossiers/:id/quote/reject",
            post(quote_reject_handler::<R, E>),
        )
        .route(
            "/api/v1/dossiers/:id/quote/request-info",
            post(quote_request_info_handler::<R, E>),
        )
        .route(
            "/api/v1/dossiers/:id/quote/respond",
            post(quote_respond_handler::<R, E>),
        )
        .route("/api/v1/dossiers/:id/audit", post(audit_handler::<R, E>))
        .route("/api/v1/dossiers/:id/payment", post(payment_handler::<R, E>))
        .route("/api/v1/dossiers/:id/reject", post(reject_handler::<R, E>))
        .route(
            "/api/v1/reports/overdue-steps",
            get(overdue_handler::<R, E>),
        )
        .with_state(service)
}

fn error_response(err: OrchestratorError) -> Response {
    let status = match &err {
        OrchestratorError::Engine(engine) => match engine {
            DossierError::NotFound => StatusCode::NOT_FOUND,
            DossierError::ConcurrentModification => StatusCode::CONFLICT,
            DossierError::InvalidTransition { .. }
            | DossierError::OutOfOrder { .. }
            | DossierError::InvalidQuoteState { .. }
            | DossierError::AlreadyFinalized => StatusCode::CONFLICT,
            DossierError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        },
        OrchestratorError::Repository(_) | OrchestratorError::Outbox(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    let payload = json!({ "error": err.to_string() });
    (status, axum::Json(payload)).into_response()
}

fn respond<T: serde::Serialize>(
    result: Result<T, OrchestratorError>,
    success: StatusCode,
) -> Response {
    match result {
        Ok(body) => (success, axum::Json(body)).into_response(),
        Err(err) => error_response(err),
    }
}

#[derive(Debug, Deserialize)]
struct ActorEnvelope {
    actor: ActorRef,
    expected_updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct AssignExpertRequest {
    expert_id: String,
    #[serde(flatten)]
    envelope: ActorEnvelope,
}

#[derive(Debug, Deserialize)]
struct StepUpdateRequest {
    status: StepStatus,
    #[serde(flatten)]
    envelope: ActorEnvelope,
}

#[derive(Debug, Deserialize)]
struct QuoteProposeRequest {
    #[serde(flatten)]
    proposal: QuoteProposal,
    #[serde(flatten)]
    envelope: ActorEnvelope,
}

#[derive(Debug, Deserialize)]
struct CommentRequest {
    #[serde(default)]
    comment: Option<String>,
    #[serde(flatten)]
    envelope: ActorEnvelope,
}

#[derive(Debug, Deserialize)]
struct AuditRequest {
    #[serde(flatten)]
    input: AuditInput,
    #[serde(flatten)]
    envelope: ActorEnvelope,
}

#[derive(Debug, Deserialize)]
struct PaymentRequest {
    invoice_id: String,
    #[serde(flatten)]
    envelope: ActorEnvelope,
}

#[derive(Debug, Deserialize)]
struct RejectRequest {
    reason: String,
    #[serde(flatten)]
    envelope: ActorEnvelope,
}

pub(crate) async fn register_handler<R, E>(
    State(service): State<Arc<DossierOrchestrator<R, E>>>,
    axum::Json(new): axum::Json<NewDossier>,
) -> Response
where
    R: DossierRepository + 'static,
    E: EventSink + 'static,
{
    respond(
        service.register_eligible(new, Utc::now()),
        StatusCode::CREATED,
    )
}

pub(crate) async fn snapshot_handler<R, E>(
    State(service): State<Arc<DossierOrchestrator<R, E>>>,
    Path(id): Path<String>,
) -> Response
where
    R: DossierRepository + 'static,
    E: EventSink + 'static,
{
    respond(
        service.snapshot(&DossierId(id), Utc::now()),
        StatusCode::OK,
    )
}

pub(crate) async fn overdue_handler<R, E>(
    State(service): State<Arc<DossierOrchestrator<R, E>>>,
) -> Response
where
    R: DossierRepository + 'static,
    E: EventSink + 'static,
{
    respond(service.overdue_report(Utc::now()), StatusCode::OK)
}

pub(crate) async fn assign_expert_handler<R, E>(
    State(service): State<Arc<DossierOrchestrator<R, E>>>,
    Path(id): Path<String>,
    axum::Json(request): axum::Json<AssignExpertRequest>,
) -> Response
where
    R: DossierRepository + 'static,
    E: EventSink + 'static,
{
    respond(
        service.assign_expert(
            &DossierId(id),
            &request.expert_id,
            &request.envelope.actor,
            request.envelope.expected_updated_at,
            Utc::now(),
        ),
        StatusCode::OK,
    )
}

pub(crate) async fn start_work_handler<R, E>(
    State(service): State<Arc<DossierOrchestrator<R, E>>>,
    Path(id): Path<String>,
    axum::Json(request): axum::Json<ActorEnvelope>,
) -> Response
where
    R: DossierRepository + 'static,
    E: EventSink + 'static,
{
    respond(
        service.start_work(
            &DossierId(id),
            &request.actor,
            request.expected_updated_at,
            Utc::now(),
        ),
        StatusCode::OK,
    )
}

pub(crate) async fn step_update_handler<R, E>(
    State(service): State<Arc<DossierOrchestrator<R, E>>>,
    Path((id, step_id)): Path<(String, String)>,
    axum::Json(request): axum::Json<StepUpdateRequest>,
) -> Response
where
    R: DossierRepository + 'static,
    E: EventSink + 'static,
{
    respond(
        service.record_step_update(
            &DossierId(id),
            &StepId(step_id),
            request.status,
            &request.envelope.actor,
            request.envelope.expected_updated_at,
            Utc::now(),
        ),
        StatusCode::OK,
    )
}

pub(crate) async fn quote_propose_handler<R, E>(
    State(service): State<Arc<DossierOrchestrator<R, E>>>,
    Path(id): Path<String>,
    axum::Json(request): axum::Json<QuoteProposeRequest>,
) -> Response
where
    R: DossierRepository + 'static,
    E: EventSink + 'static,
{
    respond(
        service.propose_quote(
            &DossierId(id),
            request.proposal,
            &request.envelope.actor,
            request.envelope.expected_updated_at,
            Utc::now(),
        ),
        StatusCode::OK,
    )
}

pub(crate) async fn quote_accept_handler<R, E>(
    State(service): State<Arc<DossierOrchestrator<R, E>>>,
    Path(id): Path<String>,
    axum::Json(request): axum::Json<CommentRequest>,
) -> Response
where
    R: DossierRepository + 'static,
    E: EventSink + 'static,
{
    respond(
        service.accept_quote(
            &DossierId(id),
            request.comment.as_deref(),
            &request.envelope.actor,
            request.envelope.expected_updated_at,
            Utc::now(),
        ),
        StatusCode::OK,
    )
}

pub(crate) async fn quote_reject_handler<R, E>(
    State(service): State<Arc<DossierOrchestrator<R, E>>>,
    Path(id): Path<String>,
    axum::Json(request): axum::Json<CommentRequest>,
) -> Response
where
    R: DossierRepository + 'static,
    E: EventSink + 'static,
{
    respond(
        service.reject_quote(
            &DossierId(id),
            request.comment.as_deref().unwrap_or_default(),
            &request.envelope.actor,
            request.envelope.expected_updated_at,
            Utc::now(),
        ),
        StatusCode::OK,
    )
}

pub(crate) async fn quote_request_info_handler<R, E>(
    State(service): State<Arc<DossierOrchestrator<R, E>>>,
    Path(id): Path<String>,
    axum::Json(request): axum::Json<CommentRequest>,
) -> Response
where
    R: DossierRepository + 'static,
    E: EventSink + 'static,
{
    respond(
        service.request_quote_info(
            &DossierId(id),
            request.comment.as_deref().unwrap_or_default(),
            &request.envelope.actor,
            request.envelope.expected_updated_at,
            Utc::now(),
        ),
        StatusCode::OK,
    )
}

pub(crate) async fn quote_respond_handler<R, E>(
    State(service): State<Arc<DossierOrchestrator<R, E>>>,
    Path(id): Path<String>,
    axum::Json(request): axum::Json<CommentRequest>,
) -> Response
where
    R: DossierRepository + 'static,
    E: EventSink + 'static,
{
    respond(
        service.respond_quote_info(
            &DossierId(id),
            request.comment.as_deref().unwrap_or_default(),
            &request.envelope.actor,
            request.envelope.expected_updated_at,
            Utc::now(),
        ),
        StatusCode::OK,
    )
}

pub(crate) async fn audit_handler<R, E>(
    State(service): State<Arc<DossierOrchestrator<R, E>>>,
    Path(id): Path<String>,
    axum::Json(request): axum::Json<AuditRequest>,
) -> Response
where
    R: DossierRepository + 'static,
    E: EventSink + 'static,
{
    respond(
        service.finalize_audit(
            &DossierId(id),
            request.input,
            &request.envelope.actor,
            request.envelope.expected_updated_at,
            Utc::now(),
        ),
        StatusCode::OK,
    )
}

pub(crate) async fn payment_handler<R, E>(
    State(service): State<Arc<DossierOrchestrator<R, E>>>,
    Path(id): Path<String>,
    axum::Json(request): axum::Json<PaymentRequest>,
) -> Response
where
    R: DossierRepository + 'static,
    E: EventSink + 'static,
{
    respond(
        service.confirm_payment(
            &DossierId(id),
            &request.invoice_id,
            &request.envelope.actor,
            request.envelope.expected_updated_at,
            Utc::now(),
        ),
        StatusCode::OK,
    )
}

pub(crate) async fn reject_handler<R, E>(
    State(service): State<Arc<DossierOrchestrator<R, E>>>,
    Path(id): Path<String>,
    axum::Json(request): axum::Json<RejectRequest>,
) -> Response
where
    R: DossierRepository + 'static,
    E: EventSink + 'static,
{
    respond(
        service.reject_dossier(
            &DossierId(id),
            &request.reason,
            &request.envelope.actor,
            request.envelope.expected_updated_at,
            Utc::now(),
        ),
        StatusCode::OK,
    )
}
