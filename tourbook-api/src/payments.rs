use axum::{
    extract::{Json, Path, Query, State},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tourbook_booking::{BookingSummary, MethodOption, PaymentOrchestrator};
use tourbook_core::{CallbackData, ClientSignals, IntentHandle, PaymentMethod};
use uuid::Uuid;

use crate::error::AppError;
use crate::session::{self, SessionLease};
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/sessions/{session_id}/payment-methods", get(list_methods))
        .route("/v1/sessions/{session_id}/payments", post(initiate_payment))
        .route("/v1/sessions/{session_id}/payments/complete", post(complete_payment))
        .route("/v1/sessions/{session_id}/payments/return", get(redirect_return))
}

#[derive(Debug, Serialize)]
struct MethodsResponse {
    methods: Vec<MethodOption>,
}

#[derive(Debug, Deserialize)]
pub struct InitiatePaymentRequest {
    pub booking_id: Uuid,
    pub method: PaymentMethod,
    #[serde(default)]
    pub signals: ClientSignals,
}

/// Query string the redirect provider appends to the return URL.
#[derive(Debug, Deserialize)]
pub struct RedirectReturnParams {
    #[serde(rename = "paymentId")]
    pub payment_id: Option<String>,
    #[serde(rename = "PayerID")]
    pub payer_id: Option<String>,
}

/// GET /v1/sessions/{session_id}/payment-methods?wallet_ready=true&element_ready=true
async fn list_methods(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Query(signals): Query<ClientSignals>,
) -> Result<Json<MethodsResponse>, AppError> {
    let orchestrator = match session::peek(&state, &session_id).await? {
        Some(orchestrator) => orchestrator,
        None => PaymentOrchestrator::start(state.services.clone(), session_id),
    };
    let methods = orchestrator.available_methods(&signals).await;
    Ok(Json(MethodsResponse { methods }))
}

/// POST /v1/sessions/{session_id}/payments
async fn initiate_payment(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(req): Json<InitiatePaymentRequest>,
) -> Result<Json<IntentHandle>, AppError> {
    let mut lease = SessionLease::acquire(&state, &session_id).await?;
    let result = lease
        .orchestrator
        .initiate_payment(req.booking_id, req.method, &req.signals)
        .await;
    lease.release(&state).await?;

    Ok(Json(result?))
}

/// POST /v1/sessions/{session_id}/payments/complete
async fn complete_payment(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(callback): Json<CallbackData>,
) -> Result<Json<BookingSummary>, AppError> {
    complete(&state, &session_id, callback).await
}

/// GET /v1/sessions/{session_id}/payments/return?paymentId=...&PayerID=...
/// Both parameters may be missing when the customer navigated back by hand.
async fn redirect_return(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Query(params): Query<RedirectReturnParams>,
) -> Result<Json<BookingSummary>, AppError> {
    let callback = CallbackData::RedirectReturn {
        payment_reference: params.payment_id,
        approval_token: params.payer_id,
    };
    complete(&state, &session_id, callback).await
}

async fn complete(
    state: &AppState,
    session_id: &str,
    callback: CallbackData,
) -> Result<Json<BookingSummary>, AppError> {
    let mut lease = SessionLease::acquire(state, session_id).await?;
    let result = lease.orchestrator.complete_payment(callback).await;
    lease.release(state).await?;

    Ok(Json(result?))
}
