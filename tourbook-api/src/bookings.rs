use axum::{
    extract::{Json, Path, State},
    routing::post,
    Router,
};
use tourbook_booking::BookingSummary;
use tourbook_core::BookingDraft;
use tracing::info;

use crate::error::AppError;
use crate::session::SessionLease;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route(
            "/v1/sessions/{session_id}/booking",
            post(ensure_booking).get(get_booking),
        )
        .route("/v1/sessions/{session_id}/cancel", post(cancel_booking))
}

/// POST /v1/sessions/{session_id}/booking
/// Create the session's booking from the draft, or return the one it already owns.
async fn ensure_booking(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(draft): Json<BookingDraft>,
) -> Result<Json<BookingSummary>, AppError> {
    let mut lease = SessionLease::acquire(&state, &session_id).await?;
    let result = async {
        let booking_id = lease.orchestrator.ensure_booking(draft).await?;
        info!(session_id = %session_id, booking_id = %booking_id, "Booking ensured");
        lease.orchestrator.summary().await
    }
    .await;
    lease.release(&state).await?;

    Ok(Json(result?))
}

/// GET /v1/sessions/{session_id}/booking
async fn get_booking(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<BookingSummary>, AppError> {
    let mut lease = SessionLease::acquire(&state, &session_id).await?;
    if lease.orchestrator.booking_id().is_none() {
        lease.release(&state).await?;
        return Err(AppError::NotFound(format!("No booking for session {}", session_id)));
    }
    let result = lease.orchestrator.refresh().await;
    lease.release(&state).await?;

    Ok(Json(result?))
}

/// POST /v1/sessions/{session_id}/cancel
async fn cancel_booking(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<BookingSummary>, AppError> {
    let mut lease = SessionLease::acquire(&state, &session_id).await?;
    let result = lease.orchestrator.cancel_booking().await;
    lease.release(&state).await?;

    let summary = result?;
    info!(session_id = %session_id, booking_id = %summary.booking_id, status = %summary.status, "Booking cancellation handled");
    Ok(Json(summary))
}
