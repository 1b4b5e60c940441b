use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tourbook_booking::{BookingError, SessionStoreError};

#[derive(Debug)]
pub enum AppError {
    Booking(BookingError),
    BadRequest(String),
    NotFound(String),
    /// Another request currently holds the session lock.
    SessionBusy(String),
    ServiceUnavailable(String),
    Anyhow(anyhow::Error),
}

fn booking_error_kind(err: &BookingError) -> (StatusCode, &'static str) {
    match err {
        BookingError::Validation(_) => (StatusCode::BAD_REQUEST, "validation"),
        BookingError::Pricing(_) => (StatusCode::BAD_REQUEST, "validation"),
        BookingError::InvalidCallback(_) => (StatusCode::BAD_REQUEST, "invalid_callback"),
        BookingError::PhaseOrder { .. } => (StatusCode::CONFLICT, "phase_order"),
        BookingError::SessionConflict(_) => (StatusCode::CONFLICT, "session_conflict"),
        BookingError::NotPayable { .. } => (StatusCode::CONFLICT, "not_payable"),
        BookingError::NotCancellable { .. } => (StatusCode::CONFLICT, "not_cancellable"),
        BookingError::InvalidTransition(_) => (StatusCode::CONFLICT, "invalid_transition"),
        BookingError::MethodUnavailable(_) => (StatusCode::UNPROCESSABLE_ENTITY, "method_unavailable"),
        BookingError::IntentRejected { .. } => (StatusCode::PAYMENT_REQUIRED, "intent_rejected"),
        BookingError::Transport(_) => (StatusCode::BAD_GATEWAY, "transport"),
        BookingError::OutcomeUnknown { .. } => (StatusCode::ACCEPTED, "outcome_unknown"),
        BookingError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
        BookingError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            AppError::Booking(BookingError::OutcomeUnknown { booking_id, status }) => {
                // Not a failure: the client keeps polling the persisted status.
                tracing::warn!(booking_id = %booking_id, status = %status, "Payment outcome unknown");
                (
                    StatusCode::ACCEPTED,
                    json!({
                        "error": format!("Payment outcome for booking {} is not known yet", booking_id),
                        "kind": "outcome_unknown",
                        "booking_id": booking_id,
                        "status": status,
                    }),
                )
            }
            AppError::Booking(err) => {
                let (status, kind) = booking_error_kind(&err);
                let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
                    tracing::error!("Internal Server Error: {}", err);
                    "Internal Server Error".to_string()
                } else {
                    tracing::debug!(kind, "Request rejected: {}", err);
                    err.to_string()
                };
                (status, json!({ "error": message, "kind": kind }))
            }
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, json!({ "error": msg, "kind": "bad_request" })),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, json!({ "error": msg, "kind": "not_found" })),
            AppError::SessionBusy(session_id) => (
                StatusCode::CONFLICT,
                json!({
                    "error": format!("Another operation is in progress for session {}", session_id),
                    "kind": "session_busy",
                }),
            ),
            AppError::ServiceUnavailable(msg) => {
                tracing::warn!("Dependency unavailable: {}", msg);
                (
                    StatusCode::BAD_GATEWAY,
                    json!({ "error": "Service temporarily unavailable", "kind": "transport" }),
                )
            }
            AppError::Anyhow(err) => {
                tracing::error!("Internal Server Error: {}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": "Internal Server Error", "kind": "internal" }),
                )
            }
        };

        (status, Json(body)).into_response()
    }
}

impl From<BookingError> for AppError {
    fn from(err: BookingError) -> Self {
        AppError::Booking(err)
    }
}

impl From<SessionStoreError> for AppError {
    fn from(err: SessionStoreError) -> Self {
        match err {
            SessionStoreError::Unavailable(msg) => AppError::ServiceUnavailable(msg),
            SessionStoreError::Corrupt(msg) => AppError::Anyhow(anyhow::anyhow!("corrupt session: {}", msg)),
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Anyhow(err)
    }
}
