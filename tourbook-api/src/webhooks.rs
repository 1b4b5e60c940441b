use axum::{
    extract::{Json, State},
    http::StatusCode,
    routing::post,
    Router,
};
use serde_json::{json, Value};

use crate::error::AppError;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new().route("/v1/webhooks/payments", post(handle_payment_webhook))
}

/// Pull the intent id out of a provider event.
///
/// Intent-style events carry it as `data.object.payment_intent` (charge events) or
/// `data.object.id`; payment-style events as `resource.parent_payment` (sale events) or
/// `resource.id`.
pub fn intent_id_from_event(payload: &Value) -> Option<String> {
    let candidates = [
        payload.pointer("/data/object/payment_intent"),
        payload.pointer("/data/object/id"),
        payload.pointer("/resource/parent_payment"),
        payload.pointer("/resource/id"),
        payload.get("intent_id"),
    ];
    candidates
        .into_iter()
        .flatten()
        .filter_map(Value::as_str)
        .find(|id| !id.is_empty())
        .map(str::to_string)
}

/// POST /v1/webhooks/payments
/// The event only names the intent; its status is re-read from the provider.
async fn handle_payment_webhook(
    State(state): State<AppState>,
    Json(payload): Json<Value>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let event_type = payload
        .get("type")
        .or_else(|| payload.get("event_type"))
        .and_then(Value::as_str)
        .unwrap_or("unknown");
    let intent_id = intent_id_from_event(&payload)
        .ok_or_else(|| AppError::BadRequest("Event does not reference a payment".to_string()))?;

    tracing::info!(event_type, intent_id = %intent_id, "Received payment webhook");

    match state.reconciler.sync_intent(&intent_id).await? {
        Some(booking) => Ok((
            StatusCode::OK,
            Json(json!({ "booking_id": booking.id, "status": booking.status })),
        )),
        None => Ok((StatusCode::ACCEPTED, Json(json!({ "status": "ignored" })))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intent_id_from_intent_events() {
        let succeeded = json!({
            "type": "payment_intent.succeeded",
            "data": {"object": {"id": "pi_123", "status": "succeeded"}}
        });
        assert_eq!(intent_id_from_event(&succeeded).as_deref(), Some("pi_123"));

        let charge = json!({
            "type": "charge.succeeded",
            "data": {"object": {"id": "ch_9", "payment_intent": "pi_123"}}
        });
        assert_eq!(intent_id_from_event(&charge).as_deref(), Some("pi_123"));
    }

    #[test]
    fn test_intent_id_from_payment_events() {
        let sale = json!({
            "event_type": "PAYMENT.SALE.COMPLETED",
            "resource": {"id": "SALE-1", "parent_payment": "PAY-123"}
        });
        assert_eq!(intent_id_from_event(&sale).as_deref(), Some("PAY-123"));

        assert_eq!(intent_id_from_event(&json!({"type": "ping"})), None);
    }
}
