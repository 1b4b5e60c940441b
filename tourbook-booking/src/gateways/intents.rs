//! Client for providers exposing a card-network style PaymentIntents API
//! (form-encoded requests, bearer secret key). Shared by the wallet and
//! embedded-element gateways.

use reqwest::Client;
use serde::Deserialize;
use tourbook_core::{ConfirmOutcome, GatewayError, IntentRequest};

use super::http::{build_client, send_json};

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct IntentBody {
    pub id: String,
    pub status: String,
    pub client_secret: Option<String>,
    pub latest_charge: Option<String>,
    pub last_payment_error: Option<IntentError>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct IntentError {
    pub message: Option<String>,
}

impl IntentBody {
    /// Map the provider's intent status onto a settlement outcome.
    pub fn outcome(&self) -> Result<ConfirmOutcome, GatewayError> {
        let reference = self.latest_charge.clone().unwrap_or_else(|| self.id.clone());
        match self.status.as_str() {
            "succeeded" => Ok(ConfirmOutcome::succeeded(reference)),
            "processing" | "requires_capture" => Ok(ConfirmOutcome::pending(Some(self.id.clone()))),
            "requires_payment_method" => match &self.last_payment_error {
                Some(err) => Ok(ConfirmOutcome::failed(err.message.clone())),
                None => Ok(ConfirmOutcome::requires_action()),
            },
            "requires_action" | "requires_confirmation" => Ok(ConfirmOutcome::requires_action()),
            "canceled" => Ok(ConfirmOutcome::cancelled()),
            other => Err(GatewayError::UnexpectedResponse(format!(
                "unknown intent status: {}",
                other
            ))),
        }
    }
}

pub(crate) struct IntentsApi {
    http: Client,
    api_base: String,
    secret_key: String,
}

impl IntentsApi {
    pub fn new(api_base: &str, secret_key: &str, timeout_ms: u64) -> Result<Self, GatewayError> {
        Ok(Self {
            http: build_client(timeout_ms)?,
            api_base: api_base.trim_end_matches('/').to_string(),
            secret_key: secret_key.to_string(),
        })
    }

    pub async fn create(
        &self,
        request: &IntentRequest,
        method_type: &str,
    ) -> Result<IntentBody, GatewayError> {
        let form = [
            ("amount", request.amount_cents.to_string()),
            ("currency", request.currency.to_lowercase()),
            ("payment_method_types[]", method_type.to_string()),
            ("description", request.description.clone()),
            ("receipt_email", request.customer.email.expose().clone()),
            ("metadata[booking_id]", request.booking_id.to_string()),
            ("metadata[session_id]", request.session_id.clone()),
        ];
        let req = self
            .http
            .post(format!("{}/v1/payment_intents", self.api_base))
            .bearer_auth(&self.secret_key)
            .header("Idempotency-Key", request.idempotency_key())
            .form(&form);
        send_json(req, "create payment intent").await
    }

    pub async fn retrieve(&self, intent_id: &str) -> Result<IntentBody, GatewayError> {
        let req = self
            .http
            .get(format!("{}/v1/payment_intents/{}", self.api_base, intent_id))
            .bearer_auth(&self.secret_key);
        send_json(req, "retrieve payment intent").await
    }

    pub async fn confirm(
        &self,
        intent_id: &str,
        form: &[(&str, &str)],
    ) -> Result<IntentBody, GatewayError> {
        let req = self
            .http
            .post(format!("{}/v1/payment_intents/{}/confirm", self.api_base, intent_id))
            .bearer_auth(&self.secret_key)
            .form(form);
        send_json(req, "confirm payment intent").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tourbook_core::SettlementStatus;

    fn body(status: &str) -> IntentBody {
        IntentBody {
            id: "pi_1".to_string(),
            status: status.to_string(),
            client_secret: None,
            latest_charge: None,
            last_payment_error: None,
        }
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(body("succeeded").outcome().unwrap().status, SettlementStatus::Succeeded);
        assert_eq!(body("processing").outcome().unwrap().status, SettlementStatus::Pending);
        assert_eq!(body("canceled").outcome().unwrap().status, SettlementStatus::Cancelled);
        assert_eq!(
            body("requires_payment_method").outcome().unwrap().status,
            SettlementStatus::RequiresAction
        );
        assert!(body("exploded").outcome().is_err());
    }

    #[test]
    fn test_decline_keeps_provider_reason() {
        let mut declined = body("requires_payment_method");
        declined.last_payment_error = Some(IntentError {
            message: Some("Your card has insufficient funds.".to_string()),
        });
        let outcome = declined.outcome().unwrap();
        assert_eq!(outcome.status, SettlementStatus::Failed);
        assert_eq!(outcome.reason.as_deref(), Some("Your card has insufficient funds."));
    }

    #[test]
    fn test_success_prefers_charge_reference() {
        let mut paid = body("succeeded");
        paid.latest_charge = Some("ch_9".to_string());
        assert_eq!(paid.outcome().unwrap().provider_reference.as_deref(), Some("ch_9"));
    }
}
