use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tourbook_core::{
    CallbackData, ClientSignals, ConfirmOutcome, GatewayAdapter, GatewayCapability, GatewayError,
    IntentHandle, IntentRequest, NextAction, ProviderFamily,
};
use tracing::{debug, info, warn};

use super::http::{build_client, default_timeout_ms, format_major_units, send_json};

/// Hosted approval page provider (REST payments API with OAuth client credentials).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedirectConfig {
    pub api_base: String,
    pub client_id: String,
    pub client_secret: String,
    /// May contain `{session_id}`; the provider appends `paymentId` and `PayerID`.
    pub return_url: String,
    pub cancel_url: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct PaymentResponse {
    id: String,
    state: String,
    #[serde(default)]
    links: Vec<Link>,
    #[serde(default)]
    transactions: Vec<Transaction>,
    failure_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Link {
    rel: String,
    href: String,
}

#[derive(Debug, Deserialize)]
struct Transaction {
    #[serde(default)]
    related_resources: Vec<RelatedResource>,
}

#[derive(Debug, Deserialize)]
struct RelatedResource {
    sale: Option<Sale>,
}

#[derive(Debug, Deserialize)]
struct Sale {
    id: String,
}

impl PaymentResponse {
    fn approval_url(&self) -> Option<&str> {
        self.links
            .iter()
            .find(|l| l.rel == "approval_url")
            .map(|l| l.href.as_str())
    }

    fn sale_id(&self) -> Option<String> {
        self.transactions
            .iter()
            .flat_map(|t| t.related_resources.iter())
            .find_map(|r| r.sale.as_ref().map(|s| s.id.clone()))
    }

    fn outcome(&self) -> ConfirmOutcome {
        match self.state.as_str() {
            "approved" | "completed" => {
                ConfirmOutcome::succeeded(self.sale_id().unwrap_or_else(|| self.id.clone()))
            }
            "failed" => ConfirmOutcome::failed(self.failure_reason.clone()),
            "expired" => ConfirmOutcome::failed(Some("Approval window expired".to_string())),
            "canceled" | "cancelled" => ConfirmOutcome::cancelled(),
            "created" => ConfirmOutcome::requires_action(),
            _ => ConfirmOutcome::pending(Some(self.id.clone())),
        }
    }
}

/// Redirect-flow adapter: no synchronous success path. The customer approves on
/// the provider's site and comes back with a payment reference and a payer token.
pub struct RedirectGateway {
    http: Client,
    config: RedirectConfig,
}

impl RedirectGateway {
    pub fn new(config: RedirectConfig) -> Result<Self, GatewayError> {
        Ok(Self {
            http: build_client(config.timeout_ms)?,
            config,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.api_base.trim_end_matches('/'), path)
    }

    async fn access_token(&self) -> Result<String, GatewayError> {
        let req = self
            .http
            .post(self.url("/v1/oauth2/token"))
            .basic_auth(&self.config.client_id, Some(&self.config.client_secret))
            .form(&[("grant_type", "client_credentials")]);
        let token: TokenResponse = send_json(req, "redirect provider token").await?;
        Ok(token.access_token)
    }

    async fn execute(&self, payment_id: &str, payer_id: &str) -> Result<PaymentResponse, GatewayError> {
        let token = self.access_token().await?;
        let req = self
            .http
            .post(self.url(&format!("/v1/payments/payment/{}/execute", payment_id)))
            .bearer_auth(token)
            .json(&json!({ "payer_id": payer_id }));
        send_json(req, "execute redirect payment").await
    }

    async fn lookup(&self, payment_id: &str) -> Result<PaymentResponse, GatewayError> {
        let token = self.access_token().await?;
        let req = self
            .http
            .get(self.url(&format!("/v1/payments/payment/{}", payment_id)))
            .bearer_auth(token);
        send_json(req, "lookup redirect payment").await
    }
}

#[async_trait]
impl GatewayAdapter for RedirectGateway {
    fn family(&self) -> ProviderFamily {
        ProviderFamily::Redirect
    }

    async fn check_capability(&self, signals: &ClientSignals) -> GatewayCapability {
        match self.access_token().await {
            Ok(_) => GatewayCapability {
                available: true,
                ready_signal: self.family().client_ready(signals),
            },
            Err(e) => {
                warn!(error = %e, "Redirect provider unreachable");
                GatewayCapability::unavailable()
            }
        }
    }

    async fn create_intent(&self, request: &IntentRequest) -> Result<IntentHandle, GatewayError> {
        let token = self.access_token().await?;
        let amount = format_major_units(request.amount_cents);
        let currency = request.currency.to_uppercase();
        let payload = json!({
            "intent": "sale",
            "payer": { "payment_method": "paypal" },
            "redirect_urls": {
                "return_url": self.config.return_url.replace("{session_id}", &request.session_id),
                "cancel_url": self.config.cancel_url.replace("{session_id}", &request.session_id),
            },
            "transactions": [{
                "item_list": {
                    "items": [{
                        "name": request.description,
                        "sku": request.booking_id.to_string(),
                        "price": amount,
                        "currency": currency,
                        "quantity": 1
                    }]
                },
                "amount": { "total": amount, "currency": currency },
                "description": request.description,
                "invoice_number": request.idempotency_key(),
            }]
        });

        let req = self
            .http
            .post(self.url("/v1/payments/payment"))
            .bearer_auth(token)
            .header("PayPal-Request-Id", request.idempotency_key())
            .json(&payload);
        let payment: PaymentResponse = send_json(req, "create redirect payment").await?;

        let approval_url = payment
            .approval_url()
            .ok_or_else(|| GatewayError::UnexpectedResponse("no approval_url link".to_string()))?
            .to_string();

        info!(intent_id = %payment.id, booking_id = %request.booking_id, "Redirect payment created");
        Ok(IntentHandle {
            intent_id: payment.id,
            booking_id: request.booking_id,
            method: request.method,
            amount_cents: request.amount_cents,
            currency: request.currency.clone(),
            next_action: Some(NextAction::Redirect { approval_url }),
        })
    }

    async fn confirm(
        &self,
        handle: &IntentHandle,
        callback: &CallbackData,
    ) -> Result<ConfirmOutcome, GatewayError> {
        match callback {
            CallbackData::RedirectReturn {
                payment_reference,
                approval_token,
            } => {
                let reference = payment_reference.as_deref().unwrap_or_default();
                if reference != handle.intent_id {
                    return Err(GatewayError::InvalidCallback(format!(
                        "payment reference {} does not match the active intent",
                        reference
                    )));
                }
                let payer_id = approval_token
                    .as_deref()
                    .filter(|t| !t.trim().is_empty())
                    .ok_or_else(|| GatewayError::InvalidCallback("missing approval token".to_string()))?;

                debug!(intent_id = %handle.intent_id, "Executing approved redirect payment");
                Ok(self.execute(&handle.intent_id, payer_id).await?.outcome())
            }
            CallbackData::StatusPoll => Ok(self.lookup(&handle.intent_id).await?.outcome()),
            CallbackData::Cancelled => Ok(ConfirmOutcome::cancelled()),
            other => Err(GatewayError::InvalidCallback(format!(
                "redirect flow cannot confirm {:?}",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tourbook_core::SettlementStatus;

    fn response(state: &str) -> PaymentResponse {
        PaymentResponse {
            id: "PAY-1".to_string(),
            state: state.to_string(),
            links: vec![],
            transactions: vec![],
            failure_reason: None,
        }
    }

    #[test]
    fn test_state_mapping() {
        assert_eq!(response("approved").outcome().status, SettlementStatus::Succeeded);
        assert_eq!(response("created").outcome().status, SettlementStatus::RequiresAction);
        assert_eq!(response("failed").outcome().status, SettlementStatus::Failed);
        assert_eq!(response("pending").outcome().status, SettlementStatus::Pending);
    }

    #[test]
    fn test_sale_id_is_the_reference() {
        let body = r#"{
            "id": "PAY-1",
            "state": "approved",
            "transactions": [{"related_resources": [{"sale": {"id": "SALE-7"}}]}]
        }"#;
        let payment: PaymentResponse = serde_json::from_str(body).unwrap();
        assert_eq!(payment.outcome().provider_reference.as_deref(), Some("SALE-7"));
    }
}
