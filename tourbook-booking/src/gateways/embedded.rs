use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tourbook_core::{
    CallbackData, ClientSignals, ConfirmOutcome, GatewayAdapter, GatewayCapability, GatewayError,
    IntentHandle, IntentRequest, NextAction, PaymentMethod, ProviderFamily,
};
use tracing::info;

use super::http::default_timeout_ms;
use super::intents::IntentsApi;

/// Smallest amount the provider will charge, in minor units.
pub const MIN_CHARGE_CENTS: i64 = 50;

fn default_instant_transfer_type() -> String {
    "mb_way".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddedConfig {
    pub api_base: String,
    pub secret_key: String,
    /// Handed to the client to mount the element
    pub publishable_key: String,
    /// Provider method type used for `instant_transfer`
    #[serde(default = "default_instant_transfer_type")]
    pub instant_transfer_type: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

/// Embedded-element adapter. The client drives the form with the intent's secret;
/// confirmation reads the intent back, which may still be settling out-of-band.
pub struct EmbeddedGateway {
    api: IntentsApi,
    config: EmbeddedConfig,
}

impl EmbeddedGateway {
    pub fn new(config: EmbeddedConfig) -> Result<Self, GatewayError> {
        Ok(Self {
            api: IntentsApi::new(&config.api_base, &config.secret_key, config.timeout_ms)?,
            config,
        })
    }

    fn method_type(&self, method: PaymentMethod) -> &str {
        match method {
            PaymentMethod::InstantTransfer => self.config.instant_transfer_type.as_str(),
            _ => "card",
        }
    }
}

#[async_trait]
impl GatewayAdapter for EmbeddedGateway {
    fn family(&self) -> ProviderFamily {
        ProviderFamily::EmbeddedElement
    }

    async fn check_capability(&self, signals: &ClientSignals) -> GatewayCapability {
        // Readiness belongs to the widget; the server only knows the key was issued.
        GatewayCapability {
            available: !self.config.publishable_key.trim().is_empty(),
            ready_signal: self.family().client_ready(signals),
        }
    }

    async fn create_intent(&self, request: &IntentRequest) -> Result<IntentHandle, GatewayError> {
        if request.amount_cents < MIN_CHARGE_CENTS {
            return Err(GatewayError::Rejected {
                reason: format!(
                    "Amount {} is below the minimum chargeable amount of {}",
                    request.amount_cents, MIN_CHARGE_CENTS
                ),
            });
        }

        let intent = self.api.create(request, self.method_type(request.method)).await?;
        let client_secret = intent
            .client_secret
            .clone()
            .ok_or_else(|| GatewayError::UnexpectedResponse("intent without client_secret".to_string()))?;

        info!(intent_id = %intent.id, booking_id = %request.booking_id, method = %request.method, "Embedded intent created");
        Ok(IntentHandle {
            intent_id: intent.id,
            booking_id: request.booking_id,
            method: request.method,
            amount_cents: request.amount_cents,
            currency: request.currency.clone(),
            next_action: Some(NextAction::EmbeddedForm {
                client_secret,
                publishable_key: self.config.publishable_key.clone(),
            }),
        })
    }

    async fn confirm(
        &self,
        handle: &IntentHandle,
        callback: &CallbackData,
    ) -> Result<ConfirmOutcome, GatewayError> {
        match callback {
            CallbackData::ElementSubmitted | CallbackData::StatusPoll => {
                self.api.retrieve(&handle.intent_id).await?.outcome()
            }
            CallbackData::Cancelled => Ok(ConfirmOutcome::cancelled()),
            other => Err(GatewayError::InvalidCallback(format!(
                "embedded flow cannot confirm {:?}",
                other
            ))),
        }
    }
}
