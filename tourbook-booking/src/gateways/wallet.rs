use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tourbook_core::{
    CallbackData, ClientSignals, ConfirmOutcome, GatewayAdapter, GatewayCapability, GatewayError,
    IntentHandle, IntentRequest, NextAction, ProviderFamily,
};
use tracing::{debug, info};

use super::http::default_timeout_ms;
use super::intents::IntentsApi;

fn default_environment() -> String {
    "TEST".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletConfig {
    pub api_base: String,
    pub secret_key: String,
    /// Merchant identifier registered with the wallet
    pub merchant_id: String,
    /// `TEST` or `PRODUCTION`
    #[serde(default = "default_environment")]
    pub environment: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

/// Wallet-token adapter: the device's payment sheet yields an opaque token that is
/// exchanged for settlement in the same request.
pub struct WalletGateway {
    api: IntentsApi,
    config: WalletConfig,
}

impl WalletGateway {
    pub fn new(config: WalletConfig) -> Result<Self, GatewayError> {
        Ok(Self {
            api: IntentsApi::new(&config.api_base, &config.secret_key, config.timeout_ms)?,
            config,
        })
    }

    /// First capability stage: the wallet integration has what it needs to open a sheet.
    fn sdk_ready(&self) -> bool {
        !self.config.secret_key.trim().is_empty() && !self.config.merchant_id.trim().is_empty()
    }
}

#[async_trait]
impl GatewayAdapter for WalletGateway {
    fn family(&self) -> ProviderFamily {
        ProviderFamily::WalletToken
    }

    async fn check_capability(&self, signals: &ClientSignals) -> GatewayCapability {
        if !self.sdk_ready() {
            return GatewayCapability::unavailable();
        }
        GatewayCapability {
            available: true,
            ready_signal: self.family().client_ready(signals),
        }
    }

    async fn create_intent(&self, request: &IntentRequest) -> Result<IntentHandle, GatewayError> {
        let intent = self.api.create(request, "card").await?;
        let client_secret = intent
            .client_secret
            .clone()
            .ok_or_else(|| GatewayError::UnexpectedResponse("intent without client_secret".to_string()))?;

        info!(intent_id = %intent.id, booking_id = %request.booking_id, "Wallet intent created");
        Ok(IntentHandle {
            intent_id: intent.id,
            booking_id: request.booking_id,
            method: request.method,
            amount_cents: request.amount_cents,
            currency: request.currency.clone(),
            next_action: Some(NextAction::PaymentSheet {
                client_secret,
                merchant_id: self.config.merchant_id.clone(),
                environment: self.config.environment.clone(),
                amount_cents: request.amount_cents,
                currency: request.currency.clone(),
            }),
        })
    }

    async fn confirm(
        &self,
        handle: &IntentHandle,
        callback: &CallbackData,
    ) -> Result<ConfirmOutcome, GatewayError> {
        match callback {
            CallbackData::WalletAuthorization { token } => {
                if token.trim().is_empty() {
                    return Err(GatewayError::InvalidCallback("empty wallet token".to_string()));
                }
                debug!(intent_id = %handle.intent_id, "Exchanging wallet token");
                let form = [
                    ("payment_method_data[type]", "card"),
                    ("payment_method_data[card][token]", token.as_str()),
                ];
                self.api.confirm(&handle.intent_id, &form).await?.outcome()
            }
            CallbackData::StatusPoll => self.api.retrieve(&handle.intent_id).await?.outcome(),
            // The sheet was dismissed on the device.
            CallbackData::Cancelled => Ok(ConfirmOutcome::cancelled()),
            other => Err(GatewayError::InvalidCallback(format!(
                "wallet flow cannot confirm {:?}",
                other
            ))),
        }
    }
}
