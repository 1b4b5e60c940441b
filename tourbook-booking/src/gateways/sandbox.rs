use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Mutex;
use tourbook_core::{
    CallbackData, ClientSignals, ConfirmOutcome, GatewayAdapter, GatewayCapability, GatewayError,
    IntentHandle, IntentRequest, NextAction, PaymentMethod, ProviderFamily,
};
use tracing::debug;

/// Wallet token that the sandbox declines.
pub const SANDBOX_DECLINE_TOKEN: &str = "tok_decline";
/// Wallet token whose confirmation times out.
pub const SANDBOX_TIMEOUT_TOKEN: &str = "tok_timeout";
/// Redirect approval token that the sandbox declines.
pub const SANDBOX_DECLINE_PAYER: &str = "DECLINE";

#[derive(Default)]
struct SandboxState {
    capability: Option<GatewayCapability>,
    create_failures: VecDeque<GatewayError>,
    confirm_script: VecDeque<Result<ConfirmOutcome, GatewayError>>,
    /// Last outcome the provider would report for each intent
    settled: HashMap<String, ConfirmOutcome>,
    sequence: u32,
}

/// In-process gateway for development mode and tests. No money moves.
///
/// Behaves like a well-mannered provider of its family unless scripted otherwise:
/// cards and wallets succeed, instant transfers settle later, magic tokens decline
/// or time out.
pub struct SandboxGateway {
    family: ProviderFamily,
    state: Mutex<SandboxState>,
    create_calls: AtomicUsize,
    confirm_calls: AtomicUsize,
}

impl SandboxGateway {
    pub fn new(family: ProviderFamily) -> Self {
        Self {
            family,
            state: Mutex::new(SandboxState::default()),
            create_calls: AtomicUsize::new(0),
            confirm_calls: AtomicUsize::new(0),
        }
    }

    /// Force the capability result. `None` restores the default.
    pub async fn set_capability(&self, capability: Option<GatewayCapability>) {
        self.state.lock().await.capability = capability;
    }

    pub async fn fail_next_create(&self, error: GatewayError) {
        self.state.lock().await.create_failures.push_back(error);
    }

    /// Queue the result of the next `confirm` call.
    pub async fn script_confirm(&self, result: Result<ConfirmOutcome, GatewayError>) {
        self.state.lock().await.confirm_script.push_back(result);
    }

    /// Settle an intent out-of-band; later status polls report this outcome.
    pub async fn settle(&self, intent_id: &str, outcome: ConfirmOutcome) {
        self.state
            .lock()
            .await
            .settled
            .insert(intent_id.to_string(), outcome);
    }

    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub fn confirm_calls(&self) -> usize {
        self.confirm_calls.load(Ordering::SeqCst)
    }

    fn reference(intent_id: &str) -> String {
        format!("{}_ref", intent_id)
    }

    fn next_action(&self, intent_id: &str, request: &IntentRequest) -> NextAction {
        let client_secret = format!("{}_secret", intent_id);
        match self.family {
            ProviderFamily::Redirect => NextAction::Redirect {
                approval_url: format!("https://sandbox.tourbook.invalid/approve/{}", intent_id),
            },
            ProviderFamily::WalletToken => NextAction::PaymentSheet {
                client_secret,
                merchant_id: "sandbox-merchant".to_string(),
                environment: "TEST".to_string(),
                amount_cents: request.amount_cents,
                currency: request.currency.clone(),
            },
            ProviderFamily::EmbeddedElement => NextAction::EmbeddedForm {
                client_secret,
                publishable_key: "pk_sandbox".to_string(),
            },
        }
    }

    fn default_outcome(
        &self,
        handle: &IntentHandle,
        callback: &CallbackData,
        settled: Option<&ConfirmOutcome>,
    ) -> Result<ConfirmOutcome, GatewayError> {
        let reference = Self::reference(&handle.intent_id);
        match callback {
            CallbackData::Cancelled => Ok(ConfirmOutcome::cancelled()),
            CallbackData::StatusPoll => Ok(settled.cloned().unwrap_or_else(ConfirmOutcome::requires_action)),
            CallbackData::RedirectReturn {
                payment_reference,
                approval_token,
            } => {
                if payment_reference.as_deref() != Some(handle.intent_id.as_str()) {
                    return Err(GatewayError::InvalidCallback(
                        "payment reference does not match the active intent".to_string(),
                    ));
                }
                match approval_token.as_deref() {
                    Some(SANDBOX_DECLINE_PAYER) => {
                        Ok(ConfirmOutcome::failed(Some("Payer's funding source was declined".to_string())))
                    }
                    Some(_) => Ok(ConfirmOutcome::succeeded(reference)),
                    None => Err(GatewayError::InvalidCallback("missing approval token".to_string())),
                }
            }
            CallbackData::WalletAuthorization { token } => match token.as_str() {
                SANDBOX_DECLINE_TOKEN => Ok(ConfirmOutcome::failed(Some("Your card was declined.".to_string()))),
                SANDBOX_TIMEOUT_TOKEN => Err(GatewayError::Timeout),
                _ => Ok(ConfirmOutcome::succeeded(reference)),
            },
            CallbackData::ElementSubmitted => match handle.method {
                PaymentMethod::InstantTransfer => Ok(ConfirmOutcome::pending(Some(handle.intent_id.clone()))),
                _ => Ok(ConfirmOutcome::succeeded(reference)),
            },
        }
    }
}

#[async_trait]
impl GatewayAdapter for SandboxGateway {
    fn family(&self) -> ProviderFamily {
        self.family
    }

    async fn check_capability(&self, signals: &ClientSignals) -> GatewayCapability {
        match self.state.lock().await.capability {
            Some(capability) => capability,
            None => GatewayCapability {
                available: true,
                ready_signal: self.family.client_ready(signals),
            },
        }
    }

    async fn create_intent(&self, request: &IntentRequest) -> Result<IntentHandle, GatewayError> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock().await;

        if let Some(error) = state.create_failures.pop_front() {
            return Err(error);
        }
        if request.amount_cents <= 0 {
            return Err(GatewayError::Rejected {
                reason: "Amount must be positive".to_string(),
            });
        }

        state.sequence += 1;
        let intent_id = format!(
            "sbx_{}_{}_{}",
            self.family,
            request.booking_id.simple(),
            state.sequence
        );
        debug!(intent_id = %intent_id, amount_cents = request.amount_cents, "Sandbox intent created");

        Ok(IntentHandle {
            next_action: Some(self.next_action(&intent_id, request)),
            intent_id,
            booking_id: request.booking_id,
            method: request.method,
            amount_cents: request.amount_cents,
            currency: request.currency.clone(),
        })
    }

    async fn confirm(
        &self,
        handle: &IntentHandle,
        callback: &CallbackData,
    ) -> Result<ConfirmOutcome, GatewayError> {
        self.confirm_calls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock().await;

        let result = match state.confirm_script.pop_front() {
            Some(scripted) => scripted,
            None => self.default_outcome(handle, callback, state.settled.get(&handle.intent_id)),
        };
        if let Ok(outcome) = &result {
            state.settled.insert(handle.intent_id.clone(), outcome.clone());
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tourbook_core::{CustomerContact, SettlementStatus};
    use tourbook_shared::Masked;
    use uuid::Uuid;

    fn request(method: PaymentMethod, amount_cents: i64) -> IntentRequest {
        IntentRequest {
            booking_id: Uuid::new_v4(),
            method,
            amount_cents,
            currency: "EUR".to_string(),
            customer: CustomerContact {
                name: "Ana Costa".to_string(),
                email: Masked::from("ana@example.com"),
                phone: Masked::from("+351912345678"),
            },
            description: "Deposit".to_string(),
            session_id: "s-1".to_string(),
            attempt: 1,
        }
    }

    #[tokio::test]
    async fn test_instant_transfer_settles_later() {
        let gateway = SandboxGateway::new(ProviderFamily::EmbeddedElement);
        let handle = gateway
            .create_intent(&request(PaymentMethod::InstantTransfer, 3000))
            .await
            .unwrap();

        let first = gateway.confirm(&handle, &CallbackData::ElementSubmitted).await.unwrap();
        assert_eq!(first.status, SettlementStatus::Pending);

        let poll = gateway.confirm(&handle, &CallbackData::StatusPoll).await.unwrap();
        assert_eq!(poll.status, SettlementStatus::Pending);

        gateway
            .settle(&handle.intent_id, ConfirmOutcome::succeeded("bank-ref"))
            .await;
        let poll = gateway.confirm(&handle, &CallbackData::StatusPoll).await.unwrap();
        assert_eq!(poll.status, SettlementStatus::Succeeded);
        assert_eq!(gateway.confirm_calls(), 3);
    }

    #[tokio::test]
    async fn test_magic_tokens() {
        let gateway = SandboxGateway::new(ProviderFamily::WalletToken);
        let handle = gateway
            .create_intent(&request(PaymentMethod::Wallet, 3000))
            .await
            .unwrap();

        let declined = gateway
            .confirm(
                &handle,
                &CallbackData::WalletAuthorization {
                    token: SANDBOX_DECLINE_TOKEN.to_string(),
                },
            )
            .await
            .unwrap();
        assert_eq!(declined.status, SettlementStatus::Failed);

        let timeout = gateway
            .confirm(
                &handle,
                &CallbackData::WalletAuthorization {
                    token: SANDBOX_TIMEOUT_TOKEN.to_string(),
                },
            )
            .await;
        assert_eq!(timeout, Err(GatewayError::Timeout));
    }

    #[tokio::test]
    async fn test_scripted_create_failure() {
        let gateway = SandboxGateway::new(ProviderFamily::Redirect);
        gateway
            .fail_next_create(GatewayError::Transport("connection reset".to_string()))
            .await;

        assert!(gateway.create_intent(&request(PaymentMethod::Redirect, 3000)).await.is_err());
        assert!(gateway.create_intent(&request(PaymentMethod::Redirect, 3000)).await.is_ok());
        assert_eq!(gateway.create_calls(), 2);
    }

    #[tokio::test]
    async fn test_capability_follows_client_signals() {
        let gateway = SandboxGateway::new(ProviderFamily::WalletToken);
        assert!(!gateway.check_capability(&ClientSignals::default()).await.is_selectable());

        let ready = ClientSignals {
            wallet_ready: Some(true),
            element_ready: None,
        };
        assert!(gateway.check_capability(&ready).await.is_selectable());

        gateway.set_capability(Some(GatewayCapability::unavailable())).await;
        assert!(!gateway.check_capability(&ready).await.is_selectable());
    }
}
