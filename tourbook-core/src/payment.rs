use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::booking::CustomerContact;

/// The customer's method choice. Each method is served by exactly one provider family.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    /// Hosted approval page on the provider's site.
    Redirect,
    /// Device wallet payment sheet.
    Wallet,
    /// Card form rendered by the provider's embedded element.
    Card,
    /// Bank-app confirmation that settles out-of-band.
    InstantTransfer,
}

impl PaymentMethod {
    pub const ALL: [PaymentMethod; 4] = [
        PaymentMethod::Redirect,
        PaymentMethod::Wallet,
        PaymentMethod::Card,
        PaymentMethod::InstantTransfer,
    ];

    pub fn family(&self) -> ProviderFamily {
        match self {
            PaymentMethod::Redirect => ProviderFamily::Redirect,
            PaymentMethod::Wallet => ProviderFamily::WalletToken,
            PaymentMethod::Card | PaymentMethod::InstantTransfer => ProviderFamily::EmbeddedElement,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Redirect => "redirect",
            PaymentMethod::Wallet => "wallet",
            PaymentMethod::Card => "card",
            PaymentMethod::InstantTransfer => "instant_transfer",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        PaymentMethod::ALL.into_iter().find(|m| m.as_str() == value)
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The three provider interaction shapes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ProviderFamily {
    Redirect,
    WalletToken,
    EmbeddedElement,
}

impl ProviderFamily {
    pub fn methods(&self) -> Vec<PaymentMethod> {
        PaymentMethod::ALL
            .into_iter()
            .filter(|m| m.family() == *self)
            .collect()
    }

    /// Client-side readiness as reported by the presentation layer.
    pub fn client_ready(&self, signals: &ClientSignals) -> bool {
        match self {
            ProviderFamily::Redirect => true,
            ProviderFamily::WalletToken => signals.wallet_ready == Some(true),
            ProviderFamily::EmbeddedElement => signals.element_ready == Some(true),
        }
    }
}

impl fmt::Display for ProviderFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProviderFamily::Redirect => "redirect",
            ProviderFamily::WalletToken => "wallet_token",
            ProviderFamily::EmbeddedElement => "embedded_element",
        };
        f.write_str(name)
    }
}

/// Readiness signals only the client can observe. Absent means "not reported".
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClientSignals {
    /// Result of the wallet's "can this device/account authorize" query.
    pub wallet_ready: Option<bool>,
    /// The embedded element fired its ready event.
    pub element_ready: Option<bool>,
}

/// Ephemeral capability check result. Never persisted, never reused across requests.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct GatewayCapability {
    pub available: bool,
    pub ready_signal: bool,
}

impl GatewayCapability {
    pub fn unavailable() -> Self {
        Self::default()
    }

    pub fn is_selectable(&self) -> bool {
        self.available && self.ready_signal
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntentRequest {
    pub booking_id: Uuid,
    pub method: PaymentMethod,
    /// Always the booking's deposit, never its total.
    pub amount_cents: i64,
    pub currency: String,
    pub customer: CustomerContact,
    pub description: String,
    /// Payment session driving the attempt; providers send the customer back to it.
    pub session_id: String,
    /// 1-based attempt counter within the session.
    pub attempt: u32,
}

impl IntentRequest {
    /// Provider-side idempotency key: one per booking attempt.
    pub fn idempotency_key(&self) -> String {
        format!("{}-{}", self.booking_id.simple(), self.attempt)
    }
}

/// What the client has to do next to complete the attempt.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NextAction {
    /// Navigate the browser away to the provider's approval page.
    Redirect { approval_url: String },
    /// Open the native wallet sheet; it yields an authorization token.
    PaymentSheet {
        client_secret: String,
        merchant_id: String,
        environment: String,
        amount_cents: i64,
        currency: String,
    },
    /// Mount the embedded element with this secret.
    EmbeddedForm {
        client_secret: String,
        publishable_key: String,
    },
}

/// Opaque per-attempt handle returned by `create_intent`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IntentHandle {
    pub intent_id: String,
    pub booking_id: Uuid,
    pub method: PaymentMethod,
    pub amount_cents: i64,
    pub currency: String,
    /// Absent when the handle was rebuilt from a persisted booking.
    pub next_action: Option<NextAction>,
}

impl IntentHandle {
    pub fn family(&self) -> ProviderFamily {
        self.method.family()
    }

    /// Rebuild a handle from what the booking record keeps, e.g. to poll a provider.
    pub fn resume(
        intent_id: impl Into<String>,
        booking_id: Uuid,
        method: PaymentMethod,
        amount_cents: i64,
        currency: impl Into<String>,
    ) -> Self {
        Self {
            intent_id: intent_id.into(),
            booking_id,
            method,
            amount_cents,
            currency: currency.into(),
            next_action: None,
        }
    }
}

/// Provider data handed back to `confirm`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CallbackData {
    /// Browser came back from the approval page. Either value may be missing
    /// when the customer navigated back by hand.
    RedirectReturn {
        payment_reference: Option<String>,
        approval_token: Option<String>,
    },
    /// Opaque token produced by the wallet sheet.
    WalletAuthorization { token: String },
    /// The embedded element finished its client-side confirmation step.
    ElementSubmitted,
    /// Ask the provider for the authoritative status of the current intent.
    StatusPoll,
    /// The customer dismissed the provider flow.
    Cancelled,
}

impl CallbackData {
    /// Whether this callback carries anything a provider could confirm.
    pub fn carries_outcome(&self) -> bool {
        match self {
            CallbackData::RedirectReturn {
                payment_reference,
                approval_token,
            } => {
                let present = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.trim().is_empty());
                present(payment_reference) && present(approval_token)
            }
            _ => true,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SettlementStatus {
    Succeeded,
    /// Accepted by the customer, settling out-of-band.
    Pending,
    Failed,
    Cancelled,
    /// The provider is still waiting for the customer; nothing to reconcile yet.
    RequiresAction,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConfirmOutcome {
    pub status: SettlementStatus,
    pub provider_reference: Option<String>,
    /// Provider's decline text, passed through verbatim.
    pub reason: Option<String>,
}

impl ConfirmOutcome {
    pub fn succeeded(reference: impl Into<String>) -> Self {
        Self {
            status: SettlementStatus::Succeeded,
            provider_reference: Some(reference.into()),
            reason: None,
        }
    }

    pub fn pending(reference: Option<String>) -> Self {
        Self {
            status: SettlementStatus::Pending,
            provider_reference: reference,
            reason: None,
        }
    }

    pub fn failed(reason: Option<String>) -> Self {
        Self {
            status: SettlementStatus::Failed,
            provider_reference: None,
            reason,
        }
    }

    pub fn cancelled() -> Self {
        Self {
            status: SettlementStatus::Cancelled,
            provider_reference: None,
            reason: None,
        }
    }

    pub fn requires_action() -> Self {
        Self {
            status: SettlementStatus::RequiresAction,
            provider_reference: None,
            reason: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GatewayError {
    #[error("Payment provider is not configured: {0}")]
    NotConfigured(String),

    #[error("Payment provider unreachable: {0}")]
    Transport(String),

    /// The request may have reached the provider; the result is unknown.
    #[error("Payment provider timed out")]
    Timeout,

    #[error("Payment provider rejected the request: {reason}")]
    Rejected { reason: String },

    #[error("Callback does not match the active payment attempt: {0}")]
    InvalidCallback(String),

    #[error("Unexpected provider response: {0}")]
    UnexpectedResponse(String),
}

impl GatewayError {
    pub fn is_ambiguous(&self) -> bool {
        matches!(self, GatewayError::Timeout)
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, GatewayError::Transport(_) | GatewayError::NotConfigured(_))
    }
}

/// Uniform contract every payment provider integration implements.
#[async_trait]
pub trait GatewayAdapter: Send + Sync {
    fn family(&self) -> ProviderFamily;

    /// Decide whether the family can be offered right now. Failures read as unavailable.
    async fn check_capability(&self, signals: &ClientSignals) -> GatewayCapability;

    /// Open a new single-attempt intent with the provider.
    async fn create_intent(&self, request: &IntentRequest) -> Result<IntentHandle, GatewayError>;

    /// Turn provider callback data into a settlement outcome.
    async fn confirm(
        &self,
        handle: &IntentHandle,
        callback: &CallbackData,
    ) -> Result<ConfirmOutcome, GatewayError>;
}
