pub mod embedded;
pub(crate) mod http;
pub(crate) mod intents;
pub mod redirect;
pub mod sandbox;
pub mod wallet;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tourbook_core::{GatewayAdapter, GatewayError, PaymentMethod, ProviderFamily};
use tracing::info;

pub use embedded::{EmbeddedConfig, EmbeddedGateway, MIN_CHARGE_CENTS};
pub use redirect::{RedirectConfig, RedirectGateway};
pub use sandbox::SandboxGateway;
pub use wallet::{WalletConfig, WalletGateway};

/// Provider configuration. A family without a block is simply not offered.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PaymentsConfig {
    /// Serve every family from the in-process sandbox.
    #[serde(default)]
    pub sandbox: bool,
    pub redirect: Option<RedirectConfig>,
    pub wallet: Option<WalletConfig>,
    pub embedded: Option<EmbeddedConfig>,
}

/// One adapter per provider family. The orchestrator picks by `PaymentMethod::family()`.
#[derive(Default, Clone)]
pub struct GatewayRegistry {
    adapters: HashMap<ProviderFamily, Arc<dyn GatewayAdapter>>,
}

impl GatewayRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &PaymentsConfig) -> Result<Self, GatewayError> {
        let mut registry = Self::new();

        if config.sandbox {
            info!("Payments running against the sandbox gateway");
            for family in [
                ProviderFamily::Redirect,
                ProviderFamily::WalletToken,
                ProviderFamily::EmbeddedElement,
            ] {
                registry.register(Arc::new(SandboxGateway::new(family)));
            }
            return Ok(registry);
        }

        if let Some(redirect) = &config.redirect {
            registry.register(Arc::new(RedirectGateway::new(redirect.clone())?));
        }
        if let Some(wallet) = &config.wallet {
            registry.register(Arc::new(WalletGateway::new(wallet.clone())?));
        }
        if let Some(embedded) = &config.embedded {
            registry.register(Arc::new(EmbeddedGateway::new(embedded.clone())?));
        }
        info!(families = ?registry.families(), "Payment gateways registered");
        Ok(registry)
    }

    /// Register an adapter under its own family, replacing any previous one.
    pub fn register(&mut self, adapter: Arc<dyn GatewayAdapter>) {
        self.adapters.insert(adapter.family(), adapter);
    }

    pub fn with(mut self, adapter: Arc<dyn GatewayAdapter>) -> Self {
        self.register(adapter);
        self
    }

    pub fn get(&self, family: ProviderFamily) -> Option<Arc<dyn GatewayAdapter>> {
        self.adapters.get(&family).cloned()
    }

    pub fn for_method(&self, method: PaymentMethod) -> Option<Arc<dyn GatewayAdapter>> {
        self.get(method.family())
    }

    pub fn families(&self) -> Vec<ProviderFamily> {
        let mut families: Vec<_> = self.adapters.keys().copied().collect();
        families.sort_by_key(|f| f.to_string());
        families
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sandbox_registers_every_family() {
        let registry = GatewayRegistry::from_config(&PaymentsConfig {
            sandbox: true,
            ..Default::default()
        })
        .unwrap();
        for method in PaymentMethod::ALL {
            assert!(registry.for_method(method).is_some());
        }
    }

    #[test]
    fn test_unconfigured_family_is_absent() {
        let registry = GatewayRegistry::from_config(&PaymentsConfig {
            sandbox: false,
            redirect: None,
            wallet: None,
            embedded: Some(EmbeddedConfig {
                api_base: "http://localhost:12111".to_string(),
                secret_key: "sk_test".to_string(),
                publishable_key: "pk_test".to_string(),
                instant_transfer_type: "mb_way".to_string(),
                timeout_ms: 1000,
            }),
        })
        .unwrap();
        assert!(registry.for_method(PaymentMethod::Card).is_some());
        assert!(registry.for_method(PaymentMethod::InstantTransfer).is_some());
        assert!(registry.for_method(PaymentMethod::Wallet).is_none());
    }
}
