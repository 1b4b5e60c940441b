pub mod error;
pub mod gateways;
pub mod models;
pub mod orchestrator;
pub mod reconciler;
pub mod session;

pub use error::BookingError;
pub use gateways::{GatewayRegistry, PaymentsConfig, SandboxGateway};
pub use models::{BookingSummary, MethodOption};
pub use orchestrator::{PaymentOrchestrator, PaymentServices};
pub use reconciler::OutcomeReconciler;
pub use session::{InMemorySessionStore, PaymentPhase, PaymentSession, SessionStore, SessionStoreError, TerminalOutcome};
