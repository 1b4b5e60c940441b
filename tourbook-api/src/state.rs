use std::sync::Arc;
use tourbook_booking::{OutcomeReconciler, PaymentServices, SessionStore};

#[derive(Clone)]
pub struct AppState {
    pub services: Arc<PaymentServices>,
    pub sessions: Arc<dyn SessionStore>,
    pub reconciler: OutcomeReconciler,
}

impl AppState {
    pub fn new(services: Arc<PaymentServices>, sessions: Arc<dyn SessionStore>) -> Self {
        let reconciler = services.reconciler();
        Self {
            services,
            sessions,
            reconciler,
        }
    }
}
