use tourbook_catalog::PricingError;
use tourbook_core::{
    BookingStatus, GatewayError, PaymentMethod, RepositoryError, TransitionError, ValidationError,
};
use uuid::Uuid;

use crate::session::{PaymentPhase, SessionStoreError};

/// Everything the orchestrator can report to the presentation layer.
#[derive(Debug, thiserror::Error)]
pub enum BookingError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("{operation} is not allowed while the payment session is {phase}")]
    PhaseOrder {
        operation: &'static str,
        phase: PaymentPhase,
    },

    #[error("Payment session conflict: {0}")]
    SessionConflict(String),

    #[error("Payment method {0} is not available right now")]
    MethodUnavailable(PaymentMethod),

    #[error("Booking cannot take a payment while {status}")]
    NotPayable { status: BookingStatus },

    #[error("Booking cannot be cancelled while {status}")]
    NotCancellable { status: BookingStatus },

    /// Repository or provider unreachable. Nothing was durably advanced; the caller may retry.
    #[error("Service temporarily unavailable: {0}")]
    Transport(String),

    /// The provider refused to open the intent. The booking stays payable.
    #[error("Payment provider rejected the payment: {reason}")]
    IntentRejected { reason: String },

    #[error("Invalid payment callback: {0}")]
    InvalidCallback(String),

    /// The confirmation call may have reached the provider; the booking is held as `processing`.
    #[error("Payment outcome for booking {booking_id} is not known yet")]
    OutcomeUnknown {
        booking_id: Uuid,
        status: BookingStatus,
    },

    #[error("Booking not found: {0}")]
    NotFound(Uuid),

    #[error(transparent)]
    InvalidTransition(#[from] TransitionError),

    #[error(transparent)]
    Pricing(#[from] PricingError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<RepositoryError> for BookingError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::Unavailable(msg) => BookingError::Transport(msg),
            RepositoryError::NotFound(id) => BookingError::NotFound(id),
            RepositoryError::InvalidTransition(e) => BookingError::InvalidTransition(e),
            RepositoryError::Corrupt(msg) => BookingError::Internal(msg),
        }
    }
}

impl From<GatewayError> for BookingError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::Rejected { reason } => BookingError::IntentRejected { reason },
            GatewayError::InvalidCallback(msg) => BookingError::InvalidCallback(msg),
            GatewayError::Timeout => BookingError::Transport("payment provider timed out".to_string()),
            other => BookingError::Transport(other.to_string()),
        }
    }
}

impl From<SessionStoreError> for BookingError {
    fn from(err: SessionStoreError) -> Self {
        match err {
            SessionStoreError::Unavailable(msg) => BookingError::Transport(msg),
            SessionStoreError::Corrupt(msg) => BookingError::Internal(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repository_errors_keep_their_kind() {
        let err: BookingError = RepositoryError::Unavailable("connection refused".to_string()).into();
        assert!(matches!(err, BookingError::Transport(_)));

        let id = Uuid::new_v4();
        let err: BookingError = RepositoryError::NotFound(id).into();
        assert!(matches!(err, BookingError::NotFound(found) if found == id));
    }

    #[test]
    fn test_provider_reason_is_passed_through() {
        let err: BookingError = GatewayError::Rejected {
            reason: "Amount below minimum".to_string(),
        }
        .into();
        assert_eq!(err.to_string(), "Payment provider rejected the payment: Amount below minimum");
    }
}
