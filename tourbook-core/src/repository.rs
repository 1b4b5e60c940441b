use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::booking::{Booking, BookingUpdate, NewBooking, TransitionError};
use crate::payment::PaymentMethod;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RepositoryError {
    #[error("Reservation store unavailable: {0}")]
    Unavailable(String),

    #[error("Booking not found: {0}")]
    NotFound(Uuid),

    #[error(transparent)]
    InvalidTransition(#[from] TransitionError),

    #[error("Stored booking is malformed: {0}")]
    Corrupt(String),
}

/// A provider intent ever opened for a booking. Kept after a retry replaces it on the booking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntentRecord {
    pub intent_id: String,
    pub booking_id: Uuid,
    pub method: PaymentMethod,
    pub recorded_at: DateTime<Utc>,
}

/// Durable store of Booking records. Treated as remote and fallible.
#[async_trait]
pub trait ReservationRepository: Send + Sync {
    /// Create the booking, or return the one already created for `new.idempotency_key`.
    async fn create(&self, new: NewBooking) -> Result<Booking, RepositoryError>;

    async fn get(&self, id: Uuid) -> Result<Booking, RepositoryError>;

    async fn update(&self, id: Uuid, update: BookingUpdate) -> Result<Booking, RepositoryError>;

    /// Look up any intent recorded through `update`, including superseded ones.
    async fn find_intent(&self, intent_id: &str) -> Result<Option<IntentRecord>, RepositoryError>;
}
