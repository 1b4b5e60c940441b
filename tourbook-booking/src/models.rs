use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tourbook_core::{Booking, BookingStatus, PaymentMethod, ProviderFamily};
use uuid::Uuid;

use crate::session::PaymentPhase;

/// Read-only view of a booking for display: status and amounts, no contact data.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BookingSummary {
    pub booking_id: Uuid,
    pub tour_id: String,
    pub selected_date: NaiveDate,
    pub participants: u32,
    pub status: BookingStatus,
    pub phase: PaymentPhase,
    pub total_cents: i64,
    pub deposit_cents: i64,
    pub remaining_cents: i64,
    pub currency: String,
    pub payment_method: Option<PaymentMethod>,
    pub provider_reference: Option<String>,
    /// Provider's decline text, verbatim
    pub failure_reason: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl BookingSummary {
    pub fn new(booking: &Booking, phase: PaymentPhase) -> Self {
        Self {
            booking_id: booking.id,
            tour_id: booking.tour_id.clone(),
            selected_date: booking.selected_date,
            participants: booking.participants,
            status: booking.status,
            phase,
            total_cents: booking.total_cents,
            deposit_cents: booking.deposit_cents,
            remaining_cents: booking.remaining_cents,
            currency: booking.currency.clone(),
            payment_method: booking.payment_method,
            provider_reference: booking.provider_reference.clone(),
            failure_reason: booking.failure_reason.clone(),
            updated_at: booking.updated_at,
        }
    }

    /// Payment accepted but settling out-of-band.
    pub fn awaiting_settlement(&self) -> bool {
        self.status == BookingStatus::Processing
    }
}

/// A method the customer can pick right now.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct MethodOption {
    pub method: PaymentMethod,
    pub family: ProviderFamily,
}
