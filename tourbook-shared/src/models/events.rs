use chrono::NaiveDate;
use uuid::Uuid;

pub const BOOKING_CONFIRMED_TOPIC: &str = "booking.confirmed";
pub const BOOKING_PAYMENT_FAILED_TOPIC: &str = "booking.payment_failed";
pub const BOOKING_CANCELLED_TOPIC: &str = "booking.cancelled";

/// Emitted once when a booking's deposit is verified as settled.
/// The catalog side consumes it to block the date for the tour.
#[derive(Debug, serde::Serialize, serde::Deserialize, Clone, PartialEq)]
pub struct BookingConfirmedEvent {
    pub booking_id: Uuid,
    pub tour_id: String,
    pub selected_date: NaiveDate,
    pub participants: u32,
    pub deposit_cents: i64,
    pub remaining_cents: i64,
    pub currency: String,
    pub provider_reference: Option<String>,
    pub timestamp: i64,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone, PartialEq)]
pub struct BookingPaymentFailedEvent {
    pub booking_id: Uuid,
    pub intent_id: Option<String>,
    pub reason: Option<String>,
    pub timestamp: i64,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone, PartialEq)]
pub struct BookingCancelledEvent {
    pub booking_id: Uuid,
    pub tour_id: String,
    pub selected_date: NaiveDate,
    pub timestamp: i64,
}

/// Envelope used by publishers that route on topic.
#[derive(Debug, serde::Serialize, serde::Deserialize, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BookingEvent {
    Confirmed(BookingConfirmedEvent),
    PaymentFailed(BookingPaymentFailedEvent),
    Cancelled(BookingCancelledEvent),
}

impl BookingEvent {
    pub fn topic(&self) -> &'static str {
        match self {
            BookingEvent::Confirmed(_) => BOOKING_CONFIRMED_TOPIC,
            BookingEvent::PaymentFailed(_) => BOOKING_PAYMENT_FAILED_TOPIC,
            BookingEvent::Cancelled(_) => BOOKING_CANCELLED_TOPIC,
        }
    }

    pub fn booking_id(&self) -> Uuid {
        match self {
            BookingEvent::Confirmed(e) => e.booking_id,
            BookingEvent::PaymentFailed(e) => e.booking_id,
            BookingEvent::Cancelled(e) => e.booking_id,
        }
    }
}
