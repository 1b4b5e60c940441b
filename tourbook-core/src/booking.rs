use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tourbook_shared::Masked;
use uuid::Uuid;

use crate::payment::PaymentMethod;
use crate::validation::ValidationError;

/// Booking status in the reservation lifecycle.
///
/// `Draft` only exists client-side before the first repository write.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Draft,
    PendingPayment,
    Processing,
    Confirmed,
    Failed,
    Cancelled,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Draft => "draft",
            BookingStatus::PendingPayment => "pending_payment",
            BookingStatus::Processing => "processing",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Failed => "failed",
            BookingStatus::Cancelled => "cancelled",
        }
    }

    /// No further payment attempt can change the booking.
    pub fn is_final(&self) -> bool {
        matches!(self, BookingStatus::Confirmed | BookingStatus::Cancelled)
    }

    /// Persisted status transition table.
    pub fn can_transition_to(&self, next: BookingStatus) -> bool {
        use BookingStatus::*;
        match (self, next) {
            (_, Draft) => false,
            (Draft, PendingPayment) => true,
            (PendingPayment, Processing | Confirmed | Failed | Cancelled) => true,
            (Processing, Confirmed | Failed) => true,
            // A new attempt after a decline.
            (Failed, PendingPayment) => true,
            // Late provider-verified success for an earlier attempt.
            (Failed, Confirmed) => true,
            (Failed, Cancelled) => true,
            _ => false,
        }
    }

    pub fn transition_to(&self, next: BookingStatus) -> Result<BookingStatus, TransitionError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(TransitionError {
                from: *self,
                to: next,
            })
        }
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BookingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(BookingStatus::Draft),
            "pending_payment" => Ok(BookingStatus::PendingPayment),
            "processing" => Ok(BookingStatus::Processing),
            "confirmed" => Ok(BookingStatus::Confirmed),
            "failed" => Ok(BookingStatus::Failed),
            "cancelled" => Ok(BookingStatus::Cancelled),
            other => Err(format!("unknown booking status: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("Invalid booking transition from {from} to {to}")]
pub struct TransitionError {
    pub from: BookingStatus,
    pub to: BookingStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CustomerContact {
    pub name: String,
    pub email: Masked<String>,
    pub phone: Masked<String>,
}

impl CustomerContact {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::MissingField("customer.name"));
        }
        let email = self.email.expose().trim();
        if email.is_empty() {
            return Err(ValidationError::MissingField("customer.email"));
        }
        if !looks_like_email(email) {
            return Err(ValidationError::InvalidEmail);
        }
        if self.phone.expose().trim().is_empty() {
            return Err(ValidationError::MissingField("customer.phone"));
        }
        Ok(())
    }
}

fn looks_like_email(value: &str) -> bool {
    match value.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !value.contains(char::is_whitespace)
        }
        None => false,
    }
}

/// What the customer filled in before anything was persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BookingDraft {
    pub tour_id: String,
    pub customer: CustomerContact,
    pub selected_date: NaiveDate,
    pub participants: u32,
    pub special_request: Option<String>,
    pub language: String,
}

impl BookingDraft {
    /// Field-level checks that need no tour data.
    pub fn validate_fields(&self) -> Result<(), ValidationError> {
        if self.tour_id.trim().is_empty() {
            return Err(ValidationError::MissingField("tour_id"));
        }
        self.customer.validate()?;
        if self.language.trim().is_empty() {
            return Err(ValidationError::MissingField("language"));
        }
        if self.participants == 0 {
            return Err(ValidationError::ParticipantsOutOfRange {
                requested: 0,
                min: 1,
                max: None,
            });
        }
        Ok(())
    }
}

/// Total, deposit and remaining balance in minor currency units.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PriceSplit {
    pub total_cents: i64,
    pub deposit_cents: i64,
    pub remaining_cents: i64,
}

impl PriceSplit {
    pub fn is_consistent(&self) -> bool {
        self.deposit_cents + self.remaining_cents == self.total_cents
    }
}

/// Input for the first repository write of a booking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewBooking {
    /// Payment session that produced the draft; the repository never creates two
    /// bookings for the same key.
    pub idempotency_key: String,
    pub draft: BookingDraft,
    pub split: PriceSplit,
    pub currency: String,
}

/// The durable reservation record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Booking {
    pub id: Uuid,
    pub idempotency_key: String,
    pub tour_id: String,
    pub customer: CustomerContact,
    pub selected_date: NaiveDate,
    pub participants: u32,
    pub special_request: Option<String>,
    pub language: String,
    pub total_cents: i64,
    pub deposit_cents: i64,
    pub remaining_cents: i64,
    pub currency: String,
    pub status: BookingStatus,
    pub payment_method: Option<PaymentMethod>,
    pub payment_intent_id: Option<String>,
    pub provider_reference: Option<String>,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Booking {
    /// Materialize a freshly created booking. Only repositories call this.
    pub fn from_new(id: Uuid, new: NewBooking) -> Self {
        let now = Utc::now();
        let NewBooking {
            idempotency_key,
            draft,
            split,
            currency,
        } = new;
        Self {
            id,
            idempotency_key,
            tour_id: draft.tour_id,
            customer: draft.customer,
            selected_date: draft.selected_date,
            participants: draft.participants,
            special_request: draft.special_request,
            language: draft.language,
            total_cents: split.total_cents,
            deposit_cents: split.deposit_cents,
            remaining_cents: split.remaining_cents,
            currency,
            status: BookingStatus::PendingPayment,
            payment_method: None,
            payment_intent_id: None,
            provider_reference: None,
            failure_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn split(&self) -> PriceSplit {
        PriceSplit {
            total_cents: self.total_cents,
            deposit_cents: self.deposit_cents,
            remaining_cents: self.remaining_cents,
        }
    }

    /// Apply a partial update, enforcing the status transition table.
    pub fn apply(&mut self, update: &BookingUpdate) -> Result<(), TransitionError> {
        if let Some(next) = update.status {
            if next != self.status {
                self.status = self.status.transition_to(next)?;
            }
        }
        if let Some(method) = update.payment_method {
            self.payment_method = Some(method);
        }
        if let Some(intent_id) = &update.payment_intent_id {
            self.payment_intent_id = Some(intent_id.clone());
        }
        if let Some(reference) = &update.provider_reference {
            self.provider_reference = Some(reference.clone());
        }
        if let Some(reason) = &update.failure_reason {
            self.failure_reason = reason.clone();
        }
        self.updated_at = Utc::now();
        Ok(())
    }
}

/// Partial update. `None` leaves a field untouched; `failure_reason: Some(None)` clears it.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BookingUpdate {
    pub status: Option<BookingStatus>,
    pub payment_method: Option<PaymentMethod>,
    pub payment_intent_id: Option<String>,
    pub provider_reference: Option<String>,
    pub failure_reason: Option<Option<String>>,
}

impl BookingUpdate {
    pub fn status(status: BookingStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn with_intent(mut self, intent_id: impl Into<String>, method: PaymentMethod) -> Self {
        self.payment_intent_id = Some(intent_id.into());
        self.payment_method = Some(method);
        self
    }

    pub fn with_provider_reference(mut self, reference: Option<String>) -> Self {
        self.provider_reference = reference;
        self
    }

    pub fn with_failure_reason(mut self, reason: Option<String>) -> Self {
        self.failure_reason = Some(reason);
        self
    }
}
