use chrono::NaiveDate;

/// Draft problems detected before any repository write. Reported verbatim to the customer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Customer email address is not valid")]
    InvalidEmail,

    #[error("Participant count {requested} is outside the allowed range {min}..={}", fmt_max(.max))]
    ParticipantsOutOfRange {
        requested: u32,
        min: u32,
        max: Option<u32>,
    },

    #[error("Tour not found: {0}")]
    TourNotFound(String),

    #[error("Tour {0} is not open for booking")]
    TourInactive(String),

    #[error("Date {0} is not in the tour's published availability")]
    DateUnavailable(NaiveDate),

    #[error("Date {0} is already booked")]
    DateOccupied(NaiveDate),

    #[error("Date {0} is in the past")]
    DateInPast(NaiveDate),

    #[error("Total price must be positive, got {0}")]
    NonPositiveTotal(i64),

    #[error("Total price {0} is too small to collect a deposit")]
    DepositTooSmall(i64),
}

fn fmt_max(max: &Option<u32>) -> String {
    max.map(|m| m.to_string()).unwrap_or_default()
}
