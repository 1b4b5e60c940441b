use chrono::NaiveDate;
use tourbook_core::{BookingDraft, ValidationError};

use crate::tour::Tour;

/// Check a draft against the tour it targets. Returns the total price on success.
///
/// `today` is passed in so callers decide the clock (and the timezone) to use.
pub fn validate_draft(tour: &Tour, draft: &BookingDraft, today: NaiveDate) -> Result<i64, ValidationError> {
    draft.validate_fields()?;

    if !tour.is_active {
        return Err(ValidationError::TourInactive(tour.id.clone()));
    }

    let max = tour.max_participants.max(tour.min_participants);
    if draft.participants < tour.min_participants || draft.participants > max {
        return Err(ValidationError::ParticipantsOutOfRange {
            requested: draft.participants,
            min: tour.min_participants,
            max: Some(max),
        });
    }

    let date = draft.selected_date;
    if date < today {
        return Err(ValidationError::DateInPast(date));
    }
    if !tour.is_published(date) {
        return Err(ValidationError::DateUnavailable(date));
    }
    if tour.is_occupied(date) {
        return Err(ValidationError::DateOccupied(date));
    }

    let total = tour
        .total_for(draft.participants)
        .ok_or(ValidationError::NonPositiveTotal(i64::MAX))?;
    if total <= 0 {
        return Err(ValidationError::NonPositiveTotal(total));
    }
    Ok(total)
}
