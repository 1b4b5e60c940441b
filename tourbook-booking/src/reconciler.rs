use chrono::Utc;
use std::sync::Arc;
use tourbook_core::{
    Booking, BookingEventPublisher, BookingStatus, BookingUpdate, CallbackData, ConfirmOutcome,
    IntentHandle, RepositoryError, ReservationRepository, SettlementStatus,
};
use tourbook_shared::models::events::{
    BookingCancelledEvent, BookingConfirmedEvent, BookingEvent, BookingPaymentFailedEvent,
};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::BookingError;
use crate::gateways::GatewayRegistry;

const GENERIC_DECLINE: &str = "Payment was declined by the provider";

/// Booking status a settlement outcome leads to. `None`: nothing to record yet.
pub fn target_status(settlement: SettlementStatus) -> Option<BookingStatus> {
    match settlement {
        SettlementStatus::Succeeded => Some(BookingStatus::Confirmed),
        SettlementStatus::Pending => Some(BookingStatus::Processing),
        SettlementStatus::Failed => Some(BookingStatus::Failed),
        SettlementStatus::Cancelled => Some(BookingStatus::PendingPayment),
        SettlementStatus::RequiresAction => None,
    }
}

/// Maps provider outcomes onto booking status, exactly once per outcome.
///
/// Every write re-reads the booking first and is skipped when the booking already
/// reflects the outcome, so duplicate callbacks and webhooks never publish twice.
#[derive(Clone)]
pub struct OutcomeReconciler {
    reservations: Arc<dyn ReservationRepository>,
    events: Arc<dyn BookingEventPublisher>,
    gateways: Arc<GatewayRegistry>,
}

impl OutcomeReconciler {
    pub fn new(
        reservations: Arc<dyn ReservationRepository>,
        events: Arc<dyn BookingEventPublisher>,
        gateways: Arc<GatewayRegistry>,
    ) -> Self {
        Self {
            reservations,
            events,
            gateways,
        }
    }

    pub async fn resolve(
        &self,
        booking_id: Uuid,
        intent_id: &str,
        outcome: &ConfirmOutcome,
    ) -> Result<Booking, BookingError> {
        let current = self.reservations.get(booking_id).await?;

        let Some(target) = target_status(outcome.status) else {
            debug!(booking_id = %booking_id, intent_id = %intent_id, "Provider awaits customer action");
            return Ok(current);
        };

        if current.status == target {
            debug!(booking_id = %booking_id, status = %target, "Outcome already recorded");
            return Ok(current);
        }
        if current.status.is_final() {
            if outcome.status == SettlementStatus::Succeeded && current.status == BookingStatus::Cancelled {
                error!(booking_id = %booking_id, intent_id = %intent_id, "Settlement succeeded for a cancelled booking");
            }
            return Ok(current);
        }

        let is_current_intent = current.payment_intent_id.as_deref() == Some(intent_id);
        if !is_current_intent {
            if outcome.status != SettlementStatus::Succeeded {
                debug!(booking_id = %booking_id, intent_id = %intent_id, "Ignoring outcome of a superseded intent");
                return Ok(current);
            }
            warn!(booking_id = %booking_id, intent_id = %intent_id, "Superseded intent settled; confirming booking");
        }

        if !current.status.can_transition_to(target) {
            debug!(booking_id = %booking_id, from = %current.status, to = %target, "Outcome does not apply");
            return Ok(current);
        }

        let reason = match target {
            BookingStatus::Failed => Some(outcome.reason.clone().unwrap_or_else(|| GENERIC_DECLINE.to_string())),
            _ => None,
        };
        let update = BookingUpdate::status(target)
            .with_provider_reference(outcome.provider_reference.clone())
            .with_failure_reason(reason);

        let updated = match self.reservations.update(booking_id, update).await {
            Ok(updated) => updated,
            // Another writer got there first; the stored record wins.
            Err(RepositoryError::InvalidTransition(_)) => return Ok(self.reservations.get(booking_id).await?),
            Err(e) => return Err(e.into()),
        };

        info!(booking_id = %booking_id, intent_id = %intent_id, from = %current.status, to = %updated.status, "Booking reconciled");

        match updated.status {
            BookingStatus::Confirmed => self.publish(confirmed_event(&updated)).await,
            BookingStatus::Failed => {
                self.publish(BookingEvent::PaymentFailed(BookingPaymentFailedEvent {
                    booking_id,
                    intent_id: Some(intent_id.to_string()),
                    reason: updated.failure_reason.clone(),
                    timestamp: Utc::now().timestamp(),
                }))
                .await
            }
            _ => {}
        }
        Ok(updated)
    }

    /// Hold a booking whose confirmation result is unknown as `processing`.
    pub async fn mark_unresolved(&self, booking_id: Uuid) -> Result<Booking, BookingError> {
        let current = self.reservations.get(booking_id).await?;
        if current.status != BookingStatus::PendingPayment {
            return Ok(current);
        }
        warn!(booking_id = %booking_id, intent_id = ?current.payment_intent_id, "Payment outcome unknown; holding as processing");
        Ok(self
            .reservations
            .update(booking_id, BookingUpdate::status(BookingStatus::Processing))
            .await?)
    }

    /// Explicit cancellation of the reservation itself.
    pub async fn cancel(&self, booking_id: Uuid) -> Result<Booking, BookingError> {
        let current = self.reservations.get(booking_id).await?;
        match current.status {
            BookingStatus::Cancelled => return Ok(current),
            BookingStatus::Confirmed | BookingStatus::Processing => {
                return Err(BookingError::NotCancellable {
                    status: current.status,
                })
            }
            _ => {}
        }

        let updated = self
            .reservations
            .update(booking_id, BookingUpdate::status(BookingStatus::Cancelled))
            .await?;
        info!(booking_id = %booking_id, "Booking cancelled");

        self.publish(BookingEvent::Cancelled(BookingCancelledEvent {
            booking_id,
            tour_id: updated.tour_id.clone(),
            selected_date: updated.selected_date,
            timestamp: Utc::now().timestamp(),
        }))
        .await;
        Ok(updated)
    }

    /// Ask the provider for the authoritative status of an intent and reconcile it.
    /// Intents replaced by a later attempt still resolve to their booking.
    /// `None` when no booking ever recorded the intent.
    pub async fn sync_intent(&self, intent_id: &str) -> Result<Option<Booking>, BookingError> {
        let Some(record) = self.reservations.find_intent(intent_id).await? else {
            debug!(intent_id = %intent_id, "No booking references this intent");
            return Ok(None);
        };
        let booking = self.reservations.get(record.booking_id).await?;
        if booking.status.is_final() {
            return Ok(Some(booking));
        }

        let gateway = self
            .gateways
            .for_method(record.method)
            .ok_or(BookingError::MethodUnavailable(record.method))?;

        let handle = IntentHandle::resume(
            intent_id,
            booking.id,
            record.method,
            booking.deposit_cents,
            booking.currency.clone(),
        );
        let outcome = gateway.confirm(&handle, &CallbackData::StatusPoll).await?;
        self.resolve(booking.id, intent_id, &outcome).await.map(Some)
    }

    async fn publish(&self, event: BookingEvent) {
        // The booking is already durable; a lost event is logged, not rolled back.
        if let Err(e) = self.events.publish(&event).await {
            error!(topic = event.topic(), booking_id = %event.booking_id(), error = %e, "Failed to publish booking event");
        }
    }
}

fn confirmed_event(booking: &Booking) -> BookingEvent {
    BookingEvent::Confirmed(BookingConfirmedEvent {
        booking_id: booking.id,
        tour_id: booking.tour_id.clone(),
        selected_date: booking.selected_date,
        participants: booking.participants,
        deposit_cents: booking.deposit_cents,
        remaining_cents: booking.remaining_cents,
        currency: booking.currency.clone(),
        provider_reference: booking.provider_reference.clone(),
        timestamp: Utc::now().timestamp(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use tourbook_core::{
        BookingDraft, CustomerContact, InMemoryReservationRepository, NewBooking, PaymentMethod,
        PriceSplit, RecordingEventPublisher,
    };
    use tourbook_shared::Masked;

    struct Fixture {
        repo: Arc<InMemoryReservationRepository>,
        events: Arc<RecordingEventPublisher>,
        reconciler: OutcomeReconciler,
    }

    fn fixture() -> Fixture {
        let repo = Arc::new(InMemoryReservationRepository::new());
        let events = Arc::new(RecordingEventPublisher::new());
        let reconciler = OutcomeReconciler::new(repo.clone(), events.clone(), Arc::new(GatewayRegistry::new()));
        Fixture {
            repo,
            events,
            reconciler,
        }
    }

    async fn booking_with_intent(repo: &InMemoryReservationRepository, intent_id: &str) -> Booking {
        let booking = repo
            .create(NewBooking {
                idempotency_key: Uuid::new_v4().to_string(),
                draft: BookingDraft {
                    tour_id: "tour-fatima".to_string(),
                    customer: CustomerContact {
                        name: "Ana Costa".to_string(),
                        email: Masked::from("ana@example.com"),
                        phone: Masked::from("+351912345678"),
                    },
                    selected_date: NaiveDate::from_ymd_opt(2030, 5, 17).unwrap(),
                    participants: 2,
                    special_request: None,
                    language: "pt".to_string(),
                },
                split: PriceSplit {
                    total_cents: 10000,
                    deposit_cents: 3000,
                    remaining_cents: 7000,
                },
                currency: "EUR".to_string(),
            })
            .await
            .unwrap();
        repo.update(
            booking.id,
            BookingUpdate::default().with_intent(intent_id, PaymentMethod::Card),
        )
        .await
        .unwrap()
    }

    #[test]
    fn test_transition_table() {
        assert_eq!(target_status(SettlementStatus::Succeeded), Some(BookingStatus::Confirmed));
        assert_eq!(target_status(SettlementStatus::Pending), Some(BookingStatus::Processing));
        assert_eq!(target_status(SettlementStatus::Failed), Some(BookingStatus::Failed));
        assert_eq!(target_status(SettlementStatus::Cancelled), Some(BookingStatus::PendingPayment));
        assert_eq!(target_status(SettlementStatus::RequiresAction), None);
    }

    #[tokio::test]
    async fn test_duplicate_success_publishes_once() {
        let f = fixture();
        let booking = booking_with_intent(&f.repo, "pi_1").await;
        let outcome = ConfirmOutcome::succeeded("ch_1");

        let first = f.reconciler.resolve(booking.id, "pi_1", &outcome).await.unwrap();
        let second = f.reconciler.resolve(booking.id, "pi_1", &outcome).await.unwrap();

        assert_eq!(first.status, BookingStatus::Confirmed);
        assert_eq!(second.status, BookingStatus::Confirmed);
        assert_eq!(f.events.events().await.len(), 1);
    }

    #[tokio::test]
    async fn test_confirmed_never_regresses() {
        let f = fixture();
        let booking = booking_with_intent(&f.repo, "pi_1").await;
        f.reconciler
            .resolve(booking.id, "pi_1", &ConfirmOutcome::succeeded("ch_1"))
            .await
            .unwrap();

        let after = f
            .reconciler
            .resolve(booking.id, "pi_1", &ConfirmOutcome::failed(Some("late decline".to_string())))
            .await
            .unwrap();
        assert_eq!(after.status, BookingStatus::Confirmed);
        assert_eq!(after.failure_reason, None);
    }

    #[tokio::test]
    async fn test_decline_records_reason_verbatim() {
        let f = fixture();
        let booking = booking_with_intent(&f.repo, "pi_1").await;
        let failed = f
            .reconciler
            .resolve(
                booking.id,
                "pi_1",
                &ConfirmOutcome::failed(Some("Your card has insufficient funds.".to_string())),
            )
            .await
            .unwrap();
        assert_eq!(failed.status, BookingStatus::Failed);
        assert_eq!(failed.failure_reason.as_deref(), Some("Your card has insufficient funds."));

        let events = f.events.events().await;
        assert!(matches!(&events[0], BookingEvent::PaymentFailed(e) if e.intent_id.as_deref() == Some("pi_1")));
    }

    #[tokio::test]
    async fn test_stale_intent_decline_is_ignored() {
        let f = fixture();
        let booking = booking_with_intent(&f.repo, "pi_2").await;
        let after = f
            .reconciler
            .resolve(booking.id, "pi_1", &ConfirmOutcome::failed(None))
            .await
            .unwrap();
        assert_eq!(after.status, BookingStatus::PendingPayment);
        assert!(f.events.events().await.is_empty());
    }

    #[tokio::test]
    async fn test_cancel_from_processing_is_a_no_op() {
        let f = fixture();
        let booking = booking_with_intent(&f.repo, "pi_1").await;
        f.reconciler
            .resolve(booking.id, "pi_1", &ConfirmOutcome::pending(Some("pi_1".to_string())))
            .await
            .unwrap();

        let after = f
            .reconciler
            .resolve(booking.id, "pi_1", &ConfirmOutcome::cancelled())
            .await
            .unwrap();
        assert_eq!(after.status, BookingStatus::Processing);
    }

    #[tokio::test]
    async fn test_explicit_cancel_rules() {
        let f = fixture();
        let booking = booking_with_intent(&f.repo, "pi_1").await;
        let cancelled = f.reconciler.cancel(booking.id).await.unwrap();
        assert_eq!(cancelled.status, BookingStatus::Cancelled);
        // idempotent
        f.reconciler.cancel(booking.id).await.unwrap();
        assert_eq!(f.events.events().await.len(), 1);

        let other = booking_with_intent(&f.repo, "pi_9").await;
        f.reconciler
            .resolve(other.id, "pi_9", &ConfirmOutcome::succeeded("ch_9"))
            .await
            .unwrap();
        let result = f.reconciler.cancel(other.id).await;
        assert!(matches!(result, Err(BookingError::NotCancellable { status: BookingStatus::Confirmed })));
    }

    #[tokio::test]
    async fn test_unresolved_is_held_as_processing() {
        let f = fixture();
        let booking = booking_with_intent(&f.repo, "pi_1").await;
        let held = f.reconciler.mark_unresolved(booking.id).await.unwrap();
        assert_eq!(held.status, BookingStatus::Processing);
    }

    #[tokio::test]
    async fn test_sync_unknown_intent() {
        let f = fixture();
        assert!(f.reconciler.sync_intent("pi_missing").await.unwrap().is_none());
    }
}
