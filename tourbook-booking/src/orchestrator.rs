use chrono::Utc;
use std::sync::Arc;
use tourbook_catalog::{validate_draft, DepositPolicy, TourCatalog};
use tourbook_core::{
    Booking, BookingDraft, BookingEventPublisher, BookingStatus, BookingUpdate, CallbackData,
    ClientSignals, ConfirmOutcome, GatewayError, IntentHandle, IntentRequest, NewBooking, PaymentMethod,
    ReservationRepository, SettlementStatus, ValidationError,
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::BookingError;
use crate::gateways::GatewayRegistry;
use crate::models::{BookingSummary, MethodOption};
use crate::reconciler::OutcomeReconciler;
use crate::session::{PaymentPhase, PaymentSession, TerminalOutcome};

/// Collaborators shared by every payment session.
pub struct PaymentServices {
    pub reservations: Arc<dyn ReservationRepository>,
    pub catalog: Arc<dyn TourCatalog>,
    pub gateways: Arc<GatewayRegistry>,
    pub events: Arc<dyn BookingEventPublisher>,
    pub deposit_policy: DepositPolicy,
    /// Used when a tour does not state its own currency
    pub default_currency: String,
}

impl PaymentServices {
    pub fn reconciler(&self) -> OutcomeReconciler {
        OutcomeReconciler::new(
            self.reservations.clone(),
            self.events.clone(),
            self.gateways.clone(),
        )
    }
}

/// Drives one booking session through
/// `Idle -> IntentRequested -> AwaitingProviderAction -> Reconciling -> Terminal`.
///
/// One instance per session; the caller serializes operations on it.
pub struct PaymentOrchestrator {
    services: Arc<PaymentServices>,
    reconciler: OutcomeReconciler,
    session: PaymentSession,
}

impl PaymentOrchestrator {
    pub fn new(services: Arc<PaymentServices>, session: PaymentSession) -> Self {
        let reconciler = services.reconciler();
        Self {
            services,
            reconciler,
            session,
        }
    }

    pub fn start(services: Arc<PaymentServices>, session_id: impl Into<String>) -> Self {
        Self::new(services, PaymentSession::new(session_id))
    }

    pub fn session(&self) -> &PaymentSession {
        &self.session
    }

    pub fn into_session(self) -> PaymentSession {
        self.session
    }

    pub fn phase(&self) -> PaymentPhase {
        self.session.phase
    }

    pub fn booking_id(&self) -> Option<Uuid> {
        self.session.booking_id
    }

    fn set_phase(&mut self, phase: PaymentPhase) {
        if self.session.phase != phase {
            debug!(session_id = %self.session.session_id, from = %self.session.phase, to = %phase, "Payment phase");
        }
        self.session.phase = phase;
        self.session.touch();
    }

    fn phase_error(&self, operation: &'static str) -> BookingError {
        BookingError::PhaseOrder {
            operation,
            phase: self.session.phase,
        }
    }

    /// Create the booking for this session's draft, exactly once.
    pub async fn ensure_booking(&mut self, draft: BookingDraft) -> Result<Uuid, BookingError> {
        if let Some(id) = self.session.booking_id {
            return if self.session.draft.as_ref() == Some(&draft) {
                Ok(id)
            } else {
                Err(BookingError::SessionConflict(
                    "session already owns a booking for a different draft".to_string(),
                ))
            };
        }

        draft.validate_fields()?;
        let tour = self
            .services
            .catalog
            .get_tour(&draft.tour_id)
            .await?
            .ok_or_else(|| ValidationError::TourNotFound(draft.tour_id.clone()))?;
        let total_cents = validate_draft(&tour, &draft, Utc::now().date_naive())?;
        let split = self.services.deposit_policy.for_tour(&tour)?.split(total_cents)?;
        if split.deposit_cents <= 0 {
            return Err(ValidationError::DepositTooSmall(total_cents).into());
        }

        let currency = if tour.currency.trim().is_empty() {
            self.services.default_currency.clone()
        } else {
            tour.currency.clone()
        };

        let booking = self
            .services
            .reservations
            .create(NewBooking {
                idempotency_key: self.session.session_id.clone(),
                draft: draft.clone(),
                split,
                currency,
            })
            .await?;

        // The session key may already own a booking when the session record was lost.
        if !same_reservation(&booking, &draft) {
            return Err(BookingError::SessionConflict(
                "session key already used for a different booking".to_string(),
            ));
        }

        info!(
            booking_id = %booking.id,
            tour_id = %booking.tour_id,
            participants = booking.participants,
            total_cents = booking.total_cents,
            deposit_cents = booking.deposit_cents,
            "Booking ensured"
        );

        self.session.booking_id = Some(booking.id);
        self.session.draft = Some(draft);
        self.set_phase(PaymentPhase::from_status(booking.status));
        Ok(booking.id)
    }

    /// Re-check every registered gateway and list the methods the customer can pick now.
    pub async fn available_methods(&self, signals: &ClientSignals) -> Vec<MethodOption> {
        let mut options = Vec::new();
        for method in PaymentMethod::ALL {
            let Some(gateway) = self.services.gateways.for_method(method) else {
                continue;
            };
            if gateway.check_capability(signals).await.is_selectable() {
                options.push(MethodOption {
                    method,
                    family: method.family(),
                });
            }
        }
        options
    }

    /// Open a provider intent for the booking's deposit.
    pub async fn initiate_payment(
        &mut self,
        booking_id: Uuid,
        method: PaymentMethod,
        signals: &ClientSignals,
    ) -> Result<IntentHandle, BookingError> {
        let Some(current_id) = self.session.booking_id else {
            return Err(self.phase_error("initiate_payment"));
        };
        if current_id != booking_id {
            return Err(BookingError::SessionConflict(format!(
                "booking {} does not belong to this session",
                booking_id
            )));
        }
        if matches!(
            self.session.phase,
            PaymentPhase::Reconciling
                | PaymentPhase::Terminal(TerminalOutcome::Confirmed)
                | PaymentPhase::Terminal(TerminalOutcome::Cancelled)
        ) {
            return Err(self.phase_error("initiate_payment"));
        }

        let booking = self.services.reservations.get(booking_id).await?;
        if matches!(
            booking.status,
            BookingStatus::Confirmed | BookingStatus::Cancelled | BookingStatus::Processing
        ) {
            self.set_phase(PaymentPhase::from_status(booking.status));
            return Err(BookingError::NotPayable {
                status: booking.status,
            });
        }
        if booking.deposit_cents <= 0 {
            return Err(ValidationError::DepositTooSmall(booking.total_cents).into());
        }
        // Another session may have taken the date since this booking was created.
        if let Some(tour) = self.services.catalog.get_tour(&booking.tour_id).await? {
            if tour.is_occupied(booking.selected_date) {
                return Err(ValidationError::DateOccupied(booking.selected_date).into());
            }
        }

        let gateway = self
            .services
            .gateways
            .for_method(method)
            .ok_or(BookingError::MethodUnavailable(method))?;
        let capability = gateway.check_capability(signals).await;
        if !capability.is_selectable() {
            info!(booking_id = %booking_id, method = %method, ?capability, "Payment method not selectable");
            return Err(BookingError::MethodUnavailable(method));
        }

        if booking.status == BookingStatus::Failed {
            self.services
                .reservations
                .update(
                    booking_id,
                    BookingUpdate::status(BookingStatus::PendingPayment).with_failure_reason(None),
                )
                .await?;
        }

        self.set_phase(PaymentPhase::IntentRequested);
        self.session.attempts += 1;
        let request = IntentRequest {
            booking_id,
            method,
            amount_cents: booking.deposit_cents,
            currency: booking.currency.clone(),
            customer: booking.customer.clone(),
            description: self.describe(&booking).await,
            session_id: self.session.session_id.clone(),
            attempt: self.session.attempts,
        };

        let handle = match gateway.create_intent(&request).await {
            Ok(handle) => handle,
            Err(e) => {
                warn!(booking_id = %booking_id, method = %method, error = %e, "Intent creation failed");
                self.session.active_intent = None;
                self.set_phase(PaymentPhase::Idle);
                return Err(e.into());
            }
        };

        // Persist the intent before handing control back, so it can be recovered from the booking.
        if let Err(e) = self
            .services
            .reservations
            .update(
                booking_id,
                BookingUpdate::default().with_intent(handle.intent_id.clone(), method),
            )
            .await
        {
            warn!(booking_id = %booking_id, intent_id = %handle.intent_id, error = %e, "Failed to record intent");
            self.session.active_intent = None;
            self.set_phase(PaymentPhase::Idle);
            return Err(e.into());
        }

        info!(
            booking_id = %booking_id,
            intent_id = %handle.intent_id,
            method = %method,
            amount_cents = handle.amount_cents,
            attempt = self.session.attempts,
            "Payment intent created"
        );
        self.session.active_intent = Some(handle.clone());
        self.set_phase(PaymentPhase::AwaitingProviderAction);
        Ok(handle)
    }

    /// Hand provider callback data to the active adapter and reconcile the result.
    /// Safe to repeat with the same data.
    pub async fn complete_payment(&mut self, callback: CallbackData) -> Result<BookingSummary, BookingError> {
        let Some(booking_id) = self.session.booking_id else {
            return Err(self.phase_error("complete_payment"));
        };
        if self.session.phase == PaymentPhase::IntentRequested {
            return Err(self.phase_error("complete_payment"));
        }

        let booking = self.services.reservations.get(booking_id).await?;
        if booking.status.is_final() || booking.status == BookingStatus::Failed {
            // Already reconciled; a duplicate callback changes nothing.
            return Ok(self.settle_phase(&booking));
        }

        let Some(handle) = self.current_intent(&booking) else {
            return Err(self.phase_error("complete_payment"));
        };

        if !callback.carries_outcome() {
            debug!(booking_id = %booking_id, "Callback without outcome; nothing to reconcile");
            return Ok(BookingSummary::new(&booking, self.session.phase));
        }

        let gateway = self
            .services
            .gateways
            .for_method(handle.method)
            .ok_or(BookingError::MethodUnavailable(handle.method))?;

        // An earlier confirmation may have gone through without us seeing the answer.
        let unresolved = booking.status == BookingStatus::Processing
            || self.session.phase == PaymentPhase::Reconciling;

        self.set_phase(PaymentPhase::Reconciling);
        let outcome = match gateway.confirm(&handle, &callback).await {
            Ok(outcome) => outcome,
            Err(GatewayError::Rejected { reason }) if unresolved && callback != CallbackData::StatusPoll => {
                info!(
                    booking_id = %booking_id,
                    intent_id = %handle.intent_id,
                    reason = %reason,
                    "Confirmation refused after an unresolved attempt; reading provider status"
                );
                match gateway.confirm(&handle, &CallbackData::StatusPoll).await {
                    Ok(outcome) => outcome,
                    Err(e) if e.is_ambiguous() => return self.hold_unresolved(booking_id).await,
                    Err(e) => {
                        warn!(booking_id = %booking_id, intent_id = %handle.intent_id, error = %e, "Status read failed");
                        return Err(e.into());
                    }
                }
            }
            Err(GatewayError::Rejected { reason }) => ConfirmOutcome::failed(Some(reason)),
            Err(e) if e.is_ambiguous() => return self.hold_unresolved(booking_id).await,
            Err(e) => {
                warn!(booking_id = %booking_id, intent_id = %handle.intent_id, error = %e, "Confirmation failed");
                self.set_phase(PaymentPhase::AwaitingProviderAction);
                return Err(e.into());
            }
        };

        let updated = match self.reconciler.resolve(booking_id, &handle.intent_id, &outcome).await {
            Ok(updated) => updated,
            Err(e) => {
                self.set_phase(PaymentPhase::AwaitingProviderAction);
                return Err(e);
            }
        };

        let phase = match (outcome.status, updated.status) {
            (SettlementStatus::Cancelled, BookingStatus::PendingPayment) => {
                self.session.active_intent = None;
                PaymentPhase::Idle
            }
            (_, BookingStatus::PendingPayment) => PaymentPhase::AwaitingProviderAction,
            (_, status) => PaymentPhase::from_status(status),
        };
        self.set_phase(phase);
        Ok(BookingSummary::new(&updated, phase))
    }

    /// Cancel the reservation on the customer's request.
    pub async fn cancel_booking(&mut self) -> Result<BookingSummary, BookingError> {
        let Some(booking_id) = self.session.booking_id else {
            return Err(self.phase_error("cancel_booking"));
        };
        let booking = self.reconciler.cancel(booking_id).await?;
        self.session.active_intent = None;
        Ok(self.settle_phase(&booking))
    }

    /// Re-read the booking and align the phase with its persisted status.
    pub async fn refresh(&mut self) -> Result<BookingSummary, BookingError> {
        let Some(booking_id) = self.session.booking_id else {
            return Err(self.phase_error("refresh"));
        };
        let booking = self.services.reservations.get(booking_id).await?;
        if self.session.phase == PaymentPhase::IntentRequested {
            return Ok(BookingSummary::new(&booking, self.session.phase));
        }
        Ok(self.settle_phase(&booking))
    }

    /// Status and amounts for display, without touching the phase.
    pub async fn summary(&self) -> Result<BookingSummary, BookingError> {
        let Some(booking_id) = self.session.booking_id else {
            return Err(self.phase_error("summary"));
        };
        let booking = self.services.reservations.get(booking_id).await?;
        Ok(BookingSummary::new(&booking, self.session.phase))
    }

    async fn hold_unresolved(&mut self, booking_id: Uuid) -> Result<BookingSummary, BookingError> {
        // The stored booking is the source of truth; a webhook may already have settled it.
        let booking = self.services.reservations.get(booking_id).await?;
        if booking.status.is_final() || booking.status == BookingStatus::Failed {
            return Ok(self.settle_phase(&booking));
        }

        let held = self.reconciler.mark_unresolved(booking_id).await?;
        self.set_phase(PaymentPhase::Reconciling);
        Err(BookingError::OutcomeUnknown {
            booking_id,
            status: held.status,
        })
    }

    fn settle_phase(&mut self, booking: &Booking) -> BookingSummary {
        let phase = match booking.status {
            BookingStatus::PendingPayment if self.session.active_intent.is_some() => {
                PaymentPhase::AwaitingProviderAction
            }
            BookingStatus::Processing if self.session.phase == PaymentPhase::Reconciling => {
                PaymentPhase::Reconciling
            }
            status => PaymentPhase::from_status(status),
        };
        self.set_phase(phase);
        BookingSummary::new(booking, phase)
    }

    /// The session's active intent, or the one recorded on the booking after a lost session.
    fn current_intent(&self, booking: &Booking) -> Option<IntentHandle> {
        if let Some(handle) = &self.session.active_intent {
            if booking.payment_intent_id.as_deref() == Some(handle.intent_id.as_str()) {
                return Some(handle.clone());
            }
        }
        let intent_id = booking.payment_intent_id.as_deref()?;
        let method = booking.payment_method?;
        Some(IntentHandle::resume(
            intent_id,
            booking.id,
            method,
            booking.deposit_cents,
            booking.currency.clone(),
        ))
    }

    async fn describe(&self, booking: &Booking) -> String {
        let tour_name = match self.services.catalog.get_tour(&booking.tour_id).await {
            Ok(Some(tour)) => tour.display_name(&booking.language).to_string(),
            _ => booking.tour_id.clone(),
        };
        format!("Deposit for {} on {}", tour_name, booking.selected_date)
    }
}

fn same_reservation(booking: &Booking, draft: &BookingDraft) -> bool {
    booking.tour_id == draft.tour_id
        && booking.selected_date == draft.selected_date
        && booking.participants == draft.participants
        && booking.customer == draft.customer
}
