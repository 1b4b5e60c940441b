use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::booking::{Booking, BookingUpdate, NewBooking};
use crate::repository::{IntentRecord, RepositoryError, ReservationRepository};

#[derive(Default)]
struct Tables {
    bookings: HashMap<Uuid, Booking>,
    by_key: HashMap<String, Uuid>,
    intents: HashMap<String, IntentRecord>,
}

/// In-process reservation store for development mode and tests.
#[derive(Default)]
pub struct InMemoryReservationRepository {
    tables: RwLock<Tables>,
    offline: AtomicBool,
}

impl InMemoryReservationRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate the store being unreachable.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub async fn count(&self) -> usize {
        self.tables.read().await.bookings.len()
    }

    fn check_online(&self) -> Result<(), RepositoryError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(RepositoryError::Unavailable("in-memory store offline".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl ReservationRepository for InMemoryReservationRepository {
    async fn create(&self, new: NewBooking) -> Result<Booking, RepositoryError> {
        self.check_online()?;
        let mut tables = self.tables.write().await;

        if let Some(existing) = tables.by_key.get(&new.idempotency_key) {
            if let Some(booking) = tables.bookings.get(existing) {
                return Ok(booking.clone());
            }
        }

        let id = Uuid::new_v4();
        let key = new.idempotency_key.clone();
        let booking = Booking::from_new(id, new);
        tables.by_key.insert(key, id);
        tables.bookings.insert(id, booking.clone());
        Ok(booking)
    }

    async fn get(&self, id: Uuid) -> Result<Booking, RepositoryError> {
        self.check_online()?;
        self.tables
            .read()
            .await
            .bookings
            .get(&id)
            .cloned()
            .ok_or(RepositoryError::NotFound(id))
    }

    async fn update(&self, id: Uuid, update: BookingUpdate) -> Result<Booking, RepositoryError> {
        self.check_online()?;
        let mut tables = self.tables.write().await;
        let booking = tables
            .bookings
            .get_mut(&id)
            .ok_or(RepositoryError::NotFound(id))?;
        booking.apply(&update)?;
        let updated = booking.clone();

        if let (Some(intent_id), Some(method)) = (&update.payment_intent_id, update.payment_method) {
            tables
                .intents
                .entry(intent_id.clone())
                .or_insert_with(|| IntentRecord {
                    intent_id: intent_id.clone(),
                    booking_id: id,
                    method,
                    recorded_at: updated.updated_at,
                });
        }
        Ok(updated)
    }

    async fn find_intent(&self, intent_id: &str) -> Result<Option<IntentRecord>, RepositoryError> {
        self.check_online()?;
        Ok(self.tables.read().await.intents.get(intent_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::booking::tests::sample_draft;
    use crate::booking::{BookingStatus, PriceSplit};
    use crate::payment::PaymentMethod;

    fn new_booking(key: &str) -> NewBooking {
        NewBooking {
            idempotency_key: key.to_string(),
            draft: sample_draft(),
            split: PriceSplit {
                total_cents: 10000,
                deposit_cents: 3000,
                remaining_cents: 7000,
            },
            currency: "EUR".to_string(),
        }
    }

    #[tokio::test]
    async fn test_create_is_idempotent_per_key() {
        let repo = InMemoryReservationRepository::new();
        let first = repo.create(new_booking("session-a")).await.unwrap();
        let second = repo.create(new_booking("session-a")).await.unwrap();
        let other = repo.create(new_booking("session-b")).await.unwrap();

        assert_eq!(first.id, second.id);
        assert_ne!(first.id, other.id);
        assert_eq!(repo.count().await, 2);
    }

    #[tokio::test]
    async fn test_update_and_find_intent() {
        let repo = InMemoryReservationRepository::new();
        let booking = repo.create(new_booking("session-a")).await.unwrap();

        repo.update(
            booking.id,
            BookingUpdate::status(BookingStatus::PendingPayment).with_intent("pi_1", PaymentMethod::Card),
        )
        .await
        .unwrap();

        let found = repo.find_intent("pi_1").await.unwrap().unwrap();
        assert_eq!(found.booking_id, booking.id);
        assert_eq!(found.method, PaymentMethod::Card);
        assert!(repo.find_intent("pi_2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_superseded_intent_stays_resolvable() {
        let repo = InMemoryReservationRepository::new();
        let booking = repo.create(new_booking("session-a")).await.unwrap();
        repo.update(booking.id, BookingUpdate::default().with_intent("pi_1", PaymentMethod::Card))
            .await
            .unwrap();
        let current = repo
            .update(booking.id, BookingUpdate::default().with_intent("PAY-2", PaymentMethod::Redirect))
            .await
            .unwrap();
        assert_eq!(current.payment_intent_id.as_deref(), Some("PAY-2"));

        let first = repo.find_intent("pi_1").await.unwrap().unwrap();
        assert_eq!(first.booking_id, booking.id);
        assert_eq!(first.method, PaymentMethod::Card);
    }

    #[tokio::test]
    async fn test_update_rejects_invalid_transition() {
        let repo = InMemoryReservationRepository::new();
        let booking = repo.create(new_booking("session-a")).await.unwrap();
        repo.update(booking.id, BookingUpdate::status(BookingStatus::Confirmed))
            .await
            .unwrap();

        let result = repo
            .update(booking.id, BookingUpdate::status(BookingStatus::Processing))
            .await;
        assert!(matches!(result, Err(RepositoryError::InvalidTransition(_))));
    }

    #[tokio::test]
    async fn test_offline_store_surfaces_unavailable() {
        let repo = InMemoryReservationRepository::new();
        repo.set_offline(true);
        let result = repo.create(new_booking("session-a")).await;
        assert!(matches!(result, Err(RepositoryError::Unavailable(_))));
    }
}
