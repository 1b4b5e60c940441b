use async_trait::async_trait;
use chrono::NaiveDate;
use std::sync::Arc;
use tourbook_core::{BookingEventPublisher, PublishError, RepositoryError};
use tourbook_shared::models::events::BookingEvent;
use tracing::{debug, error, info};

use crate::tour::StaticCatalog;

/// Catalog-side write path for departure dates.
#[async_trait]
pub trait OccupancyLedger: Send + Sync {
    /// Mark a departure as taken. `false` when it already was, or the tour is unknown.
    async fn block_date(&self, tour_id: &str, date: NaiveDate) -> Result<bool, RepositoryError>;
}

#[async_trait]
impl OccupancyLedger for StaticCatalog {
    async fn block_date(&self, tour_id: &str, date: NaiveDate) -> Result<bool, RepositoryError> {
        Ok(self.mark_occupied(tour_id, date).await)
    }
}

/// Consumes booking events for the catalog: a confirmed booking takes its date.
/// Every event is then handed to the next publisher unchanged.
pub struct OccupancyBlocker {
    ledger: Arc<dyn OccupancyLedger>,
    next: Arc<dyn BookingEventPublisher>,
}

impl OccupancyBlocker {
    pub fn new(ledger: Arc<dyn OccupancyLedger>, next: Arc<dyn BookingEventPublisher>) -> Self {
        Self { ledger, next }
    }
}

#[async_trait]
impl BookingEventPublisher for OccupancyBlocker {
    async fn publish(&self, event: &BookingEvent) -> Result<(), PublishError> {
        if let BookingEvent::Confirmed(confirmed) = event {
            match self
                .ledger
                .block_date(&confirmed.tour_id, confirmed.selected_date)
                .await
            {
                Ok(true) => info!(
                    booking_id = %confirmed.booking_id,
                    tour_id = %confirmed.tour_id,
                    date = %confirmed.selected_date,
                    "Departure date blocked"
                ),
                Ok(false) => debug!(tour_id = %confirmed.tour_id, date = %confirmed.selected_date, "Date already blocked"),
                Err(e) => error!(
                    booking_id = %confirmed.booking_id,
                    tour_id = %confirmed.tour_id,
                    error = %e,
                    "Failed to block departure date"
                ),
            }
        }
        self.next.publish(event).await
    }
}
