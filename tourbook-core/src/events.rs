use async_trait::async_trait;
use tokio::sync::Mutex;
use tourbook_shared::models::events::BookingEvent;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Failed to publish booking event: {0}")]
pub struct PublishError(pub String);

/// Sink for downstream effects of booking transitions (date blocking, notifications).
#[async_trait]
pub trait BookingEventPublisher: Send + Sync {
    async fn publish(&self, event: &BookingEvent) -> Result<(), PublishError>;
}

/// Writes events to the log only. Used when no broker is configured.
pub struct LogEventPublisher;

#[async_trait]
impl BookingEventPublisher for LogEventPublisher {
    async fn publish(&self, event: &BookingEvent) -> Result<(), PublishError> {
        info!(topic = event.topic(), booking_id = %event.booking_id(), "Booking event");
        Ok(())
    }
}

/// Keeps every published event in memory.
#[derive(Default)]
pub struct RecordingEventPublisher {
    events: Mutex<Vec<BookingEvent>>,
}

impl RecordingEventPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn events(&self) -> Vec<BookingEvent> {
        self.events.lock().await.clone()
    }
}

#[async_trait]
impl BookingEventPublisher for RecordingEventPublisher {
    async fn publish(&self, event: &BookingEvent) -> Result<(), PublishError> {
        self.events.lock().await.push(event.clone());
        Ok(())
    }
}
