use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use std::time::Duration;
use tourbook_core::{BookingEventPublisher, PublishError};
use tourbook_shared::models::events::BookingEvent;
use tracing::{error, info};

#[derive(Clone)]
pub struct KafkaEventPublisher {
    producer: FutureProducer,
}

impl KafkaEventPublisher {
    pub fn new(brokers: &str) -> Result<Self, rdkafka::error::KafkaError> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("message.timeout.ms", "5000")
            .create()?;

        Ok(Self { producer })
    }
}

#[async_trait]
impl BookingEventPublisher for KafkaEventPublisher {
    async fn publish(&self, event: &BookingEvent) -> Result<(), PublishError> {
        let topic = event.topic();
        let key = event.booking_id().to_string();
        let payload = serde_json::to_string(event).map_err(|e| PublishError(e.to_string()))?;

        // Keyed by booking so one booking's events stay ordered within a partition.
        let record = FutureRecord::to(topic).key(&key).payload(&payload);

        match self.producer.send(record, Timeout::After(Duration::from_secs(0))).await {
            Ok(delivery) => {
                info!(
                    topic,
                    booking_id = %key,
                    partition = delivery.partition,
                    offset = delivery.offset,
                    "Booking event sent"
                );
                Ok(())
            }
            Err((e, _msg)) => {
                error!(topic, booking_id = %key, "Failed to send booking event: {}", e);
                Err(PublishError(e.to_string()))
            }
        }
    }
}
