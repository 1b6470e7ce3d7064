//! Bus publishers.

use crate::error::PublishError;
use crate::headers::DeliveryHeaders;
use crate::metrics::DispatchMetrics;
use event_schema::{EventEnvelope, EventMode, Topics};
use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, warn};

/// Publish side of the message bus.
///
/// `key` selects the partition; callers pass the entity id so events for one
/// entity stay on one partition.
#[async_trait::async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, key: &str, event: &EventEnvelope) -> Result<(), PublishError>;
}

#[derive(Debug, Clone)]
pub struct KafkaPublisherConfig {
    pub brokers: String,
    pub client_id: String,
    pub topics: Topics,
    pub send_timeout: Duration,
}

/// Kafka producer with idempotence enabled.
#[derive(Clone)]
pub struct KafkaEventPublisher {
    producer: FutureProducer,
    topics: Topics,
    send_timeout: Duration,
    metrics: DispatchMetrics,
}

impl KafkaEventPublisher {
    pub fn new(config: &KafkaPublisherConfig) -> Result<Self, PublishError> {
        let producer = ClientConfig::new()
            .set("bootstrap.servers", &config.brokers)
            .set("client.id", &config.client_id)
            .set("enable.idempotence", "true")
            .set("acks", "all")
            .set("max.in.flight.requests.per.connection", "5")
            .set("retries", "3")
            .set("linger.ms", "5")
            .create::<FutureProducer>()
            .map_err(|e| PublishError::Kafka(e.to_string()))?;

        Ok(Self {
            producer,
            topics: config.topics.clone(),
            send_timeout: config.send_timeout,
            metrics: DispatchMetrics,
        })
    }

    pub fn topics(&self) -> &Topics {
        &self.topics
    }

    /// Send an already encoded payload with explicit delivery headers. Used
    /// for redelivery and dead-lettering, where the payload must stay intact.
    pub async fn send_raw(
        &self,
        topic: &str,
        key: Option<&[u8]>,
        payload: &[u8],
        headers: &DeliveryHeaders,
    ) -> Result<(), PublishError> {
        let mut record = FutureRecord::<[u8], [u8]>::to(topic)
            .payload(payload)
            .headers(headers.to_owned_headers());
        if let Some(key) = key {
            record = record.key(key);
        }

        self.producer
            .send(record, self.send_timeout)
            .await
            .map(|_| ())
            .map_err(|(err, _)| PublishError::Kafka(err.to_string()))
    }
}

#[async_trait::async_trait]
impl EventPublisher for KafkaEventPublisher {
    async fn publish(&self, key: &str, event: &EventEnvelope) -> Result<(), PublishError> {
        let payload = event.to_bytes()?;
        let topic = self.topics.for_mode(event.mode);

        match self
            .send_raw(
                topic,
                Some(key.as_bytes()),
                &payload,
                &DeliveryHeaders::first(event),
            )
            .await
        {
            Ok(()) => {
                self.metrics.record_publish(event.mode.as_str(), "ok");
                debug!(
                    mode = %event.mode,
                    event_id = %event.event_id,
                    topic = %topic,
                    partition_key = %key,
                    "Published event to Kafka"
                );
                Ok(())
            }
            Err(err) => {
                self.metrics.record_publish(event.mode.as_str(), "error");
                warn!(
                    error = %err,
                    mode = %event.mode,
                    event_id = %event.event_id,
                    "Failed to publish event to Kafka"
                );
                Err(err)
            }
        }
    }
}

/// In-process publisher that records every event. Used when no brokers are
/// configured and in tests.
#[derive(Clone, Default)]
pub struct MemoryEventPublisher {
    published: Arc<Mutex<Vec<(String, EventEnvelope)>>>,
    failing: Arc<AtomicBool>,
}

impl MemoryEventPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent publish fail with `PublishError::Unavailable`.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn events(&self) -> Vec<EventEnvelope> {
        self.lock().iter().map(|(_, e)| e.clone()).collect()
    }

    pub fn keyed_events(&self) -> Vec<(String, EventEnvelope)> {
        self.lock().clone()
    }

    pub fn modes(&self) -> Vec<EventMode> {
        self.lock().iter().map(|(_, e)| e.mode).collect()
    }

    /// Drain and return everything published so far.
    pub fn take(&self) -> Vec<EventEnvelope> {
        self.lock().drain(..).map(|(_, e)| e).collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<(String, EventEnvelope)>> {
        match self.published.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[async_trait::async_trait]
impl EventPublisher for MemoryEventPublisher {
    async fn publish(&self, key: &str, event: &EventEnvelope) -> Result<(), PublishError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(PublishError::Unavailable("memory bus set to fail".to_string()));
        }
        self.lock().push((key.to_string(), event.clone()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_publisher_records_and_fails_on_demand() {
        let bus = MemoryEventPublisher::new();
        let event = EventEnvelope::new(
            "creation-service",
            EventMode::AddCreationView,
            &serde_json::json!({"creation_id": 3}),
        )
        .unwrap();

        bus.publish("3", &event).await.unwrap();
        bus.set_failing(true);
        assert!(matches!(
            bus.publish("3", &event).await,
            Err(PublishError::Unavailable(_))
        ));

        assert_eq!(bus.modes(), vec![EventMode::AddCreationView]);
        assert_eq!(bus.keyed_events()[0].0, "3");
        assert_eq!(bus.take().len(), 1);
        assert!(bus.events().is_empty());
    }
}
