//! Kafka consumer runner.
//!
//! Main-topic workers share one consumer group. Each redelivery tier has its
//! own topic and consumer, which holds a message until its `not_before`
//! header has passed. Offsets are committed only after the outcome has been
//! acted on.

use crate::dispatcher::{Dispatcher, Outcome};
use crate::dlq::DeadLetter;
use crate::headers::DeliveryHeaders;
use crate::publisher::KafkaEventPublisher;
use event_schema::{dead_letter_topic, retry_topic};
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::error::KafkaError;
use rdkafka::message::{BorrowedMessage, Message};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

const REPUBLISH_BACKOFF: Duration = Duration::from_secs(1);
const MAX_REPUBLISH_BACKOFF: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    pub brokers: String,
    pub group_id: String,
    /// Home topic; tier and dead-letter topics are derived from it.
    pub topic: String,
    pub workers: usize,
}

pub struct KafkaDispatchRunner {
    config: ConsumerConfig,
    dispatcher: Arc<Dispatcher>,
    publisher: KafkaEventPublisher,
}

impl KafkaDispatchRunner {
    pub fn new(
        config: ConsumerConfig,
        dispatcher: Arc<Dispatcher>,
        publisher: KafkaEventPublisher,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            dispatcher,
            publisher,
        })
    }

    /// Spawn the main-topic workers and one consumer per tier topic.
    pub fn spawn(self: &Arc<Self>, tasks: &mut JoinSet<()>) {
        let workers = self.config.workers.max(1);
        for worker in 0..workers {
            let runner = Arc::clone(self);
            let topic = self.config.topic.clone();
            tasks.spawn(async move { runner.run(topic, worker).await });
        }

        for tier in 0..self.dispatcher.policy().tiers().len() {
            let runner = Arc::clone(self);
            let topic = retry_topic(&self.config.topic, tier);
            tasks.spawn(async move { runner.run(topic, 0).await });
        }

        info!(
            topic = %self.config.topic,
            workers,
            tiers = self.dispatcher.policy().tiers().len(),
            "Event dispatch consumers started"
        );
    }

    async fn run(self: Arc<Self>, topic: String, worker: usize) {
        if let Err(err) = self.run_inner(&topic, worker).await {
            error!(topic = %topic, worker, "Event consumer terminated with error: {err}");
        }
    }

    async fn run_inner(&self, topic: &str, worker: usize) -> Result<(), KafkaError> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &self.config.brokers)
            .set("group.id", &self.config.group_id)
            .set("client.id", format!("{}-{}", self.config.group_id, worker))
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", "earliest")
            .set("enable.partition.eof", "false")
            .set("session.timeout.ms", "45000")
            .set("max.poll.interval.ms", "300000")
            .create()?;

        consumer.subscribe(&[topic])?;

        loop {
            match consumer.recv().await {
                Ok(record) => {
                    self.process(&record).await;

                    if let Err(commit_err) = consumer.commit_message(&record, CommitMode::Async) {
                        warn!("Failed to commit Kafka offset: {}", commit_err);
                    }
                }
                Err(err) => {
                    error!("Kafka error: {}", err);
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }
    }

    async fn process(&self, record: &BorrowedMessage<'_>) {
        let headers = DeliveryHeaders::from_message(record);
        if let Some(delay) = headers.remaining_delay() {
            tokio::time::sleep(delay).await;
        }

        let Some(raw) = record.payload() else {
            warn!(topic = %record.topic(), "Discarding Kafka message with empty payload");
            return;
        };

        let outcome = self.dispatcher.dispatch_raw(raw, headers.attempt).await;
        self.settle(record.key(), raw, &headers, outcome).await;
    }

    async fn settle(
        &self,
        key: Option<&[u8]>,
        raw: &[u8],
        headers: &DeliveryHeaders,
        outcome: Outcome,
    ) {
        match outcome {
            Outcome::Ack | Outcome::Discard { .. } => {}
            Outcome::Redeliver {
                attempt,
                tier,
                delay,
                reason,
            } => {
                let topic = retry_topic(&self.config.topic, tier);
                info!(
                    topic = %topic,
                    event_id = ?headers.event_id,
                    attempt,
                    delay_secs = delay.as_secs(),
                    reason = %reason,
                    "Scheduling event redelivery"
                );
                let next = headers.redelivery(attempt, delay);
                self.republish(&topic, key, raw, &next).await;
            }
            Outcome::DeadLetter { attempts, reason } => {
                let topic = dead_letter_topic(&self.config.topic);
                error!(
                    topic = %topic,
                    event_id = ?headers.event_id,
                    attempts,
                    reason = %reason,
                    "Redelivery budget spent, dead-lettering event"
                );
                let letter = DeadLetter::new(self.config.topic.clone(), reason, raw)
                    .with_attempts(attempts)
                    .with_identity(headers.mode.clone(), headers.event_id.clone());
                match serde_json::to_vec(&letter) {
                    Ok(body) => {
                        let dlq_headers = DeliveryHeaders {
                            attempt: attempts,
                            not_before: None,
                            ..headers.clone()
                        };
                        self.republish(&topic, key, &body, &dlq_headers).await;
                    }
                    Err(e) => error!(error = %e, "Failed to serialize dead letter"),
                }
            }
        }
    }

    /// Keep trying until the message is handed to Kafka; the offset of the
    /// source message must not be committed before that.
    async fn republish(
        &self,
        topic: &str,
        key: Option<&[u8]>,
        payload: &[u8],
        headers: &DeliveryHeaders,
    ) {
        let mut backoff = REPUBLISH_BACKOFF;
        loop {
            match self.publisher.send_raw(topic, key, payload, headers).await {
                Ok(()) => return,
                Err(e) => {
                    warn!(
                        topic = %topic,
                        error = %e,
                        retry_in_secs = backoff.as_secs(),
                        "Republish failed"
                    );
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(MAX_REPUBLISH_BACKOFF);
                }
            }
        }
    }
}
