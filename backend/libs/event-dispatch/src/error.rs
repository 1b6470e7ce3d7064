use resilience::TimeoutError;
use thiserror::Error;

/// Failure reported by an event handler.
#[derive(Error, Debug)]
pub enum HandlerError {
    /// Transient failure; the event is redelivered after a delay tier.
    #[error("retryable: {0:#}")]
    Retryable(#[from] anyhow::Error),

    /// The event can never succeed (bad payload, untrusted callback); it is
    /// logged and dropped.
    #[error("malformed event: {0}")]
    Malformed(String),
}

impl HandlerError {
    pub fn malformed(reason: impl Into<String>) -> Self {
        HandlerError::Malformed(reason.into())
    }
}

#[derive(Error, Debug)]
pub enum PublishError {
    #[error("Kafka error: {0}")]
    Kafka(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] event_schema::EnvelopeError),

    #[error("Publish timeout: {0}")]
    Timeout(#[from] TimeoutError),

    #[error("Bus unavailable: {0}")]
    Unavailable(String),
}
