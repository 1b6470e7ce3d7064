//! Kafka headers carried by every bus message.

use chrono::Utc;
use event_schema::EventEnvelope;
use rdkafka::message::{Header, Headers, Message, OwnedHeaders};
use std::time::Duration;

pub const HEADER_MODE: &str = "mode";
pub const HEADER_EVENT_ID: &str = "event_id";
pub const HEADER_ATTEMPT: &str = "attempt";
pub const HEADER_NOT_BEFORE: &str = "not_before";

/// Delivery metadata. `attempt` and `not_before` live only here so that a
/// redelivered payload stays byte-identical to the original.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DeliveryHeaders {
    pub mode: Option<String>,
    pub event_id: Option<String>,
    pub attempt: u32,
    /// Unix millis before which the message must not be dispatched.
    pub not_before: Option<i64>,
}

impl DeliveryHeaders {
    pub fn first(event: &EventEnvelope) -> Self {
        Self {
            mode: Some(event.mode.as_str().to_string()),
            event_id: Some(event.event_id.to_string()),
            attempt: 0,
            not_before: None,
        }
    }

    /// Headers for the redelivery of a failed message.
    pub fn redelivery(&self, attempt: u32, delay: Duration) -> Self {
        Self {
            mode: self.mode.clone(),
            event_id: self.event_id.clone(),
            attempt,
            not_before: Some(Utc::now().timestamp_millis() + delay.as_millis() as i64),
        }
    }

    pub fn from_message<M: Message>(message: &M) -> Self {
        let attempt = header_value(message, HEADER_ATTEMPT)
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        Self {
            mode: header_value(message, HEADER_MODE).map(str::to_string),
            event_id: header_value(message, HEADER_EVENT_ID).map(str::to_string),
            attempt,
            not_before: header_value(message, HEADER_NOT_BEFORE).and_then(|v| v.parse().ok()),
        }
    }

    pub fn to_owned_headers(&self) -> OwnedHeaders {
        let attempt = self.attempt.to_string();
        let not_before = self.not_before.map(|ms| ms.to_string());
        OwnedHeaders::new()
            .insert(Header {
                key: HEADER_MODE,
                value: self.mode.as_deref(),
            })
            .insert(Header {
                key: HEADER_EVENT_ID,
                value: self.event_id.as_deref(),
            })
            .insert(Header {
                key: HEADER_ATTEMPT,
                value: Some(attempt.as_str()),
            })
            .insert(Header {
                key: HEADER_NOT_BEFORE,
                value: not_before.as_deref(),
            })
    }

    /// Time left until `not_before`, if it lies in the future.
    pub fn remaining_delay(&self) -> Option<Duration> {
        let not_before = self.not_before?;
        let now = Utc::now().timestamp_millis();
        (not_before > now).then(|| Duration::from_millis((not_before - now) as u64))
    }
}

pub fn header_value<'a, M: Message>(message: &'a M, key: &str) -> Option<&'a str> {
    message
        .headers()
        .and_then(|headers| {
            headers
                .iter()
                .find(|header| header.key == key)
                .and_then(|header| header.value)
        })
        .and_then(|value| std::str::from_utf8(value).ok())
}
