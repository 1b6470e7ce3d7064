/// Event schema shared by every service on the bus
///
/// An event is an immutable `{mode, payload}` message. The publisher emits it
/// once per triggering action; consumers may see it more than once, so every
/// handler must tolerate replays. `event_id` stays stable across redeliveries
/// and is what handlers key their idempotency markers on.
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use uuid::Uuid;

pub mod facade;
pub mod mode;
pub mod review;

pub use mode::{CommentKind, CreationKind, EventMode, UnknownMode};
pub use review::{CorrelationError, ReviewCorrelation};

/// Current schema version for all events
pub const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, thiserror::Error)]
pub enum EnvelopeError {
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Event payload must serialize to a JSON object")]
    NotAMap,
}

/// Base event envelope for all bus messages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// Unique event ID, reused by every redelivery of the same event
    pub event_id: Uuid,
    /// Handler selector
    pub mode: EventMode,
    /// Source service that generated the event
    pub source: String,
    pub timestamp: DateTime<Utc>,
    pub schema_version: u32,
    /// Key-value payload, decoded by the handler bound to `mode`
    #[serde(default)]
    pub payload: Map<String, Value>,
}

impl EventEnvelope {
    pub fn new<T: Serialize>(
        source: impl Into<String>,
        mode: EventMode,
        payload: &T,
    ) -> Result<Self, EnvelopeError> {
        let payload = match serde_json::to_value(payload)? {
            Value::Object(map) => map,
            _ => return Err(EnvelopeError::NotAMap),
        };

        Ok(Self {
            event_id: Uuid::new_v4(),
            mode,
            source: source.into(),
            timestamp: Utc::now(),
            schema_version: SCHEMA_VERSION,
            payload,
        })
    }

    pub fn with_event_id(mut self, event_id: Uuid) -> Self {
        self.event_id = event_id;
        self
    }

    /// Decode the payload into the struct the handler expects.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, EnvelopeError> {
        Ok(serde_json::from_value(Value::Object(self.payload.clone()))?)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, EnvelopeError> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_slice(raw: &[u8]) -> Result<Self, EnvelopeError> {
        Ok(serde_json::from_slice(raw)?)
    }
}

/// Topic layout. Each mode has exactly one home topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topics {
    pub comment: String,
    pub creation: String,
    pub search: String,
}

impl Topics {
    pub fn with_prefix(prefix: &str) -> Self {
        Self {
            comment: format!("{}.comment", prefix),
            creation: format!("{}.creation", prefix),
            search: format!("{}.search", prefix),
        }
    }

    pub fn for_mode(&self, mode: EventMode) -> &str {
        use EventMode::*;
        match mode {
            CommentReviewRequest
            | CommentReviewResult
            | CreateCommentDbCacheAndSearch
            | CreateSubCommentDbCacheAndSearch
            | RemoveCommentCache
            | RemoveSubCommentCache
            | SetCommentAgree
            | CancelCommentAgree => &self.comment,
            CreationReviewRequest
            | CreationReviewResult
            | CreateCreationDbCacheAndSearch
            | UpdateCreationSearch
            | RemoveCreationCache
            | SetCreationAgree
            | CancelCreationAgree
            | SetCreationCollect
            | CancelCreationCollect
            | AddCreationView => &self.creation,
            SearchIndex | SearchRemove => &self.search,
        }
    }
}

/// Topic holding redeliveries for the given delay tier (0-based).
pub fn retry_topic(topic: &str, tier: usize) -> String {
    format!("{}.retry.{}", topic, tier)
}

pub fn dead_letter_topic(topic: &str) -> String {
    format!("{}.dlq", topic)
}

// ============================================================================
// MODERATION EVENTS
// ============================================================================

/// Ask the external reviewer to judge a piece of text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewRequestEvent {
    pub subject: String,
    pub entity_id: i64,
    pub uuid: String,
    pub parent_id: i64,
    pub text: String,
}

impl ReviewRequestEvent {
    pub fn correlation(&self) -> ReviewCorrelation {
        ReviewCorrelation {
            uuid: self.uuid.clone(),
            entity_id: self.entity_id,
            parent_id: self.parent_id,
            subject: self.subject.clone(),
        }
    }
}

/// Reviewer verdict as delivered by the moderation callback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewResultEvent {
    pub job_id: String,
    pub passed: bool,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub result: String,
    #[serde(default)]
    pub correlation: BTreeMap<String, String>,
}

// ============================================================================
// COMMENT SERVICE EVENTS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommentEvent {
    pub id: i64,
    pub uuid: String,
    pub creation_id: i64,
    pub creation_type: i16,
    pub creation_author: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubCommentEvent {
    pub id: i64,
    pub uuid: String,
    pub creation_id: i64,
    pub creation_type: i16,
    pub creation_author: String,
    pub root_id: i64,
    pub root_uuid: String,
    pub parent_id: i64,
    pub reply_uuid: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    /// Agree total at deletion, set on removal events only
    #[serde(default)]
    pub agree: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommentRemovedEvent {
    pub comment: CommentEvent,
    /// Agree total of the comment itself at deletion
    #[serde(default)]
    pub agree: i64,
    #[serde(default)]
    pub replies: Vec<SubCommentEvent>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommentAgreeEvent {
    pub comment_id: i64,
    /// User who agreed
    pub uuid: String,
    /// Author of the agreed comment
    pub author: String,
    pub creation_id: i64,
    pub creation_type: i16,
    /// Set when the target is a reply
    pub root_id: Option<i64>,
}

// ============================================================================
// CREATION SERVICE EVENTS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreationEvent {
    pub id: i64,
    pub uuid: String,
    pub kind: CreationKind,
    pub title: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreationRemovedEvent {
    pub creation: CreationEvent,
    /// Users whose collection feeds held the creation
    #[serde(default)]
    pub collectors: Vec<String>,
    /// Totals at deletion time, unwound from the author's counters
    #[serde(default)]
    pub counts: facade::CreationCounts,
}

/// Agree, collect or view on a creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreationInteractionEvent {
    pub creation_id: i64,
    pub kind: CreationKind,
    pub author: String,
    /// Acting user, empty for anonymous views
    #[serde(default)]
    pub uuid: String,
}

// ============================================================================
// SEARCH PROJECTION EVENTS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchDocumentEvent {
    pub index: String,
    pub id: i64,
    pub uuid: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchRemovalEvent {
    pub index: String,
    pub id: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn comment() -> CommentEvent {
        CommentEvent {
            id: 1,
            uuid: "u1".to_string(),
            creation_id: 10,
            creation_type: 1,
            creation_author: "u1".to_string(),
            content: "first".to_string(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_envelope_payload_is_flat_map() {
        let env = EventEnvelope::new("comment-service", EventMode::CreateCommentDbCacheAndSearch, &comment()).unwrap();
        assert_eq!(env.payload.get("creation_id"), Some(&Value::from(10)));
        assert_eq!(env.schema_version, SCHEMA_VERSION);

        let decoded: CommentEvent = env.decode().unwrap();
        assert_eq!(decoded, comment());
    }

    #[test]
    fn test_envelope_rejects_scalar_payload() {
        let err = EventEnvelope::new("x", EventMode::SearchRemove, &42).unwrap_err();
        assert!(matches!(err, EnvelopeError::NotAMap));
    }

    #[test]
    fn test_unknown_mode_fails_to_decode() {
        let raw = br#"{"event_id":"6f1c2c4e-1b0b-4a4e-9a39-2c7b1c7a0e11","mode":"nope","source":"x","timestamp":"2024-01-01T00:00:00Z","schema_version":1,"payload":{}}"#;
        assert!(EventEnvelope::from_slice(raw).is_err());
    }

    #[test]
    fn test_topics_route_modes() {
        let topics = Topics::with_prefix("quill");
        assert_eq!(topics.for_mode(EventMode::SetCommentAgree), "quill.comment");
        assert_eq!(topics.for_mode(EventMode::AddCreationView), "quill.creation");
        assert_eq!(topics.for_mode(EventMode::SearchIndex), "quill.search");
        assert_eq!(retry_topic("quill.comment", 2), "quill.comment.retry.2");
        assert_eq!(dead_letter_topic("quill.comment"), "quill.comment.dlq");
    }
}
