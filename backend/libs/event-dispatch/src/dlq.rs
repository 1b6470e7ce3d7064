//! Dead-letter record written to `{topic}.dlq`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadLetter {
    pub source_topic: String,
    pub mode: Option<String>,
    pub event_id: Option<String>,
    pub error: String,
    pub attempts: u32,
    pub timestamp: DateTime<Utc>,
    /// The original payload; JSON when it parsed, otherwise the lossy text.
    pub payload: serde_json::Value,
}

impl DeadLetter {
    pub fn new(source_topic: impl Into<String>, error: impl Into<String>, raw: &[u8]) -> Self {
        let payload = serde_json::from_slice(raw).unwrap_or_else(|_| {
            serde_json::Value::String(String::from_utf8_lossy(raw).into_owned())
        });
        Self {
            source_topic: source_topic.into(),
            mode: None,
            event_id: None,
            error: error.into(),
            attempts: 0,
            timestamp: Utc::now(),
            payload,
        }
    }

    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }

    pub fn with_identity(mut self, mode: Option<String>, event_id: Option<String>) -> Self {
        self.mode = mode;
        self.event_id = event_id;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keeps_json_payload_structured() {
        let letter = DeadLetter::new("quill.comment", "boom", br#"{"mode":"set_comment_agree"}"#)
            .with_attempts(6)
            .with_identity(Some("set_comment_agree".into()), None);

        assert_eq!(letter.payload["mode"], "set_comment_agree");
        assert_eq!(letter.attempts, 6);
    }

    #[test]
    fn test_non_json_payload_kept_as_text() {
        let letter = DeadLetter::new("quill.comment", "boom", b"not json");
        assert_eq!(letter.payload, serde_json::Value::String("not json".into()));
    }
}
