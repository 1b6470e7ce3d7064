//! Moderation correlation headers.
//!
//! The external reviewer echoes these headers back on its verdict callback.
//! They are the only link between a verdict and the entity it judges, so a
//! verdict whose headers do not parse is never trusted.

use std::collections::BTreeMap;

pub const HEADER_UUID: &str = "x-review-uuid";
pub const HEADER_ENTITY_ID: &str = "x-review-entity-id";
pub const HEADER_PARENT_ID: &str = "x-review-parent-id";
pub const HEADER_SUBJECT: &str = "x-review-subject";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CorrelationError {
    #[error("missing correlation header {0}")]
    Missing(&'static str),
    #[error("invalid correlation header {header}: {value:?}")]
    Invalid { header: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewCorrelation {
    /// Owner of the entity under review
    pub uuid: String,
    pub entity_id: i64,
    /// Creation id for comments, root id for sub-comments, 0 for creations
    pub parent_id: i64,
    /// `comment`, `sub_comment`, `article`, `column` or `talk`
    pub subject: String,
}

impl ReviewCorrelation {
    pub fn to_headers(&self) -> BTreeMap<String, String> {
        let mut headers = BTreeMap::new();
        headers.insert(HEADER_UUID.to_string(), self.uuid.clone());
        headers.insert(HEADER_ENTITY_ID.to_string(), self.entity_id.to_string());
        headers.insert(HEADER_PARENT_ID.to_string(), self.parent_id.to_string());
        headers.insert(HEADER_SUBJECT.to_string(), self.subject.clone());
        headers
    }

    pub fn from_headers(headers: &BTreeMap<String, String>) -> Result<Self, CorrelationError> {
        let uuid = required(headers, HEADER_UUID)?;
        let subject = required(headers, HEADER_SUBJECT)?;
        let entity_id = parse_id(headers, HEADER_ENTITY_ID)?;
        let parent_id = parse_id(headers, HEADER_PARENT_ID)?;

        if entity_id <= 0 {
            return Err(CorrelationError::Invalid {
                header: HEADER_ENTITY_ID,
                value: entity_id.to_string(),
            });
        }
        if parent_id < 0 {
            return Err(CorrelationError::Invalid {
                header: HEADER_PARENT_ID,
                value: parent_id.to_string(),
            });
        }

        Ok(Self {
            uuid: uuid.to_string(),
            entity_id,
            parent_id,
            subject: subject.to_string(),
        })
    }
}

fn required<'a>(
    headers: &'a BTreeMap<String, String>,
    name: &'static str,
) -> Result<&'a str, CorrelationError> {
    headers
        .get(name)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .ok_or(CorrelationError::Missing(name))
}

fn parse_id(headers: &BTreeMap<String, String>, name: &'static str) -> Result<i64, CorrelationError> {
    let raw = required(headers, name)?;
    raw.parse::<i64>().map_err(|_| CorrelationError::Invalid {
        header: name,
        value: raw.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ReviewCorrelation {
        ReviewCorrelation {
            uuid: "u1".to_string(),
            entity_id: 7,
            parent_id: 10,
            subject: "comment".to_string(),
        }
    }

    #[test]
    fn test_headers_parse_back() {
        let headers = sample().to_headers();
        assert_eq!(ReviewCorrelation::from_headers(&headers), Ok(sample()));
    }

    #[test]
    fn test_missing_uuid_is_rejected() {
        let mut headers = sample().to_headers();
        headers.remove(HEADER_UUID);
        assert_eq!(
            ReviewCorrelation::from_headers(&headers),
            Err(CorrelationError::Missing(HEADER_UUID))
        );
    }

    #[test]
    fn test_blank_and_garbage_values_are_rejected() {
        let mut headers = sample().to_headers();
        headers.insert(HEADER_SUBJECT.to_string(), "   ".to_string());
        assert!(matches!(
            ReviewCorrelation::from_headers(&headers),
            Err(CorrelationError::Missing(HEADER_SUBJECT))
        ));

        let mut headers = sample().to_headers();
        headers.insert(HEADER_ENTITY_ID.to_string(), "seven".to_string());
        assert!(matches!(
            ReviewCorrelation::from_headers(&headers),
            Err(CorrelationError::Invalid { header: HEADER_ENTITY_ID, .. })
        ));

        let mut headers = sample().to_headers();
        headers.insert(HEADER_ENTITY_ID.to_string(), "0".to_string());
        assert!(ReviewCorrelation::from_headers(&headers).is_err());
    }
}
