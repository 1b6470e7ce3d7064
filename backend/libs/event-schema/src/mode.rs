//! Closed set of bus message kinds.
//!
//! The wire carries the snake_case name in the envelope's `mode` field and in
//! the `mode` Kafka header. Anything outside this set fails to decode and is
//! discarded by the dispatcher.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventMode {
    // comment-service
    CommentReviewRequest,
    CommentReviewResult,
    CreateCommentDbCacheAndSearch,
    CreateSubCommentDbCacheAndSearch,
    RemoveCommentCache,
    RemoveSubCommentCache,
    SetCommentAgree,
    CancelCommentAgree,

    // creation-service
    CreationReviewRequest,
    CreationReviewResult,
    CreateCreationDbCacheAndSearch,
    UpdateCreationSearch,
    RemoveCreationCache,
    SetCreationAgree,
    CancelCreationAgree,
    SetCreationCollect,
    CancelCreationCollect,
    AddCreationView,

    // search projection (consumed outside this workspace)
    SearchIndex,
    SearchRemove,
}

impl EventMode {
    pub const ALL: [EventMode; 20] = [
        EventMode::CommentReviewRequest,
        EventMode::CommentReviewResult,
        EventMode::CreateCommentDbCacheAndSearch,
        EventMode::CreateSubCommentDbCacheAndSearch,
        EventMode::RemoveCommentCache,
        EventMode::RemoveSubCommentCache,
        EventMode::SetCommentAgree,
        EventMode::CancelCommentAgree,
        EventMode::CreationReviewRequest,
        EventMode::CreationReviewResult,
        EventMode::CreateCreationDbCacheAndSearch,
        EventMode::UpdateCreationSearch,
        EventMode::RemoveCreationCache,
        EventMode::SetCreationAgree,
        EventMode::CancelCreationAgree,
        EventMode::SetCreationCollect,
        EventMode::CancelCreationCollect,
        EventMode::AddCreationView,
        EventMode::SearchIndex,
        EventMode::SearchRemove,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventMode::CommentReviewRequest => "comment_review_request",
            EventMode::CommentReviewResult => "comment_review_result",
            EventMode::CreateCommentDbCacheAndSearch => "create_comment_db_cache_and_search",
            EventMode::CreateSubCommentDbCacheAndSearch => "create_sub_comment_db_cache_and_search",
            EventMode::RemoveCommentCache => "remove_comment_cache",
            EventMode::RemoveSubCommentCache => "remove_sub_comment_cache",
            EventMode::SetCommentAgree => "set_comment_agree",
            EventMode::CancelCommentAgree => "cancel_comment_agree",
            EventMode::CreationReviewRequest => "creation_review_request",
            EventMode::CreationReviewResult => "creation_review_result",
            EventMode::CreateCreationDbCacheAndSearch => "create_creation_db_cache_and_search",
            EventMode::UpdateCreationSearch => "update_creation_search",
            EventMode::RemoveCreationCache => "remove_creation_cache",
            EventMode::SetCreationAgree => "set_creation_agree",
            EventMode::CancelCreationAgree => "cancel_creation_agree",
            EventMode::SetCreationCollect => "set_creation_collect",
            EventMode::CancelCreationCollect => "cancel_creation_collect",
            EventMode::AddCreationView => "add_creation_view",
            EventMode::SearchIndex => "search_index",
            EventMode::SearchRemove => "search_remove",
        }
    }
}

impl fmt::Display for EventMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown event mode: {0}")]
pub struct UnknownMode(pub String);

impl FromStr for EventMode {
    type Err = UnknownMode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventMode::ALL
            .iter()
            .copied()
            .find(|mode| mode.as_str() == s)
            .ok_or_else(|| UnknownMode(s.to_string()))
    }
}

/// Kind discriminator for long-form creations. Stored as SMALLINT.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CreationKind {
    Article,
    Column,
    Talk,
}

impl CreationKind {
    pub const ALL: [CreationKind; 3] = [CreationKind::Article, CreationKind::Column, CreationKind::Talk];

    pub fn code(&self) -> i16 {
        match self {
            CreationKind::Article => 1,
            CreationKind::Column => 2,
            CreationKind::Talk => 3,
        }
    }

    pub fn from_code(code: i16) -> Option<Self> {
        match code {
            1 => Some(CreationKind::Article),
            2 => Some(CreationKind::Column),
            3 => Some(CreationKind::Talk),
            _ => None,
        }
    }

    /// Name used as cache key prefix and as the counter field on the
    /// per-user aggregate.
    pub fn as_str(&self) -> &'static str {
        match self {
            CreationKind::Article => "article",
            CreationKind::Column => "column",
            CreationKind::Talk => "talk",
        }
    }
}

impl fmt::Display for CreationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CreationKind {
    type Err = UnknownMode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CreationKind::ALL
            .iter()
            .copied()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| UnknownMode(s.to_string()))
    }
}

/// Top-level comment or reply in a comment thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommentKind {
    Comment,
    SubComment,
}

impl CommentKind {
    pub fn code(&self) -> i16 {
        match self {
            CommentKind::Comment => 1,
            CommentKind::SubComment => 2,
        }
    }

    pub fn from_code(code: i16) -> Option<Self> {
        match code {
            1 => Some(CommentKind::Comment),
            2 => Some(CommentKind::SubComment),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CommentKind::Comment => "comment",
            CommentKind::SubComment => "sub_comment",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_names_round_trip_through_from_str() {
        for mode in EventMode::ALL {
            assert_eq!(mode.as_str().parse::<EventMode>(), Ok(mode));
        }
    }

    #[test]
    fn test_mode_serde_matches_as_str() {
        let json = serde_json::to_string(&EventMode::CreateSubCommentDbCacheAndSearch).unwrap();
        assert_eq!(json, "\"create_sub_comment_db_cache_and_search\"");
    }

    #[test]
    fn test_unknown_mode() {
        let err = "drop_everything".parse::<EventMode>().unwrap_err();
        assert_eq!(err.0, "drop_everything");
    }

    #[test]
    fn test_creation_kind_codes() {
        assert_eq!(CreationKind::from_code(3), Some(CreationKind::Talk));
        assert_eq!(CreationKind::from_code(9), None);
        assert_eq!(CreationKind::Column.code(), 2);
        assert_eq!("article".parse::<CreationKind>(), Ok(CreationKind::Article));
    }
}
