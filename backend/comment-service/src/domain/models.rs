use chrono::{DateTime, Utc};
use event_schema::{CommentEvent, CommentKind, SubCommentEvent};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::collections::HashMap;

pub const DRAFT_PENDING: i16 = 1;
pub const DRAFT_SENT: i16 = 2;

pub const STATUS_REVIEWING: i16 = 1;
pub const STATUS_PASSED: i16 = 2;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct CommentDraft {
    pub id: i64,
    pub uuid: String,
    pub kind: i16,
    pub creation_id: i64,
    pub creation_type: i16,
    pub root_id: i64,
    pub parent_id: i64,
    pub reply_uuid: String,
    pub content: String,
    pub status: i16,
    pub created_at: DateTime<Utc>,
}

impl CommentDraft {
    pub fn kind(&self) -> Option<CommentKind> {
        CommentKind::from_code(self.kind)
    }
}

/// Fields a client supplies for a new draft.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewDraft {
    pub uuid: String,
    pub kind: CommentKind,
    pub creation_id: i64,
    pub creation_type: i16,
    pub root_id: i64,
    pub parent_id: i64,
    pub reply_uuid: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Comment {
    pub id: i64,
    pub uuid: String,
    pub creation_id: i64,
    pub creation_type: i16,
    pub creation_author: String,
    pub content: String,
    pub status: i16,
    pub created_at: DateTime<Utc>,
}

impl Comment {
    pub fn is_passed(&self) -> bool {
        self.status == STATUS_PASSED
    }

    pub fn to_event(&self) -> CommentEvent {
        CommentEvent {
            id: self.id,
            uuid: self.uuid.clone(),
            creation_id: self.creation_id,
            creation_type: self.creation_type,
            creation_author: self.creation_author.clone(),
            content: self.content.clone(),
            created_at: self.created_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct SubComment {
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
    pub status: i16,
    pub created_at: DateTime<Utc>,
}

impl SubComment {
    pub fn is_passed(&self) -> bool {
        self.status == STATUS_PASSED
    }

    pub fn to_event(&self) -> SubCommentEvent {
        SubCommentEvent {
            id: self.id,
            uuid: self.uuid.clone(),
            creation_id: self.creation_id,
            creation_type: self.creation_type,
            creation_author: self.creation_author.clone(),
            root_id: self.root_id,
            root_uuid: self.root_uuid.clone(),
            parent_id: self.parent_id,
            reply_uuid: self.reply_uuid.clone(),
            content: self.content.clone(),
            created_at: self.created_at,
            agree: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct CommentStatistic {
    pub comment_id: i64,
    pub agree: i64,
    pub comment: i64,
}

/// Totals for one user, as stored in `comment_user_{uuid}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, FromRow)]
pub struct UserCommentStatistic {
    /// Comments received on the user's creations
    pub comment: i64,
    /// Agrees received on the user's comments
    pub agree: i64,
}

/// Row of the agree-ranked feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct HotCommentRow {
    pub id: i64,
    pub uuid: String,
    pub agree: i64,
}

/// A comment or reply someone can agree with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct AgreeTarget {
    pub comment_id: i64,
    pub author: String,
    pub creation_id: i64,
    pub creation_type: i16,
    pub root_id: Option<i64>,
}

/// Everything deleted together with a top-level comment.
#[derive(Debug, Clone, PartialEq)]
pub struct RemovedComment {
    pub comment: Comment,
    pub replies: Vec<SubComment>,
    /// Agree totals on the deleted statistic rows, keyed by comment id.
    pub agrees: HashMap<i64, i64>,
}

impl RemovedComment {
    pub fn agree_of(&self, id: i64) -> i64 {
        self.agrees.get(&id).copied().unwrap_or(0)
    }
}

/// A deleted reply and the agree total it carried.
#[derive(Debug, Clone, PartialEq)]
pub struct RemovedSubComment {
    pub reply: SubComment,
    pub agree: i64,
}

/// Rejected moderation verdict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    pub uuid: String,
    pub comment_id: i64,
    pub kind: CommentKind,
    pub job_id: String,
    pub label: String,
    pub result: String,
}

/// Entity still waiting for a verdict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct ReviewBacklogEntry {
    pub id: i64,
    pub kind: i16,
    pub uuid: String,
    pub parent_id: i64,
    pub content: String,
}

// Read models served from cache members.

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentItem {
    pub id: i64,
    pub uuid: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubCommentItem {
    pub id: i64,
    pub uuid: String,
    pub reply_uuid: String,
    pub parent_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyItem {
    pub id: i64,
    pub uuid: String,
    pub reply_uuid: String,
    pub root_id: i64,
    pub parent_id: i64,
    pub creation_id: i64,
    pub creation_type: i16,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewQueueItem {
    pub kind: String,
    pub id: i64,
}
