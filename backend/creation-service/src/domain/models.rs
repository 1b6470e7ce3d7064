use chrono::{DateTime, Utc};
use event_schema::facade::CreationCounts;
use event_schema::{CreationEvent, CreationKind};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

pub const DRAFT_PENDING: i16 = 1;
pub const DRAFT_SENT: i16 = 2;

pub const STATUS_REVIEWING: i16 = 1;
pub const STATUS_PASSED: i16 = 2;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct CreationDraft {
    pub id: i64,
    pub uuid: String,
    pub kind: i16,
    pub title: String,
    pub content: String,
    pub status: i16,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewCreationDraft {
    pub uuid: String,
    pub kind: CreationKind,
    pub title: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Creation {
    pub id: i64,
    pub uuid: String,
    pub kind: i16,
    pub title: String,
    pub content: String,
    pub status: i16,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Creation {
    pub fn is_passed(&self) -> bool {
        self.status == STATUS_PASSED
    }

    /// `None` only for rows written with an unknown kind code.
    pub fn creation_kind(&self) -> Option<CreationKind> {
        CreationKind::from_code(self.kind)
    }

    pub fn to_event(&self, kind: CreationKind) -> CreationEvent {
        CreationEvent {
            id: self.id,
            uuid: self.uuid.clone(),
            kind,
            title: self.title.clone(),
            content: self.content.clone(),
            created_at: self.created_at,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct CreationStatistic {
    pub creation_id: i64,
    pub kind: i16,
    pub agree: i64,
    pub collect: i64,
    pub view: i64,
    pub comment: i64,
}

impl CreationStatistic {
    pub fn counts(&self) -> CreationCounts {
        CreationCounts {
            agree: self.agree,
            collect: self.collect,
            view: self.view,
            comment: self.comment,
        }
    }
}

/// Totals for one user, as stored in `creation_user_{uuid}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, FromRow)]
pub struct UserCreationStatistic {
    pub article: i64,
    pub column: i64,
    pub talk: i64,
    /// Agrees received on the user's creations
    pub agree: i64,
    /// Collects received on the user's creations
    pub collect: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct ScoredCreationRow {
    pub id: i64,
    pub uuid: String,
    pub kind: i16,
    pub score: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct CollectRow {
    pub creation_id: i64,
    pub author: String,
    pub kind: i16,
    pub created_at: DateTime<Utc>,
}

/// A creation deleted with everything that referenced it.
#[derive(Debug, Clone, PartialEq)]
pub struct RemovedCreation {
    pub creation: Creation,
    pub statistic: Option<CreationStatistic>,
    pub collectors: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreationViolation {
    pub uuid: String,
    pub creation_id: i64,
    pub kind: CreationKind,
    pub job_id: String,
    pub label: String,
    pub result: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct ReviewBacklogEntry {
    pub id: i64,
    pub kind: i16,
    pub uuid: String,
    pub title: String,
    pub content: String,
}

// Read models decoded from cache members.

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreationItem {
    pub id: i64,
    pub uuid: String,
}

/// Collections and leaderboard entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankedItem {
    pub id: i64,
    pub author: String,
    pub kind: CreationKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewQueueItem {
    pub kind: String,
    pub id: i64,
}
