//! Store boundary for creations, drafts, statistics and relations.

mod postgres;

pub use postgres::PgCreationStore;

use crate::domain::models::{
    CollectRow, Creation, CreationDraft, CreationStatistic, CreationViolation, NewCreationDraft,
    RemovedCreation, ReviewBacklogEntry, ScoredCreationRow, UserCreationStatistic,
};
use event_schema::CreationKind;
use resilience::TimeoutError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RepoError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("draft {0} is no longer pending")]
    DraftNotPending(i64),

    #[error("{uuid} does not own {entity}")]
    NotOwner { uuid: String, entity: String },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Store timeout: {0}")]
    Timeout(#[from] TimeoutError),
}

pub type RepoResult<T> = Result<T, RepoError>;

/// Every mutating method commits or rolls back as a unit.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait CreationStore: Send + Sync {
    async fn insert_draft(&self, draft: NewCreationDraft) -> RepoResult<i64>;

    async fn last_pending_draft(&self, uuid: String, kind: CreationKind) -> RepoResult<CreationDraft>;

    /// Consume the draft and insert the creation as reviewing.
    async fn create_creation(&self, draft: CreationDraft) -> RepoResult<Creation>;

    async fn get_creation(&self, id: i64) -> RepoResult<Creation>;

    /// Owner-only rewrite of title and content. Status is kept.
    async fn edit_creation(
        &self,
        uuid: String,
        id: i64,
        title: String,
        content: String,
    ) -> RepoResult<Creation>;

    /// Mark passed and seed the statistic row. Safe to repeat.
    async fn mark_passed(&self, id: i64) -> RepoResult<Creation>;

    /// Record the violation and drop the creation if it is still reviewing.
    async fn reject(&self, violation: CreationViolation) -> RepoResult<bool>;

    /// Delete the creation with its statistic and relation rows.
    async fn remove_creation(&self, uuid: String, id: i64) -> RepoResult<RemovedCreation>;

    async fn set_agree(&self, uuid: String, creation_id: i64) -> RepoResult<bool>;

    async fn cancel_agree(&self, uuid: String, creation_id: i64) -> RepoResult<bool>;

    async fn set_collect(&self, uuid: String, creation: Creation) -> RepoResult<bool>;

    async fn cancel_collect(&self, uuid: String, creation_id: i64) -> RepoResult<bool>;

    async fn add_view(&self, creation_id: i64) -> RepoResult<()>;

    /// Apply `delta` to the comment count unless `key` was already applied.
    /// Returns whether this call applied it.
    async fn adjust_comment_count(&self, creation_id: i64, delta: i64, key: String) -> RepoResult<bool>;

    async fn list_creations(&self, kind: CreationKind, offset: i64, limit: i64) -> RepoResult<Vec<Creation>>;

    async fn list_hot_creations(
        &self,
        kind: CreationKind,
        offset: i64,
        limit: i64,
    ) -> RepoResult<Vec<ScoredCreationRow>>;

    async fn list_user_creations(
        &self,
        uuid: String,
        kind: CreationKind,
        offset: i64,
        limit: i64,
    ) -> RepoResult<Vec<Creation>>;

    async fn list_collects(&self, uuid: String, offset: i64, limit: i64) -> RepoResult<Vec<CollectRow>>;

    async fn leaderboard(&self, offset: i64, limit: i64) -> RepoResult<Vec<ScoredCreationRow>>;

    async fn creation_statistics(&self, kind: CreationKind, ids: Vec<i64>) -> RepoResult<Vec<CreationStatistic>>;

    async fn user_statistic(&self, uuid: String) -> RepoResult<UserCreationStatistic>;

    async fn review_backlog(&self, older_than_secs: i64, limit: i64) -> RepoResult<Vec<ReviewBacklogEntry>>;
}
