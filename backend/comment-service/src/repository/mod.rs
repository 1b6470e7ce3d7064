//! Store boundary for comments, replies, drafts, statistics and relations.

mod postgres;

pub use postgres::PgCommentStore;

use crate::domain::models::{
    AgreeTarget, Comment, CommentDraft, CommentStatistic, HotCommentRow, NewDraft, RemovedComment,
    RemovedSubComment, ReviewBacklogEntry, SubComment, UserCommentStatistic, Violation,
};
use event_schema::CommentKind;
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

/// Every mutating method runs in one transaction; a failure leaves the
/// store untouched.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait CommentStore: Send + Sync {
    async fn insert_draft(&self, draft: NewDraft) -> RepoResult<i64>;

    /// Most recently inserted pending draft of a kind.
    async fn last_pending_draft(&self, uuid: String, kind: CommentKind) -> RepoResult<CommentDraft>;

    /// Draft pending→sent, insert the comment as reviewing, delete the draft.
    async fn create_comment(&self, draft: CommentDraft, creation_author: String) -> RepoResult<Comment>;

    async fn create_sub_comment(&self, draft: CommentDraft, root: Comment) -> RepoResult<SubComment>;

    async fn get_comment(&self, id: i64) -> RepoResult<Comment>;

    async fn get_sub_comment(&self, id: i64) -> RepoResult<SubComment>;

    /// Mark passed and seed the statistic row. Safe to repeat.
    async fn mark_comment_passed(&self, id: i64) -> RepoResult<Comment>;

    /// Mark passed, seed the statistic row and count the reply on its root
    /// the first time only.
    async fn mark_sub_comment_passed(&self, id: i64) -> RepoResult<SubComment>;

    /// Record the violation and drop the entity if it is still reviewing.
    /// Returns whether an entity was deleted.
    async fn reject(&self, violation: Violation) -> RepoResult<bool>;

    async fn remove_comment(&self, uuid: String, id: i64) -> RepoResult<RemovedComment>;

    async fn remove_sub_comment(&self, uuid: String, id: i64) -> RepoResult<RemovedSubComment>;

    async fn agree_target(&self, id: i64) -> RepoResult<AgreeTarget>;

    /// Returns whether the relation row was inserted.
    async fn set_agree(&self, uuid: String, comment_id: i64) -> RepoResult<bool>;

    /// Returns whether the relation row was deleted.
    async fn cancel_agree(&self, uuid: String, comment_id: i64) -> RepoResult<bool>;

    async fn list_comments(
        &self,
        creation_id: i64,
        creation_type: i16,
        offset: i64,
        limit: i64,
    ) -> RepoResult<Vec<Comment>>;

    async fn list_hot_comments(
        &self,
        creation_id: i64,
        creation_type: i16,
        offset: i64,
        limit: i64,
    ) -> RepoResult<Vec<HotCommentRow>>;

    async fn list_sub_comments(&self, root_id: i64, offset: i64, limit: i64) -> RepoResult<Vec<SubComment>>;

    async fn list_user_replies(&self, uuid: String, offset: i64, limit: i64) -> RepoResult<Vec<SubComment>>;

    async fn list_user_replied(&self, uuid: String, offset: i64, limit: i64) -> RepoResult<Vec<SubComment>>;

    async fn comment_statistics(&self, ids: Vec<i64>) -> RepoResult<Vec<CommentStatistic>>;

    async fn user_statistic(&self, uuid: String) -> RepoResult<UserCommentStatistic>;

    /// Entities still reviewing after `older_than_secs`.
    async fn review_backlog(&self, older_than_secs: i64, limit: i64) -> RepoResult<Vec<ReviewBacklogEntry>>;
}
