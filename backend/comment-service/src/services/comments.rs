/// Client-facing comment operations
///
/// Writes go to the store in one transaction and then hand the fan-out to
/// the bus. Once the store write has committed, a failing publish or cache
/// call is logged and never reported to the caller. Reads go through the
/// cache-aside views.
use crate::cache::{self, keys, FIELD_AGREE, FIELD_COMMENT, REVIEW_QUEUE_CAP};
use crate::domain::models::{
    Comment, CommentItem, CommentStatistic, NewDraft, RemovedSubComment, ReplyItem,
    ReviewQueueItem, SubComment, SubCommentItem, UserCommentStatistic,
};
use crate::error::{ServiceError, ServiceResult};
use crate::repository::CommentStore;
use crate::services::facade::CreationStatisticsProvider;
use event_dispatch::EventPublisher;
use event_schema::{
    CommentAgreeEvent, CommentKind, CommentRemovedEvent, CreationKind, EventMode, ReviewRequestEvent,
    SubCommentEvent,
};
use fanout_cache::{is_member_field, ttl, FeedEntry, FeedWindow, GuardedBatch, Page, ReadThrough};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

const MAX_CONTENT_CHARS: usize = 2000;

#[derive(Debug, Clone, Deserialize)]
pub struct CommentDraftRequest {
    pub creation_id: i64,
    pub creation_type: i16,
    pub content: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubCommentDraftRequest {
    pub creation_id: i64,
    pub creation_type: i16,
    pub root_id: i64,
    pub parent_id: i64,
    pub reply_uuid: String,
    pub content: String,
}

#[derive(Clone)]
pub struct CommentUseCase {
    store: Arc<dyn CommentStore>,
    creations: Arc<dyn CreationStatisticsProvider>,
    publisher: Arc<dyn EventPublisher>,
    views: ReadThrough,
}

impl CommentUseCase {
    pub fn new(
        store: Arc<dyn CommentStore>,
        creations: Arc<dyn CreationStatisticsProvider>,
        publisher: Arc<dyn EventPublisher>,
        views: ReadThrough,
    ) -> Self {
        Self {
            store,
            creations,
            publisher,
            views,
        }
    }

    // ========================================================================
    // Writes
    // ========================================================================

    pub async fn create_comment_draft(&self, uuid: &str, request: CommentDraftRequest) -> ServiceResult<i64> {
        validate_content(&request.content)?;
        validate_creation_type(request.creation_type)?;

        let id = self
            .store
            .insert_draft(NewDraft {
                uuid: uuid.to_string(),
                kind: CommentKind::Comment,
                creation_id: request.creation_id,
                creation_type: request.creation_type,
                root_id: 0,
                parent_id: 0,
                reply_uuid: String::new(),
                content: request.content,
            })
            .await?;
        debug!(uuid = %uuid, draft_id = id, "Comment draft saved");
        Ok(id)
    }

    pub async fn create_sub_comment_draft(
        &self,
        uuid: &str,
        request: SubCommentDraftRequest,
    ) -> ServiceResult<i64> {
        validate_content(&request.content)?;
        validate_creation_type(request.creation_type)?;
        if request.root_id <= 0 || request.parent_id <= 0 {
            return Err(ServiceError::ValidationFailed(
                "reply needs a root and a parent".to_string(),
            ));
        }
        if !is_member_field(&request.reply_uuid) {
            return Err(ServiceError::ValidationFailed(
                "reply_uuid must be a non-empty identifier".to_string(),
            ));
        }

        let id = self
            .store
            .insert_draft(NewDraft {
                uuid: uuid.to_string(),
                kind: CommentKind::SubComment,
                creation_id: request.creation_id,
                creation_type: request.creation_type,
                root_id: request.root_id,
                parent_id: request.parent_id,
                reply_uuid: request.reply_uuid,
                content: request.content,
            })
            .await?;
        debug!(uuid = %uuid, draft_id = id, "Reply draft saved");
        Ok(id)
    }

    /// Promote the caller's latest pending comment draft and send it to review.
    pub async fn create_comment(&self, uuid: &str) -> ServiceResult<Comment> {
        let draft = self
            .store
            .last_pending_draft(uuid.to_string(), CommentKind::Comment)
            .await?;
        let author = self
            .creations
            .creation_author(draft.creation_id, draft.creation_type)
            .await?;

        let comment = self
            .store
            .create_comment(draft, author)
            .await
            .map_err(ServiceError::create_failed)?;
        info!(uuid = %uuid, comment_id = comment.id, "Comment created, awaiting review");

        self.request_review(
            CommentKind::Comment,
            ReviewRequestEvent {
                subject: CommentKind::Comment.as_str().to_string(),
                entity_id: comment.id,
                uuid: comment.uuid.clone(),
                parent_id: comment.creation_id,
                text: comment.content.clone(),
            },
        )
        .await;
        Ok(comment)
    }

    /// Promote the caller's latest pending reply draft and send it to review.
    pub async fn create_sub_comment(&self, uuid: &str) -> ServiceResult<SubComment> {
        let draft = self
            .store
            .last_pending_draft(uuid.to_string(), CommentKind::SubComment)
            .await?;
        let root = self.store.get_comment(draft.root_id).await?;
        if !root.is_passed() {
            return Err(ServiceError::NotFound(format!("comment {}", root.id)));
        }

        let reply = self
            .store
            .create_sub_comment(draft, root)
            .await
            .map_err(ServiceError::create_failed)?;
        info!(uuid = %uuid, sub_comment_id = reply.id, root_id = reply.root_id, "Reply created, awaiting review");

        self.request_review(
            CommentKind::SubComment,
            ReviewRequestEvent {
                subject: CommentKind::SubComment.as_str().to_string(),
                entity_id: reply.id,
                uuid: reply.uuid.clone(),
                parent_id: reply.root_id,
                text: reply.content.clone(),
            },
        )
        .await;
        Ok(reply)
    }

    pub async fn remove_comment(&self, uuid: &str, id: i64) -> ServiceResult<()> {
        let removed = self.store.remove_comment(uuid.to_string(), id).await?;
        info!(uuid = %uuid, comment_id = id, replies = removed.replies.len(), "Comment removed");

        if !removed.comment.is_passed() {
            self.settle_review_entry(uuid, CommentKind::Comment, id).await;
            return Ok(());
        }

        let event = CommentRemovedEvent {
            comment: removed.comment.to_event(),
            agree: removed.agree_of(id),
            replies: removed
                .replies
                .iter()
                .filter(|r| r.is_passed())
                .map(|r| SubCommentEvent {
                    agree: removed.agree_of(r.id),
                    ..r.to_event()
                })
                .collect(),
        };
        self.publish_after_commit(EventMode::RemoveCommentCache, id, &event).await;
        Ok(())
    }

    pub async fn remove_sub_comment(&self, uuid: &str, id: i64) -> ServiceResult<()> {
        let RemovedSubComment { reply, agree } =
            self.store.remove_sub_comment(uuid.to_string(), id).await?;
        info!(uuid = %uuid, sub_comment_id = id, "Reply removed");

        if !reply.is_passed() {
            self.settle_review_entry(uuid, CommentKind::SubComment, id).await;
            return Ok(());
        }
        let event = SubCommentEvent {
            agree,
            ..reply.to_event()
        };
        self.publish_after_commit(EventMode::RemoveSubCommentCache, id, &event)
            .await;
        Ok(())
    }

    /// Returns whether the agree was new.
    pub async fn set_comment_agree(&self, uuid: &str, comment_id: i64) -> ServiceResult<bool> {
        let target = self.store.agree_target(comment_id).await?;
        let changed = self.store.set_agree(uuid.to_string(), comment_id).await?;
        if changed {
            let event = agree_event(uuid, target);
            self.publish_after_commit(EventMode::SetCommentAgree, comment_id, &event)
                .await;
        }
        Ok(changed)
    }

    /// Returns whether an agree was withdrawn.
    pub async fn cancel_comment_agree(&self, uuid: &str, comment_id: i64) -> ServiceResult<bool> {
        let target = self.store.agree_target(comment_id).await?;
        let changed = self.store.cancel_agree(uuid.to_string(), comment_id).await?;
        if changed {
            let event = agree_event(uuid, target);
            self.publish_after_commit(EventMode::CancelCommentAgree, comment_id, &event)
                .await;
        }
        Ok(changed)
    }

    // ========================================================================
    // Reads
    // ========================================================================

    pub async fn get_comment_list(
        &self,
        creation_id: i64,
        creation_type: i16,
        page: Page,
    ) -> ServiceResult<Vec<CommentItem>> {
        let store = self.store.clone();
        let members = self
            .views
            .feed(
                "comment_list",
                &keys::creation_feed(creation_id, creation_type),
                page,
                ttl::FEED,
                move |window: FeedWindow| {
                    let store = store.clone();
                    async move {
                        let rows = store
                            .list_comments(creation_id, creation_type, window.offset as i64, window.limit as i64)
                            .await?;
                        Ok::<_, ServiceError>(
                            rows.iter()
                                .map(|c| FeedEntry::new(c.id as f64, cache::comment_member(c.id, &c.uuid)))
                                .collect(),
                        )
                    }
                },
            )
            .await?;
        Ok(decode_all(&members, cache::decode_comment))
    }

    pub async fn get_comment_hot_list(
        &self,
        creation_id: i64,
        creation_type: i16,
        page: Page,
    ) -> ServiceResult<Vec<CommentItem>> {
        let store = self.store.clone();
        let members = self
            .views
            .feed(
                "comment_hot_list",
                &keys::creation_hot(creation_id, creation_type),
                page,
                ttl::FEED,
                move |window: FeedWindow| {
                    let store = store.clone();
                    async move {
                        let rows = store
                            .list_hot_comments(creation_id, creation_type, window.offset as i64, window.limit as i64)
                            .await?;
                        Ok::<_, ServiceError>(
                            rows.iter()
                                .map(|c| FeedEntry::new(c.agree as f64, cache::comment_member(c.id, &c.uuid)))
                                .collect(),
                        )
                    }
                },
            )
            .await?;
        Ok(decode_all(&members, cache::decode_comment))
    }

    pub async fn get_sub_comment_list(&self, root_id: i64, page: Page) -> ServiceResult<Vec<SubCommentItem>> {
        let store = self.store.clone();
        let members = self
            .views
            .feed(
                "sub_comment_list",
                &keys::sub_feed(root_id),
                page,
                ttl::FEED,
                move |window: FeedWindow| {
                    let store = store.clone();
                    async move {
                        let rows = store
                            .list_sub_comments(root_id, window.offset as i64, window.limit as i64)
                            .await?;
                        Ok::<_, ServiceError>(
                            rows.iter()
                                .map(|r| {
                                    FeedEntry::new(
                                        r.id as f64,
                                        cache::sub_comment_member(r.id, &r.uuid, &r.reply_uuid, r.parent_id),
                                    )
                                })
                                .collect(),
                        )
                    }
                },
            )
            .await?;
        Ok(decode_all(&members, cache::decode_sub_comment))
    }

    /// Replies the user wrote.
    pub async fn get_user_reply_list(&self, uuid: &str, page: Page) -> ServiceResult<Vec<ReplyItem>> {
        let store = self.store.clone();
        let owner = uuid.to_string();
        let members = self
            .views
            .feed(
                "comment_user_reply",
                &keys::user_reply(uuid),
                page,
                ttl::USER_FEED,
                move |window: FeedWindow| {
                    let store = store.clone();
                    let owner = owner.clone();
                    async move {
                        let rows = store
                            .list_user_replies(owner, window.offset as i64, window.limit as i64)
                            .await?;
                        Ok::<_, ServiceError>(reply_entries(&rows))
                    }
                },
            )
            .await?;
        Ok(decode_all(&members, cache::decode_reply))
    }

    /// Replies addressed to the user.
    pub async fn get_user_replied_list(&self, uuid: &str, page: Page) -> ServiceResult<Vec<ReplyItem>> {
        let store = self.store.clone();
        let owner = uuid.to_string();
        let members = self
            .views
            .feed(
                "comment_user_replied",
                &keys::user_replied(uuid),
                page,
                ttl::USER_FEED,
                move |window: FeedWindow| {
                    let store = store.clone();
                    let owner = owner.clone();
                    async move {
                        let rows = store
                            .list_user_replied(owner, window.offset as i64, window.limit as i64)
                            .await?;
                        Ok::<_, ServiceError>(reply_entries(&rows))
                    }
                },
            )
            .await?;
        Ok(decode_all(&members, cache::decode_reply))
    }

    /// Counters for each id, in request order. Unknown ids are left out.
    pub async fn get_comment_statistics(&self, ids: &[i64]) -> ServiceResult<Vec<CommentStatistic>> {
        let store = self.store.clone();
        let rows = self
            .views
            .counters_batch(
                "comment_statistic",
                ids,
                keys::counter,
                ttl::COUNTER,
                move |missing: Vec<i64>| async move {
                    let rows = store.comment_statistics(missing).await?;
                    Ok::<_, ServiceError>(
                        rows.into_iter()
                            .map(|s| {
                                (
                                    s.comment_id,
                                    vec![
                                        (FIELD_AGREE.to_string(), s.agree),
                                        (FIELD_COMMENT.to_string(), s.comment),
                                    ],
                                )
                            })
                            .collect(),
                    )
                },
            )
            .await?;

        Ok(rows
            .into_iter()
            .map(|(comment_id, fields)| CommentStatistic {
                comment_id,
                agree: fields.get(FIELD_AGREE).copied().unwrap_or(0),
                comment: fields.get(FIELD_COMMENT).copied().unwrap_or(0),
            })
            .collect())
    }

    pub async fn get_user_comment_statistic(&self, uuid: &str) -> ServiceResult<UserCommentStatistic> {
        let store = self.store.clone();
        let owner = uuid.to_string();
        let fields = self
            .views
            .counters("comment_user", &keys::user_counter(uuid), ttl::COUNTER, || async move {
                let s = store.user_statistic(owner).await?;
                Ok::<_, ServiceError>(Some(vec![
                    (FIELD_COMMENT.to_string(), s.comment),
                    (FIELD_AGREE.to_string(), s.agree),
                ]))
            })
            .await?
            .unwrap_or_default();

        Ok(UserCommentStatistic {
            comment: fields.get(FIELD_COMMENT).copied().unwrap_or(0),
            agree: fields.get(FIELD_AGREE).copied().unwrap_or(0),
        })
    }

    /// The caller's own items still under review. Cache only.
    pub async fn get_review_queue(&self, uuid: &str) -> ServiceResult<Vec<ReviewQueueItem>> {
        let entries = self
            .views
            .store()
            .list_range(&keys::review_queue(uuid), FeedWindow::head(REVIEW_QUEUE_CAP))
            .await?;
        Ok(decode_all(&entries, cache::decode_review_entry))
    }

    // ========================================================================
    // Post-commit fan-out
    // ========================================================================

    async fn request_review(&self, kind: CommentKind, request: ReviewRequestEvent) {
        let uuid = request.uuid.clone();
        let id = request.entity_id;
        self.publish_after_commit(EventMode::CommentReviewRequest, id, &request)
            .await;
        self.apply_after_commit(cache::review_enqueued(&uuid, kind, id)).await;
    }

    async fn settle_review_entry(&self, uuid: &str, kind: CommentKind, id: i64) {
        self.apply_after_commit(cache::review_settled(uuid, kind, id)).await;
    }

    async fn publish_after_commit<T: serde::Serialize>(&self, mode: EventMode, key: i64, payload: &T) {
        if let Err(e) = super::publish(&*self.publisher, mode, key, payload).await {
            warn!(mode = %mode, key, error = %e, "Publish after commit failed");
        }
    }

    async fn apply_after_commit(&self, batch: GuardedBatch) {
        if let Err(e) = self.views.store().apply(&batch).await {
            warn!(error = %e, "Cache update after commit failed");
        }
    }
}

fn agree_event(uuid: &str, target: crate::domain::models::AgreeTarget) -> CommentAgreeEvent {
    CommentAgreeEvent {
        comment_id: target.comment_id,
        uuid: uuid.to_string(),
        author: target.author,
        creation_id: target.creation_id,
        creation_type: target.creation_type,
        root_id: target.root_id,
    }
}

fn reply_entries(rows: &[SubComment]) -> Vec<FeedEntry> {
    rows.iter()
        .map(|r| FeedEntry::new(r.id as f64, cache::reply_member(&r.to_event())))
        .collect()
}

/// Members that no longer decode are dropped from the page rather than
/// failing it for every reader.
fn decode_all<T>(members: &[String], decode: impl Fn(&str) -> fanout_cache::CacheResult<T>) -> Vec<T> {
    members
        .iter()
        .filter_map(|m| match decode(m) {
            Ok(item) => Some(item),
            Err(e) => {
                warn!(member = %m, error = %e, "Skipping undecodable feed member");
                None
            }
        })
        .collect()
}

fn validate_content(content: &str) -> ServiceResult<()> {
    if content.trim().is_empty() {
        return Err(ServiceError::ValidationFailed("content is empty".to_string()));
    }
    if content.chars().count() > MAX_CONTENT_CHARS {
        return Err(ServiceError::ValidationFailed(format!(
            "content exceeds {} characters",
            MAX_CONTENT_CHARS
        )));
    }
    Ok(())
}

fn validate_creation_type(code: i16) -> ServiceResult<CreationKind> {
    CreationKind::from_code(code)
        .ok_or_else(|| ServiceError::ValidationFailed(format!("unknown creation type {}", code)))
}
