/// Client-facing creation operations and the internal façade
///
/// Store writes commit first. Everything after the commit (publishing,
/// review-queue bookkeeping) is logged on failure and never undoes the
/// write. Lists and counters are read through the cache.
use crate::cache::{
    self, keys, FIELD_AGREE, FIELD_COLLECT, FIELD_COMMENT, FIELD_VIEW, REVIEW_QUEUE_CAP,
};
use crate::domain::models::{
    Creation, CreationItem, CreationStatistic, NewCreationDraft, RankedItem, ReviewQueueItem,
    UserCreationStatistic,
};
use crate::error::{ServiceError, ServiceResult};
use crate::repository::{CreationStore, RepoError};
use event_dispatch::EventPublisher;
use event_schema::facade::{AdjustmentResult, CommentCountAdjustment, CreationAuthor, CreationCounts};
use event_schema::{
    CreationInteractionEvent, CreationKind, CreationRemovedEvent, EventMode, ReviewRequestEvent,
};
use fanout_cache::{ttl, CacheResult, FeedEntry, FeedWindow, GuardedBatch, Page, ReadThrough};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

const MAX_TITLE_CHARS: usize = 100;
const MAX_TALK_CHARS: usize = 1000;
const MAX_BODY_CHARS: usize = 50_000;

#[derive(Debug, Clone, Deserialize)]
pub struct CreationDraftRequest {
    pub kind: CreationKind,
    #[serde(default)]
    pub title: String,
    pub content: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreationEditRequest {
    #[serde(default)]
    pub title: String,
    pub content: String,
}

#[derive(Clone)]
pub struct CreationUseCase {
    store: Arc<dyn CreationStore>,
    publisher: Arc<dyn EventPublisher>,
    views: ReadThrough,
}

impl CreationUseCase {
    pub fn new(store: Arc<dyn CreationStore>, publisher: Arc<dyn EventPublisher>, views: ReadThrough) -> Self {
        Self {
            store,
            publisher,
            views,
        }
    }

    // ========================================================================
    // Writes
    // ========================================================================

    pub async fn create_draft(&self, uuid: &str, request: CreationDraftRequest) -> ServiceResult<i64> {
        validate_body(request.kind, &request.title, &request.content)?;
        let id = self
            .store
            .insert_draft(NewCreationDraft {
                uuid: uuid.to_string(),
                kind: request.kind,
                title: request.title,
                content: request.content,
            })
            .await?;
        debug!(uuid = %uuid, kind = %request.kind, draft_id = id, "Creation draft saved");
        Ok(id)
    }

    /// Promote the caller's latest pending draft of `kind` and send it to
    /// review.
    pub async fn create_creation(&self, uuid: &str, kind: CreationKind) -> ServiceResult<Creation> {
        let draft = self.store.last_pending_draft(uuid.to_string(), kind).await?;
        let creation = self
            .store
            .create_creation(draft)
            .await
            .map_err(ServiceError::create_failed)?;
        info!(uuid = %uuid, kind = %kind, creation_id = creation.id, "Creation created, awaiting review");

        self.request_review(kind, &creation).await;
        Ok(creation)
    }

    /// Rewrite title and content. A passed creation is reindexed.
    pub async fn edit_creation(&self, uuid: &str, id: i64, request: CreationEditRequest) -> ServiceResult<Creation> {
        let current = self.store.get_creation(id).await?;
        let kind = creation_kind(&current)?;
        validate_body(kind, &request.title, &request.content)?;

        let creation = self
            .store
            .edit_creation(uuid.to_string(), id, request.title, request.content)
            .await?;
        info!(uuid = %uuid, creation_id = id, "Creation edited");

        if creation.is_passed() {
            self.publish_after_commit(EventMode::UpdateCreationSearch, id, &creation.to_event(kind))
                .await;
        }
        Ok(creation)
    }

    pub async fn delete_creation(&self, uuid: &str, id: i64) -> ServiceResult<()> {
        let removed = self.store.remove_creation(uuid.to_string(), id).await?;
        let kind = creation_kind(&removed.creation)?;
        info!(uuid = %uuid, creation_id = id, collectors = removed.collectors.len(), "Creation deleted");

        if !removed.creation.is_passed() {
            self.apply_after_commit(cache::review_settled(uuid, kind, id)).await;
            return Ok(());
        }

        let event = CreationRemovedEvent {
            creation: removed.creation.to_event(kind),
            collectors: removed.collectors,
            counts: removed.statistic.map(|s| s.counts()).unwrap_or_default(),
        };
        self.publish_after_commit(EventMode::RemoveCreationCache, id, &event).await;
        Ok(())
    }

    pub async fn set_agree(&self, uuid: &str, id: i64) -> ServiceResult<bool> {
        let creation = self.passed_creation(id).await?;
        let changed = self.store.set_agree(uuid.to_string(), id).await?;
        if changed {
            self.publish_interaction(EventMode::SetCreationAgree, uuid, &creation).await?;
        }
        Ok(changed)
    }

    pub async fn cancel_agree(&self, uuid: &str, id: i64) -> ServiceResult<bool> {
        let creation = self.passed_creation(id).await?;
        let changed = self.store.cancel_agree(uuid.to_string(), id).await?;
        if changed {
            self.publish_interaction(EventMode::CancelCreationAgree, uuid, &creation).await?;
        }
        Ok(changed)
    }

    pub async fn set_collect(&self, uuid: &str, id: i64) -> ServiceResult<bool> {
        let creation = self.passed_creation(id).await?;
        let changed = self.store.set_collect(uuid.to_string(), creation.clone()).await?;
        if changed {
            self.publish_interaction(EventMode::SetCreationCollect, uuid, &creation).await?;
        }
        Ok(changed)
    }

    pub async fn cancel_collect(&self, uuid: &str, id: i64) -> ServiceResult<bool> {
        let creation = self.passed_creation(id).await?;
        let changed = self.store.cancel_collect(uuid.to_string(), id).await?;
        if changed {
            self.publish_interaction(EventMode::CancelCreationCollect, uuid, &creation).await?;
        }
        Ok(changed)
    }

    /// Count a view. `uuid` is `None` for anonymous readers.
    pub async fn add_view(&self, uuid: Option<&str>, id: i64) -> ServiceResult<()> {
        let creation = self.passed_creation(id).await?;
        self.store.add_view(id).await?;
        self.publish_interaction(EventMode::AddCreationView, uuid.unwrap_or_default(), &creation)
            .await
    }

    // ========================================================================
    // Reads
    // ========================================================================

    pub async fn get_creation_list(&self, kind: CreationKind, page: Page) -> ServiceResult<Vec<CreationItem>> {
        let store = self.store.clone();
        let members = self
            .views
            .feed("creation_list", &keys::feed(kind), page, ttl::FEED, move |window: FeedWindow| {
                let store = store.clone();
                async move {
                    let rows = store
                        .list_creations(kind, window.offset as i64, window.limit as i64)
                        .await?;
                    Ok::<_, ServiceError>(newest_entries(&rows))
                }
            })
            .await?;
        Ok(decode_all(&members, cache::decode_creation))
    }

    pub async fn get_creation_hot_list(&self, kind: CreationKind, page: Page) -> ServiceResult<Vec<CreationItem>> {
        let store = self.store.clone();
        let members = self
            .views
            .feed("creation_hot_list", &keys::hot(kind), page, ttl::FEED, move |window: FeedWindow| {
                let store = store.clone();
                async move {
                    let rows = store
                        .list_hot_creations(kind, window.offset as i64, window.limit as i64)
                        .await?;
                    Ok::<_, ServiceError>(
                        rows.iter()
                            .map(|r| FeedEntry::new(r.score as f64, cache::creation_member(r.id, &r.uuid)))
                            .collect(),
                    )
                }
            })
            .await?;
        Ok(decode_all(&members, cache::decode_creation))
    }

    pub async fn get_user_creation_list(
        &self,
        uuid: &str,
        kind: CreationKind,
        page: Page,
    ) -> ServiceResult<Vec<CreationItem>> {
        let store = self.store.clone();
        let owner = uuid.to_string();
        let members = self
            .views
            .feed(
                "creation_user_list",
                &keys::user_feed(kind, uuid),
                page,
                ttl::USER_FEED,
                move |window: FeedWindow| {
                    let store = store.clone();
                    let owner = owner.clone();
                    async move {
                        let rows = store
                            .list_user_creations(owner, kind, window.offset as i64, window.limit as i64)
                            .await?;
                        Ok::<_, ServiceError>(newest_entries(&rows))
                    }
                },
            )
            .await?;
        Ok(decode_all(&members, cache::decode_creation))
    }

    /// The user's collections, most recently collected first.
    pub async fn get_collect_list(&self, uuid: &str, page: Page) -> ServiceResult<Vec<RankedItem>> {
        let store = self.store.clone();
        let owner = uuid.to_string();
        let members = self
            .views
            .feed(
                "creation_collect_list",
                &keys::collect_feed(uuid),
                page,
                ttl::USER_FEED,
                move |window: FeedWindow| {
                    let store = store.clone();
                    let owner = owner.clone();
                    async move {
                        let rows = store
                            .list_collects(owner, window.offset as i64, window.limit as i64)
                            .await?;
                        Ok::<_, ServiceError>(
                            rows.iter()
                                .filter_map(|r| {
                                    let kind = CreationKind::from_code(r.kind)?;
                                    Some(FeedEntry::new(
                                        r.created_at.timestamp_millis() as f64,
                                        cache::ranked_member(r.creation_id, &r.author, kind),
                                    ))
                                })
                                .collect(),
                        )
                    }
                },
            )
            .await?;
        Ok(decode_all(&members, cache::decode_ranked))
    }

    pub async fn get_leaderboard(&self, page: Page) -> ServiceResult<Vec<RankedItem>> {
        let store = self.store.clone();
        let members = self
            .views
            .feed("leaderboard", keys::LEADERBOARD, page, ttl::LEADERBOARD, move |window: FeedWindow| {
                let store = store.clone();
                async move {
                    let rows = store.leaderboard(window.offset as i64, window.limit as i64).await?;
                    Ok::<_, ServiceError>(
                        rows.iter()
                            .filter_map(|r| {
                                let kind = CreationKind::from_code(r.kind)?;
                                Some(FeedEntry::new(
                                    r.score as f64,
                                    cache::ranked_member(r.id, &r.uuid, kind),
                                ))
                            })
                            .collect(),
                    )
                }
            })
            .await?;
        Ok(decode_all(&members, cache::decode_ranked))
    }

    /// Counters for each id, in request order. Unknown ids are left out.
    pub async fn get_creation_statistics(
        &self,
        kind: CreationKind,
        ids: &[i64],
    ) -> ServiceResult<Vec<CreationStatistic>> {
        let store = self.store.clone();
        let rows = self
            .views
            .counters_batch(
                "creation_statistic",
                ids,
                move |id| keys::counter(kind, id),
                ttl::COUNTER,
                move |missing: Vec<i64>| async move {
                    let rows = store.creation_statistics(kind, missing).await?;
                    Ok::<_, ServiceError>(
                        rows.iter()
                            .map(|s| (s.creation_id, counter_fields(&s.counts())))
                            .collect(),
                    )
                },
            )
            .await?;

        Ok(rows
            .into_iter()
            .map(|(creation_id, fields)| {
                let counts = counts_from(&fields);
                CreationStatistic {
                    creation_id,
                    kind: kind.code(),
                    agree: counts.agree,
                    collect: counts.collect,
                    view: counts.view,
                    comment: counts.comment,
                }
            })
            .collect())
    }

    pub async fn get_creation_user_statistic(&self, uuid: &str) -> ServiceResult<UserCreationStatistic> {
        let store = self.store.clone();
        let owner = uuid.to_string();
        let fields = self
            .views
            .counters("creation_user", &keys::user_counter(uuid), ttl::COUNTER, || async move {
                let s = store.user_statistic(owner).await?;
                Ok::<_, ServiceError>(Some(vec![
                    (CreationKind::Article.as_str().to_string(), s.article),
                    (CreationKind::Column.as_str().to_string(), s.column),
                    (CreationKind::Talk.as_str().to_string(), s.talk),
                    (FIELD_AGREE.to_string(), s.agree),
                    (FIELD_COLLECT.to_string(), s.collect),
                ]))
            })
            .await?
            .unwrap_or_default();

        let field = |name: &str| fields.get(name).copied().unwrap_or(0);
        Ok(UserCreationStatistic {
            article: field(CreationKind::Article.as_str()),
            column: field(CreationKind::Column.as_str()),
            talk: field(CreationKind::Talk.as_str()),
            agree: field(FIELD_AGREE),
            collect: field(FIELD_COLLECT),
        })
    }

    pub async fn get_review_queue(&self, uuid: &str) -> ServiceResult<Vec<ReviewQueueItem>> {
        let entries = self
            .views
            .store()
            .list_range(&keys::review_queue(uuid), FeedWindow::head(REVIEW_QUEUE_CAP))
            .await?;
        Ok(decode_all(&entries, cache::decode_review_entry))
    }

    // ========================================================================
    // Façade
    // ========================================================================

    /// Author of a passed creation.
    pub async fn author(&self, kind: CreationKind, id: i64) -> ServiceResult<CreationAuthor> {
        let creation = self.creation_of_kind(kind, id).await?;
        if !creation.is_passed() {
            return Err(ServiceError::NotFound(format!("{} {}", kind, id)));
        }
        Ok(CreationAuthor { author: creation.uuid })
    }

    pub async fn counts(&self, kind: CreationKind, id: i64) -> ServiceResult<CreationCounts> {
        let store = self.store.clone();
        let fields = self
            .views
            .counters("creation_counts", &keys::counter(kind, id), ttl::COUNTER, || async move {
                let rows = store.creation_statistics(kind, vec![id]).await?;
                Ok::<_, ServiceError>(rows.first().map(|s| counter_fields(&s.counts())))
            })
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("{} {}", kind, id)))?;
        Ok(counts_from(&fields))
    }

    /// Move the comment count once per idempotency key. A creation that no
    /// longer exists reports `applied: false`.
    pub async fn adjust_comment_count(
        &self,
        kind: CreationKind,
        id: i64,
        adjustment: CommentCountAdjustment,
    ) -> ServiceResult<AdjustmentResult> {
        if adjustment.delta == 0 {
            return Err(ServiceError::ValidationFailed("delta is zero".to_string()));
        }
        if adjustment.idempotency_key.trim().is_empty() {
            return Err(ServiceError::ValidationFailed("idempotency_key is empty".to_string()));
        }

        let creation = match self.creation_of_kind(kind, id).await {
            Ok(creation) => creation,
            Err(ServiceError::NotFound(_)) => {
                debug!(creation_id = id, key = %adjustment.idempotency_key, "Comment count for missing creation ignored");
                return Ok(AdjustmentResult { applied: false });
            }
            Err(e) => return Err(e),
        };

        let applied = self
            .store
            .adjust_comment_count(id, adjustment.delta, adjustment.idempotency_key.clone())
            .await?;

        // The key is also the cache marker, so a retry after a lost cache
        // write still lands exactly once.
        let batch = cache::comment_count_adjusted(
            kind,
            id,
            &creation.uuid,
            adjustment.delta,
            &adjustment.idempotency_key,
        );
        self.views.store().apply(&batch).await?;

        debug!(creation_id = id, delta = adjustment.delta, applied, "Comment count adjusted");
        Ok(AdjustmentResult { applied })
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    async fn creation_of_kind(&self, kind: CreationKind, id: i64) -> ServiceResult<Creation> {
        let creation = self.store.get_creation(id).await?;
        if creation.kind != kind.code() {
            return Err(ServiceError::NotFound(format!("{} {}", kind, id)));
        }
        Ok(creation)
    }

    async fn passed_creation(&self, id: i64) -> ServiceResult<Creation> {
        let creation = self.store.get_creation(id).await?;
        if !creation.is_passed() {
            return Err(ServiceError::NotFound(format!("creation {}", id)));
        }
        Ok(creation)
    }

    async fn request_review(&self, kind: CreationKind, creation: &Creation) {
        let request = ReviewRequestEvent {
            subject: kind.as_str().to_string(),
            entity_id: creation.id,
            uuid: creation.uuid.clone(),
            parent_id: 0,
            text: review_text(&creation.title, &creation.content),
        };
        self.publish_after_commit(EventMode::CreationReviewRequest, creation.id, &request)
            .await;
        self.apply_after_commit(cache::review_enqueued(&creation.uuid, kind, creation.id))
            .await;
    }

    /// Interaction events only follow a committed change, so a failed
    /// publish is logged like any other post-commit step.
    async fn publish_interaction(&self, mode: EventMode, uuid: &str, creation: &Creation) -> ServiceResult<()> {
        let event = CreationInteractionEvent {
            creation_id: creation.id,
            kind: creation_kind(creation)?,
            author: creation.uuid.clone(),
            uuid: uuid.to_string(),
        };
        self.publish_after_commit(mode, creation.id, &event).await;
        Ok(())
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

pub(crate) fn review_text(title: &str, content: &str) -> String {
    if title.is_empty() {
        content.to_string()
    } else {
        format!("{}\n{}", title, content)
    }
}

fn creation_kind(creation: &Creation) -> ServiceResult<CreationKind> {
    creation.creation_kind().ok_or_else(|| {
        ServiceError::Database(RepoError::NotFound(format!(
            "creation {} has unknown kind {}",
            creation.id, creation.kind
        )))
    })
}

fn newest_entries(rows: &[Creation]) -> Vec<FeedEntry> {
    rows.iter()
        .map(|c| FeedEntry::new(c.id as f64, cache::creation_member(c.id, &c.uuid)))
        .collect()
}

fn counter_fields(counts: &CreationCounts) -> Vec<(String, i64)> {
    vec![
        (FIELD_AGREE.to_string(), counts.agree),
        (FIELD_COLLECT.to_string(), counts.collect),
        (FIELD_VIEW.to_string(), counts.view),
        (FIELD_COMMENT.to_string(), counts.comment),
    ]
}

fn counts_from(fields: &HashMap<String, i64>) -> CreationCounts {
    let field = |name: &str| fields.get(name).copied().unwrap_or(0);
    CreationCounts {
        agree: field(FIELD_AGREE),
        collect: field(FIELD_COLLECT),
        view: field(FIELD_VIEW),
        comment: field(FIELD_COMMENT),
    }
}

fn decode_all<T>(members: &[String], decode: impl Fn(&str) -> CacheResult<T>) -> Vec<T> {
    let mut items = Vec::with_capacity(members.len());
    for member in members {
        match decode(member) {
            Ok(item) => items.push(item),
            Err(e) => warn!(member = %member, error = %e, "Dropping undecodable feed member"),
        }
    }
    items
}

/// Talks are short and untitled; articles and columns need a title.
fn validate_body(kind: CreationKind, title: &str, content: &str) -> ServiceResult<()> {
    if content.trim().is_empty() {
        return Err(ServiceError::ValidationFailed("content is empty".to_string()));
    }
    let (needs_title, max_content) = match kind {
        CreationKind::Talk => (false, MAX_TALK_CHARS),
        CreationKind::Article | CreationKind::Column => (true, MAX_BODY_CHARS),
    };
    if needs_title && title.trim().is_empty() {
        return Err(ServiceError::ValidationFailed(format!("{} needs a title", kind)));
    }
    if title.chars().count() > MAX_TITLE_CHARS {
        return Err(ServiceError::ValidationFailed(format!(
            "title exceeds {} characters",
            MAX_TITLE_CHARS
        )));
    }
    if content.chars().count() > max_content {
        return Err(ServiceError::ValidationFailed(format!(
            "content exceeds {} characters",
            max_content
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{CreationDraft, RemovedCreation, STATUS_PASSED, STATUS_REVIEWING};
    use crate::repository::MockCreationStore;
    use chrono::Utc;
    use event_dispatch::MemoryEventPublisher;
    use fanout_cache::{MemoryCacheStore, PopulatePool};
    use std::time::Duration;

    fn build(store: MockCreationStore) -> (CreationUseCase, MemoryEventPublisher, Arc<MemoryCacheStore>) {
        let publisher = MemoryEventPublisher::new();
        let cache = Arc::new(MemoryCacheStore::new());
        let views = ReadThrough::new(cache.clone(), PopulatePool::new(4, Duration::from_secs(1)));
        let use_case = CreationUseCase::new(Arc::new(store), Arc::new(publisher.clone()), views);
        (use_case, publisher, cache)
    }

    fn article(id: i64, status: i16) -> Creation {
        Creation {
            id,
            uuid: "author".to_string(),
            kind: CreationKind::Article.code(),
            title: "Title".to_string(),
            content: "body".to_string(),
            status,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn draft() -> CreationDraft {
        CreationDraft {
            id: 4,
            uuid: "author".to_string(),
            kind: CreationKind::Article.code(),
            title: "Title".to_string(),
            content: "body".to_string(),
            status: 1,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_create_creation_requests_review_with_title() {
        let mut store = MockCreationStore::new();
        store.expect_last_pending_draft().returning(|_, _| Ok(draft()));
        store
            .expect_create_creation()
            .returning(|_| Ok(article(30, STATUS_REVIEWING)));
        let (use_case, publisher, _) = build(store);

        use_case.create_creation("author", CreationKind::Article).await.unwrap();

        assert_eq!(publisher.modes(), vec![EventMode::CreationReviewRequest]);
        let request: ReviewRequestEvent = publisher.events()[0].decode().unwrap();
        assert_eq!(request.subject, "article");
        assert_eq!(request.text, "Title\nbody");
        assert_eq!(
            use_case.get_review_queue("author").await.unwrap(),
            vec![ReviewQueueItem { kind: "article".to_string(), id: 30 }]
        );
    }

    #[tokio::test]
    async fn test_create_creation_conflict_publishes_nothing() {
        let mut store = MockCreationStore::new();
        store.expect_last_pending_draft().returning(|_, _| Ok(draft()));
        store
            .expect_create_creation()
            .returning(|d| Err(RepoError::DraftNotPending(d.id)));
        let (use_case, publisher, _) = build(store);

        let err = use_case.create_creation("author", CreationKind::Article).await.unwrap_err();
        assert!(matches!(err, ServiceError::DraftConflict(_)));
        assert!(publisher.events().is_empty());
    }

    #[tokio::test]
    async fn test_article_draft_needs_title() {
        let mut store = MockCreationStore::new();
        store.expect_insert_draft().never();
        let (use_case, _, _) = build(store);

        let request = CreationDraftRequest {
            kind: CreationKind::Article,
            title: " ".to_string(),
            content: "body".to_string(),
        };
        assert!(matches!(
            use_case.create_draft("author", request).await,
            Err(ServiceError::ValidationFailed(_))
        ));
    }

    #[tokio::test]
    async fn test_edit_reindexes_only_passed_creations() {
        let mut store = MockCreationStore::new();
        store
            .expect_get_creation()
            .returning(|id| Ok(article(id, STATUS_REVIEWING)));
        store
            .expect_edit_creation()
            .returning(|_, id, title, content| {
                let mut c = article(id, if id == 1 { STATUS_PASSED } else { STATUS_REVIEWING });
                c.title = title;
                c.content = content;
                Ok(c)
            });
        let (use_case, publisher, _) = build(store);
        let edit = CreationEditRequest {
            title: "New".to_string(),
            content: "text".to_string(),
        };

        use_case.edit_creation("author", 2, edit.clone()).await.unwrap();
        assert!(publisher.events().is_empty());

        use_case.edit_creation("author", 1, edit).await.unwrap();
        assert_eq!(publisher.modes(), vec![EventMode::UpdateCreationSearch]);
    }

    #[tokio::test]
    async fn test_delete_carries_collectors_and_totals() {
        let mut store = MockCreationStore::new();
        store.expect_remove_creation().returning(|_, id| {
            Ok(RemovedCreation {
                creation: article(id, STATUS_PASSED),
                statistic: Some(CreationStatistic {
                    creation_id: id,
                    kind: 1,
                    agree: 3,
                    collect: 1,
                    view: 9,
                    comment: 2,
                }),
                collectors: vec!["fan".to_string()],
            })
        });
        let (use_case, publisher, _) = build(store);

        use_case.delete_creation("author", 5).await.unwrap();

        let removed: CreationRemovedEvent = publisher.events()[0].decode().unwrap();
        assert_eq!(removed.collectors, vec!["fan".to_string()]);
        assert_eq!(removed.counts.agree, 3);
        assert_eq!(removed.creation.kind, CreationKind::Article);
    }

    #[tokio::test]
    async fn test_collect_on_reviewing_creation_is_not_found() {
        let mut store = MockCreationStore::new();
        store
            .expect_get_creation()
            .returning(|id| Ok(article(id, STATUS_REVIEWING)));
        store.expect_set_collect().never();
        let (use_case, _, _) = build(store);

        assert!(matches!(
            use_case.set_collect("fan", 5).await,
            Err(ServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_repeated_collect_publishes_once() {
        let mut store = MockCreationStore::new();
        store
            .expect_get_creation()
            .returning(|id| Ok(article(id, STATUS_PASSED)));
        let mut calls = 0;
        store.expect_set_collect().returning(move |_, _| {
            calls += 1;
            Ok(calls == 1)
        });
        let (use_case, publisher, _) = build(store);

        assert!(use_case.set_collect("fan", 5).await.unwrap());
        assert!(!use_case.set_collect("fan", 5).await.unwrap());

        assert_eq!(publisher.modes(), vec![EventMode::SetCreationCollect]);
        let event: CreationInteractionEvent = publisher.events()[0].decode().unwrap();
        assert_eq!(event.author, "author");
        assert_eq!(event.uuid, "fan");
    }

    #[tokio::test]
    async fn test_statistics_mix_cache_and_store() {
        let mut store = MockCreationStore::new();
        store
            .expect_creation_statistics()
            .withf(|kind, ids| *kind == CreationKind::Talk && ids == &vec![2])
            .returning(|_, _| {
                Ok(vec![CreationStatistic {
                    creation_id: 2,
                    kind: 3,
                    agree: 1,
                    collect: 0,
                    view: 4,
                    comment: 0,
                }])
            });
        let (use_case, _, cache) = build(store);
        cache.seed_hash(
            &keys::counter(CreationKind::Talk, 1),
            &[("agree", 7), ("collect", 2), ("view", 10), ("comment", 3)],
            ttl::COUNTER,
        );

        let stats = use_case
            .get_creation_statistics(CreationKind::Talk, &[1, 2])
            .await
            .unwrap();
        assert_eq!(stats.iter().map(|s| s.creation_id).collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(stats[0].agree, 7);
        assert_eq!(stats[1].view, 4);
    }

    #[tokio::test]
    async fn test_leaderboard_skips_undecodable_members() {
        let mut store = MockCreationStore::new();
        store.expect_leaderboard().never();
        let (use_case, _, cache) = build(store);
        let good = cache::ranked_member(3, "author", CreationKind::Talk);
        cache.seed_feed(
            keys::LEADERBOARD,
            &[("9%a%b%1", 9.0), (good.as_str(), 2.0), ("7%author%42", 1.0)],
            ttl::FEED,
        );

        let items = use_case.get_leaderboard(Page::new(1, 10)).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].id, 3);
        assert_eq!(items[0].kind, CreationKind::Talk);
    }

    #[tokio::test]
    async fn test_leaderboard_falls_back_to_store_and_populates() {
        let mut store = MockCreationStore::new();
        store.expect_leaderboard().returning(|_, _| {
            Ok(vec![crate::domain::models::ScoredCreationRow {
                id: 9,
                uuid: "author".to_string(),
                kind: 2,
                score: 12,
            }])
        });
        let (use_case, _, cache) = build(store);

        let board = use_case.get_leaderboard(Page::default()).await.unwrap();
        assert_eq!(board[0].kind, CreationKind::Column);

        use_case.views.populate_pool().wait_idle().await;
        assert!(cache.contains(keys::LEADERBOARD));
    }

    #[tokio::test]
    async fn test_author_of_wrong_kind_is_not_found() {
        let mut store = MockCreationStore::new();
        store
            .expect_get_creation()
            .returning(|id| Ok(article(id, STATUS_PASSED)));
        let (use_case, _, _) = build(store);

        assert_eq!(
            use_case.author(CreationKind::Article, 5).await.unwrap().author,
            "author"
        );
        assert!(matches!(
            use_case.author(CreationKind::Talk, 5).await,
            Err(ServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_comment_count_lands_once_per_key() {
        let mut store = MockCreationStore::new();
        store
            .expect_get_creation()
            .returning(|id| Ok(article(id, STATUS_PASSED)));
        let mut calls = 0;
        store.expect_adjust_comment_count().returning(move |_, _, _| {
            calls += 1;
            Ok(calls == 1)
        });
        let (use_case, _, cache) = build(store);
        let key = keys::counter(CreationKind::Article, 5);
        cache.seed_hash(&key, &[("comment", 1)], ttl::COUNTER);
        let adjustment = CommentCountAdjustment {
            delta: 1,
            idempotency_key: "comment_create_77".to_string(),
        };

        let first = use_case
            .adjust_comment_count(CreationKind::Article, 5, adjustment.clone())
            .await
            .unwrap();
        let second = use_case
            .adjust_comment_count(CreationKind::Article, 5, adjustment)
            .await
            .unwrap();

        assert!(first.applied);
        assert!(!second.applied);
        assert_eq!(cache.hash_field(&key, "comment"), Some(2));
    }

    #[tokio::test]
    async fn test_comment_count_for_deleted_creation_is_not_applied() {
        let mut store = MockCreationStore::new();
        store
            .expect_get_creation()
            .returning(|id| Err(RepoError::NotFound(format!("creation {}", id))));
        store.expect_adjust_comment_count().never();
        let (use_case, _, _) = build(store);

        let result = use_case
            .adjust_comment_count(
                CreationKind::Article,
                5,
                CommentCountAdjustment {
                    delta: -3,
                    idempotency_key: "comment_remove_8".to_string(),
                },
            )
            .await
            .unwrap();
        assert!(!result.applied);
    }
}
