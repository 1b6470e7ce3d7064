//! Bus-driven steps, one per event mode.
//!
//! Every step may run more than once for the same event. Store updates are
//! idempotent, cache batches carry a marker, and façade calls carry an
//! idempotency key derived from the entity, so replays do not double count.

use crate::cache::{self, SCOPE_CREATE, SCOPE_REMOVE};
use crate::domain::models::Violation;
use crate::error::{ServiceError, ServiceResult};
use crate::repository::{CommentStore, RepoError};
use crate::services::facade::CreationStatisticsProvider;
use crate::services::reviewer::ContentReviewer;
use crate::services::search::SearchIndexer;
use event_dispatch::EventPublisher;
use event_schema::{
    CommentAgreeEvent, CommentEvent, CommentKind, CommentRemovedEvent, EventEnvelope, EventMode,
    ReviewCorrelation, ReviewRequestEvent, ReviewResultEvent, SubCommentEvent,
};
use fanout_cache::{CacheStore, GuardedBatch, ScriptOutcome};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tracing::{debug, info, warn};

const INDEX_COMMENT: &str = "comment";
const INDEX_SUB_COMMENT: &str = "sub_comment";

pub struct CommentWorkflow {
    store: Arc<dyn CommentStore>,
    cache: Arc<dyn CacheStore>,
    publisher: Arc<dyn EventPublisher>,
    reviewer: Arc<dyn ContentReviewer>,
    creations: Arc<dyn CreationStatisticsProvider>,
    search: SearchIndexer,
}

impl CommentWorkflow {
    pub fn new(
        store: Arc<dyn CommentStore>,
        cache: Arc<dyn CacheStore>,
        publisher: Arc<dyn EventPublisher>,
        reviewer: Arc<dyn ContentReviewer>,
        creations: Arc<dyn CreationStatisticsProvider>,
    ) -> Self {
        let search = SearchIndexer::new(publisher.clone());
        Self {
            store,
            cache,
            publisher,
            reviewer,
            creations,
            search,
        }
    }

    /// `comment_review_request`
    pub async fn review_request(&self, event: &EventEnvelope) -> ServiceResult<()> {
        let request: ReviewRequestEvent = decode(event)?;
        let job_id = self.reviewer.submit(request.clone()).await?;
        info!(
            subject = %request.subject,
            entity_id = request.entity_id,
            job_id = %job_id,
            "Submitted for review"
        );
        Ok(())
    }

    /// `comment_review_result`
    pub async fn review_result(&self, event: &EventEnvelope) -> ServiceResult<()> {
        let verdict: ReviewResultEvent = decode(event)?;
        let correlation = ReviewCorrelation::from_headers(&verdict.correlation)
            .map_err(|e| ServiceError::ValidationFailed(e.to_string()))?;

        let kind = match correlation.subject.as_str() {
            "comment" => CommentKind::Comment,
            "sub_comment" => CommentKind::SubComment,
            other => {
                return Err(ServiceError::ValidationFailed(format!(
                    "unknown review subject {}",
                    other
                )))
            }
        };

        match kind {
            CommentKind::Comment => self.settle_comment(&correlation, &verdict).await?,
            CommentKind::SubComment => self.settle_sub_comment(&correlation, &verdict).await?,
        }

        self.apply(&cache::review_settled(&correlation.uuid, kind, correlation.entity_id))
            .await?;
        Ok(())
    }

    async fn settle_comment(&self, correlation: &ReviewCorrelation, verdict: &ReviewResultEvent) -> ServiceResult<()> {
        let comment = match self.store.get_comment(correlation.entity_id).await {
            Ok(comment) => comment,
            Err(RepoError::NotFound(_)) => {
                info!(comment_id = correlation.entity_id, "Verdict for a comment that no longer exists");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };
        if comment.uuid != correlation.uuid || comment.creation_id != correlation.parent_id {
            return Err(ServiceError::ValidationFailed(format!(
                "verdict does not match comment {}",
                comment.id
            )));
        }

        if verdict.passed {
            super::publish(
                &*self.publisher,
                EventMode::CreateCommentDbCacheAndSearch,
                comment.id,
                &comment.to_event(),
            )
            .await?;
            return Ok(());
        }

        self.reject(correlation, verdict, CommentKind::Comment).await
    }

    async fn settle_sub_comment(
        &self,
        correlation: &ReviewCorrelation,
        verdict: &ReviewResultEvent,
    ) -> ServiceResult<()> {
        let reply = match self.store.get_sub_comment(correlation.entity_id).await {
            Ok(reply) => reply,
            Err(RepoError::NotFound(_)) => {
                info!(sub_comment_id = correlation.entity_id, "Verdict for a reply that no longer exists");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };
        if reply.uuid != correlation.uuid || reply.root_id != correlation.parent_id {
            return Err(ServiceError::ValidationFailed(format!(
                "verdict does not match reply {}",
                reply.id
            )));
        }

        if verdict.passed {
            super::publish(
                &*self.publisher,
                EventMode::CreateSubCommentDbCacheAndSearch,
                reply.id,
                &reply.to_event(),
            )
            .await?;
            return Ok(());
        }

        self.reject(correlation, verdict, CommentKind::SubComment).await
    }

    async fn reject(
        &self,
        correlation: &ReviewCorrelation,
        verdict: &ReviewResultEvent,
        kind: CommentKind,
    ) -> ServiceResult<()> {
        let deleted = self
            .store
            .reject(Violation {
                uuid: correlation.uuid.clone(),
                comment_id: correlation.entity_id,
                kind,
                job_id: verdict.job_id.clone(),
                label: verdict.label.clone(),
                result: verdict.result.clone(),
            })
            .await?;
        info!(
            kind = kind.as_str(),
            id = correlation.entity_id,
            label = %verdict.label,
            deleted,
            "Review rejected"
        );
        Ok(())
    }

    /// `create_comment_db_cache_and_search`
    pub async fn comment_created(&self, event: &EventEnvelope) -> ServiceResult<()> {
        let payload: CommentEvent = decode(event)?;
        let comment = match self.store.mark_comment_passed(payload.id).await {
            Ok(comment) => comment,
            Err(RepoError::NotFound(_)) => {
                info!(comment_id = payload.id, "Comment removed before it went live");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        self.apply(&cache::comment_created(&comment.to_event())).await?;
        self.search
            .index(INDEX_COMMENT, comment.id, &comment.uuid, &comment.content)
            .await?;
        self.creations
            .add_creation_comment_count(
                comment.creation_id,
                comment.creation_type,
                1,
                format!("{}_{}", SCOPE_CREATE, comment.id),
            )
            .await?;
        Ok(())
    }

    /// `create_sub_comment_db_cache_and_search`
    pub async fn sub_comment_created(&self, event: &EventEnvelope) -> ServiceResult<()> {
        let payload: SubCommentEvent = decode(event)?;
        let reply = match self.store.mark_sub_comment_passed(payload.id).await {
            Ok(reply) => reply,
            Err(RepoError::NotFound(_)) => {
                info!(sub_comment_id = payload.id, "Reply removed before it went live");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        self.apply(&cache::sub_comment_created(&reply.to_event())).await?;
        self.search
            .index(INDEX_SUB_COMMENT, reply.id, &reply.uuid, &reply.content)
            .await?;
        self.creations
            .add_creation_comment_count(
                reply.creation_id,
                reply.creation_type,
                1,
                format!("{}_{}", SCOPE_CREATE, reply.id),
            )
            .await?;
        Ok(())
    }

    /// `remove_comment_cache`
    pub async fn comment_removed(&self, event: &EventEnvelope) -> ServiceResult<()> {
        let removed: CommentRemovedEvent = decode(event)?;
        let comment = &removed.comment;

        self.apply(&cache::comment_removed(&removed)).await?;
        self.search.remove(INDEX_COMMENT, comment.id).await?;
        for reply in &removed.replies {
            self.search.remove(INDEX_SUB_COMMENT, reply.id).await?;
        }
        self.creations
            .reduce_creation_comment_count(
                comment.creation_id,
                comment.creation_type,
                1 + removed.replies.len() as i64,
                format!("{}_{}", SCOPE_REMOVE, comment.id),
            )
            .await?;
        Ok(())
    }

    /// `remove_sub_comment_cache`
    pub async fn sub_comment_removed(&self, event: &EventEnvelope) -> ServiceResult<()> {
        let reply: SubCommentEvent = decode(event)?;

        self.apply(&cache::sub_comment_removed(&reply)).await?;
        self.search.remove(INDEX_SUB_COMMENT, reply.id).await?;
        self.creations
            .reduce_creation_comment_count(
                reply.creation_id,
                reply.creation_type,
                1,
                format!("{}_{}", SCOPE_REMOVE, reply.id),
            )
            .await?;
        Ok(())
    }

    /// `set_comment_agree` (+1) and `cancel_comment_agree` (-1)
    pub async fn agree_changed(&self, event: &EventEnvelope, delta: i64) -> ServiceResult<()> {
        let agree: CommentAgreeEvent = decode(event)?;
        self.apply(&cache::agree_changed(&agree, delta, event.event_id))
            .await?;
        Ok(())
    }

    async fn apply(&self, batch: &GuardedBatch) -> ServiceResult<ScriptOutcome> {
        let outcome = self.cache.apply(batch).await?;
        match outcome {
            ScriptOutcome::Duplicate => {
                debug!(marker = ?batch.marker.as_ref().map(|m| &m.key), "Fan-out already applied")
            }
            ScriptOutcome::Applied(n) => debug!(effects = n, "Fan-out applied"),
        }
        Ok(outcome)
    }
}

fn decode<T: DeserializeOwned>(event: &EventEnvelope) -> ServiceResult<T> {
    event.decode().map_err(|e| {
        warn!(mode = %event.mode, event_id = %event.event_id, error = %e, "Undecodable payload");
        ServiceError::ValidationFailed(format!("{} payload: {}", event.mode, e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::keys;
    use crate::domain::models::{Comment, SubComment, STATUS_PASSED, STATUS_REVIEWING};
    use crate::repository::MockCommentStore;
    use crate::services::facade::MockCreationStatisticsProvider;
    use crate::services::reviewer::MockContentReviewer;
    use chrono::Utc;
    use event_dispatch::MemoryEventPublisher;
    use event_schema::{SearchDocumentEvent, SearchRemovalEvent};
    use fanout_cache::{ttl, MemoryCacheStore};
    use std::collections::BTreeMap;

    struct Harness {
        store: MockCommentStore,
        reviewer: MockContentReviewer,
        creations: MockCreationStatisticsProvider,
        publisher: MemoryEventPublisher,
        cache: Arc<MemoryCacheStore>,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                store: MockCommentStore::new(),
                reviewer: MockContentReviewer::new(),
                creations: MockCreationStatisticsProvider::new(),
                publisher: MemoryEventPublisher::new(),
                cache: Arc::new(MemoryCacheStore::new()),
            }
        }

        fn build(self) -> (CommentWorkflow, MemoryEventPublisher, Arc<MemoryCacheStore>) {
            let workflow = CommentWorkflow::new(
                Arc::new(self.store),
                self.cache.clone(),
                Arc::new(self.publisher.clone()),
                Arc::new(self.reviewer),
                Arc::new(self.creations),
            );
            (workflow, self.publisher, self.cache)
        }
    }

    fn comment(status: i16) -> Comment {
        Comment {
            id: 100,
            uuid: "u1".to_string(),
            creation_id: 10,
            creation_type: 1,
            creation_author: "a".to_string(),
            content: "first".to_string(),
            status,
            created_at: Utc::now(),
        }
    }

    fn reply(id: i64, uuid: &str, reply_uuid: &str) -> SubComment {
        SubComment {
            id,
            uuid: uuid.to_string(),
            creation_id: 10,
            creation_type: 1,
            creation_author: "a".to_string(),
            root_id: 100,
            root_uuid: "u1".to_string(),
            parent_id: 100,
            reply_uuid: reply_uuid.to_string(),
            content: "reply".to_string(),
            status: STATUS_PASSED,
            created_at: Utc::now(),
        }
    }

    fn envelope<T: serde::Serialize>(mode: EventMode, payload: &T) -> EventEnvelope {
        EventEnvelope::new("test", mode, payload).unwrap()
    }

    fn verdict(passed: bool, correlation: BTreeMap<String, String>) -> ReviewResultEvent {
        ReviewResultEvent {
            job_id: "job-1".to_string(),
            passed,
            label: if passed { "Normal".to_string() } else { "Spam".to_string() },
            result: String::new(),
            correlation,
        }
    }

    fn correlation(subject: &str, entity_id: i64, parent_id: i64) -> BTreeMap<String, String> {
        ReviewCorrelation {
            uuid: "u1".to_string(),
            entity_id,
            parent_id,
            subject: subject.to_string(),
        }
        .to_headers()
    }

    #[tokio::test]
    async fn test_passing_verdict_publishes_create_event() {
        let mut h = Harness::new();
        h.store
            .expect_get_comment()
            .returning(|_| Ok(comment(STATUS_REVIEWING)));
        h.store.expect_reject().never();
        let (workflow, publisher, _) = h.build();

        let event = envelope(
            EventMode::CommentReviewResult,
            &verdict(true, correlation("comment", 100, 10)),
        );
        workflow.review_result(&event).await.unwrap();

        let events = publisher.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].mode, EventMode::CreateCommentDbCacheAndSearch);
        let created: CommentEvent = events[0].decode().unwrap();
        assert_eq!(created.id, 100);
    }

    #[tokio::test]
    async fn test_failing_verdict_records_violation() {
        let mut h = Harness::new();
        h.store
            .expect_get_comment()
            .returning(|_| Ok(comment(STATUS_REVIEWING)));
        h.store
            .expect_reject()
            .withf(|v| v.comment_id == 100 && v.label == "Spam" && v.kind == CommentKind::Comment)
            .times(1)
            .returning(|_| Ok(true));
        let (workflow, publisher, _) = h.build();

        let event = envelope(
            EventMode::CommentReviewResult,
            &verdict(false, correlation("comment", 100, 10)),
        );
        workflow.review_result(&event).await.unwrap();
        assert!(publisher.events().is_empty());
    }

    #[tokio::test]
    async fn test_verdict_without_correlation_is_malformed() {
        let mut h = Harness::new();
        h.store.expect_get_comment().never();
        let (workflow, _, _) = h.build();

        let event = envelope(EventMode::CommentReviewResult, &verdict(true, BTreeMap::new()));
        let err = workflow.review_result(&event).await.unwrap_err();
        assert!(matches!(err, ServiceError::ValidationFailed(_)));
    }

    #[tokio::test]
    async fn test_verdict_for_other_owner_is_refused() {
        let mut h = Harness::new();
        h.store.expect_get_comment().returning(|_| {
            let mut c = comment(STATUS_REVIEWING);
            c.uuid = "someone-else".to_string();
            Ok(c)
        });
        let (workflow, publisher, _) = h.build();

        let event = envelope(
            EventMode::CommentReviewResult,
            &verdict(true, correlation("comment", 100, 10)),
        );
        assert!(workflow.review_result(&event).await.is_err());
        assert!(publisher.events().is_empty());
    }

    #[tokio::test]
    async fn test_verdict_clears_review_queue_entry() {
        let mut h = Harness::new();
        h.store
            .expect_get_comment()
            .returning(|_| Ok(comment(STATUS_REVIEWING)));
        let (workflow, _, cache) = h.build();
        cache
            .apply(&cache::review_enqueued("u1", CommentKind::Comment, 100))
            .await
            .unwrap();

        let event = envelope(
            EventMode::CommentReviewResult,
            &verdict(true, correlation("comment", 100, 10)),
        );
        workflow.review_result(&event).await.unwrap();
        assert_eq!(cache.list(&keys::review_queue("u1")), None);
    }

    #[tokio::test]
    async fn test_comment_created_replay_counts_once() {
        let mut h = Harness::new();
        h.store
            .expect_mark_comment_passed()
            .times(2)
            .returning(|_| Ok(comment(STATUS_PASSED)));
        h.creations
            .expect_add_creation_comment_count()
            .withf(|id, kind, count, key| *id == 10 && *kind == 1 && *count == 1 && key == "comment_create_100")
            .times(2)
            .returning(|_, _, _, _| Ok(()));
        let (workflow, publisher, cache) = h.build();
        cache.seed_hash(&keys::user_counter("a"), &[("comment", 4), ("agree", 0)], ttl::COUNTER);

        let event = envelope(EventMode::CreateCommentDbCacheAndSearch, &comment(STATUS_PASSED).to_event());
        workflow.comment_created(&event).await.unwrap();
        workflow.comment_created(&event).await.unwrap();

        assert_eq!(cache.hash_field(&keys::user_counter("a"), "comment"), Some(5));
        assert_eq!(cache.hash_field(&keys::counter(100), "agree"), Some(0));

        let indexed: Vec<SearchDocumentEvent> = publisher
            .events()
            .iter()
            .filter(|e| e.mode == EventMode::SearchIndex)
            .map(|e| e.decode().unwrap())
            .collect();
        assert!(!indexed.is_empty());
        assert_eq!(indexed[0].index, "comment");
    }

    #[tokio::test]
    async fn test_comment_created_after_removal_is_skipped() {
        let mut h = Harness::new();
        h.store
            .expect_mark_comment_passed()
            .returning(|id| Err(RepoError::NotFound(format!("comment {}", id))));
        h.creations.expect_add_creation_comment_count().never();
        let (workflow, publisher, _) = h.build();

        let event = envelope(EventMode::CreateCommentDbCacheAndSearch, &comment(STATUS_PASSED).to_event());
        workflow.comment_created(&event).await.unwrap();
        assert!(publisher.events().is_empty());
    }

    #[tokio::test]
    async fn test_cache_failure_surfaces_for_redelivery() {
        let mut h = Harness::new();
        h.store
            .expect_mark_comment_passed()
            .returning(|_| Ok(comment(STATUS_PASSED)));
        h.creations.expect_add_creation_comment_count().never();
        let (workflow, _, cache) = h.build();
        cache.set_unavailable(true);

        let event = envelope(EventMode::CreateCommentDbCacheAndSearch, &comment(STATUS_PASSED).to_event());
        let err = workflow.comment_created(&event).await.unwrap_err();
        assert!(matches!(err, ServiceError::CacheFailed(_)));
    }

    #[tokio::test]
    async fn test_comment_removed_reduces_by_replies_and_clears_search() {
        let mut h = Harness::new();
        h.creations
            .expect_reduce_creation_comment_count()
            .withf(|_, _, count, key| *count == 3 && key == "comment_remove_100")
            .times(1)
            .returning(|_, _, _, _| Ok(()));
        let (workflow, publisher, cache) = h.build();
        cache.seed_hash(&keys::user_counter("a"), &[("comment", 5), ("agree", 0)], ttl::COUNTER);
        cache.seed_hash(&keys::counter(100), &[("agree", 2), ("comment", 2)], ttl::COUNTER);
        cache.seed_hash(&keys::user_counter("u1"), &[("comment", 1), ("agree", 2)], ttl::COUNTER);
        cache.seed_hash(&keys::user_counter("u2"), &[("comment", 0), ("agree", 6)], ttl::COUNTER);

        let removed = CommentRemovedEvent {
            comment: comment(STATUS_PASSED).to_event(),
            agree: 2,
            replies: vec![
                SubCommentEvent {
                    agree: 1,
                    ..reply(201, "u2", "u1").to_event()
                },
                reply(202, "u3", "u2").to_event(),
            ],
        };
        workflow
            .comment_removed(&envelope(EventMode::RemoveCommentCache, &removed))
            .await
            .unwrap();

        assert_eq!(cache.hash_field(&keys::user_counter("a"), "comment"), Some(2));
        assert!(!cache.contains(&keys::counter(100)));
        assert_eq!(cache.hash_field(&keys::user_counter("u1"), "agree"), Some(0));
        assert_eq!(cache.hash_field(&keys::user_counter("u2"), "agree"), Some(5));

        let removals: Vec<i64> = publisher
            .events()
            .iter()
            .filter(|e| e.mode == EventMode::SearchRemove)
            .map(|e| e.decode::<SearchRemovalEvent>().unwrap().id)
            .collect();
        assert_eq!(removals, vec![100, 201, 202]);
    }

    #[tokio::test]
    async fn test_agree_on_uncached_reply_leaves_cache_cold() {
        let h = Harness::new();
        let (workflow, _, cache) = h.build();

        let agree = CommentAgreeEvent {
            comment_id: 5,
            uuid: "u2".to_string(),
            author: "u1".to_string(),
            creation_id: 10,
            creation_type: 1,
            root_id: Some(100),
        };
        workflow
            .agree_changed(&envelope(EventMode::SetCommentAgree, &agree), 1)
            .await
            .unwrap();
        assert!(!cache.contains(&keys::counter(5)));
    }

    #[tokio::test]
    async fn test_agree_redelivery_applies_once() {
        let h = Harness::new();
        let (workflow, _, cache) = h.build();
        cache.seed_hash(&keys::counter(100), &[("agree", 0), ("comment", 0)], ttl::COUNTER);

        let agree = CommentAgreeEvent {
            comment_id: 100,
            uuid: "u2".to_string(),
            author: "u1".to_string(),
            creation_id: 10,
            creation_type: 1,
            root_id: None,
        };
        let event = envelope(EventMode::SetCommentAgree, &agree);
        workflow.agree_changed(&event, 1).await.unwrap();
        workflow.agree_changed(&event, 1).await.unwrap();

        assert_eq!(cache.hash_field(&keys::counter(100), "agree"), Some(1));
    }

    #[tokio::test]
    async fn test_review_request_submits_to_reviewer() {
        let mut h = Harness::new();
        h.reviewer
            .expect_submit()
            .withf(|r| r.entity_id == 100 && r.subject == "comment")
            .times(1)
            .returning(|_| Ok("job-1".to_string()));
        let (workflow, _, _) = h.build();

        let request = ReviewRequestEvent {
            subject: "comment".to_string(),
            entity_id: 100,
            uuid: "u1".to_string(),
            parent_id: 10,
            text: "first".to_string(),
        };
        workflow
            .review_request(&envelope(EventMode::CommentReviewRequest, &request))
            .await
            .unwrap();
    }
}
