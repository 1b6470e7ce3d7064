//! Bus-driven creation steps.
//!
//! Steps are replay-safe: store writes are idempotent and every cache batch
//! carries a marker (creation id for create/remove, event id for
//! interactions).

use crate::cache;
use crate::domain::models::CreationViolation;
use crate::error::{ServiceError, ServiceResult};
use crate::repository::{CreationStore, RepoError};
use crate::services::reviewer::ContentReviewer;
use crate::services::search::SearchIndexer;
use event_dispatch::EventPublisher;
use event_schema::{
    CreationEvent, CreationInteractionEvent, CreationKind, CreationRemovedEvent, EventEnvelope,
    EventMode, ReviewCorrelation, ReviewRequestEvent, ReviewResultEvent,
};
use fanout_cache::{CacheStore, GuardedBatch, ScriptOutcome};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct CreationWorkflow {
    store: Arc<dyn CreationStore>,
    cache: Arc<dyn CacheStore>,
    publisher: Arc<dyn EventPublisher>,
    reviewer: Arc<dyn ContentReviewer>,
    search: SearchIndexer,
}

impl CreationWorkflow {
    pub fn new(
        store: Arc<dyn CreationStore>,
        cache: Arc<dyn CacheStore>,
        publisher: Arc<dyn EventPublisher>,
        reviewer: Arc<dyn ContentReviewer>,
    ) -> Self {
        Self {
            store,
            cache,
            search: SearchIndexer::new(publisher.clone()),
            publisher,
            reviewer,
        }
    }

    /// `creation_review_request`
    pub async fn review_request(&self, event: &EventEnvelope) -> ServiceResult<()> {
        let request: ReviewRequestEvent = decode(event)?;
        let job_id = self.reviewer.submit(request.clone()).await?;
        info!(subject = %request.subject, creation_id = request.entity_id, %job_id, "Submitted for review");
        Ok(())
    }

    /// `creation_review_result`
    pub async fn review_result(&self, event: &EventEnvelope) -> ServiceResult<()> {
        let verdict: ReviewResultEvent = decode(event)?;
        let correlation = ReviewCorrelation::from_headers(&verdict.correlation)
            .map_err(|e| ServiceError::ValidationFailed(e.to_string()))?;
        let kind: CreationKind = correlation
            .subject
            .parse()
            .map_err(|_| ServiceError::ValidationFailed(format!("unknown review subject {}", correlation.subject)))?;

        let creation = match self.store.get_creation(correlation.entity_id).await {
            Ok(creation) => Some(creation),
            Err(RepoError::NotFound(_)) => {
                info!(creation_id = correlation.entity_id, "Verdict for a creation that no longer exists");
                None
            }
            Err(e) => return Err(e.into()),
        };

        if let Some(creation) = creation {
            if creation.uuid != correlation.uuid || creation.kind != kind.code() {
                return Err(ServiceError::ValidationFailed(format!(
                    "verdict does not match creation {}",
                    creation.id
                )));
            }

            if verdict.passed {
                super::publish(
                    &*self.publisher,
                    EventMode::CreateCreationDbCacheAndSearch,
                    creation.id,
                    &creation.to_event(kind),
                )
                .await?;
            } else {
                let deleted = self
                    .store
                    .reject(CreationViolation {
                        uuid: correlation.uuid.clone(),
                        creation_id: creation.id,
                        kind,
                        job_id: verdict.job_id.clone(),
                        label: verdict.label.clone(),
                        result: verdict.result.clone(),
                    })
                    .await?;
                info!(kind = %kind, creation_id = creation.id, label = %verdict.label, deleted, "Review rejected");
            }
        }

        self.apply(&cache::review_settled(&correlation.uuid, kind, correlation.entity_id))
            .await?;
        Ok(())
    }

    /// `create_creation_db_cache_and_search`
    pub async fn creation_created(&self, event: &EventEnvelope) -> ServiceResult<()> {
        let payload: CreationEvent = decode(event)?;
        let creation = match self.store.mark_passed(payload.id).await {
            Ok(creation) => creation,
            Err(RepoError::NotFound(_)) => {
                info!(creation_id = payload.id, "Creation removed before it went live");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        self.apply(&cache::creation_created(&creation.to_event(payload.kind)))
            .await?;
        self.search
            .index(payload.kind, creation.id, &creation.uuid, &creation.title, &creation.content)
            .await
    }

    /// `update_creation_search`. Indexes the stored text, not the payload, so
    /// an older edit delivered late cannot win.
    pub async fn search_updated(&self, event: &EventEnvelope) -> ServiceResult<()> {
        let payload: CreationEvent = decode(event)?;
        match self.store.get_creation(payload.id).await {
            Ok(creation) if creation.is_passed() => {
                self.search
                    .index(payload.kind, creation.id, &creation.uuid, &creation.title, &creation.content)
                    .await
            }
            Ok(_) | Err(RepoError::NotFound(_)) => {
                debug!(creation_id = payload.id, "Nothing to reindex");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// `remove_creation_cache`
    pub async fn creation_removed(&self, event: &EventEnvelope) -> ServiceResult<()> {
        let removed: CreationRemovedEvent = decode(event)?;
        self.apply(&cache::creation_removed(&removed)).await?;
        self.search.remove(removed.creation.kind, removed.creation.id).await
    }

    /// `set_creation_agree` (+1) and `cancel_creation_agree` (-1)
    pub async fn agree_changed(&self, event: &EventEnvelope, delta: i64) -> ServiceResult<()> {
        let interaction: CreationInteractionEvent = decode(event)?;
        self.apply(&cache::agree_changed(&interaction, delta, event.event_id))
            .await?;
        Ok(())
    }

    /// `set_creation_collect` (+1) and `cancel_creation_collect` (-1)
    pub async fn collect_changed(&self, event: &EventEnvelope, delta: i64) -> ServiceResult<()> {
        let interaction: CreationInteractionEvent = decode(event)?;
        if interaction.uuid.is_empty() {
            return Err(ServiceError::ValidationFailed("collect without a user".to_string()));
        }
        let collected_at = event.timestamp.timestamp_millis() as f64;
        self.apply(&cache::collect_changed(&interaction, delta, collected_at, event.event_id))
            .await?;
        Ok(())
    }

    /// `add_creation_view`
    pub async fn viewed(&self, event: &EventEnvelope) -> ServiceResult<()> {
        let interaction: CreationInteractionEvent = decode(event)?;
        self.apply(&cache::viewed(&interaction, event.event_id)).await?;
        Ok(())
    }

    async fn apply(&self, batch: &GuardedBatch) -> ServiceResult<ScriptOutcome> {
        let outcome = self.cache.apply(batch).await?;
        if outcome == ScriptOutcome::Duplicate {
            debug!(marker = ?batch.marker.as_ref().map(|m| &m.key), "Fan-out already applied");
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
    use crate::domain::models::{Creation, STATUS_PASSED, STATUS_REVIEWING};
    use crate::repository::MockCreationStore;
    use crate::services::reviewer::MockContentReviewer;
    use chrono::Utc;
    use event_dispatch::MemoryEventPublisher;
    use event_schema::facade::CreationCounts;
    use event_schema::{SearchDocumentEvent, SearchRemovalEvent};
    use fanout_cache::{ttl, MemoryCacheStore};
    use std::collections::BTreeMap;

    fn build(
        store: MockCreationStore,
        reviewer: MockContentReviewer,
    ) -> (CreationWorkflow, MemoryEventPublisher, Arc<MemoryCacheStore>) {
        let publisher = MemoryEventPublisher::new();
        let cache = Arc::new(MemoryCacheStore::new());
        let workflow = CreationWorkflow::new(
            Arc::new(store),
            cache.clone(),
            Arc::new(publisher.clone()),
            Arc::new(reviewer),
        );
        (workflow, publisher, cache)
    }

    fn talk(status: i16) -> Creation {
        Creation {
            id: 8,
            uuid: "author".to_string(),
            kind: CreationKind::Talk.code(),
            title: String::new(),
            content: "short".to_string(),
            status,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn envelope<T: serde::Serialize>(mode: EventMode, payload: &T) -> EventEnvelope {
        EventEnvelope::new("test", mode, payload).unwrap()
    }

    fn verdict(passed: bool, subject: &str) -> ReviewResultEvent {
        ReviewResultEvent {
            job_id: "job-9".to_string(),
            passed,
            label: if passed { "Normal" } else { "Ad" }.to_string(),
            result: String::new(),
            correlation: ReviewCorrelation {
                uuid: "author".to_string(),
                entity_id: 8,
                parent_id: 0,
                subject: subject.to_string(),
            }
            .to_headers(),
        }
    }

    fn interaction(uuid: &str) -> CreationInteractionEvent {
        CreationInteractionEvent {
            creation_id: 8,
            kind: CreationKind::Talk,
            author: "author".to_string(),
            uuid: uuid.to_string(),
        }
    }

    #[tokio::test]
    async fn test_pass_publishes_create_and_settles_queue() {
        let mut store = MockCreationStore::new();
        store.expect_get_creation().returning(|_| Ok(talk(STATUS_REVIEWING)));
        store.expect_reject().never();
        let (workflow, publisher, cache) = build(store, MockContentReviewer::new());
        cache
            .apply(&cache::review_enqueued("author", CreationKind::Talk, 8))
            .await
            .unwrap();

        workflow
            .review_result(&envelope(EventMode::CreationReviewResult, &verdict(true, "talk")))
            .await
            .unwrap();

        assert_eq!(publisher.modes(), vec![EventMode::CreateCreationDbCacheAndSearch]);
        assert_eq!(cache.list(&keys::review_queue("author")), None);
    }

    #[tokio::test]
    async fn test_reject_records_violation() {
        let mut store = MockCreationStore::new();
        store.expect_get_creation().returning(|_| Ok(talk(STATUS_REVIEWING)));
        store
            .expect_reject()
            .withf(|v| v.creation_id == 8 && v.label == "Ad" && v.kind == CreationKind::Talk)
            .times(1)
            .returning(|_| Ok(true));
        let (workflow, publisher, _) = build(store, MockContentReviewer::new());

        workflow
            .review_result(&envelope(EventMode::CreationReviewResult, &verdict(false, "talk")))
            .await
            .unwrap();
        assert!(publisher.events().is_empty());
    }

    #[tokio::test]
    async fn test_verdict_with_wrong_kind_is_malformed() {
        let mut store = MockCreationStore::new();
        store.expect_get_creation().returning(|_| Ok(talk(STATUS_REVIEWING)));
        let (workflow, publisher, _) = build(store, MockContentReviewer::new());

        let err = workflow
            .review_result(&envelope(EventMode::CreationReviewResult, &verdict(true, "article")))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::ValidationFailed(_)));
        assert!(publisher.events().is_empty());

        let mut headers = BTreeMap::new();
        headers.insert("x-review-subject".to_string(), "talk".to_string());
        let mut bad = verdict(true, "talk");
        bad.correlation = headers;
        assert!(workflow
            .review_result(&envelope(EventMode::CreationReviewResult, &bad))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_created_replay_counts_once() {
        let mut store = MockCreationStore::new();
        store
            .expect_mark_passed()
            .times(2)
            .returning(|_| Ok(talk(STATUS_PASSED)));
        let (workflow, publisher, cache) = build(store, MockContentReviewer::new());
        cache.seed_hash(&keys::user_counter("author"), &[("talk", 2)], ttl::COUNTER);
        cache.seed_feed("talk", &[], ttl::FEED);

        let event = envelope(
            EventMode::CreateCreationDbCacheAndSearch,
            &talk(STATUS_PASSED).to_event(CreationKind::Talk),
        );
        workflow.creation_created(&event).await.unwrap();
        workflow.creation_created(&event).await.unwrap();

        assert_eq!(cache.hash_field(&keys::user_counter("author"), "talk"), Some(3));
        assert_eq!(cache.hash_field(&keys::counter(CreationKind::Talk, 8), "view"), Some(0));
        assert_eq!(cache.feed("talk").map(|f| f.len()), Some(1));

        let indexed: SearchDocumentEvent = publisher
            .events()
            .iter()
            .find(|e| e.mode == EventMode::SearchIndex)
            .map(|e| e.decode().unwrap())
            .unwrap();
        assert_eq!(indexed.index, "talk");
    }

    #[tokio::test]
    async fn test_created_after_delete_is_skipped() {
        let mut store = MockCreationStore::new();
        store
            .expect_mark_passed()
            .returning(|id| Err(RepoError::NotFound(format!("creation {}", id))));
        let (workflow, publisher, _) = build(store, MockContentReviewer::new());

        let event = envelope(
            EventMode::CreateCreationDbCacheAndSearch,
            &talk(STATUS_PASSED).to_event(CreationKind::Talk),
        );
        workflow.creation_created(&event).await.unwrap();
        assert!(publisher.events().is_empty());
    }

    #[tokio::test]
    async fn test_search_update_uses_stored_text() {
        let mut store = MockCreationStore::new();
        store.expect_get_creation().returning(|_| {
            let mut c = talk(STATUS_PASSED);
            c.content = "latest".to_string();
            Ok(c)
        });
        let (workflow, publisher, _) = build(store, MockContentReviewer::new());

        let mut stale = talk(STATUS_PASSED).to_event(CreationKind::Talk);
        stale.content = "older".to_string();
        workflow
            .search_updated(&envelope(EventMode::UpdateCreationSearch, &stale))
            .await
            .unwrap();

        let document: SearchDocumentEvent = publisher.events()[0].decode().unwrap();
        assert_eq!(document.content, "latest");
    }

    #[tokio::test]
    async fn test_removed_unwinds_author_counters_and_search() {
        let (workflow, publisher, cache) = build(MockCreationStore::new(), MockContentReviewer::new());
        let user = keys::user_counter("author");
        cache.seed_hash(&user, &[("talk", 1), ("agree", 5), ("collect", 1)], ttl::COUNTER);
        let member = cache::ranked_member(8, "author", CreationKind::Talk);
        cache.seed_feed(&keys::collect_feed("fan"), &[(member.as_str(), 1.0)], ttl::USER_FEED);

        let removed = CreationRemovedEvent {
            creation: talk(STATUS_PASSED).to_event(CreationKind::Talk),
            collectors: vec!["fan".to_string()],
            counts: CreationCounts {
                agree: 2,
                collect: 1,
                view: 0,
                comment: 0,
            },
        };
        workflow
            .creation_removed(&envelope(EventMode::RemoveCreationCache, &removed))
            .await
            .unwrap();

        assert_eq!(cache.hash_field(&user, "talk"), Some(0));
        assert_eq!(cache.hash_field(&user, "agree"), Some(3));
        assert_eq!(cache.hash_field(&user, "collect"), Some(0));
        assert_eq!(cache.feed(&keys::collect_feed("fan")), None);

        let removal: SearchRemovalEvent = publisher.events()[0].decode().unwrap();
        assert_eq!((removal.index.as_str(), removal.id), ("talk", 8));
    }

    #[tokio::test]
    async fn test_collect_scores_by_event_time_and_replays_once() {
        let (workflow, _, cache) = build(MockCreationStore::new(), MockContentReviewer::new());
        cache.seed_hash(&keys::counter(CreationKind::Talk, 8), &[("collect", 0)], ttl::COUNTER);
        cache.seed_feed(&keys::collect_feed("fan"), &[], ttl::USER_FEED);

        let event = envelope(EventMode::SetCreationCollect, &interaction("fan"));
        workflow.collect_changed(&event, 1).await.unwrap();
        workflow.collect_changed(&event, 1).await.unwrap();

        assert_eq!(cache.hash_field(&keys::counter(CreationKind::Talk, 8), "collect"), Some(1));
        let feed = cache.feed(&keys::collect_feed("fan")).unwrap();
        assert_eq!(feed.len(), 1);
        assert_eq!(feed[0].1, event.timestamp.timestamp_millis() as f64);
    }

    #[tokio::test]
    async fn test_anonymous_collect_is_malformed() {
        let (workflow, _, _) = build(MockCreationStore::new(), MockContentReviewer::new());
        let event = envelope(EventMode::SetCreationCollect, &interaction(""));
        assert!(matches!(
            workflow.collect_changed(&event, 1).await,
            Err(ServiceError::ValidationFailed(_))
        ));
    }

    #[tokio::test]
    async fn test_view_on_cold_counter_creates_nothing() {
        let (workflow, _, cache) = build(MockCreationStore::new(), MockContentReviewer::new());
        workflow
            .viewed(&envelope(EventMode::AddCreationView, &interaction("")))
            .await
            .unwrap();
        assert!(!cache.contains(&keys::counter(CreationKind::Talk, 8)));
    }

    #[tokio::test]
    async fn test_review_request_goes_to_reviewer() {
        let mut reviewer = MockContentReviewer::new();
        reviewer
            .expect_submit()
            .withf(|r| r.subject == "talk" && r.entity_id == 8)
            .times(1)
            .returning(|_| Ok("job-9".to_string()));
        let (workflow, _, _) = build(MockCreationStore::new(), reviewer);

        let request = ReviewRequestEvent {
            subject: "talk".to_string(),
            entity_id: 8,
            uuid: "author".to_string(),
            parent_id: 0,
            text: "short".to_string(),
        };
        workflow
            .review_request(&envelope(EventMode::CreationReviewRequest, &request))
            .await
            .unwrap();
    }
}
