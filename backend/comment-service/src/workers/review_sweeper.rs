//! Review backlog sweeper
//!
//! A review request is published after the store commit, so a crash or a
//! bus outage in between leaves the entity reviewing with nobody asking for
//! a verdict. This job periodically re-publishes requests for entities that
//! have been reviewing longer than the grace period. Duplicate verdicts are
//! harmless: the result step is idempotent.

use crate::config::SweeperConfig;
use crate::error::ServiceResult;
use crate::repository::CommentStore;
use crate::services::publish;
use event_dispatch::EventPublisher;
use event_schema::{CommentKind, EventMode, ReviewRequestEvent};
use std::sync::Arc;
use tokio::time::sleep;
use tracing::{debug, info, warn};

pub async fn run(store: Arc<dyn CommentStore>, publisher: Arc<dyn EventPublisher>, config: SweeperConfig) {
    info!(
        interval_secs = config.interval.as_secs(),
        grace_secs = config.grace.as_secs(),
        "Starting review backlog sweeper"
    );

    loop {
        sleep(config.interval).await;

        match sweep_once(store.as_ref(), publisher.as_ref(), &config).await {
            Ok(0) => debug!("Review backlog empty"),
            Ok(n) => info!(requeued = n, "Re-sent stale review requests"),
            Err(e) => warn!(error = %e, "Review backlog sweep failed"),
        }
    }
}

/// Re-publish one batch of stale review requests.
pub async fn sweep_once(
    store: &dyn CommentStore,
    publisher: &dyn EventPublisher,
    config: &SweeperConfig,
) -> ServiceResult<usize> {
    let backlog = store
        .review_backlog(config.grace.as_secs() as i64, config.batch_size)
        .await?;

    let mut sent = 0;
    for entry in backlog {
        let Some(kind) = CommentKind::from_code(entry.kind) else {
            warn!(id = entry.id, kind = entry.kind, "Skipping backlog entry of unknown kind");
            continue;
        };
        let request = ReviewRequestEvent {
            subject: kind.as_str().to_string(),
            entity_id: entry.id,
            uuid: entry.uuid,
            parent_id: entry.parent_id,
            text: entry.content,
        };
        publish(publisher, EventMode::CommentReviewRequest, entry.id, &request).await?;
        sent += 1;
    }
    Ok(sent)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::ReviewBacklogEntry;
    use crate::repository::MockCommentStore;
    use event_dispatch::MemoryEventPublisher;
    use std::time::Duration;

    fn config() -> SweeperConfig {
        SweeperConfig {
            interval: Duration::from_secs(60),
            grace: Duration::from_secs(300),
            batch_size: 50,
        }
    }

    #[tokio::test]
    async fn test_sweep_republishes_stale_requests() {
        let mut store = MockCommentStore::new();
        store
            .expect_review_backlog()
            .withf(|older_than, limit| *older_than == 300 && *limit == 50)
            .returning(|_, _| {
                Ok(vec![
                    ReviewBacklogEntry {
                        id: 100,
                        kind: CommentKind::Comment.code(),
                        uuid: "u1".to_string(),
                        parent_id: 10,
                        content: "first".to_string(),
                    },
                    ReviewBacklogEntry {
                        id: 201,
                        kind: CommentKind::SubComment.code(),
                        uuid: "u2".to_string(),
                        parent_id: 100,
                        content: "reply".to_string(),
                    },
                ])
            });
        let publisher = MemoryEventPublisher::new();

        let sent = sweep_once(&store, &publisher, &config()).await.unwrap();
        assert_eq!(sent, 2);

        let requests: Vec<ReviewRequestEvent> = publisher
            .events()
            .iter()
            .map(|e| e.decode().unwrap())
            .collect();
        assert_eq!(requests[0].subject, "comment");
        assert_eq!(requests[1].subject, "sub_comment");
        assert_eq!(requests[1].parent_id, 100);
    }

    #[tokio::test]
    async fn test_sweep_stops_when_bus_is_down() {
        let mut store = MockCommentStore::new();
        store.expect_review_backlog().returning(|_, _| {
            Ok(vec![ReviewBacklogEntry {
                id: 100,
                kind: CommentKind::Comment.code(),
                uuid: "u1".to_string(),
                parent_id: 10,
                content: "first".to_string(),
            }])
        });
        let publisher = MemoryEventPublisher::new();
        publisher.set_failing(true);

        assert!(sweep_once(&store, &publisher, &config()).await.is_err());
    }
}
