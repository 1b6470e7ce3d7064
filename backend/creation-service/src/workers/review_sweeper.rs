//! Re-sends review requests for creations stuck in review.
//!
//! The request is published after commit; if that publish was lost the
//! creation would stay reviewing forever. Verdicts are idempotent, so a
//! duplicate request costs one extra reviewer call.

use crate::config::SweeperConfig;
use crate::error::ServiceResult;
use crate::repository::CreationStore;
use crate::services::creations::review_text;
use crate::services::publish;
use event_dispatch::EventPublisher;
use event_schema::{CreationKind, EventMode, ReviewRequestEvent};
use std::sync::Arc;
use tokio::time::sleep;
use tracing::{debug, info, warn};

pub async fn run(store: Arc<dyn CreationStore>, publisher: Arc<dyn EventPublisher>, config: SweeperConfig) {
    info!(interval_secs = config.interval.as_secs(), "Starting creation review sweeper");
    loop {
        sleep(config.interval).await;
        match sweep_once(store.as_ref(), publisher.as_ref(), &config).await {
            Ok(0) => debug!("No stale creation reviews"),
            Ok(n) => info!(requeued = n, "Re-sent stale creation review requests"),
            Err(e) => warn!(error = %e, "Creation review sweep failed"),
        }
    }
}

pub async fn sweep_once(
    store: &dyn CreationStore,
    publisher: &dyn EventPublisher,
    config: &SweeperConfig,
) -> ServiceResult<usize> {
    let backlog = store
        .review_backlog(config.grace.as_secs() as i64, config.batch_size)
        .await?;

    let mut sent = 0;
    for entry in backlog {
        let Some(kind) = CreationKind::from_code(entry.kind) else {
            warn!(creation_id = entry.id, kind = entry.kind, "Skipping creation of unknown kind");
            continue;
        };
        let request = ReviewRequestEvent {
            subject: kind.as_str().to_string(),
            entity_id: entry.id,
            uuid: entry.uuid,
            parent_id: 0,
            text: review_text(&entry.title, &entry.content),
        };
        publish(publisher, EventMode::CreationReviewRequest, entry.id, &request).await?;
        sent += 1;
    }
    Ok(sent)
}
