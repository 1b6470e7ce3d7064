//! Handler table for the creation topic.

use crate::error::ServiceResult;
use crate::services::CreationWorkflow;
use event_dispatch::{handler_fn, EventHandler, HandlerError, HandlerTable};
use event_schema::{EventEnvelope, EventMode};
use std::future::Future;
use std::sync::Arc;

fn step<F, Fut>(workflow: &Arc<CreationWorkflow>, run: F) -> Arc<dyn EventHandler>
where
    F: Fn(Arc<CreationWorkflow>, EventEnvelope) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ServiceResult<()>> + Send + 'static,
{
    let workflow = workflow.clone();
    handler_fn(move |event: EventEnvelope| {
        let fut = run(workflow.clone(), event);
        async move { fut.await.map_err(HandlerError::from) }
    })
}

pub fn handler_table(workflow: Arc<CreationWorkflow>) -> HandlerTable {
    let w = &workflow;
    HandlerTable::new()
        .bind(
            EventMode::CreationReviewRequest,
            step(w, |w, e| async move { w.review_request(&e).await }),
        )
        .bind(
            EventMode::CreationReviewResult,
            step(w, |w, e| async move { w.review_result(&e).await }),
        )
        .bind(
            EventMode::CreateCreationDbCacheAndSearch,
            step(w, |w, e| async move { w.creation_created(&e).await }),
        )
        .bind(
            EventMode::UpdateCreationSearch,
            step(w, |w, e| async move { w.search_updated(&e).await }),
        )
        .bind(
            EventMode::RemoveCreationCache,
            step(w, |w, e| async move { w.creation_removed(&e).await }),
        )
        .bind(
            EventMode::SetCreationAgree,
            step(w, |w, e| async move { w.agree_changed(&e, 1).await }),
        )
        .bind(
            EventMode::CancelCreationAgree,
            step(w, |w, e| async move { w.agree_changed(&e, -1).await }),
        )
        .bind(
            EventMode::SetCreationCollect,
            step(w, |w, e| async move { w.collect_changed(&e, 1).await }),
        )
        .bind(
            EventMode::CancelCreationCollect,
            step(w, |w, e| async move { w.collect_changed(&e, -1).await }),
        )
        .bind(
            EventMode::AddCreationView,
            step(w, |w, e| async move { w.viewed(&e).await }),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::MockCreationStore;
    use crate::services::reviewer::MockContentReviewer;
    use event_dispatch::MemoryEventPublisher;
    use fanout_cache::MemoryCacheStore;

    #[test]
    fn test_every_creation_mode_is_bound() {
        let workflow = Arc::new(CreationWorkflow::new(
            Arc::new(MockCreationStore::new()),
            Arc::new(MemoryCacheStore::new()),
            Arc::new(MemoryEventPublisher::new()),
            Arc::new(MockContentReviewer::new()),
        ));
        let table = handler_table(workflow);

        assert_eq!(table.len(), 10);
        for mode in EventMode::ALL {
            let is_creation_mode = mode.as_str().contains("creation");
            assert_eq!(table.get(mode).is_some(), is_creation_mode, "{}", mode);
        }
    }
}
