//! Mode → handler bindings for the comment topic.

use crate::error::ServiceResult;
use crate::services::CommentWorkflow;
use event_dispatch::{handler_fn, EventHandler, HandlerError, HandlerTable};
use event_schema::{EventEnvelope, EventMode};
use std::future::Future;
use std::sync::Arc;

fn step<F, Fut>(workflow: &Arc<CommentWorkflow>, run: F) -> Arc<dyn EventHandler>
where
    F: Fn(Arc<CommentWorkflow>, EventEnvelope) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ServiceResult<()>> + Send + 'static,
{
    let workflow = workflow.clone();
    handler_fn(move |event: EventEnvelope| {
        let fut = run(workflow.clone(), event);
        async move { fut.await.map_err(HandlerError::from) }
    })
}

pub fn handler_table(workflow: Arc<CommentWorkflow>) -> HandlerTable {
    HandlerTable::new()
        .bind(
            EventMode::CommentReviewRequest,
            step(&workflow, |w, e| async move { w.review_request(&e).await }),
        )
        .bind(
            EventMode::CommentReviewResult,
            step(&workflow, |w, e| async move { w.review_result(&e).await }),
        )
        .bind(
            EventMode::CreateCommentDbCacheAndSearch,
            step(&workflow, |w, e| async move { w.comment_created(&e).await }),
        )
        .bind(
            EventMode::CreateSubCommentDbCacheAndSearch,
            step(&workflow, |w, e| async move { w.sub_comment_created(&e).await }),
        )
        .bind(
            EventMode::RemoveCommentCache,
            step(&workflow, |w, e| async move { w.comment_removed(&e).await }),
        )
        .bind(
            EventMode::RemoveSubCommentCache,
            step(&workflow, |w, e| async move { w.sub_comment_removed(&e).await }),
        )
        .bind(
            EventMode::SetCommentAgree,
            step(&workflow, |w, e| async move { w.agree_changed(&e, 1).await }),
        )
        .bind(
            EventMode::CancelCommentAgree,
            step(&workflow, |w, e| async move { w.agree_changed(&e, -1).await }),
        )
}
