pub mod comments;
pub mod facade;
pub mod reviewer;
pub mod search;
pub mod workflow;

pub use comments::{CommentDraftRequest, CommentUseCase, SubCommentDraftRequest};
pub use facade::{CreationStatisticsProvider, HttpCreationClient};
pub use reviewer::{AutoPassReviewer, ContentReviewer, HttpReviewer};
pub use search::SearchIndexer;
pub use workflow::CommentWorkflow;

use crate::error::{ServiceError, ServiceResult};
use crate::SERVICE_NAME;
use event_dispatch::EventPublisher;
use event_schema::{EventEnvelope, EventMode};
use serde::Serialize;
use std::fmt::Display;

/// Wrap `payload` in an envelope and publish it keyed by `key`.
pub(crate) async fn publish<T: Serialize>(
    publisher: &dyn EventPublisher,
    mode: EventMode,
    key: impl Display,
    payload: &T,
) -> ServiceResult<EventEnvelope> {
    let envelope = EventEnvelope::new(SERVICE_NAME, mode, payload)
        .map_err(|e| ServiceError::DispatchFailed(e.into()))?;
    publisher.publish(&key.to_string(), &envelope).await?;
    Ok(envelope)
}
