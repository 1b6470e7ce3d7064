pub mod creations;
pub mod reviewer;
pub mod search;
pub mod workflow;

pub use creations::{CreationDraftRequest, CreationEditRequest, CreationUseCase};
pub use reviewer::{AutoPassReviewer, ContentReviewer, HttpReviewer};
pub use search::SearchIndexer;
pub use workflow::CreationWorkflow;

use crate::error::{ServiceError, ServiceResult};
use crate::SERVICE_NAME;
use event_dispatch::EventPublisher;
use event_schema::{EventEnvelope, EventMode};
use serde::Serialize;
use std::fmt::Display;

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
