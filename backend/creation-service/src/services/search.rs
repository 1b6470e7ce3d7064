use crate::error::ServiceResult;
use event_dispatch::EventPublisher;
use event_schema::{CreationKind, EventMode, SearchDocumentEvent, SearchRemovalEvent};
use std::sync::Arc;

/// Keeps the per-kind search indexes (`article`, `column`, `talk`) in step.
#[derive(Clone)]
pub struct SearchIndexer {
    publisher: Arc<dyn EventPublisher>,
}

impl SearchIndexer {
    pub fn new(publisher: Arc<dyn EventPublisher>) -> Self {
        Self { publisher }
    }

    /// Index or reindex a document. Talks carry no title.
    pub async fn index(
        &self,
        kind: CreationKind,
        id: i64,
        uuid: &str,
        title: &str,
        content: &str,
    ) -> ServiceResult<()> {
        let document = SearchDocumentEvent {
            index: kind.as_str().to_string(),
            id,
            uuid: uuid.to_string(),
            title: (!title.is_empty()).then(|| title.to_string()),
            content: content.to_string(),
        };
        super::publish(&*self.publisher, EventMode::SearchIndex, id, &document).await?;
        Ok(())
    }

    pub async fn remove(&self, kind: CreationKind, id: i64) -> ServiceResult<()> {
        let removal = SearchRemovalEvent {
            index: kind.as_str().to_string(),
            id,
        };
        super::publish(&*self.publisher, EventMode::SearchRemove, id, &removal).await?;
        Ok(())
    }
}
