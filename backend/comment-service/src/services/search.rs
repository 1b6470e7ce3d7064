use crate::error::ServiceResult;
use event_dispatch::EventPublisher;
use event_schema::{EventMode, SearchDocumentEvent, SearchRemovalEvent};
use std::sync::Arc;

/// Feeds the external search index through the search topic.
#[derive(Clone)]
pub struct SearchIndexer {
    publisher: Arc<dyn EventPublisher>,
}

impl SearchIndexer {
    pub fn new(publisher: Arc<dyn EventPublisher>) -> Self {
        Self { publisher }
    }

    pub async fn index(&self, index: &str, id: i64, uuid: &str, content: &str) -> ServiceResult<()> {
        let document = SearchDocumentEvent {
            index: index.to_string(),
            id,
            uuid: uuid.to_string(),
            title: None,
            content: content.to_string(),
        };
        super::publish(&*self.publisher, EventMode::SearchIndex, id, &document).await?;
        Ok(())
    }

    pub async fn remove(&self, index: &str, id: i64) -> ServiceResult<()> {
        let removal = SearchRemovalEvent {
            index: index.to_string(),
            id,
        };
        super::publish(&*self.publisher, EventMode::SearchRemove, id, &removal).await?;
        Ok(())
    }
}
