use crate::error::HandlerError;
use event_schema::{EventEnvelope, EventMode};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tracing::warn;

/// One workflow step bound to one mode.
///
/// Implementations must be idempotent: the bus delivers at least once and
/// the dispatcher does not deduplicate.
#[async_trait::async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: &EventEnvelope) -> Result<(), HandlerError>;
}

struct FnHandler<F>(F);

#[async_trait::async_trait]
impl<F, Fut> EventHandler for FnHandler<F>
where
    F: Fn(EventEnvelope) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), HandlerError>> + Send,
{
    async fn handle(&self, event: &EventEnvelope) -> Result<(), HandlerError> {
        (self.0)(event.clone()).await
    }
}

/// Wrap an async closure as a handler.
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn EventHandler>
where
    F: Fn(EventEnvelope) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    Arc::new(FnHandler(f))
}

/// Static mode → handler lookup, built once at startup.
#[derive(Clone, Default)]
pub struct HandlerTable {
    handlers: HashMap<EventMode, Arc<dyn EventHandler>>,
}

impl HandlerTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(mut self, mode: EventMode, handler: Arc<dyn EventHandler>) -> Self {
        if self.handlers.insert(mode, handler).is_some() {
            warn!(mode = %mode, "Handler rebound; the previous binding is replaced");
        }
        self
    }

    pub fn get(&self, mode: EventMode) -> Option<&Arc<dyn EventHandler>> {
        self.handlers.get(&mode)
    }

    pub fn modes(&self) -> Vec<EventMode> {
        let mut modes: Vec<EventMode> = self.handlers.keys().copied().collect();
        modes.sort_by_key(|m| m.as_str());
        modes
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}
