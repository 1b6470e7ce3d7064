use crate::member::{FeedEntry, FeedWindow};
use crate::ops::{GuardedBatch, ScriptOutcome};
use crate::CacheResult;
use std::collections::HashMap;
use std::time::Duration;

/// Cache boundary used by the fan-out engine.
///
/// `apply` is the only write path for event-driven fan-out. The `*_absent`
/// writes exist for read-through population and never overwrite what is
/// already cached.
#[async_trait::async_trait]
pub trait CacheStore: Send + Sync {
    /// Run a guarded batch atomically.
    async fn apply(&self, batch: &GuardedBatch) -> CacheResult<ScriptOutcome>;

    /// Pipelined existence probe, one answer per key in order.
    async fn exists_many(&self, keys: &[String]) -> CacheResult<Vec<bool>>;

    /// All fields of a counter hash. Empty when the key is absent.
    async fn hash_get_all(&self, key: &str) -> CacheResult<HashMap<String, i64>>;

    async fn hash_get_many(&self, keys: &[String]) -> CacheResult<Vec<HashMap<String, i64>>>;

    /// Set each field only if unset, then refresh the TTL.
    async fn hash_put_absent(
        &self,
        key: &str,
        fields: &[(String, i64)],
        ttl: Duration,
    ) -> CacheResult<()>;

    /// Members in descending score order.
    async fn feed_range_desc(&self, key: &str, window: FeedWindow) -> CacheResult<Vec<String>>;

    /// Add members that are not yet present, then refresh the TTL.
    async fn feed_put_absent(
        &self,
        key: &str,
        entries: &[FeedEntry],
        ttl: Duration,
    ) -> CacheResult<()>;

    /// Newest-first slice of a list.
    async fn list_range(&self, key: &str, window: FeedWindow) -> CacheResult<Vec<String>>;

    async fn delete(&self, keys: &[String]) -> CacheResult<()>;
}
