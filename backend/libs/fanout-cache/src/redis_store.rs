use crate::member::{FeedEntry, FeedWindow};
use crate::metrics::FanoutMetrics;
use crate::ops::{ttl_secs, GuardedBatch, ScriptOutcome};
use crate::script::FANOUT_SCRIPT;
use crate::store::CacheStore;
use crate::{CacheError, CacheResult};
use redis::{AsyncCommands, Script};
use redis_utils::{connection, SharedConnectionManager};
use resilience::timeout::{with_timeout_result, Boundary};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};

/// Redis-backed cache boundary.
#[derive(Clone)]
pub struct RedisCacheStore {
    redis: SharedConnectionManager,
    script: Script,
    timeout: Duration,
    metrics: FanoutMetrics,
}

impl RedisCacheStore {
    pub fn new(redis: SharedConnectionManager, timeout: Duration) -> Self {
        Self {
            redis,
            script: Script::new(FANOUT_SCRIPT),
            timeout,
            metrics: FanoutMetrics::new(),
        }
    }

    fn record<T>(&self, operation: &str, result: CacheResult<T>) -> CacheResult<T> {
        if let Err(e) = &result {
            warn!(operation, error = %e, "Cache operation failed");
            self.metrics.record_error(operation);
        }
        result
    }
}

#[async_trait::async_trait]
impl CacheStore for RedisCacheStore {
    async fn apply(&self, batch: &GuardedBatch) -> CacheResult<ScriptOutcome> {
        if batch.is_empty() {
            return Ok(ScriptOutcome::Applied(0));
        }

        let (keys, args) = batch.encode();
        let mut invocation = self.script.prepare_invoke();
        for key in &keys {
            invocation.key(key);
        }
        for arg in &args {
            invocation.arg(arg);
        }

        let mut conn = connection(&self.redis).await;
        let result = with_timeout_result(Boundary::Cache, self.timeout, async {
            let reply: i64 = invocation.invoke_async(&mut conn).await?;
            Ok::<_, CacheError>(reply)
        })
        .await;

        let outcome = ScriptOutcome::from_reply(self.record("apply", result)?);
        self.metrics.record_script(outcome.label());
        debug!(
            ops = batch.ops.len(),
            marker = batch.marker.as_ref().map(|m| m.key.as_str()).unwrap_or(""),
            outcome = outcome.label(),
            "Guarded batch applied"
        );
        Ok(outcome)
    }

    async fn exists_many(&self, keys: &[String]) -> CacheResult<Vec<bool>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let mut pipe = redis::pipe();
        for key in keys {
            pipe.exists(key);
        }

        let mut conn = connection(&self.redis).await;
        let result = with_timeout_result(Boundary::Cache, self.timeout, async {
            let found: Vec<bool> = pipe.query_async(&mut conn).await?;
            Ok::<_, CacheError>(found)
        })
        .await;
        self.record("exists_many", result)
    }

    async fn hash_get_all(&self, key: &str) -> CacheResult<HashMap<String, i64>> {
        let mut conn = connection(&self.redis).await;
        let result = with_timeout_result(Boundary::Cache, self.timeout, async {
            let fields: HashMap<String, i64> = conn.hgetall(key).await?;
            Ok::<_, CacheError>(fields)
        })
        .await;
        self.record("hash_get_all", result)
    }

    async fn hash_get_many(&self, keys: &[String]) -> CacheResult<Vec<HashMap<String, i64>>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let mut pipe = redis::pipe();
        for key in keys {
            pipe.hgetall(key);
        }

        let mut conn = connection(&self.redis).await;
        let result = with_timeout_result(Boundary::Cache, self.timeout, async {
            let rows: Vec<HashMap<String, i64>> = pipe.query_async(&mut conn).await?;
            Ok::<_, CacheError>(rows)
        })
        .await;
        self.record("hash_get_many", result)
    }

    async fn hash_put_absent(
        &self,
        key: &str,
        fields: &[(String, i64)],
        ttl: Duration,
    ) -> CacheResult<()> {
        if fields.is_empty() {
            return Ok(());
        }

        let mut pipe = redis::pipe();
        for (field, value) in fields {
            pipe.hset_nx(key, field, *value).ignore();
        }
        pipe.expire(key, ttl_secs(ttl) as i64).ignore();

        let mut conn = connection(&self.redis).await;
        let result = with_timeout_result(Boundary::Cache, self.timeout, async {
            pipe.query_async::<_, ()>(&mut conn).await?;
            Ok::<_, CacheError>(())
        })
        .await;
        self.record("hash_put_absent", result)
    }

    async fn feed_range_desc(&self, key: &str, window: FeedWindow) -> CacheResult<Vec<String>> {
        if window.limit == 0 {
            return Ok(Vec::new());
        }

        let mut conn = connection(&self.redis).await;
        let result = with_timeout_result(Boundary::Cache, self.timeout, async {
            let members: Vec<String> = conn
                .zrevrange(key, window.offset as isize, window.stop() as isize)
                .await?;
            Ok::<_, CacheError>(members)
        })
        .await;
        self.record("feed_range_desc", result)
    }

    async fn feed_put_absent(
        &self,
        key: &str,
        entries: &[FeedEntry],
        ttl: Duration,
    ) -> CacheResult<()> {
        if entries.is_empty() {
            return Ok(());
        }

        let mut pipe = redis::pipe();
        for entry in entries {
            pipe.cmd("ZADD")
                .arg(key)
                .arg("NX")
                .arg(entry.score)
                .arg(&entry.member)
                .ignore();
        }
        pipe.expire(key, ttl_secs(ttl) as i64).ignore();

        let mut conn = connection(&self.redis).await;
        let result = with_timeout_result(Boundary::Cache, self.timeout, async {
            pipe.query_async::<_, ()>(&mut conn).await?;
            Ok::<_, CacheError>(())
        })
        .await;
        self.record("feed_put_absent", result)
    }

    async fn list_range(&self, key: &str, window: FeedWindow) -> CacheResult<Vec<String>> {
        if window.limit == 0 {
            return Ok(Vec::new());
        }

        let mut conn = connection(&self.redis).await;
        let result = with_timeout_result(Boundary::Cache, self.timeout, async {
            let values: Vec<String> = conn
                .lrange(key, window.offset as isize, window.stop() as isize)
                .await?;
            Ok::<_, CacheError>(values)
        })
        .await;
        self.record("list_range", result)
    }

    async fn delete(&self, keys: &[String]) -> CacheResult<()> {
        if keys.is_empty() {
            return Ok(());
        }

        let mut conn = connection(&self.redis).await;
        let result = with_timeout_result(Boundary::Cache, self.timeout, async {
            conn.del::<_, ()>(keys).await?;
            Ok::<_, CacheError>(())
        })
        .await;
        self.record("delete", result)
    }
}
