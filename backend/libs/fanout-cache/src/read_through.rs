//! Read-through population.
//!
//! Reads try the cache first. A miss is served from the store, and when the
//! store has data a background task writes it back with add-if-absent
//! commands. This is the only path besides create fan-out that may bring a
//! view into existence.

use crate::member::{FeedEntry, FeedWindow, Page};
use crate::metrics::FanoutMetrics;
use crate::populate::PopulatePool;
use crate::store::CacheStore;
use crate::{ttl, CacheError};
use std::collections::HashMap;
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Upper bound on how many members a feed populate copies from the store.
pub const DEFAULT_SNAPSHOT_LIMIT: usize = 1000;

#[derive(Clone)]
pub struct ReadThrough {
    store: Arc<dyn CacheStore>,
    populate: PopulatePool,
    snapshot_limit: usize,
    metrics: FanoutMetrics,
}

impl ReadThrough {
    pub fn new(store: Arc<dyn CacheStore>, populate: PopulatePool) -> Self {
        Self {
            store,
            populate,
            snapshot_limit: DEFAULT_SNAPSHOT_LIMIT,
            metrics: FanoutMetrics::new(),
        }
    }

    pub fn with_snapshot_limit(mut self, limit: usize) -> Self {
        self.snapshot_limit = limit.max(1);
        self
    }

    pub fn store(&self) -> &Arc<dyn CacheStore> {
        &self.store
    }

    pub fn populate_pool(&self) -> &PopulatePool {
        &self.populate
    }

    /// Read one page of a ranked feed.
    ///
    /// `loader` serves both the page itself on a miss and, from the
    /// background task, the head of the feed used to populate the cache.
    pub async fn feed<L, Fut, E>(
        &self,
        view: &'static str,
        key: &str,
        page: Page,
        ttl: Duration,
        loader: L,
    ) -> Result<Vec<String>, E>
    where
        L: Fn(FeedWindow) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Vec<FeedEntry>, E>> + Send + 'static,
        E: Display + Send + 'static,
    {
        let window = page.window();
        match self.store.feed_range_desc(key, window).await {
            Ok(members) if !members.is_empty() => {
                self.metrics.record_read(view, "cache");
                return Ok(members);
            }
            Ok(_) => {}
            Err(e) => warn!(view, key = %key, error = %e, "Cache read failed, serving from store"),
        }

        self.metrics.record_read(view, "store");
        let rows = loader(window).await?;
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        let members = rows.into_iter().map(|e| e.member).collect();

        let store = self.store.clone();
        let owned_key = key.to_string();
        let snapshot = FeedWindow::head(self.snapshot_limit);
        let ttl = ttl::with_jitter(ttl);
        self.populate.submit(view, key.to_string(), async move {
            let entries = loader(snapshot)
                .await
                .map_err(|e| CacheError::Unavailable(format!("store snapshot failed: {}", e)))?;
            store.feed_put_absent(&owned_key, &entries, ttl).await
        });

        Ok(members)
    }

    /// Read a counter hash.
    pub async fn counters<L, Fut, E>(
        &self,
        view: &'static str,
        key: &str,
        ttl: Duration,
        loader: L,
    ) -> Result<Option<HashMap<String, i64>>, E>
    where
        L: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<Vec<(String, i64)>>, E>>,
    {
        match self.store.hash_get_all(key).await {
            Ok(fields) if !fields.is_empty() => {
                self.metrics.record_read(view, "cache");
                return Ok(Some(fields));
            }
            Ok(_) => {}
            Err(e) => warn!(view, key = %key, error = %e, "Cache read failed, serving from store"),
        }

        self.metrics.record_read(view, "store");
        let Some(fields) = loader().await? else {
            return Ok(None);
        };

        let store = self.store.clone();
        let owned_key = key.to_string();
        let writeback = fields.clone();
        let ttl = ttl::with_jitter(ttl);
        self.populate.submit(view, key.to_string(), async move {
            store.hash_put_absent(&owned_key, &writeback, ttl).await
        });

        Ok(Some(fields.into_iter().collect()))
    }

    /// Read counters for many ids at once.
    ///
    /// Ids are split by a pipelined existence probe. Cached ids are read from
    /// the cache and the rest from the store, concurrently. Either branch
    /// failing fails the whole call. Store rows are written back in the
    /// background. Results follow the order of `ids`; ids the store does not
    /// know are left out.
    pub async fn counters_batch<K, L, Fut, E>(
        &self,
        view: &'static str,
        ids: &[i64],
        key_of: K,
        ttl: Duration,
        load_missing: L,
    ) -> Result<Vec<(i64, HashMap<String, i64>)>, E>
    where
        K: Fn(i64) -> String,
        L: FnOnce(Vec<i64>) -> Fut,
        Fut: Future<Output = Result<Vec<(i64, Vec<(String, i64)>)>, E>>,
        E: From<CacheError>,
    {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let keys: Vec<String> = ids.iter().map(|id| key_of(*id)).collect();
        let present = self.store.exists_many(&keys).await?;

        let mut hit_ids = Vec::new();
        let mut hit_keys = Vec::new();
        let mut miss_ids = Vec::new();
        for ((id, key), cached) in ids.iter().zip(keys.into_iter()).zip(present) {
            if cached {
                hit_ids.push(*id);
                hit_keys.push(key);
            } else {
                miss_ids.push(*id);
            }
        }

        let store = self.store.clone();
        let hits = async {
            if hit_keys.is_empty() {
                return Ok(Vec::new());
            }
            store.hash_get_many(&hit_keys).await.map_err(E::from)
        };
        let miss_count = miss_ids.len();
        let misses = async {
            if miss_ids.is_empty() {
                return Ok(Vec::new());
            }
            load_missing(miss_ids).await
        };
        let (hit_rows, miss_rows) = tokio::try_join!(hits, misses)?;

        if !hit_ids.is_empty() {
            self.metrics.record_read(view, "cache");
        }
        if miss_count > 0 {
            self.metrics.record_read(view, "store");
        }

        let mut merged: HashMap<i64, HashMap<String, i64>> = HashMap::with_capacity(ids.len());
        for (id, fields) in hit_ids.into_iter().zip(hit_rows) {
            merged.insert(id, fields);
        }
        for (id, fields) in miss_rows {
            let store = self.store.clone();
            let key = key_of(id);
            let writeback = fields.clone();
            let ttl = ttl::with_jitter(ttl);
            self.populate.submit(view, key.clone(), async move {
                store.hash_put_absent(&key, &writeback, ttl).await
            });
            merged.insert(id, fields.into_iter().collect());
        }

        Ok(ids
            .iter()
            .filter_map(|id| merged.remove(id).map(|fields| (*id, fields)))
            .collect())
    }
}
