//! In-process cache backend with the same guard semantics as the Redis
//! script. Backs local runs without Redis and every cache property test.

use crate::member::{FeedEntry, FeedWindow};
use crate::metrics::FanoutMetrics;
use crate::ops::{CacheOp, GuardedBatch, ScriptOutcome};
use crate::store::CacheStore;
use crate::{CacheError, CacheResult};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
enum Value {
    Hash(HashMap<String, i64>),
    Feed(HashMap<String, f64>),
    List(VecDeque<String>),
    Flag,
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Instant,
}

type Keyspace = HashMap<String, Entry>;

#[derive(Clone, Default)]
pub struct MemoryCacheStore {
    keyspace: Arc<Mutex<Keyspace>>,
    unavailable: Arc<AtomicBool>,
    metrics: FanoutMetrics,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call fail, simulating a cache outage.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Drop a key as if its TTL had run out.
    pub fn evict(&self, key: &str) {
        self.lock().remove(key);
    }

    pub fn contains(&self, key: &str) -> bool {
        live(&mut self.lock(), key).is_some()
    }

    pub fn hash(&self, key: &str) -> Option<HashMap<String, i64>> {
        match live(&mut self.lock(), key).map(|e| &e.value) {
            Some(Value::Hash(h)) => Some(h.clone()),
            _ => None,
        }
    }

    pub fn hash_field(&self, key: &str, field: &str) -> Option<i64> {
        self.hash(key).and_then(|h| h.get(field).copied())
    }

    /// Feed contents, highest score first.
    pub fn feed(&self, key: &str) -> Option<Vec<(String, f64)>> {
        match live(&mut self.lock(), key).map(|e| &e.value) {
            Some(Value::Feed(f)) => Some(sorted_desc(f)),
            _ => None,
        }
    }

    pub fn list(&self, key: &str) -> Option<Vec<String>> {
        match live(&mut self.lock(), key).map(|e| &e.value) {
            Some(Value::List(l)) => Some(l.iter().cloned().collect()),
            _ => None,
        }
    }

    /// Remaining lifetime of a key.
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        live(&mut self.lock(), key).map(|e| e.expires_at.saturating_duration_since(Instant::now()))
    }

    /// Seed a counter hash as a read-through populate would.
    pub fn seed_hash(&self, key: &str, fields: &[(&str, i64)], ttl: Duration) {
        let hash = fields.iter().map(|(f, v)| (f.to_string(), *v)).collect();
        self.lock().insert(key.to_string(), Entry::new(Value::Hash(hash), ttl));
    }

    /// Seed a ranked feed as a read-through populate would.
    pub fn seed_feed(&self, key: &str, members: &[(&str, f64)], ttl: Duration) {
        let feed = members.iter().map(|(m, s)| (m.to_string(), *s)).collect();
        self.lock().insert(key.to_string(), Entry::new(Value::Feed(feed), ttl));
    }

    fn lock(&self) -> MutexGuard<'_, Keyspace> {
        self.keyspace.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn check_available(&self) -> CacheResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(CacheError::Unavailable("memory cache marked unavailable".to_string()));
        }
        Ok(())
    }
}

impl Entry {
    fn new(value: Value, ttl: Duration) -> Self {
        Self {
            value,
            expires_at: Instant::now() + ttl,
        }
    }

    fn refresh(&mut self, ttl: Duration) {
        self.expires_at = Instant::now() + ttl;
    }
}

fn live<'a>(keyspace: &'a mut Keyspace, key: &str) -> Option<&'a mut Entry> {
    let expired = keyspace
        .get(key)
        .map(|e| e.expires_at <= Instant::now())
        .unwrap_or(false);
    if expired {
        keyspace.remove(key);
    }
    keyspace.get_mut(key)
}

fn sorted_desc(feed: &HashMap<String, f64>) -> Vec<(String, f64)> {
    let mut members: Vec<(String, f64)> = feed.iter().map(|(m, s)| (m.clone(), *s)).collect();
    // Same tie-break as ZREVRANGE: higher score first, then reverse lexical order.
    members.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b.0.cmp(&a.0))
    });
    members
}

fn wrong_type(key: &str) -> CacheError {
    CacheError::InvalidData(format!("WRONGTYPE operation against key {}", key))
}

fn window_slice<T: Clone>(items: impl Iterator<Item = T>, window: FeedWindow) -> Vec<T> {
    items.skip(window.offset).take(window.limit).collect()
}

/// Apply one op, returning how many effects landed.
fn apply_op(keyspace: &mut Keyspace, op: &CacheOp, ttl: Duration) -> CacheResult<u32> {
    match op {
        CacheOp::HashIncr { key, field, delta } => {
            let Some(entry) = live(keyspace, key) else {
                return Ok(0);
            };
            let Value::Hash(hash) = &mut entry.value else {
                return Err(wrong_type(key));
            };
            let current = hash.get(field).copied().unwrap_or(0);
            let step = if *delta < 0 {
                if current <= 0 {
                    return Ok(0);
                }
                (*delta).max(-current)
            } else {
                *delta
            };
            hash.insert(field.clone(), current + step);
            entry.refresh(ttl);
            Ok(1)
        }
        CacheOp::HashInit { key, fields } => {
            if live(keyspace, key).is_none() {
                keyspace.insert(key.clone(), Entry::new(Value::Hash(HashMap::new()), ttl));
            }
            let entry = keyspace.get_mut(key).ok_or_else(|| wrong_type(key))?;
            let Value::Hash(hash) = &mut entry.value else {
                return Err(wrong_type(key));
            };
            for (field, value) in fields {
                hash.entry(field.clone()).or_insert(*value);
            }
            entry.refresh(ttl);
            Ok(fields.len() as u32)
        }
        CacheOp::FeedAdd { key, score, member } => {
            let Some(entry) = live(keyspace, key) else {
                return Ok(0);
            };
            let Value::Feed(feed) = &mut entry.value else {
                return Err(wrong_type(key));
            };
            feed.insert(member.clone(), *score);
            entry.refresh(ttl);
            Ok(1)
        }
        CacheOp::FeedIncr { key, member, delta } => {
            let Some(entry) = live(keyspace, key) else {
                return Ok(0);
            };
            let Value::Feed(feed) = &mut entry.value else {
                return Err(wrong_type(key));
            };
            let Some(score) = feed.get_mut(member) else {
                return Ok(0);
            };
            let delta = *delta as f64;
            if delta < 0.0 {
                if *score <= 0.0 {
                    return Ok(0);
                }
                *score += delta.max(-*score);
            } else {
                *score += delta;
            }
            entry.refresh(ttl);
            Ok(1)
        }
        CacheOp::FeedRemove { key, member } => {
            let Some(entry) = live(keyspace, key) else {
                return Ok(0);
            };
            let Value::Feed(feed) = &mut entry.value else {
                return Err(wrong_type(key));
            };
            let removed = feed.remove(member).is_some();
            if feed.is_empty() {
                keyspace.remove(key);
            }
            Ok(removed as u32)
        }
        CacheOp::QueuePush { key, value, cap } => {
            if live(keyspace, key).is_none() {
                keyspace.insert(key.clone(), Entry::new(Value::List(VecDeque::new()), ttl));
            }
            let entry = keyspace.get_mut(key).ok_or_else(|| wrong_type(key))?;
            let Value::List(list) = &mut entry.value else {
                return Err(wrong_type(key));
            };
            list.push_front(value.clone());
            list.truncate((*cap).max(1));
            entry.refresh(ttl);
            Ok(1)
        }
        CacheOp::QueueRemove { key, value } => {
            let Some(entry) = live(keyspace, key) else {
                return Ok(0);
            };
            let Value::List(list) = &mut entry.value else {
                return Err(wrong_type(key));
            };
            let before = list.len();
            list.retain(|v| v != value);
            let removed = (before - list.len()) as u32;
            if list.is_empty() {
                keyspace.remove(key);
            }
            Ok(removed)
        }
        CacheOp::Delete { key } => Ok(keyspace.remove(key).is_some() as u32),
    }
}

#[async_trait::async_trait]
impl CacheStore for MemoryCacheStore {
    async fn apply(&self, batch: &GuardedBatch) -> CacheResult<ScriptOutcome> {
        self.check_available()?;
        let mut keyspace = self.lock();

        if let Some(marker) = &batch.marker {
            if live(&mut keyspace, &marker.key).is_some() {
                self.metrics.record_script(ScriptOutcome::Duplicate.label());
                return Ok(ScriptOutcome::Duplicate);
            }
        }

        // Work on a copy so a failing op leaves nothing behind.
        let mut staged = keyspace.clone();
        let mut applied = 0u32;
        for op in &batch.ops {
            applied += apply_op(&mut staged, op, batch.ttl)?;
        }
        if let Some(marker) = &batch.marker {
            staged.insert(marker.key.clone(), Entry::new(Value::Flag, marker.ttl));
        }
        *keyspace = staged;

        let outcome = ScriptOutcome::Applied(applied);
        self.metrics.record_script(outcome.label());
        Ok(outcome)
    }

    async fn exists_many(&self, keys: &[String]) -> CacheResult<Vec<bool>> {
        self.check_available()?;
        let mut keyspace = self.lock();
        Ok(keys.iter().map(|k| live(&mut keyspace, k).is_some()).collect())
    }

    async fn hash_get_all(&self, key: &str) -> CacheResult<HashMap<String, i64>> {
        self.check_available()?;
        match live(&mut self.lock(), key).map(|e| &e.value) {
            None => Ok(HashMap::new()),
            Some(Value::Hash(h)) => Ok(h.clone()),
            Some(_) => Err(wrong_type(key)),
        }
    }

    async fn hash_get_many(&self, keys: &[String]) -> CacheResult<Vec<HashMap<String, i64>>> {
        let mut rows = Vec::with_capacity(keys.len());
        for key in keys {
            rows.push(self.hash_get_all(key).await?);
        }
        Ok(rows)
    }

    async fn hash_put_absent(
        &self,
        key: &str,
        fields: &[(String, i64)],
        ttl: Duration,
    ) -> CacheResult<()> {
        self.check_available()?;
        if fields.is_empty() {
            return Ok(());
        }
        let op = CacheOp::HashInit {
            key: key.to_string(),
            fields: fields.to_vec(),
        };
        apply_op(&mut self.lock(), &op, ttl).map(|_| ())
    }

    async fn feed_range_desc(&self, key: &str, window: FeedWindow) -> CacheResult<Vec<String>> {
        self.check_available()?;
        match live(&mut self.lock(), key).map(|e| &e.value) {
            None => Ok(Vec::new()),
            Some(Value::Feed(f)) => Ok(window_slice(sorted_desc(f).into_iter().map(|(m, _)| m), window)),
            Some(_) => Err(wrong_type(key)),
        }
    }

    async fn feed_put_absent(
        &self,
        key: &str,
        entries: &[FeedEntry],
        ttl: Duration,
    ) -> CacheResult<()> {
        self.check_available()?;
        if entries.is_empty() {
            return Ok(());
        }
        let mut keyspace = self.lock();
        if live(&mut keyspace, key).is_none() {
            keyspace.insert(key.to_string(), Entry::new(Value::Feed(HashMap::new()), ttl));
        }
        let entry = keyspace.get_mut(key).ok_or_else(|| wrong_type(key))?;
        let Value::Feed(feed) = &mut entry.value else {
            return Err(wrong_type(key));
        };
        for e in entries {
            feed.entry(e.member.clone()).or_insert(e.score);
        }
        entry.refresh(ttl);
        Ok(())
    }

    async fn list_range(&self, key: &str, window: FeedWindow) -> CacheResult<Vec<String>> {
        self.check_available()?;
        match live(&mut self.lock(), key).map(|e| &e.value) {
            None => Ok(Vec::new()),
            Some(Value::List(l)) => Ok(window_slice(l.iter().cloned(), window)),
            Some(_) => Err(wrong_type(key)),
        }
    }

    async fn delete(&self, keys: &[String]) -> CacheResult<()> {
        self.check_available()?;
        let mut keyspace = self.lock();
        for key in keys {
            keyspace.remove(key);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TTL: Duration = Duration::from_secs(60);

    #[tokio::test]
    async fn test_failed_op_rolls_back_whole_batch() {
        let store = MemoryCacheStore::new();
        store.seed_hash("comment_1", &[("agree", 3)], TTL);
        store.seed_hash("not_a_feed", &[("x", 1)], TTL);

        let mut batch = GuardedBatch::new(TTL).once("comment", "evt-1");
        batch
            .hash_incr("comment_1", "agree", 1)
            .feed_add("not_a_feed", 1.0, "m");

        assert!(store.apply(&batch).await.is_err());
        assert_eq!(store.hash_field("comment_1", "agree"), Some(3));
        // no marker left behind, so a retry is still possible
        assert!(!store.contains("fanout_done_comment_evt-1"));
    }

    #[tokio::test]
    async fn test_queue_push_caps_and_orders_newest_first() {
        let store = MemoryCacheStore::new();
        let mut batch = GuardedBatch::new(TTL);
        batch
            .queue_push("q", "a", 2)
            .queue_push("q", "b", 2)
            .queue_push("q", "c", 2);
        store.apply(&batch).await.unwrap();

        assert_eq!(store.list("q"), Some(vec!["c".to_string(), "b".to_string()]));
        let page = store.list_range("q", FeedWindow::head(1)).await.unwrap();
        assert_eq!(page, vec!["c".to_string()]);
    }

    #[tokio::test]
    async fn test_expired_key_reads_absent() {
        let store = MemoryCacheStore::new();
        store.seed_hash("comment_1", &[("agree", 1)], Duration::from_millis(1));
        std::thread::sleep(Duration::from_millis(5));

        assert!(!store.contains("comment_1"));
        assert!(store.hash_get_all("comment_1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unavailable_store_errors() {
        let store = MemoryCacheStore::new();
        store.set_unavailable(true);
        assert!(matches!(
            store.exists_many(&["k".to_string()]).await,
            Err(CacheError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_feed_range_orders_by_score_desc() {
        let store = MemoryCacheStore::new();
        store.seed_feed("f", &[("1%a", 1.0), ("3%c", 3.0), ("2%b", 2.0)], TTL);

        let members = store
            .feed_range_desc("f", FeedWindow { offset: 1, limit: 5 })
            .await
            .unwrap();
        assert_eq!(members, vec!["2%b".to_string(), "1%a".to_string()]);
    }
}
