//! Guarded batches against a live Redis
//!
//! These tests require a running Redis instance.
//! Run with: cargo test --package fanout-cache --test redis_script -- --ignored

use fanout_cache::{CacheStore, GuardedBatch, RedisCacheStore, ScriptOutcome};
use redis_utils::RedisPool;
use std::time::Duration;

const REDIS_URL: &str = "redis://127.0.0.1:6379";
const TTL: Duration = Duration::from_secs(60);

async fn create_store() -> RedisCacheStore {
    let pool = RedisPool::connect(REDIS_URL)
        .await
        .expect("Failed to connect to Redis");
    RedisCacheStore::new(pool.manager(), Duration::from_secs(2))
}

fn scoped(name: &str) -> String {
    format!("test_{}_{}", rand::random::<u32>(), name)
}

#[tokio::test]
#[ignore] // Requires Redis server
async fn test_wrong_type_rejects_batch_before_any_write() {
    let store = create_store().await;
    let counter = scoped("counter");
    let not_a_feed = scoped("not_a_feed");

    let mut seed = GuardedBatch::new(TTL);
    seed
        .hash_init(&counter, &["comment"])
        .hash_init(&not_a_feed, &["x"]);
    store.apply(&seed).await.unwrap();

    let mut batch = GuardedBatch::new(TTL).once(&scoped("scope"), "evt-1");
    batch
        .hash_incr(&counter, "comment", 1)
        .feed_add(&not_a_feed, 1.0, "m");

    assert!(store.apply(&batch).await.is_err());
    let fields = store.hash_get_all(&counter).await.unwrap();
    assert_eq!(fields.get("comment"), Some(&0));

    store.delete(&[not_a_feed.clone()]).await.unwrap();
    assert_eq!(store.apply(&batch).await.unwrap(), ScriptOutcome::Applied(1));
    assert_eq!(store.apply(&batch).await.unwrap(), ScriptOutcome::Duplicate);
    let fields = store.hash_get_all(&counter).await.unwrap();
    assert_eq!(fields.get("comment"), Some(&1));

    store.delete(&[counter]).await.unwrap();
}

#[tokio::test]
#[ignore] // Requires Redis server
async fn test_delete_then_recreate_with_new_type_is_allowed() {
    let store = create_store().await;
    let key = scoped("queue");

    let mut seed = GuardedBatch::new(TTL);
    seed.hash_init(&key, &["x"]);
    store.apply(&seed).await.unwrap();

    let mut batch = GuardedBatch::new(TTL);
    batch.delete(&key).queue_push(&key, "entry", 10);
    assert!(store.apply(&batch).await.is_ok());

    store.delete(&[key]).await.unwrap();
}
