use fanout_cache::{
    CacheError, CacheStore, FeedEntry, FeedWindow, GuardedBatch, MemoryCacheStore, Page,
    PopulatePool, ReadThrough, ScriptOutcome,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

const TTL: Duration = Duration::from_secs(600);

fn reply_batch(event_id: &str) -> GuardedBatch {
    let mut batch = GuardedBatch::new(TTL).once("comment", event_id);
    batch
        .hash_incr("comment_1", "comment", 1)
        .hash_incr("comment_user_u1", "comment", 1)
        .feed_add("sub_comment_1", 5.0, "5%u2%u1%1");
    batch
}

#[tokio::test]
async fn test_replayed_event_does_not_double_count() {
    let store = MemoryCacheStore::new();
    store.seed_hash("comment_1", &[("agree", 0), ("comment", 0)], TTL);
    store.seed_hash("comment_user_u1", &[("comment", 2)], TTL);
    store.seed_feed("sub_comment_1", &[("4%u3%u1%1", 4.0)], TTL);

    let first = store.apply(&reply_batch("evt-1")).await.unwrap();
    let second = store.apply(&reply_batch("evt-1")).await.unwrap();

    assert_eq!(first, ScriptOutcome::Applied(3));
    assert_eq!(second, ScriptOutcome::Duplicate);
    assert_eq!(store.hash_field("comment_1", "comment"), Some(1));
    assert_eq!(store.hash_field("comment_user_u1", "comment"), Some(3));
    assert_eq!(store.feed("sub_comment_1").unwrap().len(), 2);
}

#[tokio::test]
async fn test_distinct_events_both_apply() {
    let store = MemoryCacheStore::new();
    store.seed_hash("comment_1", &[("comment", 0)], TTL);

    store.apply(&reply_batch("evt-1")).await.unwrap();
    store.apply(&reply_batch("evt-2")).await.unwrap();

    assert_eq!(store.hash_field("comment_1", "comment"), Some(2));
}

#[tokio::test]
async fn test_cold_views_are_never_created_by_guarded_ops() {
    let store = MemoryCacheStore::new();

    let mut batch = GuardedBatch::new(TTL).once("comment", "evt-cold");
    batch
        .hash_incr("comment_5", "agree", 1)
        .hash_incr("comment_user_u2", "agree", -1)
        .feed_add("comment_10_1", 5.0, "5%u2")
        .feed_incr("comment_10_1_hot", "5%u2", 1)
        .feed_remove("comment_10_1", "5%u2")
        .delete("comment_5");

    let outcome = store.apply(&batch).await.unwrap();

    assert_eq!(outcome, ScriptOutcome::Applied(0));
    for key in ["comment_5", "comment_user_u2", "comment_10_1", "comment_10_1_hot"] {
        assert!(!store.contains(key), "{} was resurrected", key);
    }
}

#[tokio::test]
async fn test_evicted_view_stays_absent_after_replay() {
    let store = MemoryCacheStore::new();
    store.seed_hash("comment_1", &[("comment", 1)], TTL);
    store.apply(&reply_batch("evt-1")).await.unwrap();

    store.evict("comment_1");
    store.apply(&reply_batch("evt-2")).await.unwrap();

    assert!(!store.contains("comment_1"));
}

#[tokio::test]
async fn test_wrong_type_batch_counts_once_after_repair() {
    let store = MemoryCacheStore::new();
    store.seed_hash("comment_1", &[("comment", 0)], TTL);
    store.seed_hash("sub_comment_1", &[("x", 1)], TTL);

    let batch = reply_batch("evt-1");
    assert!(matches!(
        store.apply(&batch).await,
        Err(CacheError::InvalidData(_))
    ));
    assert_eq!(store.hash_field("comment_1", "comment"), Some(0));

    store.delete(&["sub_comment_1".to_string()]).await.unwrap();
    store.apply(&batch).await.unwrap();
    store.apply(&batch).await.unwrap();

    assert_eq!(store.hash_field("comment_1", "comment"), Some(1));
}

#[tokio::test]
async fn test_counters_never_go_negative() {
    let store = MemoryCacheStore::new();
    store.seed_hash("comment_user_u1", &[("comment", 1), ("agree", 0)], TTL);
    store.seed_feed("comment_10_1_hot", &[("1%u1", 1.0)], TTL);

    for i in 0..4 {
        let mut batch = GuardedBatch::new(TTL).once("comment", format!("dec-{}", i));
        batch
            .hash_incr("comment_user_u1", "comment", -1)
            .hash_incr("comment_user_u1", "agree", -1)
            .feed_incr("comment_10_1_hot", "1%u1", -1);
        store.apply(&batch).await.unwrap();
    }

    let mut big = GuardedBatch::new(TTL);
    big.hash_incr("comment_user_u1", "comment", -50);
    store.apply(&big).await.unwrap();

    assert_eq!(store.hash_field("comment_user_u1", "comment"), Some(0));
    assert_eq!(store.hash_field("comment_user_u1", "agree"), Some(0));
    assert_eq!(store.feed("comment_10_1_hot").unwrap(), vec![("1%u1".to_string(), 0.0)]);
}

#[tokio::test]
async fn test_saturating_decrement_stops_at_zero() {
    let store = MemoryCacheStore::new();
    store.seed_hash("creation_user_u1", &[("collect", 2)], TTL);

    let mut batch = GuardedBatch::new(TTL);
    batch.hash_incr("creation_user_u1", "collect", -5);
    assert_eq!(store.apply(&batch).await.unwrap(), ScriptOutcome::Applied(1));
    assert_eq!(store.hash_field("creation_user_u1", "collect"), Some(0));
}

#[tokio::test]
async fn test_guarded_ops_refresh_ttl() {
    let store = MemoryCacheStore::new();
    store.seed_hash("comment_1", &[("agree", 0)], Duration::from_secs(5));

    let mut batch = GuardedBatch::new(TTL);
    batch.hash_incr("comment_1", "agree", 1);
    store.apply(&batch).await.unwrap();

    assert!(store.ttl("comment_1").unwrap() > Duration::from_secs(500));
}

#[tokio::test]
async fn test_read_through_serves_store_then_cache() {
    let store = Arc::new(MemoryCacheStore::new());
    let pool = PopulatePool::new(4, Duration::from_secs(1));
    let reads = ReadThrough::new(store.clone(), pool.clone());
    let loads = Arc::new(AtomicUsize::new(0));

    let rows = vec![
        FeedEntry::new(3.0, "3%u3"),
        FeedEntry::new(2.0, "2%u2"),
        FeedEntry::new(1.0, "1%u1"),
    ];
    let loader = {
        let loads = loads.clone();
        move |window: FeedWindow| {
            let loads = loads.clone();
            let rows = rows.clone();
            async move {
                loads.fetch_add(1, Ordering::SeqCst);
                Ok::<_, CacheError>(rows.into_iter().skip(window.offset).take(window.limit).collect())
            }
        }
    };

    let first = reads
        .feed("comment_list", "comment_10_1", Page::new(1, 2), TTL, loader.clone())
        .await
        .unwrap();
    assert_eq!(first, vec!["3%u3".to_string(), "2%u2".to_string()]);

    pool.wait_idle().await;
    let loads_after_first = loads.load(Ordering::SeqCst);

    let second = reads
        .feed("comment_list", "comment_10_1", Page::new(1, 2), TTL, loader.clone())
        .await
        .unwrap();
    assert_eq!(second, first);
    assert_eq!(loads.load(Ordering::SeqCst), loads_after_first);

    // Populate copied the whole head of the feed, not just page one
    let page_two = reads
        .feed("comment_list", "comment_10_1", Page::new(2, 2), TTL, loader)
        .await
        .unwrap();
    assert_eq!(page_two, vec!["1%u1".to_string()]);
    assert_eq!(loads.load(Ordering::SeqCst), loads_after_first);
}

#[tokio::test]
async fn test_read_through_does_not_populate_from_empty_store() {
    let store = Arc::new(MemoryCacheStore::new());
    let pool = PopulatePool::new(4, Duration::from_secs(1));
    let reads = ReadThrough::new(store.clone(), pool.clone());

    let page = reads
        .feed("comment_list", "comment_99_1", Page::new(0, 10), TTL, |_window| async {
            Ok::<Vec<FeedEntry>, CacheError>(Vec::new())
        })
        .await
        .unwrap();

    pool.wait_idle().await;
    assert!(page.is_empty());
    assert!(!store.contains("comment_99_1"));
}

#[tokio::test]
async fn test_read_through_counters_populate_on_miss() {
    let store = Arc::new(MemoryCacheStore::new());
    let pool = PopulatePool::new(4, Duration::from_secs(1));
    let reads = ReadThrough::new(store.clone(), pool.clone());

    let fields = reads
        .counters("user_stat", "comment_user_u1", TTL, || async {
            Ok::<_, CacheError>(Some(vec![("comment".to_string(), 4), ("agree".to_string(), 9)]))
        })
        .await
        .unwrap()
        .unwrap();
    assert_eq!(fields.get("agree"), Some(&9));

    pool.wait_idle().await;
    assert_eq!(store.hash_field("comment_user_u1", "comment"), Some(4));
}

#[tokio::test]
async fn test_batch_counters_merge_hits_and_misses_in_order() {
    let store = Arc::new(MemoryCacheStore::new());
    store.seed_hash("comment_1", &[("agree", 7), ("comment", 1)], TTL);
    let pool = PopulatePool::new(4, Duration::from_secs(1));
    let reads = ReadThrough::new(store.clone(), pool.clone());

    let rows = reads
        .counters_batch(
            "comment_stat",
            &[2, 1, 3],
            |id| format!("comment_{}", id),
            TTL,
            |missing| async move {
                assert_eq!(missing, vec![2, 3]);
                Ok::<_, CacheError>(vec![(2, vec![("agree".to_string(), 2), ("comment".to_string(), 0)])])
            },
        )
        .await
        .unwrap();

    let ids: Vec<i64> = rows.iter().map(|(id, _)| *id).collect();
    assert_eq!(ids, vec![2, 1]);
    assert_eq!(rows[1].1.get("agree"), Some(&7));

    pool.wait_idle().await;
    assert_eq!(store.hash_field("comment_2", "agree"), Some(2));
    assert!(!store.contains("comment_3"));
}

#[tokio::test]
async fn test_batch_counters_fail_whole_call_on_store_error() {
    let store = Arc::new(MemoryCacheStore::new());
    store.seed_hash("comment_1", &[("agree", 7)], TTL);
    let reads = ReadThrough::new(store.clone(), PopulatePool::new(4, Duration::from_secs(1)));

    let result = reads
        .counters_batch(
            "comment_stat",
            &[1, 2],
            |id| format!("comment_{}", id),
            TTL,
            |_missing| async { Err::<Vec<(i64, Vec<(String, i64)>)>, _>(CacheError::InvalidData("db down".into())) },
        )
        .await;

    assert!(result.is_err());
}

#[tokio::test]
async fn test_batch_counters_fail_whole_call_on_cache_error() {
    let store = Arc::new(MemoryCacheStore::new());
    store.set_unavailable(true);
    let reads = ReadThrough::new(store.clone(), PopulatePool::new(4, Duration::from_secs(1)));

    let result = reads
        .counters_batch(
            "comment_stat",
            &[1],
            |id| format!("comment_{}", id),
            TTL,
            |_missing| async { Ok::<Vec<(i64, Vec<(String, i64)>)>, CacheError>(Vec::new()) },
        )
        .await;

    assert!(matches!(result, Err(CacheError::Unavailable(_))));
}
