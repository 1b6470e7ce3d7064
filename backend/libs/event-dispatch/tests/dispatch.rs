use event_dispatch::{
    handler_fn, Dispatcher, EventHandler, HandlerError, HandlerTable, Outcome, RedeliveryPolicy,
};
use event_schema::{EventEnvelope, EventMode};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn event(mode: EventMode) -> EventEnvelope {
    EventEnvelope::new("comment-service", mode, &serde_json::json!({"comment_id": 1})).unwrap()
}

fn counting_handler(calls: Arc<AtomicUsize>) -> Arc<dyn EventHandler> {
    handler_fn(move |_event| {
        let calls = calls.clone();
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    })
}

#[tokio::test]
async fn test_success_acks_and_hits_only_the_bound_handler() {
    let agree = Arc::new(AtomicUsize::new(0));
    let cancel = Arc::new(AtomicUsize::new(0));
    let table = HandlerTable::new()
        .bind(EventMode::SetCommentAgree, counting_handler(agree.clone()))
        .bind(EventMode::CancelCommentAgree, counting_handler(cancel.clone()));
    let dispatcher = Dispatcher::new(table, RedeliveryPolicy::default());

    let outcome = dispatcher.dispatch(&event(EventMode::SetCommentAgree), 0).await;

    assert_eq!(outcome, Outcome::Ack);
    assert_eq!(agree.load(Ordering::SeqCst), 1);
    assert_eq!(cancel.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_retryable_error_walks_tiers_then_dead_letters() {
    let table = HandlerTable::new().bind(
        EventMode::RemoveCommentCache,
        handler_fn(|_event| async { Err(HandlerError::from(anyhow::anyhow!("redis down"))) }),
    );
    let policy = RedeliveryPolicy::new(vec![Duration::from_secs(1), Duration::from_secs(5)], 3);
    let dispatcher = Dispatcher::new(table, policy);
    let removal = event(EventMode::RemoveCommentCache);

    match dispatcher.dispatch(&removal, 0).await {
        Outcome::Redeliver {
            attempt,
            tier,
            delay,
            reason,
        } => {
            assert_eq!((attempt, tier, delay), (1, 0, Duration::from_secs(1)));
            assert!(reason.contains("redis down"));
        }
        other => panic!("unexpected outcome {:?}", other),
    }

    assert!(matches!(
        dispatcher.dispatch(&removal, 2).await,
        Outcome::Redeliver { attempt: 3, tier: 1, .. }
    ));
    assert!(matches!(
        dispatcher.dispatch(&removal, 3).await,
        Outcome::DeadLetter { attempts: 4, .. }
    ));
}

#[tokio::test]
async fn test_panic_is_recovered_as_redelivery() {
    let table = HandlerTable::new().bind(
        EventMode::SetCreationAgree,
        handler_fn(|event: EventEnvelope| async move {
            if event.payload.contains_key("comment_id") {
                panic!("unexpected payload shape");
            }
            Ok(())
        }),
    );
    let dispatcher = Dispatcher::new(table, RedeliveryPolicy::default());

    match dispatcher.dispatch(&event(EventMode::SetCreationAgree), 0).await {
        Outcome::Redeliver { attempt, reason, .. } => {
            assert_eq!(attempt, 1);
            assert!(reason.contains("unexpected payload shape"));
        }
        other => panic!("unexpected outcome {:?}", other),
    }
}

#[tokio::test]
async fn test_malformed_unknown_and_undecodable_are_discarded() {
    let table = HandlerTable::new().bind(
        EventMode::CommentReviewResult,
        handler_fn(|_event| async { Err(HandlerError::malformed("missing x-review-uuid")) }),
    );
    let dispatcher = Dispatcher::new(table, RedeliveryPolicy::default());

    assert!(matches!(
        dispatcher.dispatch(&event(EventMode::CommentReviewResult), 0).await,
        Outcome::Discard { .. }
    ));
    assert!(matches!(
        dispatcher.dispatch(&event(EventMode::SearchIndex), 0).await,
        Outcome::Discard { .. }
    ));
    assert!(matches!(
        dispatcher.dispatch_raw(b"{\"mode\":\"nope\"}", 0).await,
        Outcome::Discard { .. }
    ));
}

#[tokio::test]
async fn test_raw_dispatch_decodes_envelope() {
    let calls = Arc::new(AtomicUsize::new(0));
    let table =
        HandlerTable::new().bind(EventMode::AddCreationView, counting_handler(calls.clone()));
    let dispatcher = Dispatcher::new(table, RedeliveryPolicy::default());

    let raw = event(EventMode::AddCreationView).to_bytes().unwrap();
    assert_eq!(dispatcher.dispatch_raw(&raw, 0).await, Outcome::Ack);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_rebinding_replaces_handler() {
    let first = Arc::new(AtomicUsize::new(0));
    let table = HandlerTable::new()
        .bind(EventMode::SearchIndex, counting_handler(first.clone()))
        .bind(EventMode::SearchIndex, counting_handler(first))
        .bind(EventMode::SearchRemove, counting_handler(Arc::new(AtomicUsize::new(0))));

    assert_eq!(table.len(), 2);
    assert_eq!(table.modes(), vec![EventMode::SearchIndex, EventMode::SearchRemove]);
}
