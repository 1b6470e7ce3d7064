//! Creation cache views and their guarded batches.

use crate::domain::models::{CreationItem, RankedItem, ReviewQueueItem};
use event_schema::{CreationEvent, CreationInteractionEvent, CreationKind, CreationRemovedEvent};
use fanout_cache::{decode_member, encode_member, parse_field, ttl, CacheError, CacheResult, GuardedBatch};

pub const FIELD_AGREE: &str = "agree";
pub const FIELD_COLLECT: &str = "collect";
pub const FIELD_VIEW: &str = "view";
pub const FIELD_COMMENT: &str = "comment";
pub const COUNTER_FIELDS: [&str; 4] = [FIELD_AGREE, FIELD_COLLECT, FIELD_VIEW, FIELD_COMMENT];

pub const REVIEW_QUEUE_CAP: usize = 100;

pub mod keys {
    use event_schema::CreationKind;

    pub fn counter(kind: CreationKind, id: i64) -> String {
        format!("{}_{}", kind, id)
    }

    pub fn feed(kind: CreationKind) -> String {
        kind.as_str().to_string()
    }

    pub fn hot(kind: CreationKind) -> String {
        format!("{}_hot", kind)
    }

    pub fn user_feed(kind: CreationKind, uuid: &str) -> String {
        format!("{}_user_{}", kind, uuid)
    }

    pub fn user_counter(uuid: &str) -> String {
        format!("creation_user_{}", uuid)
    }

    pub fn collect_feed(uuid: &str) -> String {
        format!("creation_collect_{}", uuid)
    }

    pub const LEADERBOARD: &str = "leaderboard";

    pub fn review_queue(uuid: &str) -> String {
        format!("creation_review_{}", uuid)
    }
}

pub const SCOPE_CREATE: &str = "creation_create";
pub const SCOPE_REMOVE: &str = "creation_remove";
pub const SCOPE_INTERACTION: &str = "creation_interaction";

pub fn creation_member(id: i64, uuid: &str) -> String {
    encode_member([id.to_string(), uuid.to_string()])
}

pub fn ranked_member(id: i64, author: &str, kind: CreationKind) -> String {
    encode_member([id.to_string(), author.to_string(), kind.code().to_string()])
}

pub fn review_entry(kind: CreationKind, id: i64) -> String {
    encode_member([kind.code().to_string(), id.to_string()])
}

pub fn decode_creation(raw: &str) -> CacheResult<CreationItem> {
    let parts = decode_member(raw, 2)?;
    Ok(CreationItem {
        id: parse_field(parts[0], "id")?,
        uuid: parts[1].to_string(),
    })
}

pub fn decode_ranked(raw: &str) -> CacheResult<RankedItem> {
    let parts = decode_member(raw, 3)?;
    let code: i16 = parse_field(parts[2], "kind")?;
    let kind = CreationKind::from_code(code)
        .ok_or_else(|| CacheError::InvalidData(format!("unknown creation kind {}", code)))?;
    Ok(RankedItem {
        id: parse_field(parts[0], "id")?,
        author: parts[1].to_string(),
        kind,
    })
}

pub fn decode_review_entry(raw: &str) -> CacheResult<ReviewQueueItem> {
    let parts = decode_member(raw, 2)?;
    let code: i16 = parse_field(parts[0], "kind")?;
    let kind = CreationKind::from_code(code)
        .map(|k| k.as_str().to_string())
        .unwrap_or_else(|| code.to_string());
    Ok(ReviewQueueItem {
        kind,
        id: parse_field(parts[1], "id")?,
    })
}

/// A creation passed review.
pub fn creation_created(creation: &CreationEvent) -> GuardedBatch {
    let kind = creation.kind;
    let member = creation_member(creation.id, &creation.uuid);
    let mut batch = GuardedBatch::new(ttl::FEED).once(SCOPE_CREATE, creation.id);
    batch
        .hash_init(keys::counter(kind, creation.id), &COUNTER_FIELDS)
        .hash_incr(keys::user_counter(&creation.uuid), kind.as_str(), 1)
        .feed_add(keys::feed(kind), creation.id as f64, member.clone())
        .feed_add(keys::hot(kind), 0.0, member.clone())
        .feed_add(keys::user_feed(kind, &creation.uuid), creation.id as f64, member)
        .feed_add(
            keys::LEADERBOARD,
            0.0,
            ranked_member(creation.id, &creation.uuid, kind),
        );
    batch
}

/// A creation was deleted. Its agree and collect totals are unwound from the
/// author's counters and it leaves every collector's feed.
pub fn creation_removed(removed: &CreationRemovedEvent) -> GuardedBatch {
    let creation = &removed.creation;
    let kind = creation.kind;
    let member = creation_member(creation.id, &creation.uuid);
    let ranked = ranked_member(creation.id, &creation.uuid, kind);
    let user_counter = keys::user_counter(&creation.uuid);

    let mut batch = GuardedBatch::new(ttl::FEED).once(SCOPE_REMOVE, creation.id);
    batch
        .delete(keys::counter(kind, creation.id))
        .feed_remove(keys::feed(kind), member.clone())
        .feed_remove(keys::hot(kind), member.clone())
        .feed_remove(keys::user_feed(kind, &creation.uuid), member)
        .feed_remove(keys::LEADERBOARD, ranked.clone())
        .hash_incr(user_counter.clone(), kind.as_str(), -1);
    if removed.counts.agree > 0 {
        batch.hash_incr(user_counter.clone(), FIELD_AGREE, -removed.counts.agree);
    }
    if removed.counts.collect > 0 {
        batch.hash_incr(user_counter, FIELD_COLLECT, -removed.counts.collect);
    }
    for collector in &removed.collectors {
        batch.feed_remove(keys::collect_feed(collector), ranked.clone());
    }
    batch
}

/// Agree toggled (`delta` is 1 or -1).
pub fn agree_changed(event: &CreationInteractionEvent, delta: i64, event_id: impl std::fmt::Display) -> GuardedBatch {
    let member = creation_member(event.creation_id, &event.author);
    let mut batch = GuardedBatch::new(ttl::COUNTER).once(SCOPE_INTERACTION, event_id);
    batch
        .hash_incr(keys::counter(event.kind, event.creation_id), FIELD_AGREE, delta)
        .hash_incr(keys::user_counter(&event.author), FIELD_AGREE, delta)
        .feed_incr(keys::hot(event.kind), member, delta)
        .feed_incr(
            keys::LEADERBOARD,
            ranked_member(event.creation_id, &event.author, event.kind),
            delta,
        );
    batch
}

/// Collect toggled. `collected_at` scores the collector's feed.
pub fn collect_changed(
    event: &CreationInteractionEvent,
    delta: i64,
    collected_at: f64,
    event_id: impl std::fmt::Display,
) -> GuardedBatch {
    let ranked = ranked_member(event.creation_id, &event.author, event.kind);
    let mut batch = GuardedBatch::new(ttl::COUNTER).once(SCOPE_INTERACTION, event_id);
    batch
        .hash_incr(keys::counter(event.kind, event.creation_id), FIELD_COLLECT, delta)
        .hash_incr(keys::user_counter(&event.author), FIELD_COLLECT, delta)
        .feed_incr(keys::LEADERBOARD, ranked.clone(), delta);
    if delta > 0 {
        batch.feed_add(keys::collect_feed(&event.uuid), collected_at, ranked);
    } else {
        batch.feed_remove(keys::collect_feed(&event.uuid), ranked);
    }
    batch
}

pub fn viewed(event: &CreationInteractionEvent, event_id: impl std::fmt::Display) -> GuardedBatch {
    let mut batch = GuardedBatch::new(ttl::COUNTER).once(SCOPE_INTERACTION, event_id);
    batch.hash_incr(keys::counter(event.kind, event.creation_id), FIELD_VIEW, 1);
    batch
}

/// Comment count moved through the façade. The idempotency key doubles as
/// the marker.
pub fn comment_count_adjusted(
    kind: CreationKind,
    id: i64,
    author: &str,
    delta: i64,
    idempotency_key: &str,
) -> GuardedBatch {
    let mut batch = GuardedBatch::new(ttl::COUNTER).once(SCOPE_INTERACTION, idempotency_key);
    batch
        .hash_incr(keys::counter(kind, id), FIELD_COMMENT, delta)
        .feed_incr(keys::LEADERBOARD, ranked_member(id, author, kind), delta);
    batch
}

pub fn review_enqueued(uuid: &str, kind: CreationKind, id: i64) -> GuardedBatch {
    let mut batch = GuardedBatch::new(ttl::REVIEW_QUEUE);
    batch.queue_push(keys::review_queue(uuid), review_entry(kind, id), REVIEW_QUEUE_CAP);
    batch
}

pub fn review_settled(uuid: &str, kind: CreationKind, id: i64) -> GuardedBatch {
    let mut batch = GuardedBatch::new(ttl::REVIEW_QUEUE);
    batch.queue_remove(keys::review_queue(uuid), review_entry(kind, id));
    batch
}
