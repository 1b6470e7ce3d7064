//! Comment cache views and the guarded batches that keep them in step with
//! the store.

use crate::domain::models::{CommentItem, ReplyItem, ReviewQueueItem, SubCommentItem};
use event_schema::{
    CommentAgreeEvent, CommentEvent, CommentKind, CommentRemovedEvent, SubCommentEvent,
};
use fanout_cache::{decode_member, encode_member, parse_field, ttl, CacheResult, GuardedBatch};

pub const FIELD_AGREE: &str = "agree";
pub const FIELD_COMMENT: &str = "comment";
pub const COUNTER_FIELDS: [&str; 2] = [FIELD_AGREE, FIELD_COMMENT];

/// Review queue length per user.
pub const REVIEW_QUEUE_CAP: usize = 100;

pub mod keys {
    pub fn counter(id: i64) -> String {
        format!("comment_{}", id)
    }

    pub fn creation_feed(creation_id: i64, creation_type: i16) -> String {
        format!("comment_{}_{}", creation_id, creation_type)
    }

    pub fn creation_hot(creation_id: i64, creation_type: i16) -> String {
        format!("comment_{}_{}_hot", creation_id, creation_type)
    }

    pub fn sub_feed(root_id: i64) -> String {
        format!("sub_comment_{}", root_id)
    }

    pub fn user_counter(uuid: &str) -> String {
        format!("comment_user_{}", uuid)
    }

    pub fn user_reply(uuid: &str) -> String {
        format!("comment_user_reply_{}", uuid)
    }

    pub fn user_replied(uuid: &str) -> String {
        format!("comment_user_replied_{}", uuid)
    }

    pub fn review_queue(uuid: &str) -> String {
        format!("comment_review_{}", uuid)
    }
}

// Marker scopes. Create and remove fan-outs are keyed by entity id so that a
// verdict delivered twice still counts once; agree toggles by event id.
pub const SCOPE_CREATE: &str = "comment_create";
pub const SCOPE_REMOVE: &str = "comment_remove";
pub const SCOPE_AGREE: &str = "comment_agree";

pub fn comment_member(id: i64, uuid: &str) -> String {
    encode_member([id.to_string(), uuid.to_string()])
}

pub fn sub_comment_member(id: i64, uuid: &str, reply_uuid: &str, parent_id: i64) -> String {
    encode_member([
        id.to_string(),
        uuid.to_string(),
        reply_uuid.to_string(),
        parent_id.to_string(),
    ])
}

pub fn reply_member(reply: &SubCommentEvent) -> String {
    encode_member([
        reply.id.to_string(),
        reply.uuid.clone(),
        reply.reply_uuid.clone(),
        reply.root_id.to_string(),
        reply.parent_id.to_string(),
        reply.creation_id.to_string(),
        reply.creation_type.to_string(),
    ])
}

pub fn review_entry(kind: CommentKind, id: i64) -> String {
    encode_member([kind.code().to_string(), id.to_string()])
}

pub fn decode_comment(raw: &str) -> CacheResult<CommentItem> {
    let parts = decode_member(raw, 2)?;
    Ok(CommentItem {
        id: parse_field(parts[0], "id")?,
        uuid: parts[1].to_string(),
    })
}

pub fn decode_sub_comment(raw: &str) -> CacheResult<SubCommentItem> {
    let parts = decode_member(raw, 4)?;
    Ok(SubCommentItem {
        id: parse_field(parts[0], "id")?,
        uuid: parts[1].to_string(),
        reply_uuid: parts[2].to_string(),
        parent_id: parse_field(parts[3], "parent_id")?,
    })
}

pub fn decode_reply(raw: &str) -> CacheResult<ReplyItem> {
    let parts = decode_member(raw, 7)?;
    Ok(ReplyItem {
        id: parse_field(parts[0], "id")?,
        uuid: parts[1].to_string(),
        reply_uuid: parts[2].to_string(),
        root_id: parse_field(parts[3], "root_id")?,
        parent_id: parse_field(parts[4], "parent_id")?,
        creation_id: parse_field(parts[5], "creation_id")?,
        creation_type: parse_field(parts[6], "creation_type")?,
    })
}

pub fn decode_review_entry(raw: &str) -> CacheResult<ReviewQueueItem> {
    let parts = decode_member(raw, 2)?;
    let code: i16 = parse_field(parts[0], "kind")?;
    let kind = CommentKind::from_code(code)
        .map(|k| k.as_str().to_string())
        .unwrap_or_else(|| code.to_string());
    Ok(ReviewQueueItem {
        kind,
        id: parse_field(parts[1], "id")?,
    })
}

/// Replied feeds a reply lands in: the root author's, plus the addressed
/// user's when the replier is not the root author.
fn replied_feeds(reply: &SubCommentEvent) -> Vec<String> {
    let mut feeds = vec![keys::user_replied(&reply.root_uuid)];
    if reply.uuid != reply.root_uuid {
        feeds.push(keys::user_replied(&reply.reply_uuid));
    }
    feeds
}

/// A comment passed review.
pub fn comment_created(comment: &CommentEvent) -> GuardedBatch {
    let member = comment_member(comment.id, &comment.uuid);
    let mut batch = GuardedBatch::new(ttl::FEED).once(SCOPE_CREATE, comment.id);
    batch
        .hash_init(keys::counter(comment.id), &COUNTER_FIELDS)
        .hash_incr(keys::user_counter(&comment.creation_author), FIELD_COMMENT, 1)
        .feed_add(
            keys::creation_feed(comment.creation_id, comment.creation_type),
            comment.id as f64,
            member.clone(),
        )
        .feed_add(
            keys::creation_hot(comment.creation_id, comment.creation_type),
            0.0,
            member,
        );
    batch
}

/// A reply passed review.
pub fn sub_comment_created(reply: &SubCommentEvent) -> GuardedBatch {
    let member = reply_member(reply);
    let mut batch = GuardedBatch::new(ttl::FEED).once(SCOPE_CREATE, reply.id);
    batch
        .hash_init(keys::counter(reply.id), &COUNTER_FIELDS)
        .hash_incr(keys::counter(reply.root_id), FIELD_COMMENT, 1)
        .hash_incr(keys::user_counter(&reply.creation_author), FIELD_COMMENT, 1)
        .feed_add(
            keys::sub_feed(reply.root_id),
            reply.id as f64,
            sub_comment_member(reply.id, &reply.uuid, &reply.reply_uuid, reply.parent_id),
        )
        .feed_add(keys::user_reply(&reply.uuid), reply.id as f64, member.clone());
    for feed in replied_feeds(reply) {
        batch.feed_add(feed, reply.id as f64, member.clone());
    }
    batch
}

/// A comment and its replies were deleted.
pub fn comment_removed(removed: &CommentRemovedEvent) -> GuardedBatch {
    let comment = &removed.comment;
    let member = comment_member(comment.id, &comment.uuid);
    let mut batch = GuardedBatch::new(ttl::FEED).once(SCOPE_REMOVE, comment.id);
    batch
        .hash_incr(
            keys::user_counter(&comment.creation_author),
            FIELD_COMMENT,
            -(1 + removed.replies.len() as i64),
        )
        .feed_remove(
            keys::creation_feed(comment.creation_id, comment.creation_type),
            member.clone(),
        )
        .feed_remove(
            keys::creation_hot(comment.creation_id, comment.creation_type),
            member,
        )
        .delete(keys::counter(comment.id))
        .delete(keys::sub_feed(comment.id));
    unwind_agree(&mut batch, &comment.uuid, removed.agree);

    for reply in &removed.replies {
        let member = reply_member(reply);
        batch
            .delete(keys::counter(reply.id))
            .feed_remove(keys::user_reply(&reply.uuid), member.clone());
        for feed in replied_feeds(reply) {
            batch.feed_remove(feed, member.clone());
        }
        unwind_agree(&mut batch, &reply.uuid, reply.agree);
    }
    batch
}

/// A single reply was deleted.
pub fn sub_comment_removed(reply: &SubCommentEvent) -> GuardedBatch {
    let member = reply_member(reply);
    let mut batch = GuardedBatch::new(ttl::FEED).once(SCOPE_REMOVE, reply.id);
    batch
        .hash_incr(keys::counter(reply.root_id), FIELD_COMMENT, -1)
        .hash_incr(keys::user_counter(&reply.creation_author), FIELD_COMMENT, -1)
        .feed_remove(
            keys::sub_feed(reply.root_id),
            sub_comment_member(reply.id, &reply.uuid, &reply.reply_uuid, reply.parent_id),
        )
        .feed_remove(keys::user_reply(&reply.uuid), member.clone())
        .delete(keys::counter(reply.id));
    for feed in replied_feeds(reply) {
        batch.feed_remove(feed, member.clone());
    }
    unwind_agree(&mut batch, &reply.uuid, reply.agree);
    batch
}

/// Agrees received by a deleted entity stop counting for its author.
fn unwind_agree(batch: &mut GuardedBatch, author: &str, agree: i64) {
    if agree > 0 {
        batch.hash_incr(keys::user_counter(author), FIELD_AGREE, -agree);
    }
}

/// Agree (`delta = 1`) or cancel (`delta = -1`).
pub fn agree_changed(agree: &CommentAgreeEvent, delta: i64, event_id: impl std::fmt::Display) -> GuardedBatch {
    let mut batch = GuardedBatch::new(ttl::COUNTER).once(SCOPE_AGREE, event_id);
    batch
        .hash_incr(keys::counter(agree.comment_id), FIELD_AGREE, delta)
        .hash_incr(keys::user_counter(&agree.author), FIELD_AGREE, delta);
    if agree.root_id.is_none() {
        batch.feed_incr(
            keys::creation_hot(agree.creation_id, agree.creation_type),
            comment_member(agree.comment_id, &agree.author),
            delta,
        );
    }
    batch
}

pub fn review_enqueued(uuid: &str, kind: CommentKind, id: i64) -> GuardedBatch {
    let mut batch = GuardedBatch::new(ttl::REVIEW_QUEUE);
    batch.queue_push(keys::review_queue(uuid), review_entry(kind, id), REVIEW_QUEUE_CAP);
    batch
}

pub fn review_settled(uuid: &str, kind: CommentKind, id: i64) -> GuardedBatch {
    let mut batch = GuardedBatch::new(ttl::REVIEW_QUEUE);
    batch.queue_remove(keys::review_queue(uuid), review_entry(kind, id));
    batch
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use fanout_cache::{CacheOp, CacheStore, MemoryCacheStore};

    fn reply(uuid: &str, root_uuid: &str, reply_uuid: &str) -> SubCommentEvent {
        SubCommentEvent {
            id: 5,
            uuid: uuid.to_string(),
            creation_id: 10,
            creation_type: 1,
            creation_author: "author".to_string(),
            root_id: 1,
            root_uuid: root_uuid.to_string(),
            parent_id: 3,
            reply_uuid: reply_uuid.to_string(),
            content: "hi".to_string(),
            created_at: Utc::now(),
            agree: 0,
        }
    }

    fn feed_keys(batch: &GuardedBatch) -> Vec<&str> {
        batch
            .ops
            .iter()
            .filter(|op| matches!(op, CacheOp::FeedAdd { .. }))
            .map(|op| op.key())
            .collect()
    }

    #[test]
    fn test_reply_by_third_party_reaches_both_replied_feeds() {
        let batch = sub_comment_created(&reply("u3", "u1", "u2"));
        let feeds = feed_keys(&batch);

        assert!(feeds.contains(&"comment_user_replied_u1"));
        assert!(feeds.contains(&"comment_user_replied_u2"));
        assert!(feeds.contains(&"comment_user_reply_u3"));
        assert!(feeds.contains(&"sub_comment_1"));
    }

    #[test]
    fn test_root_author_reply_skips_second_replied_feed() {
        let batch = sub_comment_created(&reply("u1", "u1", "u2"));
        let feeds = feed_keys(&batch);

        assert!(feeds.contains(&"comment_user_replied_u1"));
        assert!(!feeds.contains(&"comment_user_replied_u2"));
    }

    #[test]
    fn test_reply_member_round_trips() {
        let event = reply("u3", "u1", "u2");
        let item = decode_reply(&reply_member(&event)).unwrap();
        assert_eq!(item.id, 5);
        assert_eq!(item.root_id, 1);
        assert_eq!(item.parent_id, 3);
        assert_eq!(item.creation_type, 1);
    }

    #[test]
    fn test_agree_on_reply_leaves_hot_feed_alone() {
        let agree = CommentAgreeEvent {
            comment_id: 5,
            uuid: "u9".into(),
            author: "u3".into(),
            creation_id: 10,
            creation_type: 1,
            root_id: Some(1),
        };
        let batch = agree_changed(&agree, 1, "evt");
        assert_eq!(batch.ops.len(), 2);
        assert_eq!(
            batch.marker.as_ref().map(|m| m.key.as_str()),
            Some("fanout_done_comment_agree_evt")
        );
    }

    fn removed_comment(agree: i64, replies: Vec<SubCommentEvent>) -> CommentRemovedEvent {
        CommentRemovedEvent {
            comment: CommentEvent {
                id: 1,
                uuid: "u1".to_string(),
                creation_id: 10,
                creation_type: 1,
                creation_author: "author".to_string(),
                content: "root".to_string(),
                created_at: Utc::now(),
            },
            agree,
            replies,
        }
    }

    #[tokio::test]
    async fn test_comment_removal_takes_back_agrees_from_each_author() {
        let cache = MemoryCacheStore::new();
        cache.seed_hash(&keys::user_counter("u1"), &[("agree", 3), ("comment", 1)], ttl::COUNTER);
        cache.seed_hash(&keys::user_counter("u3"), &[("agree", 5), ("comment", 0)], ttl::COUNTER);
        let agreed_reply = SubCommentEvent {
            agree: 1,
            ..reply("u3", "u1", "u2")
        };

        cache
            .apply(&comment_removed(&removed_comment(2, vec![agreed_reply])))
            .await
            .unwrap();

        assert_eq!(cache.hash_field(&keys::user_counter("u1"), "agree"), Some(1));
        assert_eq!(cache.hash_field(&keys::user_counter("u3"), "agree"), Some(4));
    }

    #[tokio::test]
    async fn test_reply_removal_takes_back_its_agrees() {
        let cache = MemoryCacheStore::new();
        cache.seed_hash(&keys::user_counter("u3"), &[("agree", 5), ("comment", 2)], ttl::COUNTER);
        let removed = SubCommentEvent {
            agree: 2,
            ..reply("u3", "u1", "u2")
        };

        cache.apply(&sub_comment_removed(&removed)).await.unwrap();
        cache.apply(&sub_comment_removed(&removed)).await.unwrap();

        assert_eq!(cache.hash_field(&keys::user_counter("u3"), "agree"), Some(3));
    }

    #[test]
    fn test_removal_without_agrees_leaves_agree_field_alone() {
        let batch = sub_comment_removed(&reply("u3", "u1", "u2"));
        assert!(!batch.ops.iter().any(|op| matches!(
            op,
            CacheOp::HashIncr { field, .. } if field == FIELD_AGREE
        )));
    }

    #[test]
    fn test_review_entry_decodes_kind_name() {
        let item = decode_review_entry(&review_entry(CommentKind::SubComment, 42)).unwrap();
        assert_eq!(item.kind, "sub_comment");
        assert_eq!(item.id, 42);
    }
}
