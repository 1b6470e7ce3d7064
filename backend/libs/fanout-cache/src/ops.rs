//! Guarded mutation batches.
//!
//! A [`GuardedBatch`] is the unit of atomicity: every op in it is applied by
//! one server-side script run. Ops that update a view (`HashIncr`, `FeedAdd`,
//! `FeedIncr`) only touch keys that already exist, so a replayed or late event
//! can never recreate a view that expired. Only `HashInit` and `QueuePush`
//! create keys, and they belong to create paths.

use std::fmt::Display;
use std::time::Duration;

/// Prefix of the per-event idempotency marker key.
pub const MARKER_PREFIX: &str = "fanout_done";

/// Default lifetime of an idempotency marker. Far longer than the
/// redelivery window of any event.
pub const DEFAULT_MARKER_TTL: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Clone, PartialEq)]
pub enum CacheOp {
    /// Add `delta` to a hash field if the hash exists. Negative deltas apply
    /// only while the field is above zero and stop at zero.
    HashIncr { key: String, field: String, delta: i64 },
    /// Seed fields that are not yet set. Creates the hash.
    HashInit { key: String, fields: Vec<(String, i64)> },
    /// Add or rescore a member if the feed exists.
    FeedAdd { key: String, score: f64, member: String },
    /// Move a member's score if the member is present. Saturates at zero
    /// like `HashIncr`.
    FeedIncr { key: String, member: String, delta: i64 },
    /// Remove a member. Absent keys and members are no-ops.
    FeedRemove { key: String, member: String },
    /// Push onto a capped list. Creates the list.
    QueuePush { key: String, value: String, cap: usize },
    QueueRemove { key: String, value: String },
    Delete { key: String },
}

impl CacheOp {
    pub fn key(&self) -> &str {
        match self {
            CacheOp::HashIncr { key, .. }
            | CacheOp::HashInit { key, .. }
            | CacheOp::FeedAdd { key, .. }
            | CacheOp::FeedIncr { key, .. }
            | CacheOp::FeedRemove { key, .. }
            | CacheOp::QueuePush { key, .. }
            | CacheOp::QueueRemove { key, .. }
            | CacheOp::Delete { key } => key,
        }
    }

    /// Whether the op is able to bring a missing key into existence.
    pub fn creates_key(&self) -> bool {
        matches!(self, CacheOp::HashInit { .. } | CacheOp::QueuePush { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Marker {
    pub key: String,
    pub ttl: Duration,
}

/// Result of running a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptOutcome {
    /// Number of op effects that actually landed
    Applied(u32),
    /// The batch's marker was already set; nothing ran
    Duplicate,
}

impl ScriptOutcome {
    pub(crate) fn from_reply(reply: i64) -> Self {
        if reply < 0 {
            ScriptOutcome::Duplicate
        } else {
            ScriptOutcome::Applied(reply as u32)
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ScriptOutcome::Applied(0) => "skipped",
            ScriptOutcome::Applied(_) => "applied",
            ScriptOutcome::Duplicate => "duplicate",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GuardedBatch {
    pub ttl: Duration,
    pub marker: Option<Marker>,
    pub ops: Vec<CacheOp>,
}

impl GuardedBatch {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            marker: None,
            ops: Vec::new(),
        }
    }

    /// Run the batch at most once per `(scope, id)`.
    pub fn once(mut self, scope: &str, id: impl Display) -> Self {
        self.marker = Some(Marker {
            key: format!("{}_{}_{}", MARKER_PREFIX, scope, id),
            ttl: DEFAULT_MARKER_TTL,
        });
        self
    }

    pub fn push(&mut self, op: CacheOp) -> &mut Self {
        self.ops.push(op);
        self
    }

    pub fn hash_incr(&mut self, key: impl Into<String>, field: impl Into<String>, delta: i64) -> &mut Self {
        self.push(CacheOp::HashIncr {
            key: key.into(),
            field: field.into(),
            delta,
        })
    }

    pub fn hash_init(&mut self, key: impl Into<String>, fields: &[&str]) -> &mut Self {
        self.push(CacheOp::HashInit {
            key: key.into(),
            fields: fields.iter().map(|f| (f.to_string(), 0)).collect(),
        })
    }

    pub fn feed_add(&mut self, key: impl Into<String>, score: f64, member: impl Into<String>) -> &mut Self {
        self.push(CacheOp::FeedAdd {
            key: key.into(),
            score,
            member: member.into(),
        })
    }

    pub fn feed_incr(&mut self, key: impl Into<String>, member: impl Into<String>, delta: i64) -> &mut Self {
        self.push(CacheOp::FeedIncr {
            key: key.into(),
            member: member.into(),
            delta,
        })
    }

    pub fn feed_remove(&mut self, key: impl Into<String>, member: impl Into<String>) -> &mut Self {
        self.push(CacheOp::FeedRemove {
            key: key.into(),
            member: member.into(),
        })
    }

    pub fn queue_push(&mut self, key: impl Into<String>, value: impl Into<String>, cap: usize) -> &mut Self {
        self.push(CacheOp::QueuePush {
            key: key.into(),
            value: value.into(),
            cap,
        })
    }

    pub fn queue_remove(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.push(CacheOp::QueueRemove {
            key: key.into(),
            value: value.into(),
        })
    }

    pub fn delete(&mut self, key: impl Into<String>) -> &mut Self {
        self.push(CacheOp::Delete { key: key.into() })
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Flatten into script KEYS and ARGV.
    ///
    /// ARGV is `ttl, marker_ttl` followed by `(op, key index, a, b)` tuples.
    /// When a marker is present it is KEYS[1].
    pub(crate) fn encode(&self) -> (Vec<String>, Vec<String>) {
        let mut keys = Vec::with_capacity(self.ops.len() + 1);
        let mut args = Vec::with_capacity(2 + self.ops.len() * 4);

        args.push(ttl_secs(self.ttl).to_string());
        match &self.marker {
            Some(marker) => {
                keys.push(marker.key.clone());
                args.push(ttl_secs(marker.ttl).to_string());
            }
            None => args.push("0".to_string()),
        }

        for op in &self.ops {
            keys.push(op.key().to_string());
            let idx = keys.len().to_string();
            let mut tuple = |code: &str, a: String, b: String| {
                args.push(code.to_string());
                args.push(idx.clone());
                args.push(a);
                args.push(b);
            };

            match op {
                CacheOp::HashIncr { field, delta, .. } => tuple("hincr", field.clone(), delta.to_string()),
                CacheOp::HashInit { fields, .. } => {
                    for (field, value) in fields {
                        tuple("hinit", field.clone(), value.to_string());
                    }
                }
                CacheOp::FeedAdd { score, member, .. } => tuple("zadd", member.clone(), score.to_string()),
                CacheOp::FeedIncr { member, delta, .. } => tuple("zincr", member.clone(), delta.to_string()),
                CacheOp::FeedRemove { member, .. } => tuple("zrem", member.clone(), String::new()),
                CacheOp::QueuePush { value, cap, .. } => tuple("lpush", value.clone(), (*cap).max(1).to_string()),
                CacheOp::QueueRemove { value, .. } => tuple("lrem", value.clone(), String::new()),
                CacheOp::Delete { .. } => tuple("del", String::new(), String::new()),
            }
        }

        (keys, args)
    }
}

pub(crate) fn ttl_secs(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_without_marker() {
        let mut batch = GuardedBatch::new(Duration::from_secs(300));
        batch
            .hash_incr("comment_1", "agree", -1)
            .feed_add("comment_10_1", 1.0, "1%u1");

        let (keys, args) = batch.encode();
        assert_eq!(keys, vec!["comment_1", "comment_10_1"]);
        assert_eq!(
            args,
            vec!["300", "0", "hincr", "1", "agree", "-1", "zadd", "2", "1%u1", "1"]
        );
    }

    #[test]
    fn test_encode_marker_takes_first_key_slot() {
        let mut batch = GuardedBatch::new(Duration::from_secs(60)).once("comment", 42);
        batch.hash_init("comment_1", &["agree", "comment"]).delete("sub_comment_1");

        let (keys, args) = batch.encode();
        assert_eq!(keys, vec!["fanout_done_comment_42", "comment_1", "sub_comment_1"]);
        assert_eq!(&args[..2], &["60".to_string(), "86400".to_string()]);
        // hash_init expands to one tuple per field, both pointing at KEYS[2]
        assert_eq!(&args[2..6], &["hinit", "2", "agree", "0"]);
        assert_eq!(&args[6..10], &["hinit", "2", "comment", "0"]);
        assert_eq!(&args[10..14], &["del", "3", "", ""]);
    }

    #[test]
    fn test_sub_second_ttl_rounds_up() {
        let batch = GuardedBatch::new(Duration::from_millis(10));
        let (_, args) = batch.encode();
        assert_eq!(args[0], "1");
    }

    #[test]
    fn test_creates_key() {
        assert!(CacheOp::HashInit { key: "k".into(), fields: vec![] }.creates_key());
        assert!(!CacheOp::HashIncr { key: "k".into(), field: "f".into(), delta: 1 }.creates_key());
        assert!(!CacheOp::FeedAdd { key: "k".into(), score: 1.0, member: "m".into() }.creates_key());
    }

    #[test]
    fn test_outcome_from_reply() {
        assert_eq!(ScriptOutcome::from_reply(-1), ScriptOutcome::Duplicate);
        assert_eq!(ScriptOutcome::from_reply(0).label(), "skipped");
        assert_eq!(ScriptOutcome::from_reply(3), ScriptOutcome::Applied(3));
    }
}
