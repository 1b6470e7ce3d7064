//! JSON bodies of creation-service's internal façade.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreationAuthor {
    pub author: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CreationCounts {
    pub agree: i64,
    pub collect: i64,
    pub view: i64,
    pub comment: i64,
}

/// Add (`delta > 0`) or reduce (`delta < 0`) a creation's comment count.
/// Applied at most once per `idempotency_key`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentCountAdjustment {
    pub delta: i64,
    pub idempotency_key: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdjustmentResult {
    /// `false` when the key had already been applied
    pub applied: bool,
}
