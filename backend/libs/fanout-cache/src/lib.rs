//! Cache-consistency fan-out engine
//!
//! Keeps TTL-bound cache views (counter hashes, ranked feeds, review queues)
//! eventually consistent with the relational store:
//! - Guarded batches run as one atomic server-side script and only refresh
//!   views that are already warm
//! - Per-event markers make replayed fan-out a no-op
//! - Read-through population is the only way a cold view becomes warm again
//! - An in-process backend with identical semantics for tests and local runs

mod error;
mod memory;
mod metrics;
mod redis_store;
mod script;

pub mod member;
pub mod ops;
pub mod populate;
pub mod read_through;
pub mod store;

pub use error::{CacheError, CacheResult};
pub use member::{decode_member, encode_member, is_member_field, parse_field, FeedEntry, FeedWindow, Page};
pub use memory::MemoryCacheStore;
pub use metrics::FanoutMetrics;
pub use ops::{CacheOp, GuardedBatch, Marker, ScriptOutcome};
pub use populate::PopulatePool;
pub use read_through::ReadThrough;
pub use redis_store::RedisCacheStore;
pub use script::FANOUT_SCRIPT;
pub use store::CacheStore;

/// Default TTL values
pub mod ttl {
    use std::time::Duration;

    pub const COUNTER: Duration = Duration::from_secs(1800); // 30 minutes
    pub const FEED: Duration = Duration::from_secs(1800); // 30 minutes
    pub const USER_FEED: Duration = Duration::from_secs(600); // 10 minutes
    pub const LEADERBOARD: Duration = Duration::from_secs(3600); // 1 hour
    pub const REVIEW_QUEUE: Duration = Duration::from_secs(300); // 5 minutes

    /// Add up to 10% jitter so views populated together do not expire together
    pub fn with_jitter(ttl: Duration) -> Duration {
        let jitter_percent = (rand::random::<u32>() % 10) as f64 / 100.0;
        let jitter = (ttl.as_secs() as f64 * jitter_percent).round() as u64;
        ttl + Duration::from_secs(jitter)
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn test_jitter_stays_within_ten_percent() {
            for _ in 0..50 {
                let ttl = with_jitter(COUNTER);
                assert!(ttl >= COUNTER);
                assert!(ttl <= COUNTER + Duration::from_secs(180));
            }
        }
    }
}
