//! Ranked-feed member encoding and pagination.
//!
//! Feed members carry every field a reader needs to build a result row, so a
//! page read is a single range query with no follow-up lookups.

use crate::{CacheError, CacheResult};
use std::fmt::Display;

pub const MEMBER_DELIMITER: char = '%';

pub const DEFAULT_PAGE_SIZE: usize = 20;
pub const MAX_PAGE_SIZE: usize = 100;

/// Join member fields with the delimiter.
pub fn encode_member<I, T>(parts: I) -> String
where
    I: IntoIterator<Item = T>,
    T: Display,
{
    let mut out = String::new();
    for (i, part) in parts.into_iter().enumerate() {
        if i > 0 {
            out.push(MEMBER_DELIMITER);
        }
        out.push_str(&part.to_string());
    }
    out
}

/// Longest identifier accepted as a member field.
pub const MAX_FIELD_LEN: usize = 64;

/// Whether a caller-supplied identifier can be embedded in a member as-is.
/// Only ASCII letters, digits, `-`, `_` and `.` are allowed, which keeps the
/// delimiter out of every stored member.
pub fn is_member_field(raw: &str) -> bool {
    !raw.is_empty()
        && raw.len() <= MAX_FIELD_LEN
        && raw
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.'))
}

/// Split a member into exactly `arity` fields.
pub fn decode_member(raw: &str, arity: usize) -> CacheResult<Vec<&str>> {
    let parts: Vec<&str> = raw.split(MEMBER_DELIMITER).collect();
    if parts.len() != arity {
        return Err(CacheError::InvalidData(format!(
            "feed member {:?} has {} fields, expected {}",
            raw,
            parts.len(),
            arity
        )));
    }
    Ok(parts)
}

pub fn parse_field<T: std::str::FromStr>(raw: &str, field: &str) -> CacheResult<T> {
    raw.parse::<T>()
        .map_err(|_| CacheError::InvalidData(format!("feed member field {} = {:?}", field, raw)))
}

/// Feed member paired with its score, as loaded from the store.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedEntry {
    pub score: f64,
    pub member: String,
}

impl FeedEntry {
    pub fn new(score: impl Into<f64>, member: impl Into<String>) -> Self {
        Self {
            score: score.into(),
            member: member.into(),
        }
    }
}

/// Offset/limit slice of a descending feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeedWindow {
    pub offset: usize,
    pub limit: usize,
}

impl FeedWindow {
    pub fn head(limit: usize) -> Self {
        Self { offset: 0, limit }
    }

    /// Inclusive stop index for range commands.
    pub fn stop(&self) -> usize {
        self.offset + self.limit.saturating_sub(1)
    }
}

/// Client page request. Page numbers below 1 read page 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    number: usize,
    size: usize,
}

impl Page {
    pub fn new(number: i64, size: i64) -> Self {
        let number = if number < 1 { 1 } else { number as usize };
        let size = if size < 1 {
            DEFAULT_PAGE_SIZE
        } else {
            (size as usize).min(MAX_PAGE_SIZE)
        };
        Self { number, size }
    }

    pub fn number(&self) -> usize {
        self.number
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn window(&self) -> FeedWindow {
        FeedWindow {
            offset: (self.number - 1) * self.size,
            limit: self.size,
        }
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new(1, DEFAULT_PAGE_SIZE as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_clamps_below_one() {
        assert_eq!(Page::new(0, 10).window(), FeedWindow { offset: 0, limit: 10 });
        assert_eq!(Page::new(-5, 10), Page::new(1, 10));
        assert_eq!(Page::new(3, 10).window(), FeedWindow { offset: 20, limit: 10 });
    }

    #[test]
    fn test_page_size_bounds() {
        assert_eq!(Page::new(1, 0).size(), DEFAULT_PAGE_SIZE);
        assert_eq!(Page::new(1, 10_000).size(), MAX_PAGE_SIZE);
    }

    #[test]
    fn test_member_codec() {
        let id: i64 = 7;
        let member = encode_member([id.to_string(), "u1".to_string(), "u2".to_string(), 3.to_string()]);
        assert_eq!(member, "7%u1%u2%3");
        assert_eq!(encode_member([1, 2]), "1%2");

        let parts = decode_member(&member, 4).unwrap();
        assert_eq!(parts, vec!["7", "u1", "u2", "3"]);
        assert_eq!(parse_field::<i64>(parts[0], "id").unwrap(), 7);
    }

    #[test]
    fn test_delimiter_in_field_breaks_decoding() {
        let member = encode_member(["5", "u3", "u2%evil", "1"]);
        assert!(decode_member(&member, 4).is_err());
        assert!(!is_member_field("u2%evil"));
    }

    #[test]
    fn test_member_field_charset() {
        assert!(is_member_field("test-8f14e45f.user_1"));
        assert!(is_member_field("550e8400-e29b-41d4-a716-446655440000"));
        for bad in ["", "a b", "x%y", "ü", "a/b"] {
            assert!(!is_member_field(bad), "{:?} accepted", bad);
        }
        assert!(!is_member_field(&"a".repeat(MAX_FIELD_LEN + 1)));
    }

    #[test]
    fn test_member_arity_mismatch() {
        assert!(matches!(decode_member("1%u1", 3), Err(CacheError::InvalidData(_))));
        assert!(parse_field::<i64>("x", "id").is_err());
    }

    #[test]
    fn test_window_stop() {
        assert_eq!(FeedWindow { offset: 20, limit: 10 }.stop(), 29);
        assert_eq!(FeedWindow::head(1).stop(), 0);
    }
}
