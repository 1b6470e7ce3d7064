/// Per-boundary timeout presets
use crate::timeout::Boundary;
use std::time::Duration;

/// Timeouts for every outbound dependency of a service.
///
/// - Store: 10s (queries and short transactions)
/// - Cache: 2s (single scripts and pipelines)
/// - Bus: 5s (produce acknowledgement)
/// - Facade: 5s (narrow synchronous peer calls)
/// - Reviewer: 60s (external moderation submission)
/// - Populate: 3s (background read-through writes)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundaryTimeouts {
    pub store: Duration,
    pub cache: Duration,
    pub bus: Duration,
    pub facade: Duration,
    pub reviewer: Duration,
    pub populate: Duration,
}

impl Default for BoundaryTimeouts {
    fn default() -> Self {
        Self {
            store: Duration::from_secs(10),
            cache: Duration::from_secs(2),
            bus: Duration::from_secs(5),
            facade: Duration::from_secs(5),
            reviewer: Duration::from_secs(60),
            populate: Duration::from_secs(3),
        }
    }
}

impl BoundaryTimeouts {
    /// Load overrides from `TIMEOUT_<BOUNDARY>_MS` environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            store: env_millis("TIMEOUT_STORE_MS").unwrap_or(defaults.store),
            cache: env_millis("TIMEOUT_CACHE_MS").unwrap_or(defaults.cache),
            bus: env_millis("TIMEOUT_BUS_MS").unwrap_or(defaults.bus),
            facade: env_millis("TIMEOUT_FACADE_MS").unwrap_or(defaults.facade),
            reviewer: env_millis("TIMEOUT_REVIEWER_MS").unwrap_or(defaults.reviewer),
            populate: env_millis("TIMEOUT_POPULATE_MS").unwrap_or(defaults.populate),
        }
    }

    pub fn for_boundary(&self, boundary: Boundary) -> Duration {
        match boundary {
            Boundary::Store => self.store,
            Boundary::Cache => self.cache,
            Boundary::Bus => self.bus,
            Boundary::Facade => self.facade,
            Boundary::Reviewer => self.reviewer,
            Boundary::Populate => self.populate,
        }
    }
}

fn env_millis(name: &str) -> Option<Duration> {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .filter(|ms| *ms > 0)
        .map(Duration::from_millis)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[serial_test::serial]
    fn test_defaults_without_env() {
        std::env::remove_var("TIMEOUT_CACHE_MS");
        std::env::remove_var("TIMEOUT_REVIEWER_MS");

        let timeouts = BoundaryTimeouts::from_env();
        assert_eq!(timeouts.cache, Duration::from_secs(2));
        assert_eq!(timeouts.reviewer, Duration::from_secs(60));
        assert_eq!(timeouts.for_boundary(Boundary::Store), Duration::from_secs(10));
    }

    #[test]
    #[serial_test::serial]
    fn test_env_override_and_invalid_values() {
        std::env::set_var("TIMEOUT_CACHE_MS", "750");
        std::env::set_var("TIMEOUT_BUS_MS", "not-a-number");
        std::env::set_var("TIMEOUT_FACADE_MS", "0");

        let timeouts = BoundaryTimeouts::from_env();
        assert_eq!(timeouts.cache, Duration::from_millis(750));
        assert_eq!(timeouts.bus, Duration::from_secs(5));
        assert_eq!(timeouts.facade, Duration::from_secs(5));

        std::env::remove_var("TIMEOUT_CACHE_MS");
        std::env::remove_var("TIMEOUT_BUS_MS");
        std::env::remove_var("TIMEOUT_FACADE_MS");
    }
}
