use std::time::Duration;

/// Fixed delay tiers plus a redelivery budget.
///
/// Delivery `attempt` counts from 0. After a failed attempt `n`, the event is
/// redelivered on tier `min(n, tiers - 1)` while `n < budget`; after that it
/// is dead-lettered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedeliveryPolicy {
    tiers: Vec<Duration>,
    budget: u32,
}

impl Default for RedeliveryPolicy {
    fn default() -> Self {
        Self {
            tiers: [1, 5, 10, 30, 60].into_iter().map(Duration::from_secs).collect(),
            budget: 5,
        }
    }
}

impl RedeliveryPolicy {
    pub fn new(tiers: Vec<Duration>, budget: u32) -> Self {
        let tiers = if tiers.is_empty() {
            Self::default().tiers
        } else {
            tiers
        };
        Self { tiers, budget }
    }

    /// Load `REDELIVERY_TIERS_SECS` (comma separated) and `REDELIVERY_BUDGET`.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let tiers = std::env::var("REDELIVERY_TIERS_SECS")
            .ok()
            .map(|raw| parse_tiers(&raw))
            .filter(|t| !t.is_empty())
            .unwrap_or(defaults.tiers);
        let budget = std::env::var("REDELIVERY_BUDGET")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.budget);
        Self { tiers, budget }
    }

    pub fn tiers(&self) -> &[Duration] {
        &self.tiers
    }

    pub fn budget(&self) -> u32 {
        self.budget
    }

    /// Tier and delay for the redelivery after failed attempt `attempt`, or
    /// `None` once the budget is spent.
    pub fn next(&self, attempt: u32) -> Option<(usize, Duration)> {
        if attempt >= self.budget {
            return None;
        }
        let tier = (attempt as usize).min(self.tiers.len() - 1);
        Some((tier, self.tiers[tier]))
    }
}

fn parse_tiers(raw: &str) -> Vec<Duration> {
    raw.split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .filter_map(|s| s.parse::<u64>().ok())
        .map(Duration::from_secs)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_tiers_walk_then_dead_letter() {
        let policy = RedeliveryPolicy::default();
        assert_eq!(policy.next(0), Some((0, Duration::from_secs(1))));
        assert_eq!(policy.next(3), Some((3, Duration::from_secs(30))));
        assert_eq!(policy.next(4), Some((4, Duration::from_secs(60))));
        assert_eq!(policy.next(5), None);
    }

    #[test]
    fn test_budget_longer_than_tiers_stays_on_last_tier() {
        let policy = RedeliveryPolicy::new(vec![Duration::from_secs(2), Duration::from_secs(9)], 4);
        assert_eq!(policy.next(1), Some((1, Duration::from_secs(9))));
        assert_eq!(policy.next(3), Some((1, Duration::from_secs(9))));
        assert_eq!(policy.next(4), None);
    }

    #[test]
    fn test_zero_budget_dead_letters_immediately() {
        let policy = RedeliveryPolicy::new(vec![], 0);
        assert_eq!(policy.next(0), None);
        assert_eq!(policy.tiers().len(), 5);
    }

    #[test]
    #[serial_test::serial]
    fn test_from_env() {
        std::env::set_var("REDELIVERY_TIERS_SECS", "3, 7,x,20");
        std::env::set_var("REDELIVERY_BUDGET", "2");

        let policy = RedeliveryPolicy::from_env();
        assert_eq!(
            policy.tiers(),
            &[Duration::from_secs(3), Duration::from_secs(7), Duration::from_secs(20)]
        );
        assert_eq!(policy.budget(), 2);

        std::env::remove_var("REDELIVERY_TIERS_SECS");
        std::env::remove_var("REDELIVERY_BUDGET");
    }
}
