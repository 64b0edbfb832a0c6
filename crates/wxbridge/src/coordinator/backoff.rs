use std::time::Duration;

/// First retry delay after a cycle in which every endpoint failed.
pub const DEFAULT_INITIAL_DELAY: Duration = Duration::from_secs(60);

/// Exponential backoff between failed refresh cycles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Delay after the first failed cycle (doubles each further failure)
    pub initial_delay: Duration,
    /// Upper bound; the coordinator passes its refresh interval
    pub max_delay: Duration,
}

impl BackoffPolicy {
    pub fn new(initial_delay: Duration, max_delay: Duration) -> Self {
        Self {
            initial_delay: initial_delay.min(max_delay),
            max_delay,
        }
    }

    /// Backoff capped at the given refresh interval.
    pub fn for_interval(interval: Duration) -> Self {
        Self::new(DEFAULT_INITIAL_DELAY, interval)
    }

    /// Delay after `failures` consecutive failed cycles (1-based).
    pub fn delay_for(&self, failures: u32) -> Duration {
        let exponent = failures.saturating_sub(1).min(31);
        let factor = 2u64.saturating_pow(exponent);
        let delay_ms = (self.initial_delay.as_millis() as u64).saturating_mul(factor);
        let capped = delay_ms.min(self.max_delay.as_millis() as u64);
        Duration::from_millis(capped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_doubles() {
        let policy = BackoffPolicy::for_interval(Duration::from_secs(900));
        assert_eq!(policy.delay_for(1), Duration::from_secs(60));
        assert_eq!(policy.delay_for(2), Duration::from_secs(120));
        assert_eq!(policy.delay_for(3), Duration::from_secs(240));
        assert_eq!(policy.delay_for(4), Duration::from_secs(480));
    }

    #[test]
    fn test_delay_capped_at_interval() {
        let policy = BackoffPolicy::for_interval(Duration::from_secs(900));
        assert_eq!(policy.delay_for(5), Duration::from_secs(900));
        assert_eq!(policy.delay_for(u32::MAX), Duration::from_secs(900));
    }

    #[test]
    fn test_initial_delay_never_exceeds_cap() {
        let policy = BackoffPolicy::new(Duration::from_secs(600), Duration::from_secs(300));
        assert_eq!(policy.delay_for(1), Duration::from_secs(300));
    }

    #[test]
    fn test_zero_failures_uses_initial_delay() {
        let policy = BackoffPolicy::for_interval(Duration::from_secs(900));
        assert_eq!(policy.delay_for(0), Duration::from_secs(60));
    }
}
