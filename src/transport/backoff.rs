//! Exponential backoff reconnect policy.
//!
//! The policy counts consecutive failures. Each failure below the cap yields
//! exactly one retry delay of `base_delay * 2^(attempts - 1)`; once the cap is
//! reached the policy gives up until [`ReconnectPolicy::reset`] is called.
//! No jitter is applied.

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

// ============================================================================
// Constants
// ============================================================================

/// Default maximum number of automatic reconnect attempts.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Default delay before the first automatic reconnect.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);

/// Largest exponent applied to the base delay. Keeps the shift in range.
const MAX_EXPONENT: u32 = 31;

// ============================================================================
// ReconnectPolicy
// ============================================================================

/// Bounded exponential backoff state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Attempt cap.
    max_attempts: u32,
    /// Delay of the first retry.
    base_delay: Duration,
    /// Retries scheduled since the last successful connection.
    attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS, DEFAULT_BASE_DELAY)
    }
}

impl ReconnectPolicy {
    /// Creates a policy with zero attempts used.
    #[inline]
    #[must_use]
    pub const fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            attempts: 0,
        }
    }

    /// Records a failure and returns the delay before the next retry.
    ///
    /// Returns `None` once the attempt cap is reached (give up).
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.attempts >= self.max_attempts {
            return None;
        }

        self.attempts += 1;
        Some(self.delay_for(self.attempts))
    }

    /// Delay scheduled for the given 1-based attempt number.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(MAX_EXPONENT);
        self.base_delay.saturating_mul(1u32 << exponent)
    }

    /// Clears the attempt counter after a successful connection.
    #[inline]
    pub fn reset(&mut self) {
        self.attempts = 0;
    }

    /// Marks the policy as used up so no automatic retry fires.
    #[inline]
    pub fn exhaust(&mut self) {
        self.attempts = self.max_attempts;
    }

    /// Returns `true` if no further retry will be scheduled.
    #[inline]
    #[must_use]
    pub const fn is_exhausted(&self) -> bool {
        self.attempts >= self.max_attempts
    }

    /// Retries scheduled since the last reset.
    #[inline]
    #[must_use]
    pub const fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Attempt cap.
    #[inline]
    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use proptest::prelude::*;

    #[test]
    fn test_default_schedule() {
        let mut policy = ReconnectPolicy::default();

        let delays: Vec<_> = std::iter::from_fn(|| policy.next_delay()).collect();
        assert_eq!(
            delays,
            vec![
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(4),
                Duration::from_secs(8),
                Duration::from_secs(16),
            ]
        );
        assert!(policy.is_exhausted());
        assert_eq!(policy.next_delay(), None);
    }

    #[test]
    fn test_reset_rearms() {
        let mut policy = ReconnectPolicy::new(2, Duration::from_millis(100));
        policy.next_delay();
        policy.next_delay();
        assert!(policy.next_delay().is_none());

        policy.reset();
        assert_eq!(policy.attempts(), 0);
        assert_eq!(policy.next_delay(), Some(Duration::from_millis(100)));
    }

    #[test]
    fn test_exhaust_blocks_retries() {
        let mut policy = ReconnectPolicy::default();
        policy.exhaust();
        assert!(policy.is_exhausted());
        assert_eq!(policy.next_delay(), None);
    }

    #[test]
    fn test_zero_max_never_retries() {
        let mut policy = ReconnectPolicy::new(0, Duration::from_secs(1));
        assert_eq!(policy.next_delay(), None);
    }

    #[test]
    fn test_large_attempt_saturates() {
        let policy = ReconnectPolicy::new(u32::MAX, Duration::from_secs(u64::MAX / 2));
        assert_eq!(policy.delay_for(200), Duration::MAX);
    }

    proptest! {
        #[test]
        fn prop_delay_doubles(base_ms in 1u64..10_000, max in 1u32..12) {
            let mut policy = ReconnectPolicy::new(max, Duration::from_millis(base_ms));
            for attempt in 1..=max {
                let delay = policy.next_delay().expect("below cap");
                prop_assert_eq!(delay, Duration::from_millis(base_ms << (attempt - 1)));
                prop_assert_eq!(policy.attempts(), attempt);
            }
            prop_assert!(policy.next_delay().is_none());
            prop_assert_eq!(policy.attempts(), max);
        }
    }
}
