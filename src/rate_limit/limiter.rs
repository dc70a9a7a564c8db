use governor::clock::DefaultClock;
use governor::middleware::StateInformationMiddleware;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter as GovernorRateLimiter};
use std::num::NonZeroU32;
use std::time::{Duration, Instant};

type DirectLimiter =
    GovernorRateLimiter<NotKeyed, InMemoryState, DefaultClock, StateInformationMiddleware>;

/// One key's limiter: a GCRA quota plus a minimum gap between grants
pub struct KeyLimiter {
    quota: Quota,
    min_interval: Duration,
    limiter: DirectLimiter,
    last_acquired: Option<Instant>,
    /// Burst capacity left after the last grant, and when it was taken
    last_snapshot: Option<(u32, Instant)>,
}

impl KeyLimiter {
    /// Creates a limiter allowing `requests_per_minute` with a burst of the same size
    pub fn per_minute(requests_per_minute: u32, min_interval: Duration) -> Self {
        let rate = NonZeroU32::new(requests_per_minute).unwrap_or(NonZeroU32::MIN);
        let quota = Quota::per_minute(rate);

        Self {
            quota,
            min_interval,
            limiter: Self::build(quota),
            last_acquired: None,
            last_snapshot: None,
        }
    }

    fn build(quota: Quota) -> DirectLimiter {
        GovernorRateLimiter::direct(quota).with_middleware::<StateInformationMiddleware>()
    }

    pub fn capacity(&self) -> u32 {
        self.quota.burst_size().get()
    }

    /// Takes `permits` permits at once, or none
    pub fn try_acquire(&mut self, permits: u32, now: Instant) -> bool {
        let Some(permits) = NonZeroU32::new(permits) else {
            return true;
        };

        if self.min_interval_pending(now).is_some() {
            return false;
        }

        let outcome = if permits.get() == 1 {
            self.limiter.check()
        } else {
            match self.limiter.check_n(permits) {
                Ok(outcome) => outcome,
                // More than the burst size can never be granted
                Err(_) => return false,
            }
        };

        match outcome {
            Ok(snapshot) => {
                self.last_acquired = Some(now);
                self.last_snapshot = Some((snapshot.remaining_burst_capacity(), now));
                true
            }
            Err(_) => false,
        }
    }

    /// Whole permits available now
    pub fn remaining(&self, now: Instant) -> u32 {
        let capacity = self.capacity();
        let Some((left, at)) = self.last_snapshot else {
            return capacity;
        };

        let interval = self.quota.replenish_interval().as_nanos().max(1);
        let refilled = now.saturating_duration_since(at).as_nanos() / interval;
        let refilled = u32::try_from(refilled).unwrap_or(u32::MAX);
        left.saturating_add(refilled).min(capacity)
    }

    /// Time until every permit is available again
    pub fn time_until_full(&self, now: Instant) -> Duration {
        let missing = self.capacity() - self.remaining(now);
        self.quota.replenish_interval() * missing
    }

    /// Time until one permit can be taken, or `None` if one can be taken now
    pub fn time_until_next_permit(&self, now: Instant) -> Option<Duration> {
        if let Some(wait) = self.min_interval_pending(now) {
            return Some(wait);
        }
        if self.remaining(now) == 0 {
            return Some(self.quota.replenish_interval());
        }
        None
    }

    fn min_interval_pending(&self, now: Instant) -> Option<Duration> {
        let last = self.last_acquired?;
        let wait = self
            .min_interval
            .saturating_sub(now.saturating_duration_since(last));
        (!wait.is_zero()).then_some(wait)
    }

    /// Starts over with a fresh limiter
    pub fn reset(&mut self) {
        self.limiter = Self::build(self.quota);
        self.last_acquired = None;
        self.last_snapshot = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_limiter_is_full() {
        let limiter = KeyLimiter::per_minute(60, Duration::ZERO);
        assert_eq!(limiter.capacity(), 60);
        assert_eq!(limiter.remaining(Instant::now()), 60);
        assert!(limiter.time_until_next_permit(Instant::now()).is_none());
    }

    #[test]
    fn test_acquire_until_empty() {
        let mut limiter = KeyLimiter::per_minute(3, Duration::ZERO);
        let now = Instant::now();

        assert!(limiter.try_acquire(1, now));
        assert_eq!(limiter.remaining(now), 2);
        assert!(limiter.try_acquire(1, now));
        assert!(limiter.try_acquire(1, now));
        assert!(!limiter.try_acquire(1, now));
        assert_eq!(limiter.remaining(now), 0);
        assert!(limiter.time_until_next_permit(now).is_some());
        assert_eq!(limiter.time_until_full(now), Duration::from_secs(60));
    }

    #[test]
    fn test_bulk_acquire_is_all_or_nothing() {
        let mut limiter = KeyLimiter::per_minute(5, Duration::ZERO);
        let now = Instant::now();

        assert!(!limiter.try_acquire(6, now));
        assert!(limiter.try_acquire(4, now));
        assert!(!limiter.try_acquire(2, now));
        assert!(limiter.try_acquire(1, now));
    }

    #[test]
    fn test_zero_permits_always_granted() {
        let mut limiter = KeyLimiter::per_minute(1, Duration::ZERO);
        let now = Instant::now();
        assert!(limiter.try_acquire(1, now));
        assert!(limiter.try_acquire(0, now));
    }

    #[test]
    fn test_min_interval_enforced() {
        let mut limiter = KeyLimiter::per_minute(100, Duration::from_millis(200));
        let start = Instant::now();

        assert!(limiter.try_acquire(1, start));
        assert!(!limiter.try_acquire(1, start + Duration::from_millis(50)));
        assert!(limiter
            .time_until_next_permit(start + Duration::from_millis(50))
            .is_some());
        assert!(limiter.try_acquire(1, start + Duration::from_millis(250)));
    }

    #[test]
    fn test_zero_rate_is_clamped() {
        let limiter = KeyLimiter::per_minute(0, Duration::ZERO);
        assert_eq!(limiter.capacity(), 1);
    }

    #[test]
    fn test_reset() {
        let mut limiter = KeyLimiter::per_minute(2, Duration::from_secs(10));
        let now = Instant::now();
        assert!(limiter.try_acquire(2, now));
        assert!(!limiter.try_acquire(1, now));

        limiter.reset();
        assert_eq!(limiter.remaining(now), 2);
        assert!(limiter.try_acquire(1, now));
    }
}
