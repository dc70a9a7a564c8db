//! Per-provider rate limiting
//!
//! Each provider id gets its own `governor` limiter in a concurrent map,
//! behind its own lock so concurrent sagas for different providers never
//! contend. Acquisition never blocks: callers decide whether to wait.

mod limiter;

pub use limiter::KeyLimiter;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Requests per minute used for keys that were never configured
pub const DEFAULT_REQUESTS_PER_MINUTE: u32 = 60;

/// Snapshot of a key's limiter
#[derive(Debug, Clone, PartialEq)]
pub struct RateLimitStatus {
    /// Whole permits available now
    pub remaining: u32,
    /// When every permit will be available again
    pub reset_time: DateTime<Utc>,
    /// True if a single permit cannot be acquired right now
    pub is_limited: bool,
}

#[derive(Debug, Clone, Copy)]
struct LimitSettings {
    requests_per_minute: u32,
    min_interval: Duration,
}

/// Keyed rate limiter
pub struct RateLimiter {
    limiters: DashMap<String, Arc<Mutex<KeyLimiter>>>,
    settings: DashMap<String, LimitSettings>,
    default_requests_per_minute: u32,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::with_default_rate(DEFAULT_REQUESTS_PER_MINUTE)
    }

    pub fn with_default_rate(requests_per_minute: u32) -> Self {
        Self {
            limiters: DashMap::new(),
            settings: DashMap::new(),
            default_requests_per_minute: requests_per_minute.max(1),
        }
    }

    /// Sets the rate for a key, replacing its limiter if the rate changed
    pub fn configure(&self, key: &str, requests_per_minute: u32, min_interval: Duration) {
        let settings = LimitSettings {
            requests_per_minute: requests_per_minute.max(1),
            min_interval,
        };

        let changed = self
            .settings
            .insert(key.to_string(), settings)
            .map(|old| {
                old.requests_per_minute != settings.requests_per_minute
                    || old.min_interval != settings.min_interval
            })
            .unwrap_or(true);

        if changed {
            self.limiters.remove(key);
        }
    }

    fn limiter(&self, key: &str) -> Arc<Mutex<KeyLimiter>> {
        self.limiters
            .entry(key.to_string())
            .or_insert_with(|| {
                let settings = self.settings.get(key).map(|s| *s).unwrap_or(LimitSettings {
                    requests_per_minute: self.default_requests_per_minute,
                    min_interval: Duration::ZERO,
                });
                Arc::new(Mutex::new(KeyLimiter::per_minute(
                    settings.requests_per_minute,
                    settings.min_interval,
                )))
            })
            .clone()
    }

    fn lock(limiter: &Mutex<KeyLimiter>) -> MutexGuard<'_, KeyLimiter> {
        // A panic while holding the lock leaves at worst a stale snapshot
        limiter.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Tries to consume one permit without waiting
    pub fn try_acquire(&self, key: &str) -> bool {
        self.try_acquire_many(key, 1)
    }

    /// Tries to consume `permits` permits at once without waiting
    pub fn try_acquire_many(&self, key: &str, permits: u32) -> bool {
        let limiter = self.limiter(key);
        let acquired = Self::lock(&limiter).try_acquire(permits, Instant::now());
        if !acquired {
            tracing::debug!(provider = key, permits, "Rate limit permit denied");
        }
        acquired
    }

    /// Current status of a key's limiter
    pub fn status(&self, key: &str) -> RateLimitStatus {
        let limiter = self.limiter(key);
        let limiter = Self::lock(&limiter);
        let now = Instant::now();

        let remaining = limiter.remaining(now);
        let until_full = limiter.time_until_full(now);
        let is_limited = limiter.time_until_next_permit(now).is_some();

        RateLimitStatus {
            remaining,
            reset_time: Utc::now()
                + chrono::Duration::from_std(until_full).unwrap_or_else(|_| chrono::Duration::zero()),
            is_limited,
        }
    }

    /// Replaces a key's limiter with a fresh one
    pub fn reset(&self, key: &str) {
        if let Some(limiter) = self.limiters.get(key) {
            Self::lock(&limiter).reset();
        }
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unconfigured_key_uses_default_rate() {
        let limiter = RateLimiter::with_default_rate(2);
        assert!(limiter.try_acquire("a"));
        assert!(limiter.try_acquire("a"));
        assert!(!limiter.try_acquire("a"));
    }

    #[test]
    fn test_keys_are_independent() {
        let limiter = RateLimiter::new();
        limiter.configure("a", 1, Duration::ZERO);
        limiter.configure("b", 1, Duration::ZERO);

        assert!(limiter.try_acquire("a"));
        assert!(!limiter.try_acquire("a"));
        assert!(limiter.try_acquire("b"));
    }

    #[test]
    fn test_bulk_acquire() {
        let limiter = RateLimiter::new();
        limiter.configure("a", 10, Duration::ZERO);

        assert!(limiter.try_acquire_many("a", 7));
        assert!(!limiter.try_acquire_many("a", 4));
        assert!(limiter.try_acquire_many("a", 3));
    }

    #[test]
    fn test_status_reports_limit() {
        let limiter = RateLimiter::new();
        limiter.configure("a", 2, Duration::ZERO);

        let status = limiter.status("a");
        assert_eq!(status.remaining, 2);
        assert!(!status.is_limited);

        assert!(limiter.try_acquire_many("a", 2));
        let status = limiter.status("a");
        assert_eq!(status.remaining, 0);
        assert!(status.is_limited);
        assert!(status.reset_time > Utc::now());
    }

    #[test]
    fn test_reset_refills_key() {
        let limiter = RateLimiter::new();
        limiter.configure("a", 1, Duration::ZERO);

        assert!(limiter.try_acquire("a"));
        assert!(!limiter.try_acquire("a"));

        limiter.reset("a");
        assert!(limiter.try_acquire("a"));
    }

    #[test]
    fn test_reconfigure_replaces_limiter() {
        let limiter = RateLimiter::new();
        limiter.configure("a", 1, Duration::ZERO);
        assert!(limiter.try_acquire("a"));
        assert!(!limiter.try_acquire("a"));

        // Same settings keep the drained limiter
        limiter.configure("a", 1, Duration::ZERO);
        assert!(!limiter.try_acquire("a"));

        limiter.configure("a", 5, Duration::ZERO);
        assert!(limiter.try_acquire("a"));
    }

    #[test]
    fn test_concurrent_acquisition_never_oversubscribes() {
        let limiter = Arc::new(RateLimiter::new());
        limiter.configure("a", 50, Duration::ZERO);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let limiter = limiter.clone();
                std::thread::spawn(move || (0..20).filter(|_| limiter.try_acquire("a")).count())
            })
            .collect();

        let granted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        // A permit may replenish while the threads run
        assert!((50..=51).contains(&granted), "granted {}", granted);
    }

    #[test]
    fn test_min_delay_limits_status() {
        let limiter = RateLimiter::new();
        limiter.configure("a", 100, Duration::from_secs(30));

        assert!(limiter.try_acquire("a"));
        assert!(!limiter.try_acquire("a"));

        let status = limiter.status("a");
        assert_eq!(status.remaining, 99);
        assert!(status.is_limited);
    }

    #[test]
    fn test_bulk_request_over_capacity_is_denied() {
        let limiter = RateLimiter::new();
        limiter.configure("a", 3, Duration::ZERO);

        assert!(!limiter.try_acquire_many("a", 4));
        assert_eq!(limiter.status("a").remaining, 3);
    }
}
