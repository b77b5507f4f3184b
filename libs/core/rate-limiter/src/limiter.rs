use crate::category::RateLimitCategory;
use core_config::RateLimitConfig;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, trace};

/// Per-key window state.
#[derive(Debug, Clone, Copy)]
struct Bucket {
    count: u32,
    reset_at: Instant,
}

/// Outcome of a rate limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    /// Whether the caller may proceed.
    pub allowed: bool,
    /// Limit the key was checked against.
    pub limit: u32,
    /// Requests left in the current window.
    pub remaining: u32,
    /// When the current window ends.
    pub reset_at: Instant,
}

impl RateLimitDecision {
    /// Time until the window resets (zero once it has passed).
    pub fn reset_after(&self) -> Duration {
        self.reset_at.saturating_duration_since(Instant::now())
    }

    /// How long a denied caller should wait; `None` when allowed.
    pub fn retry_after(&self) -> Option<Duration> {
        (!self.allowed).then(|| self.reset_after())
    }
}

/// Fixed-window rate limiter keyed by arbitrary strings.
///
/// The first request for a key, or the first after its window has elapsed,
/// opens a fresh window of `config.window`. Within a window up to `limit`
/// requests are allowed; the rest are denied until `reset_at`.
///
/// The counter resets wholesale at the boundary, so a burst straddling two
/// windows can see up to `2 * limit` allowed requests.
pub struct RateLimiter {
    config: RateLimitConfig,
    buckets: Mutex<HashMap<String, Bucket>>,
}

impl RateLimiter {
    /// Create a limiter with the given window and category limits.
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// Create a limiter with a custom window and default category limits.
    pub fn with_window(window: Duration) -> Self {
        Self::new(RateLimitConfig {
            window,
            ..Default::default()
        })
    }

    /// Window length.
    pub fn window(&self) -> Duration {
        self.config.window
    }

    /// Configuration the limiter was built with.
    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Count a request for `key` and decide whether it is allowed.
    pub fn check(&self, key: &str, limit: u32) -> RateLimitDecision {
        self.check_at(key, limit, Instant::now())
    }

    /// [`check`](Self::check) against an explicit clock reading.
    pub fn check_at(&self, key: &str, limit: u32, now: Instant) -> RateLimitDecision {
        let mut buckets = self.buckets();

        if let Some(bucket) = buckets.get_mut(key) {
            if now < bucket.reset_at {
                if bucket.count < limit {
                    bucket.count += 1;
                    trace!(key, count = bucket.count, limit, "Rate limit check allowed");
                    return RateLimitDecision {
                        allowed: true,
                        limit,
                        remaining: limit - bucket.count,
                        reset_at: bucket.reset_at,
                    };
                }

                debug!(key, limit, "Rate limit exceeded");
                return RateLimitDecision {
                    allowed: false,
                    limit,
                    remaining: 0,
                    reset_at: bucket.reset_at,
                };
            }
        }

        let reset_at = now + self.config.window;
        buckets.insert(key.to_string(), Bucket { count: 1, reset_at });
        trace!(key, limit, "Rate limit window opened");

        RateLimitDecision {
            allowed: true,
            limit,
            remaining: limit.saturating_sub(1),
            reset_at,
        }
    }

    /// Check `subject` against the configured limit for `category`.
    pub fn check_category(&self, category: RateLimitCategory, subject: &str) -> RateLimitDecision {
        self.check(&category.key(subject), category.limit(&self.config))
    }

    /// Report the window for `key` without counting a request.
    pub fn peek(&self, key: &str, limit: u32) -> RateLimitDecision {
        self.peek_at(key, limit, Instant::now())
    }

    /// [`peek`](Self::peek) against an explicit clock reading.
    pub fn peek_at(&self, key: &str, limit: u32, now: Instant) -> RateLimitDecision {
        match self.buckets().get(key) {
            Some(bucket) if now < bucket.reset_at => RateLimitDecision {
                allowed: bucket.count < limit,
                limit,
                remaining: limit.saturating_sub(bucket.count),
                reset_at: bucket.reset_at,
            },
            _ => RateLimitDecision {
                allowed: true,
                limit,
                remaining: limit,
                reset_at: now + self.config.window,
            },
        }
    }

    /// Forget the window for `key`.
    pub fn reset(&self, key: &str) {
        self.buckets().remove(key);
    }

    /// Drop buckets whose window has elapsed. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut buckets = self.buckets();
        let before = buckets.len();
        buckets.retain(|_, bucket| now < bucket.reset_at);
        let purged = before - buckets.len();
        if purged > 0 {
            debug!(purged, "Purged expired rate limit buckets");
        }
        purged
    }

    /// Number of tracked keys.
    pub fn len(&self) -> usize {
        self.buckets().len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets().is_empty()
    }

    fn buckets(&self) -> MutexGuard<'_, HashMap<String, Bucket>> {
        self.buckets.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(RateLimitConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limiter_denies_after_limit() {
        let limiter = RateLimiter::with_window(Duration::from_millis(1000));
        let now = Instant::now();

        let allowed: Vec<bool> = (0..3)
            .map(|_| limiter.check_at("client", 2, now).allowed)
            .collect();
        assert_eq!(allowed, vec![true, true, false]);
    }

    #[test]
    fn test_rate_limiter_window_resets() {
        let limiter = RateLimiter::with_window(Duration::from_millis(1000));
        let start = Instant::now();

        for _ in 0..3 {
            limiter.check_at("client", 2, start);
        }

        let after = limiter.check_at("client", 2, start + Duration::from_millis(1000));
        assert!(after.allowed);
        assert_eq!(after.remaining, 1);
        assert_eq!(after.reset_at, start + Duration::from_millis(2000));
    }

    #[test]
    fn test_rate_limiter_remaining_counts_down() {
        let limiter = RateLimiter::with_window(Duration::from_secs(60));
        let now = Instant::now();

        let remaining: Vec<u32> = (0..4)
            .map(|_| limiter.check_at("k", 3, now).remaining)
            .collect();
        assert_eq!(remaining, vec![2, 1, 0, 0]);
    }

    #[test]
    fn test_denied_keeps_existing_reset() {
        let limiter = RateLimiter::with_window(Duration::from_secs(10));
        let start = Instant::now();

        let first = limiter.check_at("k", 1, start);
        let denied = limiter.check_at("k", 1, start + Duration::from_secs(5));
        assert!(!denied.allowed);
        assert_eq!(denied.reset_at, first.reset_at);
    }

    #[test]
    fn test_keys_are_independent() {
        let limiter = RateLimiter::with_window(Duration::from_secs(60));
        let now = Instant::now();

        assert!(limiter.check_at("a", 1, now).allowed);
        assert!(!limiter.check_at("a", 1, now).allowed);
        assert!(limiter.check_at("b", 1, now).allowed);
    }

    #[test]
    fn test_boundary_burst_allows_double_limit() {
        let limiter = RateLimiter::with_window(Duration::from_millis(1000));
        let start = Instant::now();

        let late = start + Duration::from_millis(999);
        let early_next = start + Duration::from_millis(1000);

        assert!(limiter.check_at("k", 2, start).allowed);
        assert!(limiter.check_at("k", 2, late).allowed);
        assert!(limiter.check_at("k", 2, early_next).allowed);
        assert!(limiter.check_at("k", 2, early_next).allowed);
        assert!(!limiter.check_at("k", 2, early_next).allowed);
    }

    #[test]
    fn test_peek_does_not_consume() {
        let limiter = RateLimiter::with_window(Duration::from_secs(60));
        let now = Instant::now();

        let fresh = limiter.peek_at("k", 2, now);
        assert!(fresh.allowed);
        assert_eq!(fresh.remaining, 2);
        assert!(limiter.is_empty());

        limiter.check_at("k", 2, now);
        limiter.check_at("k", 2, now);
        let spent = limiter.peek_at("k", 2, now);
        assert!(!spent.allowed);
        assert_eq!(spent.remaining, 0);
    }

    #[test]
    fn test_check_category_uses_configured_limit() {
        let limiter = RateLimiter::new(RateLimitConfig {
            archive: 1,
            ..Default::default()
        });

        assert!(limiter.check_category(RateLimitCategory::Archive, "user-1").allowed);
        assert!(!limiter.check_category(RateLimitCategory::Archive, "user-1").allowed);
        assert!(limiter.check_category(RateLimitCategory::Api, "user-1").allowed);
    }

    #[test]
    fn test_reset_forgets_key() {
        let limiter = RateLimiter::with_window(Duration::from_secs(60));
        limiter.check("k", 1);
        assert!(!limiter.check("k", 1).allowed);

        limiter.reset("k");
        assert!(limiter.check("k", 1).allowed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fourth_call_after_window_is_allowed() {
        let limiter = RateLimiter::with_window(Duration::from_millis(1000));

        let allowed: Vec<bool> = (0..3).map(|_| limiter.check("key", 2).allowed).collect();
        assert_eq!(allowed, vec![true, true, false]);

        tokio::time::advance(Duration::from_millis(1001)).await;

        let fourth = limiter.check("key", 2);
        assert!(fourth.allowed);
        assert_eq!(fourth.remaining, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge_expired_removes_stale_buckets() {
        let limiter = RateLimiter::with_window(Duration::from_millis(100));
        limiter.check("old", 5);

        tokio::time::advance(Duration::from_millis(150)).await;
        limiter.check("new", 5);

        assert_eq!(limiter.purge_expired(), 1);
        assert_eq!(limiter.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_after_only_when_denied() {
        let limiter = RateLimiter::with_window(Duration::from_secs(30));

        let allowed = limiter.check("k", 1);
        assert_eq!(allowed.retry_after(), None);

        tokio::time::advance(Duration::from_secs(10)).await;
        let denied = limiter.check("k", 1);
        assert_eq!(denied.retry_after(), Some(Duration::from_secs(20)));
    }
}
