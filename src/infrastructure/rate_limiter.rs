//! Rate Limiter
//!
//! Token bucket rate limiting of phone-home reports per source IP.

use dashmap::DashMap;
use std::net::IpAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;
use std::time::{Duration, Instant};

/// Rate limiter configuration.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Reports allowed per window
    pub max_requests: u64,
    /// Time window for rate limiting
    pub window: Duration,
    /// Token bucket capacity
    pub burst_size: u64,
}

impl RateLimitConfig {
    /// Budget expressed as reports per minute.
    pub fn per_minute(max_requests: u64, burst_size: u64) -> Self {
        Self {
            max_requests,
            window: Duration::from_secs(60),
            burst_size,
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self::per_minute(60, 10)
    }
}

/// Per-source bucket state.
struct Bucket {
    tokens: AtomicU64,
    last_refill_ms: AtomicU64,
    /// Last time the source was seen, allowed or not
    last_access_ms: AtomicU64,
}

impl Bucket {
    fn new(burst_size: u64) -> Self {
        let now = now_ms();
        Self {
            tokens: AtomicU64::new(burst_size),
            last_refill_ms: AtomicU64::new(now),
            last_access_ms: AtomicU64::new(now),
        }
    }
}

/// Milliseconds on a process-wide monotonic clock.
fn now_ms() -> u64 {
    static START: OnceLock<Instant> = OnceLock::new();
    START.get_or_init(Instant::now).elapsed().as_millis() as u64
}

/// Token bucket rate limiter keyed by source IP.
pub struct RateLimiter {
    config: RateLimitConfig,
    buckets: DashMap<IpAddr, Bucket>,
    /// Tokens added per millisecond
    refill_rate_per_ms: f64,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        let window_ms = config.window.as_millis().max(1) as f64;
        let refill_rate_per_ms = config.max_requests as f64 / window_ms;
        Self {
            config,
            buckets: DashMap::new(),
            refill_rate_per_ms,
        }
    }

    /// Check whether a report from this IP is allowed, consuming a token if so.
    pub fn check(&self, ip: IpAddr) -> bool {
        let bucket = self
            .buckets
            .entry(ip)
            .or_insert_with(|| Bucket::new(self.config.burst_size));

        let now = now_ms();
        bucket.last_access_ms.store(now, Ordering::Relaxed);
        let elapsed_ms = now.saturating_sub(bucket.last_refill_ms.load(Ordering::Relaxed));
        let tokens_to_add = (elapsed_ms as f64 * self.refill_rate_per_ms) as u64;

        if tokens_to_add > 0 {
            let current = bucket.tokens.load(Ordering::Relaxed);
            let refilled = (current + tokens_to_add).min(self.config.burst_size);
            bucket.tokens.store(refilled, Ordering::Relaxed);
            bucket.last_refill_ms.store(now, Ordering::Relaxed);
        }

        let mut current = bucket.tokens.load(Ordering::Relaxed);
        loop {
            if current == 0 {
                return false;
            }
            match bucket.tokens.compare_exchange_weak(
                current,
                current - 1,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return true,
                Err(c) => current = c,
            }
        }
    }

    /// Remaining tokens for a source.
    pub fn remaining(&self, ip: IpAddr) -> u64 {
        self.buckets
            .get(&ip)
            .map(|b| b.tokens.load(Ordering::Relaxed))
            .unwrap_or(self.config.burst_size)
    }

    /// Number of tracked sources.
    pub fn tracked(&self) -> usize {
        self.buckets.len()
    }

    /// Drop buckets for sources not seen within `max_age`.
    pub fn cleanup(&self, max_age: Duration) -> usize {
        let now = now_ms();
        let max_age_ms = max_age.as_millis() as u64;
        let before = self.buckets.len();
        self.buckets.retain(|_, b| {
            now.saturating_sub(b.last_access_ms.load(Ordering::Relaxed)) < max_age_ms
        });
        before - self.buckets.len()
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(RateLimitConfig::default())
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn ip(last: u8) -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(203, 0, 113, last))
    }

    #[test]
    fn test_allows_up_to_burst() {
        let limiter = RateLimiter::new(RateLimitConfig::per_minute(1, 3));

        assert!(limiter.check(ip(1)));
        assert!(limiter.check(ip(1)));
        assert!(limiter.check(ip(1)));
        assert!(!limiter.check(ip(1)));
    }

    #[test]
    fn test_sources_are_independent() {
        let limiter = RateLimiter::new(RateLimitConfig::per_minute(1, 1));

        assert!(limiter.check(ip(1)));
        assert!(!limiter.check(ip(1)));
        assert!(limiter.check(ip(2)));
        assert_eq!(limiter.tracked(), 2);
    }

    #[test]
    fn test_remaining_for_unknown_source_is_full_burst() {
        let limiter = RateLimiter::new(RateLimitConfig::per_minute(60, 5));
        assert_eq!(limiter.remaining(ip(9)), 5);

        limiter.check(ip(9));
        assert_eq!(limiter.remaining(ip(9)), 4);
    }

    #[test]
    fn test_refill_after_window() {
        let limiter = RateLimiter::new(RateLimitConfig {
            max_requests: 1000,
            window: Duration::from_secs(10),
            burst_size: 1,
        });

        assert!(limiter.check(ip(1)));
        assert!(!limiter.check(ip(1)));

        std::thread::sleep(Duration::from_millis(50));
        assert!(limiter.check(ip(1)));
    }

    #[test]
    fn test_cleanup_removes_stale_buckets() {
        let limiter = RateLimiter::default();
        limiter.check(ip(1));
        std::thread::sleep(Duration::from_millis(10));

        assert_eq!(limiter.cleanup(Duration::from_millis(1)), 1);
        assert_eq!(limiter.tracked(), 0);
    }

    #[test]
    fn test_cleanup_keeps_exhausted_bucket_still_in_use() {
        let limiter = RateLimiter::new(RateLimitConfig::per_minute(1, 1));
        assert!(limiter.check(ip(1)));
        std::thread::sleep(Duration::from_millis(200));

        // No whole token has refilled, but the source is still active.
        assert!(!limiter.check(ip(1)));
        assert_eq!(limiter.cleanup(Duration::from_millis(150)), 0);
        assert_eq!(limiter.remaining(ip(1)), 0);
        assert!(!limiter.check(ip(1)));
    }
}
