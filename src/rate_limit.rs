//! Per-client admission control for the ingestion endpoint
//!
//! Each client identity gets a token bucket, created lazily at full burst.
//! Decisions are non-blocking; the identity map is swept of idle buckets
//! once it grows past a cap so hostile traffic cannot grow it unboundedly.

use axum::http::HeaderMap;
use dashmap::DashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// Identities tracked before an eviction sweep runs.
const MAX_TRACKED_IDENTITIES: usize = 10_000;

/// Buckets idle longer than this are dropped by the sweep.
const IDLE_BUCKET_TTL: Duration = Duration::from_secs(600);

struct TokenBucket {
    tokens: f64,
    last_refill: Instant,
}

/// Token-bucket rate limiter keyed by client identity.
pub struct IpRateLimiter {
    buckets: DashMap<String, TokenBucket>,
    tokens_per_second: f64,
    max_tokens: f64,
    max_tracked: usize,
    idle_ttl: Duration,
}

impl IpRateLimiter {
    pub fn new(rate: f64, burst: f64) -> Self {
        Self {
            buckets: DashMap::new(),
            tokens_per_second: rate,
            max_tokens: burst,
            max_tracked: MAX_TRACKED_IDENTITIES,
            idle_ttl: IDLE_BUCKET_TTL,
        }
    }

    #[cfg(test)]
    fn with_eviction(rate: f64, burst: f64, max_tracked: usize, idle_ttl: Duration) -> Self {
        Self {
            buckets: DashMap::new(),
            tokens_per_second: rate,
            max_tokens: burst,
            max_tracked,
            idle_ttl,
        }
    }

    /// Check whether a request from `identity` is admitted, consuming one
    /// token if so. Never blocks.
    pub fn allow(&self, identity: &str) -> bool {
        let now = Instant::now();

        if !self.buckets.contains_key(identity) && self.buckets.len() >= self.max_tracked {
            self.evict_idle(now);
        }

        let mut bucket = self
            .buckets
            .entry(identity.to_string())
            .or_insert_with(|| TokenBucket {
                tokens: self.max_tokens,
                last_refill: now,
            });

        let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
        if elapsed > 0.0 {
            bucket.tokens = (bucket.tokens + elapsed * self.tokens_per_second).min(self.max_tokens);
            bucket.last_refill = now;
        }

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    fn evict_idle(&self, now: Instant) {
        let before = self.buckets.len();
        self.buckets
            .retain(|_, bucket| now.duration_since(bucket.last_refill) < self.idle_ttl);
        tracing::debug!(
            evicted = before - self.buckets.len(),
            tracked = self.buckets.len(),
            "rate limiter idle-bucket sweep"
        );
    }

    /// Number of identities currently tracked.
    pub fn tracked_identities(&self) -> usize {
        self.buckets.len()
    }
}

/// Derive the rate-limiting identity for a request.
///
/// Prefers the first address in `X-Forwarded-For`, falling back to the peer
/// address. Never fails.
pub fn client_identity(headers: &HeaderMap, addr: SocketAddr) -> String {
    if let Some(forwarded) = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
    {
        if let Some(first) = forwarded.split(',').next() {
            let trimmed = first.trim();
            if !trimmed.is_empty() {
                return trimmed.to_string();
            }
        }
    }
    addr.ip().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_burst_then_deny() {
        let limiter = IpRateLimiter::new(1.0, 1.0);
        assert!(limiter.allow("10.0.0.1"));
        assert!(!limiter.allow("10.0.0.1"));
    }

    #[test]
    fn test_identities_are_independent() {
        let limiter = IpRateLimiter::new(1.0, 1.0);
        assert!(limiter.allow("10.0.0.1"));
        assert!(!limiter.allow("10.0.0.1"));
        assert!(limiter.allow("10.0.0.2"));
    }

    #[test]
    fn test_tokens_refill_over_time() {
        let limiter = IpRateLimiter::new(100.0, 1.0);
        assert!(limiter.allow("10.0.0.1"));
        assert!(!limiter.allow("10.0.0.1"));
        std::thread::sleep(Duration::from_millis(100));
        assert!(limiter.allow("10.0.0.1"));
    }

    #[test]
    fn test_idle_buckets_evicted_at_cap() {
        let limiter = IpRateLimiter::with_eviction(100.0, 100.0, 2, Duration::ZERO);
        assert!(limiter.allow("10.0.0.1"));
        assert!(limiter.allow("10.0.0.2"));
        assert_eq!(limiter.tracked_identities(), 2);

        // Hitting the cap sweeps every idle bucket before inserting
        assert!(limiter.allow("10.0.0.3"));
        assert_eq!(limiter.tracked_identities(), 1);
    }

    #[test]
    fn test_identity_from_forwarded_header() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.7"));
        let addr: SocketAddr = "10.0.0.1:9999".parse().unwrap();
        assert_eq!(client_identity(&headers, addr), "203.0.113.7");
    }

    #[test]
    fn test_identity_takes_first_forwarded_address() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.7, 198.51.100.2, 10.0.0.1"),
        );
        let addr: SocketAddr = "10.0.0.1:9999".parse().unwrap();
        assert_eq!(client_identity(&headers, addr), "203.0.113.7");
    }

    #[test]
    fn test_identity_falls_back_to_peer_address() {
        let headers = HeaderMap::new();
        let addr: SocketAddr = "192.0.2.4:1234".parse().unwrap();
        assert_eq!(client_identity(&headers, addr), "192.0.2.4");
    }

    #[test]
    fn test_identity_empty_forwarded_header_falls_back() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("  "));
        let addr: SocketAddr = "192.0.2.4:1234".parse().unwrap();
        assert_eq!(client_identity(&headers, addr), "192.0.2.4");
    }
}
