//! Per-key request throttling.
//!
//! Keys are `(purpose, identity)`: the same client IP has independent budgets
//! for the portal form and the Trust Center form. Limits are best-effort; a race
//! that lets one extra request through is acceptable.

#[cfg(feature = "redis")]
pub mod redis;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use trustgate_core::{Clock, SystemClock};

#[cfg(feature = "redis")]
pub use self::redis::RedisRateLimiter;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RateKey {
    pub purpose: &'static str,
    pub identity: String,
}

impl RateKey {
    pub fn new(purpose: &'static str, identity: impl Into<String>) -> Self {
        Self {
            purpose,
            identity: identity.into(),
        }
    }
}

impl core::fmt::Display for RateKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}:{}", self.purpose, self.identity)
    }
}

/// Longest accepted window (one year).
pub const MAX_WINDOW_SECS: u64 = 365 * 86_400;

/// At most `max_requests` per `window_secs` for one key.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitPolicy {
    pub max_requests: u32,
    pub window_secs: u64,
}

impl RateLimitPolicy {
    pub const fn new(max_requests: u32, window_secs: u64) -> Self {
        Self {
            max_requests,
            window_secs,
        }
    }

    /// The window, clamped to [`MAX_WINDOW_SECS`].
    pub fn window(&self) -> Duration {
        Duration::seconds(self.window_secs.min(MAX_WINDOW_SECS) as i64)
    }
}

#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// Record an attempt for `key`; `false` means the caller is over budget.
    async fn allow(&self, key: &RateKey, policy: &RateLimitPolicy) -> bool;
}

#[async_trait]
impl<L> RateLimiter for Arc<L>
where
    L: RateLimiter + ?Sized,
{
    async fn allow(&self, key: &RateKey, policy: &RateLimitPolicy) -> bool {
        (**self).allow(key, policy).await
    }
}

/// Calls to [`InMemoryRateLimiter::allow`] between full sweeps.
const SWEEP_EVERY: u64 = 1024;

struct Window {
    span: Duration,
    attempts: Vec<DateTime<Utc>>,
}

/// Sliding-window limiter held in process memory.
///
/// Every [`SWEEP_EVERY`] calls the whole map is swept and keys with no attempt
/// inside their own window are dropped, so memory follows the set of recently
/// active keys.
pub struct InMemoryRateLimiter {
    attempts: DashMap<String, Window>,
    calls: AtomicU64,
    clock: Arc<dyn Clock>,
}

impl InMemoryRateLimiter {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            attempts: DashMap::new(),
            calls: AtomicU64::new(0),
            clock,
        }
    }

    /// Drop expired attempts everywhere, and keys left with none.
    pub fn sweep(&self) {
        let now = self.clock.now();
        self.attempts.retain(|_, window| {
            let cutoff = window_start(now, window.span);
            window.attempts.retain(|&at| at > cutoff);
            !window.attempts.is_empty()
        });
    }

    pub fn tracked_keys(&self) -> usize {
        self.attempts.len()
    }
}

impl Default for InMemoryRateLimiter {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

fn window_start(now: DateTime<Utc>, span: Duration) -> DateTime<Utc> {
    now.checked_sub_signed(span).unwrap_or(DateTime::<Utc>::MIN_UTC)
}

#[async_trait]
impl RateLimiter for InMemoryRateLimiter {
    async fn allow(&self, key: &RateKey, policy: &RateLimitPolicy) -> bool {
        // Sweep before taking an entry guard; retain locks every shard.
        if self.calls.fetch_add(1, Ordering::Relaxed) % SWEEP_EVERY == SWEEP_EVERY - 1 {
            self.sweep();
        }

        let now = self.clock.now();
        let span = policy.window();
        let cutoff = window_start(now, span);

        let mut entry = self.attempts.entry(key.to_string()).or_insert_with(|| Window {
            span,
            attempts: Vec::new(),
        });
        entry.span = span;
        entry.attempts.retain(|&at| at > cutoff);

        if entry.attempts.len() >= policy.max_requests as usize {
            tracing::debug!(key = %key.purpose, "rate limit exceeded");
            return false;
        }

        entry.attempts.push(now);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trustgate_core::ManualClock;

    fn limiter() -> (Arc<ManualClock>, InMemoryRateLimiter) {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let limiter = InMemoryRateLimiter::new(clock.clone());
        (clock, limiter)
    }

    #[tokio::test]
    async fn blocks_after_budget_and_recovers_after_window() {
        let (clock, limiter) = limiter();
        let policy = RateLimitPolicy::new(3, 60);
        let key = RateKey::new("portal_submit", "10.0.0.1");

        for _ in 0..3 {
            assert!(limiter.allow(&key, &policy).await);
        }
        assert!(!limiter.allow(&key, &policy).await);

        clock.advance(Duration::seconds(61));
        assert!(limiter.allow(&key, &policy).await);
    }

    #[tokio::test]
    async fn purposes_have_separate_budgets() {
        let (_clock, limiter) = limiter();
        let policy = RateLimitPolicy::new(1, 60);
        let by_ip = RateKey::new("trust_submit_ip", "10.0.0.1");
        let by_email = RateKey::new("trust_submit_email", "10.0.0.1");

        assert!(limiter.allow(&by_ip, &policy).await);
        assert!(!limiter.allow(&by_ip, &policy).await);
        assert!(limiter.allow(&by_email, &policy).await);
    }

    #[tokio::test]
    async fn denied_attempts_do_not_extend_the_window() {
        let (clock, limiter) = limiter();
        let policy = RateLimitPolicy::new(1, 10);
        let key = RateKey::new("redeem", "a@x.com");

        assert!(limiter.allow(&key, &policy).await);
        clock.advance(Duration::seconds(5));
        assert!(!limiter.allow(&key, &policy).await);
        clock.advance(Duration::seconds(6));
        assert!(limiter.allow(&key, &policy).await);
    }

    #[tokio::test]
    async fn sweep_drops_idle_keys_per_their_own_window() {
        let (clock, limiter) = limiter();
        limiter
            .allow(&RateKey::new("redeem", "a"), &RateLimitPolicy::new(5, 60))
            .await;
        limiter
            .allow(&RateKey::new("trust_submit_email", "a"), &RateLimitPolicy::new(5, 3600))
            .await;
        assert_eq!(limiter.tracked_keys(), 2);

        clock.advance(Duration::seconds(120));
        limiter.sweep();
        assert_eq!(limiter.tracked_keys(), 1);
    }

    #[tokio::test]
    async fn idle_keys_are_dropped_without_manual_sweeps() {
        let (clock, limiter) = limiter();
        let policy = RateLimitPolicy::new(1, 60);
        for n in 0..SWEEP_EVERY / 2 {
            assert!(limiter.allow(&RateKey::new("portal_submit", format!("10.0.{n}")), &policy).await);
        }
        assert_eq!(limiter.tracked_keys(), (SWEEP_EVERY / 2) as usize);

        clock.advance(Duration::seconds(61));
        let fresh = RateKey::new("portal_submit", "192.0.2.1");
        for _ in 0..SWEEP_EVERY / 2 {
            limiter.allow(&fresh, &policy).await;
        }
        assert_eq!(limiter.tracked_keys(), 1);
    }

    #[tokio::test]
    async fn oversized_windows_are_clamped() {
        let (_clock, limiter) = limiter();
        let policy = RateLimitPolicy::new(1, u64::MAX);
        assert_eq!(policy.window(), Duration::seconds(MAX_WINDOW_SECS as i64));
        let key = RateKey::new("redeem", "a@x.com");
        assert!(limiter.allow(&key, &policy).await);
        assert!(!limiter.allow(&key, &policy).await);
    }
}
