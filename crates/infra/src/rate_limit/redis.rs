//! Redis-backed fixed-window limiter (optional).
//!
//! One counter per `(purpose, identity, window index)`, created with `INCR` and
//! given a TTL of one window. Shared by every API instance, unlike the
//! in-memory limiter. Redis errors fail open with a warning.

use async_trait::async_trait;
use chrono::Utc;
use redis::Commands;

use super::{RateKey, RateLimitPolicy, RateLimiter, MAX_WINDOW_SECS};

#[derive(Debug)]
pub enum RedisLimiterError {
    Redis(String),
}

#[derive(Debug, Clone)]
pub struct RedisRateLimiter {
    client: redis::Client,
    prefix: String,
}

impl RedisRateLimiter {
    pub fn new(redis_url: impl AsRef<str>, prefix: impl Into<String>) -> Result<Self, RedisLimiterError> {
        let client = redis::Client::open(redis_url.as_ref())
            .map_err(|e| RedisLimiterError::Redis(e.to_string()))?;
        Ok(Self {
            client,
            prefix: prefix.into(),
        })
    }

    fn counter_key(&self, key: &RateKey, policy: &RateLimitPolicy) -> String {
        let window = policy.window_secs.clamp(1, MAX_WINDOW_SECS);
        let index = Utc::now().timestamp().max(0) as u64 / window;
        format!("{}:{}:{}", self.prefix, key, index)
    }

    fn incr(client: &redis::Client, counter: &str, ttl_secs: u64) -> Result<u64, RedisLimiterError> {
        let mut conn = client
            .get_connection()
            .map_err(|e| RedisLimiterError::Redis(e.to_string()))?;
        let count: u64 = conn
            .incr(counter, 1u64)
            .map_err(|e| RedisLimiterError::Redis(e.to_string()))?;
        if count == 1 {
            let ttl = i64::try_from(ttl_secs).unwrap_or(i64::MAX);
            let _: bool = conn
                .expire(counter, ttl)
                .map_err(|e| RedisLimiterError::Redis(e.to_string()))?;
        }
        Ok(count)
    }
}

#[async_trait]
impl RateLimiter for RedisRateLimiter {
    async fn allow(&self, key: &RateKey, policy: &RateLimitPolicy) -> bool {
        let counter = self.counter_key(key, policy);
        let client = self.client.clone();
        let ttl = policy.window_secs.clamp(1, MAX_WINDOW_SECS);

        let outcome = tokio::task::spawn_blocking(move || Self::incr(&client, &counter, ttl)).await;

        match outcome {
            Ok(Ok(count)) => count <= u64::from(policy.max_requests),
            Ok(Err(RedisLimiterError::Redis(err))) => {
                tracing::warn!(purpose = key.purpose, error = %err, "rate limiter unavailable; allowing request");
                true
            }
            Err(join) => {
                tracing::warn!(purpose = key.purpose, error = %join, "rate limiter task failed; allowing request");
                true
            }
        }
    }
}
