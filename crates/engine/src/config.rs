//! Engine configuration.

use std::ops::RangeInclusive;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use trustgate_infra::{RateLimitPolicy, MAX_WINDOW_SECS};

/// Longest accepted token lifetime, in days.
pub const MAX_TOKEN_TTL_DAYS: u32 = 36_500;

/// Throttling budgets, one per rate-limit purpose.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimits {
    /// Resources Portal request form, keyed by client IP.
    pub portal_submit: RateLimitPolicy,
    /// Trust Center request form, keyed by client IP.
    pub trust_submit_ip: RateLimitPolicy,
    /// Trust Center request form, keyed by email.
    pub trust_submit_email: RateLimitPolicy,
    /// Code redemption attempts, keyed by email.
    pub redeem: RateLimitPolicy,
}

impl Default for RateLimits {
    fn default() -> Self {
        Self {
            portal_submit: RateLimitPolicy::new(5, 3600),
            trust_submit_ip: RateLimitPolicy::new(10, 3600),
            trust_submit_email: RateLimitPolicy::new(3, 86_400),
            redeem: RateLimitPolicy::new(10, 600),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Lifetime of tokens issued by a portal approval. Long on purpose: portal
    /// access is withdrawn by revoking the request, not by expiry.
    pub portal_token_ttl_days: u32,
    /// Lifetime of Trust Center tokens (approval and resend).
    pub trust_token_ttl_days: u32,
    /// Lifetime of tokens sent after a bundle code redemption.
    pub redemption_token_ttl_days: u32,
    pub rate_limits: RateLimits,
    pub notify_timeout_ms: u64,
    /// When true, resending a Trust Center link invalidates earlier tokens for
    /// the same request.
    pub supersede_tokens_on_resend: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            portal_token_ttl_days: 3650,
            trust_token_ttl_days: 90,
            redemption_token_ttl_days: 90,
            rate_limits: RateLimits::default(),
            notify_timeout_ms: 5_000,
            supersede_tokens_on_resend: false,
        }
    }
}

impl EngineConfig {
    /// Defaults overridden by `TRUSTGATE_*` environment variables.
    ///
    /// Unparseable or out-of-range values are ignored with a warning.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        let ttl_days = 1..=MAX_TOKEN_TTL_DAYS;
        override_in(&lookup, "PORTAL_TOKEN_TTL_DAYS", &mut config.portal_token_ttl_days, &ttl_days);
        override_in(&lookup, "TRUST_TOKEN_TTL_DAYS", &mut config.trust_token_ttl_days, &ttl_days);
        override_in(
            &lookup,
            "REDEMPTION_TOKEN_TTL_DAYS",
            &mut config.redemption_token_ttl_days,
            &ttl_days,
        );
        override_with(&lookup, "TRUSTGATE_NOTIFY_TIMEOUT_MS", &mut config.notify_timeout_ms);
        override_with(
            &lookup,
            "TRUSTGATE_SUPERSEDE_TOKENS_ON_RESEND",
            &mut config.supersede_tokens_on_resend,
        );

        let limits = &mut config.rate_limits;
        for (prefix, policy) in [
            ("TRUSTGATE_RATE_PORTAL_SUBMIT", &mut limits.portal_submit),
            ("TRUSTGATE_RATE_TRUST_SUBMIT_IP", &mut limits.trust_submit_ip),
            ("TRUSTGATE_RATE_TRUST_SUBMIT_EMAIL", &mut limits.trust_submit_email),
            ("TRUSTGATE_RATE_REDEEM", &mut limits.redeem),
        ] {
            override_with(&lookup, &format!("{prefix}_MAX"), &mut policy.max_requests);
            override_in(
                &lookup,
                &format!("{prefix}_WINDOW_SECS"),
                &mut policy.window_secs,
                &(1..=MAX_WINDOW_SECS),
            );
        }

        config
    }

    pub fn portal_token_ttl(&self) -> chrono::Duration {
        chrono::Duration::days(i64::from(self.portal_token_ttl_days))
    }

    pub fn trust_token_ttl(&self) -> chrono::Duration {
        chrono::Duration::days(i64::from(self.trust_token_ttl_days))
    }

    pub fn redemption_token_ttl(&self) -> chrono::Duration {
        chrono::Duration::days(i64::from(self.redemption_token_ttl_days))
    }

    pub fn notify_timeout(&self) -> Duration {
        Duration::from_millis(self.notify_timeout_ms)
    }
}

fn override_with<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, target: &mut T)
where
    T: std::str::FromStr,
{
    let Some(raw) = lookup(key) else {
        return;
    };
    match raw.trim().parse() {
        Ok(value) => *target = value,
        Err(_) => tracing::warn!(key, value = %raw, "ignoring unparseable configuration value"),
    }
}

fn override_in<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    target: &mut T,
    range: &RangeInclusive<T>,
) where
    T: std::str::FromStr + PartialOrd + Copy + core::fmt::Display,
{
    let mut value = *target;
    override_with(lookup, key, &mut value);
    if range.contains(&value) {
        *target = value;
    } else {
        tracing::warn!(
            key,
            %value,
            min = %range.start(),
            max = %range.end(),
            "ignoring out-of-range configuration value"
        );
    }
}
