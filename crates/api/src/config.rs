//! Process configuration read from the environment.

use std::net::SocketAddr;

use anyhow::Context;

use trustgate_engine::EngineConfig;

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub bind_addr: SocketAddr,
    /// Postgres store (and Redis limiter when built with `redis`) instead of
    /// the in-memory components.
    pub use_persistent_stores: bool,
    pub database_url: Option<String>,
    pub redis_url: String,
    pub engine: EngineConfig,
}

impl ApiConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let bind_addr = lookup("TRUSTGATE_BIND_ADDR")
            .unwrap_or_else(|| "0.0.0.0:8080".to_string())
            .parse()
            .context("TRUSTGATE_BIND_ADDR must be host:port")?;
        let use_persistent_stores = lookup("USE_PERSISTENT_STORES")
            .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
            .unwrap_or(false);
        let database_url = lookup("DATABASE_URL");
        if use_persistent_stores && database_url.is_none() {
            anyhow::bail!("DATABASE_URL must be set when USE_PERSISTENT_STORES=true");
        }

        let redis_url = lookup("REDIS_URL").unwrap_or_else(|| {
            if use_persistent_stores {
                tracing::warn!("REDIS_URL not set; using redis://localhost:6379");
            }
            "redis://localhost:6379".to_string()
        });

        Ok(Self {
            bind_addr,
            use_persistent_stores,
            database_url,
            redis_url,
            engine: EngineConfig::from_lookup(&lookup),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_in_memory_on_8080() {
        let config = ApiConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config.bind_addr.port(), 8080);
        assert!(!config.use_persistent_stores);
        assert_eq!(config.engine, EngineConfig::default());
    }

    #[test]
    fn persistent_stores_need_a_database() {
        let err = ApiConfig::from_lookup(|key| {
            (key == "USE_PERSISTENT_STORES").then(|| "true".to_string())
        })
        .unwrap_err();
        assert!(err.to_string().contains("DATABASE_URL"));
    }

    #[test]
    fn bad_bind_address_is_an_error() {
        let result = ApiConfig::from_lookup(|key| {
            (key == "TRUSTGATE_BIND_ADDR").then(|| "nowhere".to_string())
        });
        assert!(result.is_err());
    }
}
