//! Component wiring: in-memory for dev/tests, Postgres (+ Redis) in production.

use std::sync::Arc;

use anyhow::Context;
use sqlx::PgPool;

use trustgate_engine::AccessEngine;
use trustgate_infra::{
    InMemoryAccessStore, InMemoryCatalog, PostgresAccessStore, PostgresCatalog, RateLimiter,
};
use trustgate_notify::TracingNotifier;

use crate::config::ApiConfig;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppServices {
    pub engine: Arc<AccessEngine>,
}

impl AppServices {
    pub fn new(engine: Arc<AccessEngine>) -> Self {
        Self { engine }
    }
}

pub async fn build_services(config: &ApiConfig) -> anyhow::Result<AppServices> {
    if config.use_persistent_stores {
        build_persistent_services(config).await
    } else {
        tracing::info!("using in-memory stores");
        Ok(build_in_memory_services(config))
    }
}

fn build_in_memory_services(config: &ApiConfig) -> AppServices {
    let engine = AccessEngine::builder(
        Arc::new(InMemoryAccessStore::new()),
        Arc::new(InMemoryCatalog::new()),
    )
    .notifier(Arc::new(TracingNotifier))
    .config(config.engine.clone())
    .build();
    AppServices::new(Arc::new(engine))
}

async fn build_persistent_services(config: &ApiConfig) -> anyhow::Result<AppServices> {
    let database_url = config
        .database_url
        .as_deref()
        .context("DATABASE_URL must be set when USE_PERSISTENT_STORES=true")?;
    let pool = PgPool::connect(database_url)
        .await
        .context("failed to connect to Postgres")?;

    let store = PostgresAccessStore::new(pool.clone());
    store.migrate().await.context("failed to apply schema")?;
    let catalog = PostgresCatalog::new(pool);

    let mut builder = AccessEngine::builder(Arc::new(store), Arc::new(catalog))
        .notifier(Arc::new(TracingNotifier))
        .config(config.engine.clone());
    if let Some(limiter) = shared_rate_limiter(config)? {
        builder = builder.rate_limiter(limiter);
    }
    tracing::info!("using persistent stores");
    Ok(AppServices::new(Arc::new(builder.build())))
}

#[cfg(feature = "redis")]
fn shared_rate_limiter(config: &ApiConfig) -> anyhow::Result<Option<Arc<dyn RateLimiter>>> {
    let limiter = trustgate_infra::rate_limit::RedisRateLimiter::new(&config.redis_url, "trustgate:rate")
        .map_err(|e| anyhow::anyhow!("failed to open redis client: {e:?}"))?;
    Ok(Some(Arc::new(limiter)))
}

#[cfg(not(feature = "redis"))]
fn shared_rate_limiter(_config: &ApiConfig) -> anyhow::Result<Option<Arc<dyn RateLimiter>>> {
    tracing::warn!("redis feature not enabled; rate limits are per process");
    Ok(None)
}
