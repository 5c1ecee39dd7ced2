use anyhow::Context;

use trustgate_api::config::ApiConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    trustgate_observability::init();

    let config = ApiConfig::from_env()?;
    let services = trustgate_api::app::build_services(&config).await?;
    let app = trustgate_api::app::build_app(services);

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;
    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}
