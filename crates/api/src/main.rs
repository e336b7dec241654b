use anyhow::Context;

use phonestore_infra::config::ServiceConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    phonestore_observability::init();

    let config = ServiceConfig::from_env().context("invalid configuration")?;
    let (app, services) = phonestore_api::app::build_app(&config).context("failed to start services")?;

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;

    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown requested");
        })
        .await?;

    tokio::task::spawn_blocking(move || services.shutdown()).await?;
    Ok(())
}
