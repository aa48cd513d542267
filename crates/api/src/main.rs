use std::sync::Arc;

use anyhow::Context;

use backoffice_api::app::{build_app, services::AppServices};
use backoffice_infra::config::AppConfig;
use backoffice_infra::crowdfunding::FinalizerSchedule;
use backoffice_infra::jobs::JobExecutorConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    backoffice_observability::init();

    let config = AppConfig::from_env()?;
    let services = Arc::new(AppServices::from_config(config.clone()).await?);

    let finalizer = config
        .finalizer_enabled
        .then(|| FinalizerSchedule::new(config.finalizer_interval).spawn(services.finalizer.clone()));
    let executor = services.job_executor().spawn(
        JobExecutorConfig::default()
            .with_name("refunds")
            .with_poll_interval(config.job_poll_interval),
    );

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;
    tracing::info!(addr = %listener.local_addr()?, "listening");

    axum::serve(listener, build_app(services))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("shutting down background tasks");
    if let Some(handle) = finalizer {
        handle.shutdown().await;
    }
    executor.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for ctrl-c");
    }
}
