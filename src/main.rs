use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use ridership_forecast::{
    ForecastService, SystemClock,
    config::AppConfig,
    http::{AppState, create_router},
};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(name = "ridership-forecast")]
#[command(about = "Hourly and daily transit ridership forecasting service")]
struct Args {
    /// Address to bind (overrides server.host)
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on (overrides server.port)
    #[arg(long)]
    port: Option<u16>,

    /// Load models and history at startup instead of on first request
    #[arg(long)]
    eager: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::builder()
        .with_default_directive(tracing::level_filters::LevelFilter::INFO.into())
        .parse_lossy("ridership_forecast=debug,tower_http=info");

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    let mut config = AppConfig::load().context("Failed to load configuration")?;
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    config.server.eager_load |= args.eager;

    let rt = tokio::runtime::Runtime::new().context("Failed to create tokio runtime")?;
    rt.block_on(serve(config))
}

async fn serve(config: AppConfig) -> Result<()> {
    tracing::info!(
        model = %config.model.model_id,
        inference_url = config.model.inference_url.as_deref().unwrap_or("<none>"),
        hourly_data = %config.hourly.data_path.display(),
        daily_data = %config.daily.data_path.display(),
        "Starting ridership forecast service"
    );

    let service = Arc::new(ForecastService::from_config(&config, Arc::new(SystemClock)));
    if config.server.eager_load {
        service.warm_up().await;
    }

    let app = create_router(AppState::new(service));

    let listener = bind(&config.server.host, config.server.port).await?;
    let addr = listener.local_addr().context("Failed to read bound address")?;
    tracing::info!("Listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("Server stopped");
    Ok(())
}

/// Bind the listener; `host` may be an IP literal or a resolvable name.
async fn bind(host: &str, port: u16) -> Result<tokio::net::TcpListener> {
    tokio::net::TcpListener::bind((host, port))
        .await
        .with_context(|| format!("Failed to bind {host}:{port}"))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bind_accepts_hostnames_and_ip_literals() {
        for host in ["localhost", "127.0.0.1"] {
            let listener = bind(host, 0).await.unwrap();
            assert!(listener.local_addr().unwrap().ip().is_loopback(), "{host}");
        }
    }

    #[tokio::test]
    async fn test_bind_reports_unresolvable_host() {
        let err = bind("no such host", 0).await.unwrap_err();
        assert!(err.to_string().contains("no such host"));
    }
}
