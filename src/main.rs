use clap::Parser as _;
use poolgate::config::Config;
use poolgate::store::Store;
use poolgate::{AppState, build_metrics_layer_and_handle, build_metrics_router, build_router};
use tokio::net::TcpListener;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = Config::parse().validate()?;
    info!("Starting poolgate on port {}", config.api_port);

    if let Some(path) = config
        .database_url
        .strip_prefix("sqlite:")
        .filter(|p| !p.starts_with(":memory:"))
        && let Some(parent) = std::path::Path::new(path).parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }

    let store = Store::connect(&config.database_url)
        .await
        .map_err(|e| anyhow::anyhow!("failed to initialise store: {e}"))?;
    info!("Store ready at {}", config.database_url);

    let bind_addr = format!("0.0.0.0:{}", config.api_port);
    let app_state = AppState::new(store, config).await?;

    info!(
        "Virtual models: {}",
        app_state
            .registry
            .snapshot()
            .virtual_models()
            .iter()
            .map(|(name, tag)| format!("{name} -> {}", tag.as_str()))
            .collect::<Vec<_>>()
            .join(", ")
    );

    let (metrics_layer, metrics_handle) = build_metrics_layer_and_handle("poolgate");
    let router = build_router(app_state)
        .merge(build_metrics_router(metrics_handle))
        .layer(metrics_layer);

    let listener = TcpListener::bind(&bind_addr)
        .await
        .map_err(|e| anyhow::anyhow!("failed to bind {bind_addr}: {e}"))?;
    info!("poolgate listening on {bind_addr}");

    axum::serve(listener, router).await?;

    Ok(())
}
