use morph_server::{AppState, ServerConfig, create_app, run_server};
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Default to INFO level, can be overridden with RUST_LOG env var
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .init();

    let config = ServerConfig::discover(std::env::args().nth(1))?;
    info!("Starting morph server...");

    let platform = config.build_platform().await?;
    let app = create_app(AppState::new(platform, &config), config.cors_layer());
    run_server(app, config.listen).await
}
