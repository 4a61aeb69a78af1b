mod config;

use azure_relay::{AppState, build_router, deployments::DeploymentMap};
use clap::Parser as _;
use config::Config;
use tokio::net::TcpListener;
use tracing::{info, instrument};

#[tokio::main]
#[instrument]
pub async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = Config::parse().validate()?;
    info!("Starting Azure relay with config: {:?}", config);

    let deployments = match &config.deployments {
        Some(path) => DeploymentMap::from_config_file(path)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to load deployments: {}", e))?,
        None => {
            info!("No deployments file given, using the built-in table");
            DeploymentMap::builtin()
        }
    };
    info!("Serving models: {}", deployments.model_names().join(", "));

    let app_state = AppState::new(deployments, config.upstream());
    let router = build_router(app_state);

    let bind_addr = format!("0.0.0.0:{}", config.port);
    let listener = TcpListener::bind(&bind_addr).await?;
    info!("Azure relay listening on {}", bind_addr);

    axum::serve(listener, router).await?;

    Ok(())
}
