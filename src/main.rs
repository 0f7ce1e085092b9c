//! Umbrella IAM - identity and access management service

use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use umbrella_iam::{config::Args, server, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    let log_level = args.log_level.clone();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("umbrella_iam={},info", log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    let keys = args.key_config();
    info!("======================================");
    info!("  Umbrella IAM");
    info!("======================================");
    info!("Node ID: {}", args.node_id);
    info!("Listen: {}", args.listen);
    info!("Mode: {}", if args.dev_mode { "DEVELOPMENT" } else { "PRODUCTION" });
    info!("Environment: {}", args.environment);
    info!("Secret store: {:?}", args.secret_store);
    info!("Object store: {:?}", args.object_store);
    info!("Private key secret: {}", keys.private_key_secret);
    info!(
        "Public key: {}/{}",
        keys.public_container, keys.public_key_file
    );
    info!("Token expiry: {} minutes", args.token_expiry_minutes);
    info!("======================================");

    let state = match AppState::from_args(args).await {
        Ok(state) => Arc::new(state),
        Err(e) => {
            error!("Failed to initialize services: {}", e);
            std::process::exit(1);
        }
    };

    server::run(state).await?;
    Ok(())
}
