//! Chat server - Entry Point
//!
//! Loads the configuration, sets up logging and runs the server until Ctrl-C.

use std::env;

use tracing::info;
use tracing_subscriber::EnvFilter;

use tcp_chat::{Server, ServerConfig};

/// Default configuration file
const DEFAULT_CONFIG: &str = "config.txt";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Get config path from command line or use default
    let config_path = env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG.to_string());
    let config = ServerConfig::load(&config_path)?;

    // Initialize logging with environment filter
    // RUST_LOG wins; otherwise the `logging` key picks verbose or silent
    let default_filter = if config.logging { "tcp_chat=debug" } else { "off" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .init();

    info!("Starting server with {}", config_path);
    Server::new(config).start().await?;

    Ok(())
}
