mod config;
mod error;
mod llm;
mod platform;
mod relay;

use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::platform::telegram::TelegramPlatform;
use crate::relay::Relay;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,ollama_relay=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    info!("Loading configuration from: {}", config_path.display());
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    info!("Configuration loaded successfully");
    info!("  Model: {} via {}", config.llm.model, config.llm.provider);
    info!("  Telegram API: {}", config.telegram.api_url);
    info!("  Poll interval: {:?}", config.telegram.poll_interval());
    if !config.telegram.allowed_chat_ids.is_empty() {
        info!("  Allowed chats: {:?}", config.telegram.allowed_chat_ids);
    }

    let platform = TelegramPlatform::new(&config.telegram)?;
    let model = llm::from_config(&config.llm)?;

    let relay = Relay::new(Box::new(platform), model, config.telegram.poll_interval())
        .with_allowed_chats(config.telegram.allowed_chat_ids.clone());

    info!("Relay is starting...");
    relay
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for Ctrl-C: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await;

    Ok(())
}
