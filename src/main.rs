mod classifier;
mod composer;
mod config;
mod context;
mod generator;
mod llm;
mod platform;
mod poller;
mod scheduler;
mod search;
mod supervisor;
#[cfg(test)]
mod testing;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::llm::{CompletionProvider, LlmClient};
use crate::platform::twitter::TwitterClient;
use crate::platform::Platform;
use crate::search::{SearchProvider, SerpApiClient};
use crate::supervisor::Supervisor;

#[tokio::main]
async fn main() -> Result<()> {
    // Credentials may live in a .env file next to the config
    dotenv::dotenv().ok();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,predictbot=debug".into()),
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
    info!("  Handle: @{}", config.twitter.bot_handle);
    info!("  Model: {} ({})", config.llm.model, config.llm.provider);
    info!("  Keywords: {:?}", config.bot.keywords);
    info!(
        "  Broadcast: {} topic(s) every {}h",
        config.broadcast.topics.len(),
        config.broadcast.interval_hours
    );

    let config = Arc::new(config);
    let platform: Arc<dyn Platform> = Arc::new(TwitterClient::new(&config.twitter)?);
    let search: Arc<dyn SearchProvider> = Arc::new(SerpApiClient::new(config.search.clone())?);
    let llm: Arc<dyn CompletionProvider> = Arc::new(LlmClient::new(config.llm.clone())?);

    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Shutdown signal received");
                shutdown.cancel();
            }
            Err(e) => warn!("Failed to listen for shutdown signal: {}", e),
        }
    });

    info!("Bot is starting...");
    Supervisor::new(config, platform, search, llm, cancel)
        .run()
        .await
}
