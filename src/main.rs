mod config;
mod event;
mod llm;
mod platform;
mod relay;
mod telemetry;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::llm::LlmClient;
use crate::relay::Relay;
use crate::telemetry::WebhookRelay;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,relaybot=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // An explicit path must exist; the default config.toml is optional
    let config_path = match std::env::args().nth(1).map(PathBuf::from) {
        Some(path) => Some(path),
        None => Some(PathBuf::from("config.toml")).filter(|p| p.exists()),
    };

    match &config_path {
        Some(path) => info!("Loading configuration from: {}", path.display()),
        None => info!("No config file, using environment only"),
    }
    let config = Config::load(config_path.as_deref(), |key| std::env::var(key).ok())
        .context("Failed to load configuration")?;

    info!("Configuration loaded successfully");
    info!("  Provider: {}", config.llm.provider);
    info!("  Model: {}", config.llm.model);
    info!("  Allowed users: {:?}", config.telegram.allowed_user_ids);

    let webhook = WebhookRelay::new(&config.webhook)?;
    info!(
        "  Webhook relay: {}",
        if webhook.is_enabled() { "enabled" } else { "disabled" }
    );

    let inference = Arc::new(LlmClient::new(config.llm.clone()));
    let relay = Arc::new(Relay::new(&config, inference, Arc::new(webhook)));

    info!("Bot is starting...");
    platform::telegram::run(
        relay,
        &config.telegram.bot_token,
        config.telegram.allowed_user_ids.clone(),
    )
    .await?;

    Ok(())
}
