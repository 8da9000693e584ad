//! Symbion Status Bot - Telegram front end for host service monitoring
//!
//! Allow-listed operators query the live state of a fixed set of systemd
//! units and the host's public IP. Status is rendered as an inline keyboard
//! that refreshes in place, and only when something actually changed.

mod aggregate;
mod config;
mod dispatch;
mod keyboard;
mod probe;
mod telegram;

use anyhow::{Context, Result};
use config::BotConfig;
use dispatch::{AppContext, Dispatcher};
use telegram::TelegramClient;
use tokio::sync::mpsc;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env if present, then logging
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt().init();

    info!("🤖 Symbion Status Bot starting...");

    let config = BotConfig::load().await.context("failed to load configuration")?;
    info!(
        "monitoring {} services for {} operators",
        config.services.len(),
        config.allowed_users.len()
    );

    let client = TelegramClient::new(&config.token).context("failed to build Telegram client")?;

    // Single worker loop: the poller feeds updates into the channel and the
    // dispatcher handles each one to completion, which keeps refreshes for
    // the same message naturally serialized.
    let (tx, mut rx) = mpsc::channel(32);
    telegram::spawn_update_poller(client.clone(), tx);

    let mut dispatcher = Dispatcher::new(AppContext::new(config), client);
    while let Some(update) = rx.recv().await {
        dispatcher.handle_update(update).await;
    }

    Ok(())
}
