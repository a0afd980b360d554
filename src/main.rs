mod config;
mod logging;
mod platform;
mod relay;
mod server;
mod tasks;

use std::path::PathBuf;
use std::sync::atomic::AtomicU64;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use teloxide::Bot;
use tracing::{info, warn};

use crate::config::Config;
use crate::platform::telegram::TelegramPlatform;
use crate::platform::{ChatPlatform, WebhookRegistry};
use crate::relay::{Relay, RelaySettings};
use crate::server::AppState;
use crate::tasks::BackgroundTasks;

/// How long shutdown waits for pending flushes and cleanups.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<()> {
    // Optional TOML file; the environment fills in and overrides it.
    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = Config::load(config_path.as_deref()).context("Failed to load configuration")?;

    logging::init(config.redacted_values());

    info!("Configuration loaded");
    info!("  Channel: {}", config.telegram.channel);
    info!("  Trigger: {}", config.publish.trigger);
    info!("  Port: {}", config.server.port);
    if config.server.admin_secret.is_none() {
        warn!("ADMIN_SECRET is not set; admin endpoints are disabled");
    }

    let telegram = Arc::new(TelegramPlatform::new(Bot::new(
        config.telegram.bot_token.expose(),
    )));
    let tasks = Arc::new(BackgroundTasks::new());
    let chat: Arc<dyn ChatPlatform> = telegram.clone();
    let relay = Relay::new(chat, RelaySettings::from_config(&config), Arc::clone(&tasks));

    let webhooks: Arc<dyn WebhookRegistry> = telegram;
    let state = Arc::new(AppState {
        relay,
        webhooks,
        webhook_url: config.webhook_url()?,
        button_url: config.publish.button_url.clone(),
        admin_secret: config.server.admin_secret.clone(),
        webhook_calls: AtomicU64::new(0),
    });

    server::register_on_startup(&state).await;

    info!("Bot is starting...");
    let router = server::router(Arc::clone(&state), &config.webhook_path());
    server::serve(router, config.server.port, shutdown_signal()).await?;

    info!("Waiting for background tasks...");
    if tokio::time::timeout(DRAIN_TIMEOUT, tasks.drain()).await.is_err() {
        tasks.abort_all();
    }
    info!("Stopped");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}
