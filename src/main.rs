//! magpie - a persistent IRC bot with pluggable message handlers.

mod backoff;
mod config;
mod conn;
mod db;
mod dispatch;
mod error;
mod outbox;
mod plugins;
mod router;
mod state;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::conn::Bot;
use crate::db::Database;
use crate::plugins::PluginHost;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.toml".to_string());

    let config = Config::load(&config_path).map_err(|e| {
        error!(path = %config_path, error = %e, "failed to load config");
        e
    })?;
    let config = Arc::new(config);

    info!(
        host = %config.connection.hostname,
        nick = %config.connection.nick,
        "starting magpie"
    );

    let db = Database::new(&config.database.path).await?;
    let plugins = PluginHost::from_config(&config)?;

    let shutdown = CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "failed to listen for shutdown signal");
                return;
            }
            info!("shutdown signal received");
            shutdown.cancel();
        });
    }

    let mut bot = Bot::new(config, db, plugins);
    bot.run(shutdown).await?;

    info!("magpie has been stopped");
    Ok(())
}
