//! Santa Bot - Secret Santa coordinator for Telegram
//!
//! Participants register with the bot, leave wish lists, draw a recipient
//! and exchange anonymous messages with their pair.

mod api;
mod assignment;
mod config;
mod db;
mod dispatch;
mod runtime;
mod session;
mod telegram;

use api::{create_router, AppState};
use config::BotConfig;
use db::Database;
use dispatch::Dispatcher;
use runtime::{DatabaseStorage, ProductionRuntime};
use std::net::SocketAddr;
use std::sync::Arc;
use telegram::{Poller, TelegramClient};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const UPDATE_QUEUE: usize = 256;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // A missing .env file is fine
    let _ = dotenvy::dotenv();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "santa_bot=info,tower_http=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false),
        )
        .init();

    // Configuration
    let mut config = BotConfig::from_env()?;
    tracing::debug!(?config, "Configuration loaded");

    // Ensure database directory exists
    if let Some(parent) = config.db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // Initialize database
    tracing::info!(path = %config.db_path.display(), "Opening database");
    let db = Database::open(&config.db_path)?;

    // Repair half-written assignments left by an interrupted commit
    let report = db.reconcile_pairs()?;
    if report.completed > 0 || report.cleared > 0 {
        tracing::warn!(
            completed = report.completed,
            cleared = report.cleared,
            "Repaired inconsistent assignments"
        );
    }

    let client = Arc::new(TelegramClient::new(&config.token, &config.api_base)?);
    match client.get_me().await {
        Ok(me) => {
            tracing::info!(username = me.username.as_deref(), "Bot identity resolved");
            config.dispatch.bot_username = me.username;
        }
        Err(e) => {
            tracing::warn!(error = %e, "Could not resolve bot username, accepting every @addressee");
        }
    }
    let storage = DatabaseStorage::new(db);
    let dispatcher = Dispatcher::new(storage, config.dispatch.clone());
    let runtime = ProductionRuntime::new(dispatcher, client.clone());

    let cancel = CancellationToken::new();
    let (updates_tx, updates_rx) = mpsc::channel(UPDATE_QUEUE);

    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for shutdown signal");
                return;
            }
            tracing::info!("Shutdown requested");
            cancel.cancel();
        });
    }

    let source = if let Some(webhook) = &config.webhook {
        let app = create_router(AppState::new(updates_tx, webhook.secret.clone()))
            .layer(TraceLayer::new_for_http());
        let addr = SocketAddr::from(([0, 0, 0, 0], webhook.port));
        tracing::info!("Webhook server listening on {addr}");

        let listener = tokio::net::TcpListener::bind(addr).await?;
        let shutdown = cancel.clone();
        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move { shutdown.cancelled().await })
                .await
                .map_err(|e| e.to_string())
        })
    } else {
        tracing::info!("Polling for updates");
        let poller = Poller::new(client, config.poll_timeout);
        let stop = cancel.clone();
        tokio::spawn(async move {
            let result = poller.run(updates_tx, stop.clone()).await;
            // A fatal polling error stops the whole bot
            stop.cancel();
            result.map_err(|e| e.to_string())
        })
    };

    runtime.run(updates_rx, cancel.clone()).await;
    runtime.shutdown().await;

    match source.await? {
        Ok(()) => Ok(()),
        Err(e) => Err(e.into()),
    }
}
