//! QBridge - Discord-WhatsApp chat bridge
//!
//! Mirrors messages between paired Discord channels and WhatsApp chats,
//! keeping replies, mentions and attachments linked across both sides.

mod bridge;
mod common;
mod config;
mod discord;
mod store;
mod whatsapp;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::signal;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use bridge::{BridgeContext, BridgeSettings, TaskQueue};
use config::{env::get_config_path, load_and_validate};
use discord::{DiscordAdapter, DiscordBot, DiscordSender};
use store::{Database, NewChannel};
use whatsapp::{WhatsAppAdapter, WhatsAppListener, WhatsAppSender};

/// How long queued bridging tasks may keep running after a shutdown signal.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let started_at = chrono::Utc::now();
    info!("QBridge v{} starting...", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config_path = get_config_path();
    info!("Loading configuration from {}...", config_path);

    let config = load_and_validate(&config_path).map_err(|e| {
        error!("Failed to load configuration: {}", e);
        error!("Please ensure {} exists and is properly formatted.", config_path);
        e
    })?;

    info!("Configuration loaded successfully");
    info!("  Database: {}", config.database.path);
    info!("  WhatsApp sidecar: {}", config.whatsapp.sidecar_url);
    info!("  Bridged channels: {}", config.channels.len());

    // ============================================================
    // Open the store and register channel pairings
    // ============================================================
    let store = Arc::new(Database::open(Path::new(&config.database.path))?);
    for pairing in &config.channels {
        let channel = store.upsert_channel(&NewChannel {
            discord_id: pairing.discord.clone(),
            whatsapp_id: pairing.whatsapp.clone(),
            discord_webhook_url: pairing.webhook.clone(),
        })?;
        info!(
            "  Channel {}: Discord {} <-> WhatsApp {}",
            channel.id, channel.discord_id, channel.whatsapp_id
        );
    }

    // ============================================================
    // Wire senders, queues and adapters
    // ============================================================
    let discord_sender = Arc::new(DiscordSender::new(&config.discord.token));
    let whatsapp_sender = Arc::new(WhatsAppSender::new(&config.whatsapp.sidecar_url));

    let ctx = Arc::new(BridgeContext::new(
        store.clone(),
        discord_sender,
        whatsapp_sender.clone(),
        BridgeSettings::from_config(&config),
    ));

    let (discord_queue, discord_queue_task) = TaskQueue::spawn("discord");
    let (whatsapp_queue, whatsapp_queue_task) = TaskQueue::spawn("whatsapp");

    let discord_adapter = DiscordAdapter::new(ctx.clone(), discord_queue.clone());
    let whatsapp_adapter = WhatsAppAdapter::new(ctx.clone(), whatsapp_queue.clone());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // ============================================================
    // Start both platforms
    // ============================================================
    info!("Starting Discord bot...");
    let discord_bot = DiscordBot::new(config.discord.token.clone(), discord_adapter, shutdown_rx.clone());
    let mut discord_task = tokio::spawn(discord_bot.run());

    info!("Starting WhatsApp listener...");
    let listener = WhatsAppListener::new(whatsapp_sender, whatsapp_adapter, shutdown_rx);
    let mut whatsapp_task = tokio::spawn(listener.run());

    let shutdown = tokio::select! {
        biased;
        _ = shutdown_signal() => {
            info!("Shutdown signal received - stopping bridge...");
            true
        }
        _ = &mut discord_task => false,
        _ = &mut whatsapp_task => false,
    };

    if let Err(e) = shutdown_tx.send(true) {
        debug!("Shutdown channel closed (tasks already exited): {}", e);
    }

    if shutdown {
        for (name, task) in [("Discord", discord_task), ("WhatsApp", whatsapp_task)] {
            match tokio::time::timeout(DRAIN_TIMEOUT, task).await {
                Ok(Ok(())) => info!("{} task stopped", name),
                Ok(Err(e)) => warn!("{} task panicked: {}", name, e),
                Err(_) => warn!("{} task did not stop in time", name),
            }
        }
    } else {
        error!("A platform task exited unexpectedly");
    }

    drain_queues(&[&discord_queue, &whatsapp_queue]).await;
    discord_queue_task.abort();
    whatsapp_queue_task.abort();

    match store.stats() {
        Ok(stats) => {
            let uptime = chrono::Utc::now() - started_at;
            info!(
                discord_messages = stats.discord_messages,
                whatsapp_messages = stats.whatsapp_messages,
                attachment_bytes = stats.total_attachment_bytes,
                uptime_secs = uptime.num_seconds(),
                "Bridge statistics"
            );
        }
        Err(e) => warn!("Failed to read bridge statistics: {}", e),
    }

    info!("Exiting...");
    Ok(())
}

/// Wait for queued bridging tasks to finish, up to [`DRAIN_TIMEOUT`].
async fn drain_queues(queues: &[&TaskQueue]) {
    let drained = tokio::time::timeout(DRAIN_TIMEOUT, async {
        while queues.iter().any(|queue| queue.pending() > 0) {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    })
    .await;

    if drained.is_err() {
        for queue in queues {
            if queue.pending() > 0 {
                warn!("Dropping {} pending {} task(s)", queue.pending(), queue.name());
            }
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
