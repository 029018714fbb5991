//! Discord gateway client.
//!
//! Gateway events are forwarded over a channel to a single processing loop,
//! which converts messages and hands them to the [`DiscordAdapter`].

use std::time::Duration;

use serenity::async_trait;
use serenity::model::channel::Message;
use serenity::model::gateway::Ready;
use serenity::prelude::*;
use serenity::Client;

use backon::BackoffBuilder;
use tokio::sync::{mpsc, watch};
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::discord::adapter::DiscordAdapter;
use crate::discord::convert::{self, ContentCleaner};

const MAX_RECONNECT_DELAY: Duration = Duration::from_secs(300);

#[derive(Debug, Clone)]
pub enum DiscordBotEvent {
    /// Bot connected and ready.
    Ready(Ready),
    /// Message received.
    Message { context: Context, message: Message },
    Disconnected,
}

struct DiscordBotEvents {
    discord_events_tx: mpsc::UnboundedSender<DiscordBotEvent>,
}

impl DiscordBotEvents {
    fn new(discord_events_tx: mpsc::UnboundedSender<DiscordBotEvent>) -> Self {
        Self { discord_events_tx }
    }
}

#[async_trait]
impl EventHandler for DiscordBotEvents {
    async fn ready(&self, _context: Context, ready: Ready) {
        if let Err(error) = self.discord_events_tx.send(DiscordBotEvent::Ready(ready)) {
            warn!("Failed to process discord event: {}", error);
        }
    }

    async fn message(&self, context: Context, message: Message) {
        if let Err(error) = self
            .discord_events_tx
            .send(DiscordBotEvent::Message { context, message })
        {
            warn!("Failed to process discord event: {}", error);
        }
    }
}

async fn build_client(
    token: &str,
    discord_events_tx: mpsc::UnboundedSender<DiscordBotEvent>,
) -> anyhow::Result<Client> {
    let intents = GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::MESSAGE_CONTENT
        | GatewayIntents::GUILDS
        | GatewayIntents::GUILD_MEMBERS;

    let events = DiscordBotEvents::new(discord_events_tx);
    let client = Client::builder(token, intents)
        .event_handler(events)
        .await?;
    Ok(client)
}

/// 5s initial, 5min max, factor 1.1, with jitter, unlimited retries.
fn discord_backoff() -> impl Iterator<Item = Duration> {
    backon::ExponentialBuilder::default()
        .with_min_delay(Duration::from_secs(5))
        .with_max_delay(MAX_RECONNECT_DELAY)
        .with_factor(1.1)
        .with_jitter()
        .without_max_times()
        .build()
}

pub struct DiscordBot {
    token: String,
    adapter: DiscordAdapter,
    cleaner: ContentCleaner,
    shutdown_rx: watch::Receiver<bool>,
}

impl DiscordBot {
    pub fn new(token: String, adapter: DiscordAdapter, shutdown_rx: watch::Receiver<bool>) -> Self {
        Self {
            token,
            adapter,
            cleaner: ContentCleaner::new(),
            shutdown_rx,
        }
    }

    pub async fn run(self) {
        let (discord_events_tx, mut discord_events_rx) = mpsc::unbounded_channel::<DiscordBotEvent>();
        let mut shutdown_rx = self.shutdown_rx.clone();
        let mut events_shutdown_rx = self.shutdown_rx.clone();

        tokio::select! {
            _ = Self::run_connection(&self.token, &discord_events_tx, &mut shutdown_rx) => {},
            _ = Self::process_events(&mut discord_events_rx, &self.adapter, &self.cleaner, &mut events_shutdown_rx) => {},
        }
        info!("Discord task ended");
    }

    async fn run_connection(
        token: &str,
        discord_events_tx: &mpsc::UnboundedSender<DiscordBotEvent>,
        shutdown_rx: &mut watch::Receiver<bool>,
    ) {
        let mut backoff = discord_backoff();

        loop {
            info!("Connecting to Discord...");

            // serenity mostly handles reconnections itself.
            let mut client = match build_client(token, discord_events_tx.clone()).await {
                Ok(client) => {
                    backoff = discord_backoff();
                    client
                }
                Err(e) => {
                    error!("Failed to build Discord client: {}", e);
                    let delay = backoff.next().unwrap_or(MAX_RECONNECT_DELAY);
                    warn!("Retrying in {:.1}s...", delay.as_secs_f64());
                    sleep(delay).await;
                    continue;
                }
            };
            let shard_manager = client.shard_manager.clone();

            let result = tokio::select! {
                result = client.start() => result,
                _ = wait_for_shutdown(shutdown_rx) => {
                    info!("Initiating graceful Discord shutdown...");
                    shard_manager.shutdown_all().await;
                    info!("Discord shutdown complete");
                    return;
                }
            };

            if let Err(error) = discord_events_tx.send(DiscordBotEvent::Disconnected) {
                warn!("Failed to process discord event: {}", error);
            }

            match result {
                Ok(()) => {
                    info!("Discord client disconnected normally");
                    break;
                }
                Err(e) => {
                    error!("Discord client error: {}", e);
                    let delay = backoff.next().unwrap_or(MAX_RECONNECT_DELAY);
                    warn!(
                        "Discord disconnected. Reconnecting in {:.1}s...",
                        delay.as_secs_f64(),
                    );
                    sleep(delay).await;
                }
            }
        }
    }

    async fn process_events(
        discord_events_rx: &mut mpsc::UnboundedReceiver<DiscordBotEvent>,
        adapter: &DiscordAdapter,
        cleaner: &ContentCleaner,
        shutdown_rx: &mut watch::Receiver<bool>,
    ) {
        let mut bot_user = None;

        loop {
            tokio::select! {
                event = discord_events_rx.recv() => {
                    match event {
                        Some(DiscordBotEvent::Ready(ready)) => {
                            info!("Discord bot connected as {}", ready.user.name);
                            bot_user = Some(ready.user.id);
                        }
                        Some(DiscordBotEvent::Message { context, message }) => {
                            if Some(message.author.id) == bot_user {
                                continue;
                            }
                            let inbound = convert::to_inbound(&context, cleaner, &message).await;
                            adapter.handle(inbound);
                        }
                        Some(DiscordBotEvent::Disconnected) => {
                            bot_user = None;
                        }
                        None => {
                            debug!("Discord events channel closed.");
                            break;
                        }
                    }
                }

                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        info!("Shutdown signal received, stopping event processing");
                        break;
                    }
                }
            }
        }
    }
}

async fn wait_for_shutdown(shutdown_rx: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown_rx.borrow() {
            return;
        }
        if shutdown_rx.changed().await.is_err() {
            // Sender gone; nothing will ever signal.
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_bounded() {
        let delays: Vec<Duration> = discord_backoff().take(100).collect();
        assert_eq!(delays.len(), 100);
        assert!(delays.iter().all(|delay| *delay <= MAX_RECONNECT_DELAY * 2));
    }

    #[tokio::test]
    async fn test_wait_for_shutdown_returns_once_signalled() {
        let (tx, mut rx) = watch::channel(false);
        let waiter = tokio::spawn(async move { wait_for_shutdown(&mut rx).await });
        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }
}
