//! Daemon - the main relay service
//!
//! Connects the store (fatal if unavailable), starts the Discord channel,
//! handles each inbound message on its own task, and shuts everything down
//! in order on Ctrl-C.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinSet;

use crate::channels::{Channel, DiscordChannel, IncomingMessage};
use crate::db::StoreConnector;
use crate::relay::Relay;
use crate::{Config, Result, assistant};

/// The relay daemon
pub struct Daemon {
    config: Config,
}

impl Daemon {
    /// Create a new daemon instance
    #[must_use]
    pub const fn new(config: Config) -> Self {
        Self { config }
    }

    /// Run until interrupted
    ///
    /// # Errors
    ///
    /// Returns error if the store is unavailable or the channel cannot connect
    pub async fn run(self) -> Result<()> {
        let Config {
            discord,
            assistant,
            store,
            window,
            identity_scope,
        } = self.config;

        let mut connector = StoreConnector::new(store);
        connector.connect().await?;

        let assistant = assistant::from_config(assistant);
        tracing::info!(
            assistant = assistant.name(),
            horizon_days = window.horizon.num_days(),
            max_entries = window.max_entries,
            ?identity_scope,
            "relay configured"
        );

        let relay = Arc::new(Relay::new(
            connector.conversations()?,
            assistant,
            window,
            identity_scope,
        ));

        if discord.channel_allowlist.is_empty() {
            tracing::warn!("DISCORD_CHANNEL_IDS not set, listening in every channel");
        }

        let (mut channel, rx) =
            DiscordChannel::with_receiver(discord.token, discord.channel_allowlist);
        if let Err(e) = channel.connect().await {
            tracing::error!(error = %e, "Discord connect failed");
            connector.close().await?;
            return Err(e);
        }

        let channel = Arc::new(channel);
        dispatch(Arc::clone(&relay), Arc::clone(&channel), rx, shutdown_signal()).await;

        release_channel(channel).await;

        drop(relay);
        connector.close().await?;

        tracing::info!("relay stopped");
        Ok(())
    }
}

/// Feed inbound messages to the relay until the receiver closes or `shutdown` fires
///
/// Each message is handled on its own task; in-flight messages are finished
/// before this returns.
pub async fn dispatch<C, S>(
    relay: Arc<Relay>,
    channel: Arc<C>,
    mut rx: mpsc::Receiver<IncomingMessage>,
    shutdown: S,
) where
    C: Channel + 'static,
    S: Future<Output = ()>,
{
    tracing::info!(channel = channel.name(), "channel handler started");

    let mut tasks = JoinSet::new();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            () = &mut shutdown => {
                tracing::info!("shutdown requested");
                break;
            }
            msg = rx.recv() => {
                let Some(msg) = msg else {
                    tracing::info!(channel = channel.name(), "channel closed");
                    break;
                };
                let relay = Arc::clone(&relay);
                let channel = Arc::clone(&channel);
                tasks.spawn(async move {
                    let outcome = relay.handle(channel.as_ref(), &msg).await;
                    tracing::debug!(message_id = %msg.id, ?outcome, "message handled");
                });
            }
            Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                if let Err(e) = joined {
                    tracing::error!(error = %e, "message task failed");
                }
            }
        }
    }

    rx.close();
    while let Some(joined) = tasks.join_next().await {
        if let Err(e) = joined {
            tracing::error!(error = %e, "message task failed");
        }
    }
}

/// Disconnect `channel` once no message task holds it
///
/// Returns whether the channel ended up disconnected.
pub async fn release_channel<C: Channel>(channel: Arc<C>) -> bool {
    match Arc::try_unwrap(channel) {
        Ok(mut channel) if channel.is_connected() => match channel.disconnect().await {
            Ok(()) => !channel.is_connected(),
            Err(e) => {
                tracing::warn!(channel = channel.name(), error = %e, "disconnect failed");
                false
            }
        },
        Ok(_) => {
            tracing::debug!("channel already disconnected");
            true
        }
        Err(_) => {
            tracing::warn!("channel still in use at shutdown");
            false
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "could not listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}
