//! Discord channel adapter using serenity

use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serenity::Client;
use serenity::all::{
    ChannelId, Context, CreateMessage, EventHandler, GatewayIntents, Message, MessageId, Ready,
    ShardManager,
};
use tokio::sync::mpsc;

use super::{Channel, IncomingMessage, OutgoingMessage, chunk_text};
use crate::{Error, Result};

/// Discord's per-message character limit
const MESSAGE_LIMIT: usize = 2000;

/// Discord channel adapter
pub struct DiscordChannel {
    token: SecretString,
    allowlist: Arc<Vec<String>>,
    message_tx: Option<mpsc::Sender<IncomingMessage>>,
    http: Option<Arc<serenity::http::Http>>,
    shard_manager: Option<Arc<ShardManager>>,
    self_id: Arc<OnceLock<String>>,
    connected: bool,
}

impl DiscordChannel {
    /// Create with a message receiver
    ///
    /// Returns the channel and a receiver for incoming messages. When
    /// `allowlist` is non-empty only those channels (plus DMs) are forwarded.
    #[must_use]
    pub fn with_receiver(
        token: SecretString,
        allowlist: Vec<String>,
    ) -> (Self, mpsc::Receiver<IncomingMessage>) {
        let (tx, rx) = mpsc::channel(100);
        let channel = Self {
            token,
            allowlist: Arc::new(allowlist),
            message_tx: Some(tx),
            http: None,
            shard_manager: None,
            self_id: Arc::new(OnceLock::new()),
            connected: false,
        };
        (channel, rx)
    }

    fn http(&self) -> Result<&Arc<serenity::http::Http>> {
        self.http
            .as_ref()
            .ok_or_else(|| Error::Channel("Discord not connected".to_string()))
    }
}

#[async_trait]
impl Channel for DiscordChannel {
    fn name(&self) -> &'static str {
        "discord"
    }

    async fn connect(&mut self) -> Result<()> {
        if self.connected {
            return Ok(());
        }

        let intents = GatewayIntents::GUILD_MESSAGES
            | GatewayIntents::DIRECT_MESSAGES
            | GatewayIntents::MESSAGE_CONTENT;

        let handler = DiscordHandler {
            message_tx: self.message_tx.clone(),
            allowlist: Arc::clone(&self.allowlist),
            self_id: Arc::clone(&self.self_id),
        };

        let mut client = Client::builder(self.token.expose_secret(), intents)
            .event_handler(handler)
            .await
            .map_err(|e| Error::Channel(format!("Discord client error: {e}")))?;

        self.http = Some(client.http.clone());
        self.shard_manager = Some(client.shard_manager.clone());

        // Spawn the client in a background task
        tokio::spawn(async move {
            if let Err(e) = client.start().await {
                tracing::error!(error = %e, "Discord client error");
            }
        });

        self.connected = true;
        tracing::info!("Discord channel connected");

        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        if let Some(shard_manager) = self.shard_manager.take() {
            shard_manager.shutdown_all().await;
        }
        self.connected = false;
        tracing::info!("Discord channel disconnected");
        Ok(())
    }

    async fn send(&self, message: OutgoingMessage) -> Result<()> {
        let http = self.http()?;

        let channel_id: u64 = message
            .channel_id
            .parse()
            .map_err(|_| Error::Channel("Invalid channel ID".to_string()))?;
        let channel = ChannelId::new(channel_id);

        let reply_to = message
            .reply_to
            .as_deref()
            .and_then(|id| id.parse::<u64>().ok())
            .map(MessageId::new);

        for (i, chunk) in chunk_text(&message.content, MESSAGE_LIMIT)
            .into_iter()
            .enumerate()
        {
            let mut builder = CreateMessage::new().content(chunk);
            // Only the first chunk carries the reply reference
            if let (0, Some(reply_to)) = (i, reply_to) {
                builder = builder.reference_message((channel, reply_to));
            }

            channel
                .send_message(http, builder)
                .await
                .map_err(|e| Error::Channel(format!("Discord send error: {e}")))?;
        }

        tracing::debug!(channel_id = %message.channel_id, "Discord message sent");
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn self_id(&self) -> Option<String> {
        self.self_id.get().cloned()
    }

    async fn send_typing(&self, channel_id: &str) -> Result<()> {
        let http = self.http()?;

        let id: u64 = channel_id
            .parse()
            .map_err(|_| Error::Channel("Invalid channel ID".to_string()))?;

        ChannelId::new(id)
            .broadcast_typing(http)
            .await
            .map_err(|e| Error::Channel(format!("Discord typing error: {e}")))?;

        tracing::debug!(channel_id, "Discord typing indicator sent");
        Ok(())
    }
}

/// Whether a message in `channel_id` should be forwarded
fn is_allowed(allowlist: &[String], channel_id: &str, is_dm: bool) -> bool {
    is_dm || allowlist.is_empty() || allowlist.iter().any(|id| id == channel_id)
}

/// Discord event handler
struct DiscordHandler {
    message_tx: Option<mpsc::Sender<IncomingMessage>>,
    allowlist: Arc<Vec<String>>,
    self_id: Arc<OnceLock<String>>,
}

#[async_trait]
impl EventHandler for DiscordHandler {
    async fn ready(&self, _ctx: Context, ready: Ready) {
        let _ = self.self_id.set(ready.user.id.to_string());
        tracing::info!(user = %ready.user.name, "Discord bot ready");
    }

    async fn message(&self, _ctx: Context, msg: Message) {
        let is_dm = msg.guild_id.is_none();
        let channel_id = msg.channel_id.to_string();

        if !is_allowed(&self.allowlist, &channel_id, is_dm) {
            return;
        }

        let incoming = IncomingMessage {
            id: msg.id.to_string(),
            channel_id,
            sender_id: msg.author.id.to_string(),
            sender_name: msg.author.name.clone(),
            content: msg.content.clone(),
            is_dm,
            from_bot: msg.author.bot,
        };

        if let Some(tx) = &self.message_tx
            && let Err(e) = tx.send(incoming).await
        {
            tracing::warn!(error = %e, "Failed to forward Discord message");
        }

        tracing::debug!(
            author = %msg.author.name,
            is_dm,
            "Discord message received"
        );
    }
}
