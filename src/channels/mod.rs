//! Messaging channel adapters
//!
//! A channel delivers inbound messages over an mpsc receiver and accepts
//! replies through the `Channel` trait.

mod chunking;
mod discord;

use async_trait::async_trait;

pub use chunking::chunk_text;
pub use discord::DiscordChannel;

use crate::Result;

/// A message from a channel
#[derive(Debug, Clone)]
pub struct IncomingMessage {
    /// Message identifier (platform-specific)
    pub id: String,

    /// Channel identifier
    pub channel_id: String,

    /// Sender identifier
    pub sender_id: String,

    /// Sender display name
    pub sender_name: String,

    /// Message content
    pub content: String,

    /// Whether this is a direct message
    pub is_dm: bool,

    /// Whether the sender is a bot account
    pub from_bot: bool,
}

/// A message to send to a channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage {
    /// Channel identifier
    pub channel_id: String,

    /// Message content
    pub content: String,

    /// Optional reply-to message ID
    pub reply_to: Option<String>,
}

impl OutgoingMessage {
    /// Create a `reply` message
    #[must_use]
    pub const fn reply(channel_id: String, content: String, reply_to: String) -> Self {
        Self {
            channel_id,
            content,
            reply_to: Some(reply_to),
        }
    }
}

/// Trait for messaging channel adapters
#[async_trait]
pub trait Channel: Send + Sync {
    /// Get the channel name
    fn name(&self) -> &'static str;

    /// Connect to the channel
    async fn connect(&mut self) -> Result<()>;

    /// Disconnect from the channel
    async fn disconnect(&mut self) -> Result<()>;

    /// Send a message
    async fn send(&self, message: OutgoingMessage) -> Result<()>;

    /// Check if connected
    fn is_connected(&self) -> bool;

    /// Platform user ID of the relay's own account, once known
    fn self_id(&self) -> Option<String> {
        None
    }

    /// Send typing indicator to show the bot is processing
    ///
    /// Default implementation is a no-op for channels that don't support typing
    async fn send_typing(&self, _channel_id: &str) -> Result<()> {
        Ok(())
    }
}
