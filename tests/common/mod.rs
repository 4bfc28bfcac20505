//! Shared test utilities

#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chat_relay::channels::{Channel, IncomingMessage, OutgoingMessage};
use chat_relay::config::{StoreConfig, StoreTarget};
use chat_relay::{Assistant, ConversationStore, DbPool, Error, Result, db};
use tokio::sync::Mutex;

/// Set up an in-memory test database
#[must_use]
pub fn setup_test_db() -> DbPool {
    db::init_memory().expect("failed to init test db")
}

/// Conversation store over an in-memory database
#[must_use]
pub fn setup_test_store() -> (DbPool, ConversationStore) {
    let pool = setup_test_db();
    let store = ConversationStore::new(pool.clone(), Duration::from_secs(5));
    (pool, store)
}

/// File-backed store config with production pool size and no retry delay
#[must_use]
pub fn file_store_config(path: &Path) -> StoreConfig {
    StoreConfig {
        target: StoreTarget::File(path.to_path_buf()),
        pool_size: 10,
        connect_attempts: 1,
        connect_delay: Duration::ZERO,
        op_timeout: Duration::from_secs(10),
    }
}

/// Build an inbound guild message
#[must_use]
pub fn incoming(id: &str, sender_id: &str, channel_id: &str, content: &str) -> IncomingMessage {
    IncomingMessage {
        id: id.to_string(),
        channel_id: channel_id.to_string(),
        sender_id: sender_id.to_string(),
        sender_name: format!("user-{sender_id}"),
        content: content.to_string(),
        is_dm: false,
        from_bot: false,
    }
}

/// Mock channel that records outgoing messages
#[derive(Default)]
pub struct MockChannel {
    connected: bool,
    self_id: Option<String>,
    fail_sends: bool,
    sent_messages: Arc<Mutex<Vec<OutgoingMessage>>>,
}

impl MockChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report `id` as the relay's own account
    pub fn with_self_id(mut self, id: &str) -> Self {
        self.self_id = Some(id.to_string());
        self
    }

    /// Make every send fail
    pub const fn failing(mut self) -> Self {
        self.fail_sends = true;
        self
    }

    pub async fn get_sent_messages(&self) -> Vec<OutgoingMessage> {
        self.sent_messages.lock().await.clone()
    }
}

#[async_trait]
impl Channel for MockChannel {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn connect(&mut self) -> Result<()> {
        self.connected = true;
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        self.connected = false;
        Ok(())
    }

    async fn send(&self, message: OutgoingMessage) -> Result<()> {
        if self.fail_sends {
            return Err(Error::Channel("send rejected".to_string()));
        }
        self.sent_messages.lock().await.push(message);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn self_id(&self) -> Option<String> {
        self.self_id.clone()
    }
}

/// Mock assistant that records prompts and answers from a fixed script
pub struct MockAssistant {
    reply: Option<String>,
    prompts: Mutex<Vec<String>>,
}

impl MockAssistant {
    /// Always answers with `reply`
    pub fn answering(reply: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: Some(reply.to_string()),
            prompts: Mutex::new(Vec::new()),
        })
    }

    /// Always fails
    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            reply: None,
            prompts: Mutex::new(Vec::new()),
        })
    }

    pub async fn prompts(&self) -> Vec<String> {
        self.prompts.lock().await.clone()
    }
}

#[async_trait]
impl Assistant for MockAssistant {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn respond(&self, prompt: &str) -> Result<String> {
        self.prompts.lock().await.push(prompt.to_string());
        self.reply
            .clone()
            .ok_or_else(|| Error::Assistant("assistant unavailable".to_string()))
    }
}
