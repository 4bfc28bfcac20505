//! Relay orchestrator
//!
//! Turns one inbound message into one reply: load history, window it, build
//! the prompt, ask the assistant, reply, then record the exchange. History
//! and persistence failures degrade silently; the sender always gets a reply.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::assistant::Assistant;
use crate::channels::{Channel, IncomingMessage, OutgoingMessage};
use crate::db::ConversationStore;
use crate::history::{Entry, Identity, IdentityScope, WindowPolicy, render_prompt};

/// Reply sent when the assistant produced no answer
pub const FALLBACK_REPLY: &str = "I'm sorry, I couldn't process your request.";

/// What happened to an inbound message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayOutcome {
    /// Message was not eligible for a reply
    Skipped(SkipReason),
    /// A reply was attempted
    Replied {
        /// Whether the assistant answered (false means the fallback was sent)
        answered: bool,
        /// Whether the reply reached the channel
        delivered: bool,
        /// Whether the exchange was recorded
        persisted: bool,
    },
}

/// Why a message was skipped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Sent by the relay's own account
    SelfAuthored,
    /// Sent by another bot account
    Bot,
    /// No text content
    Empty,
}

/// Sequences history, assistant and persistence for each inbound message
pub struct Relay {
    store: ConversationStore,
    assistant: Arc<dyn Assistant>,
    window: WindowPolicy,
    identity_scope: IdentityScope,
}

impl Relay {
    /// Create a new relay
    #[must_use]
    pub fn new(
        store: ConversationStore,
        assistant: Arc<dyn Assistant>,
        window: WindowPolicy,
        identity_scope: IdentityScope,
    ) -> Self {
        Self {
            store,
            assistant,
            window,
            identity_scope,
        }
    }

    /// Handle one inbound message as of now
    pub async fn handle<C: Channel + ?Sized>(
        &self,
        channel: &C,
        msg: &IncomingMessage,
    ) -> RelayOutcome {
        self.handle_at(channel, msg, Utc::now()).await
    }

    /// Handle one inbound message as of `now`
    pub async fn handle_at<C: Channel + ?Sized>(
        &self,
        channel: &C,
        msg: &IncomingMessage,
        now: DateTime<Utc>,
    ) -> RelayOutcome {
        if let Some(reason) = skip_reason(channel, msg) {
            tracing::trace!(message_id = %msg.id, ?reason, "message skipped");
            return RelayOutcome::Skipped(reason);
        }

        let identity = self.identity_scope.identity(&msg.sender_id, &msg.channel_id);

        if let Err(e) = channel.send_typing(&msg.channel_id).await {
            tracing::debug!(error = %e, "typing indicator failed");
        }

        let context = self.load_context(&identity, now).await;
        let prompt = render_prompt(&context, &msg.content);
        tracing::debug!(
            identity = %identity,
            sender = %msg.sender_name,
            context_entries = context.len(),
            "prompt built"
        );

        let answer = match self.assistant.respond(&prompt).await {
            Ok(answer) => Some(answer),
            Err(e) => {
                tracing::error!(
                    assistant = self.assistant.name(),
                    error = %e,
                    "assistant call failed"
                );
                None
            }
        };

        let reply = OutgoingMessage::reply(
            msg.channel_id.clone(),
            answer.clone().unwrap_or_else(|| FALLBACK_REPLY.to_string()),
            msg.id.clone(),
        );
        let delivered = match channel.send(reply).await {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(channel = channel.name(), error = %e, "reply send failed");
                false
            }
        };

        // Only real answers become history; a fallback is not an exchange
        let persisted = match &answer {
            Some(answer) => self.record(&identity, &msg.content, answer, now).await,
            None => false,
        };

        RelayOutcome::Replied {
            answered: answer.is_some(),
            delivered,
            persisted,
        }
    }

    /// Windowed history for `identity`; empty when none exists or the store fails
    async fn load_context(&self, identity: &Identity, now: DateTime<Utc>) -> Vec<Entry> {
        match self.store.fetch(identity, None).await {
            Ok(document) => self.window.select(&document, now),
            Err(e) if e.is_not_found() => {
                tracing::debug!(identity = %identity, "no conversation history");
                Vec::new()
            }
            Err(e) => {
                tracing::warn!(identity = %identity, error = %e, "history unavailable, replying without context");
                Vec::new()
            }
        }
    }

    async fn record(
        &self,
        identity: &Identity,
        user_message: &str,
        bot_response: &str,
        now: DateTime<Utc>,
    ) -> bool {
        match self
            .store
            .append(identity, user_message, bot_response, now)
            .await
        {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(identity = %identity, error = %e, "failed to record exchange");
                false
            }
        }
    }
}

fn skip_reason<C: Channel + ?Sized>(channel: &C, msg: &IncomingMessage) -> Option<SkipReason> {
    if channel.self_id().is_some_and(|id| id == msg.sender_id) {
        Some(SkipReason::SelfAuthored)
    } else if msg.from_bot {
        Some(SkipReason::Bot)
    } else if msg.content.trim().is_empty() {
        Some(SkipReason::Empty)
    } else {
        None
    }
}
