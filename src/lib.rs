//! Chat relay - forwards chat messages with recent history to an AI assistant
//!
//! Each inbound chat message is answered by an assistant that sees a bounded
//! window of the sender's earlier exchanges. Exchanges are persisted per
//! identity (user, optionally scoped to a channel).
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   IncomingMessage   ┌──────────────────────────────┐
//! │   Discord    │ ──────────────────▶ │            Relay             │
//! │   channel    │ ◀────────────────── │ fetch → window → prompt →    │
//! └──────────────┘       reply         │ assistant → reply → append   │
//!                                      └──────┬─────────────┬─────────┘
//!                                             │             │
//!                               ┌─────────────▼──┐   ┌──────▼────────┐
//!                               │ Conversation   │   │   Assistant   │
//!                               │ store (SQLite) │   │   (OpenAI)    │
//!                               └────────────────┘   └───────────────┘
//! ```

pub mod assistant;
pub mod channels;
pub mod config;
pub mod daemon;
pub mod db;
pub mod error;
pub mod history;
pub mod relay;

pub use assistant::Assistant;
pub use config::Config;
pub use daemon::Daemon;
pub use db::{ConversationStore, DbPool, StoreConnector};
pub use error::{Error, Result, StoreOp};
pub use history::{
    ConversationDocument, DailyBucket, Entry, Identity, IdentityScope, WindowPolicy,
    render_prompt, select_context,
};
pub use relay::{FALLBACK_REPLY, Relay, RelayOutcome, SkipReason};
