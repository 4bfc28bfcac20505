//! Conversation history model
//!
//! A [`ConversationDocument`] is the aggregate persisted per [`Identity`]. Entries
//! are stored flat and exposed grouped into calendar-day [`DailyBucket`]s.

mod prompt;
mod window;

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::Error;

pub use prompt::render_prompt;
pub use window::{DEFAULT_HORIZON_DAYS, DEFAULT_MAX_ENTRIES, WindowPolicy, select_context};

/// Key under which history is grouped
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<String>,
}

impl Identity {
    /// Identity keyed by user only
    #[must_use]
    pub fn user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            channel_id: None,
        }
    }

    /// Identity keyed by user within a channel
    #[must_use]
    pub fn user_channel(user_id: impl Into<String>, channel_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            channel_id: Some(channel_id.into()),
        }
    }

    /// Channel component as stored; user-scoped identities use the empty string
    pub(crate) fn channel_key(&self) -> &str {
        self.channel_id.as_deref().unwrap_or("")
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.channel_id {
            Some(channel) => write!(f, "{}/{channel}", self.user_id),
            None => f.write_str(&self.user_id),
        }
    }
}

/// How inbound messages map to an [`Identity`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum IdentityScope {
    /// One history per user, shared across channels
    User,
    /// One history per user per channel
    #[default]
    UserChannel,
}

impl IdentityScope {
    /// Build the identity for a message author in a channel
    #[must_use]
    pub fn identity(self, user_id: &str, channel_id: &str) -> Identity {
        match self {
            Self::User => Identity::user(user_id),
            Self::UserChannel => Identity::user_channel(user_id, channel_id),
        }
    }
}

impl FromStr for IdentityScope {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "user" => Ok(Self::User),
            "user_channel" | "user-channel" => Ok(Self::UserChannel),
            other => Err(Error::Config(format!(
                "unknown identity scope '{other}' (expected 'user' or 'user_channel')"
            ))),
        }
    }
}

/// One recorded exchange
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entry {
    #[serde(default)]
    pub user_message: String,
    #[serde(default)]
    pub bot_response: String,
    pub timestamp: DateTime<Utc>,
}

impl Entry {
    #[must_use]
    pub fn new(
        user_message: impl Into<String>,
        bot_response: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            user_message: user_message.into(),
            bot_response: bot_response.into(),
            timestamp,
        }
    }

    /// Both sides of the exchange are present
    #[must_use]
    pub fn is_complete(&self) -> bool {
        !self.user_message.trim().is_empty() && !self.bot_response.trim().is_empty()
    }

    /// Calendar day (UTC) this entry belongs to
    #[must_use]
    pub fn day(&self) -> NaiveDate {
        day_of(self.timestamp)
    }
}

/// Calendar day (UTC) of a timestamp
#[must_use]
pub fn day_of(timestamp: DateTime<Utc>) -> NaiveDate {
    timestamp.date_naive()
}

/// Entries recorded on one calendar day, in arrival order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyBucket {
    pub date: NaiveDate,
    #[serde(default)]
    pub entries: Vec<Entry>,
}

/// All history recorded for one identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationDocument {
    pub identity: Identity,
    #[serde(default)]
    pub buckets: Vec<DailyBucket>,
}

impl ConversationDocument {
    /// Create an empty document
    #[must_use]
    pub const fn new(identity: Identity) -> Self {
        Self {
            identity,
            buckets: Vec::new(),
        }
    }

    /// Add an entry to its day's bucket, opening the bucket if needed
    pub fn push(&mut self, entry: Entry) {
        let day = entry.day();
        match self.buckets.iter_mut().rev().find(|b| b.date == day) {
            Some(bucket) => bucket.entries.push(entry),
            None => self.buckets.push(DailyBucket {
                date: day,
                entries: vec![entry],
            }),
        }
    }

    /// All entries in chronological order
    pub fn entries(&self) -> impl Iterator<Item = &Entry> {
        self.buckets.iter().flat_map(|b| b.entries.iter())
    }

    /// Number of stored entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.buckets.iter().map(|b| b.entries.len()).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
