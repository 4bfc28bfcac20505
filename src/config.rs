//! Configuration management for the chat relay
//!
//! All settings come from the environment. Required values fail fast; the
//! rest carry documented defaults. Parsing goes through a lookup function so
//! it can be exercised without touching the process environment.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use chrono::TimeDelta;
use secrecy::SecretString;

use crate::history::{IdentityScope, WindowPolicy};
use crate::history::{DEFAULT_HORIZON_DAYS, DEFAULT_MAX_ENTRIES};
use crate::{Error, Result};

/// Local development database path
pub const DEFAULT_DATABASE_PATH: &str = "data/chat-relay.db";

/// Default assistant API base URL
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Longest accepted history horizon, in days
pub const MAX_HORIZON_DAYS: i64 = 36_500;

/// Default chat completions model when no assistant is configured
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";

/// Chat relay configuration
#[derive(Debug)]
pub struct Config {
    /// Discord connection settings
    pub discord: DiscordConfig,

    /// Assistant API settings
    pub assistant: AssistantConfig,

    /// Store settings
    pub store: StoreConfig,

    /// History window bounds
    pub window: WindowPolicy,

    /// How messages map to history identities
    pub identity_scope: IdentityScope,
}

/// Discord channel configuration
#[derive(Debug)]
pub struct DiscordConfig {
    /// Bot token
    pub token: SecretString,

    /// Channels the bot answers in; empty means every channel
    pub channel_allowlist: Vec<String>,
}

/// Assistant API configuration
#[derive(Debug)]
pub struct AssistantConfig {
    /// `OpenAI` API key
    pub api_key: SecretString,

    /// Assistant to run; chat completions are used when unset
    pub assistant_id: Option<String>,

    /// Model for chat completions
    pub model: String,

    /// API base URL
    pub base_url: String,

    /// Delay between run status polls
    pub poll_interval: Duration,

    /// Upper bound on a single assistant call
    pub timeout: Duration,
}

/// Where the store keeps its data
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreTarget {
    /// `SQLite` database file
    File(PathBuf),
    /// Private in-memory database
    Memory,
}

impl fmt::Display for StoreTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File(path) => write!(f, "{}", path.display()),
            Self::Memory => f.write_str(":memory:"),
        }
    }
}

/// Store configuration
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Database location
    pub target: StoreTarget,

    /// Maximum pooled connections
    pub pool_size: u32,

    /// Connection attempts before giving up
    pub connect_attempts: u32,

    /// Delay between connection attempts
    pub connect_delay: Duration,

    /// Upper bound on a single store operation
    pub op_timeout: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            target: StoreTarget::File(PathBuf::from(DEFAULT_DATABASE_PATH)),
            pool_size: 10,
            connect_attempts: 5,
            connect_delay: Duration::from_secs(5),
            op_timeout: Duration::from_secs(5),
        }
    }
}

impl StoreConfig {
    /// In-memory store with default bounds (for testing and dry runs)
    #[must_use]
    pub fn memory() -> Self {
        Self {
            target: StoreTarget::Memory,
            ..Self::default()
        }
    }

    /// Load store settings from the environment
    ///
    /// # Errors
    ///
    /// Returns error if a present value fails to parse
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(&env_lookup)
    }

    /// Load store settings from a lookup function
    ///
    /// # Errors
    ///
    /// Returns error if a present value fails to parse
    pub fn from_lookup(lookup: &impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();

        let target = match optional(lookup, &["RELAY_DATABASE_PATH"]) {
            Some(path) if path == ":memory:" => StoreTarget::Memory,
            Some(path) => StoreTarget::File(PathBuf::from(path)),
            None => defaults.target,
        };

        Ok(Self {
            target,
            pool_size: parse_or(lookup, "RELAY_STORE_POOL_SIZE", defaults.pool_size)?,
            connect_attempts: parse_or(
                lookup,
                "RELAY_STORE_CONNECT_ATTEMPTS",
                defaults.connect_attempts,
            )?,
            connect_delay: secs_or(lookup, "RELAY_STORE_CONNECT_DELAY_SECS", defaults.connect_delay)?,
            op_timeout: positive_secs_or(lookup, "RELAY_STORE_TIMEOUT_SECS", defaults.op_timeout)?,
        })
    }
}

impl AssistantConfig {
    /// Load assistant settings from the environment
    ///
    /// # Errors
    ///
    /// Returns error if the API key is missing or a value fails to parse
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(&env_lookup)
    }

    /// Load assistant settings from a lookup function
    ///
    /// # Errors
    ///
    /// Returns error if the API key is missing or a value fails to parse
    pub fn from_lookup(lookup: &impl Fn(&str) -> Option<String>) -> Result<Self> {
        let api_key = required(lookup, &["OPENAI_API_KEY", "CHATGPT_API_KEY"])?;

        Ok(Self {
            api_key: SecretString::from(api_key),
            assistant_id: optional(lookup, &["OPENAI_ASSISTANT_ID", "ASSISTANT_KEY"]),
            model: optional(lookup, &["OPENAI_MODEL"])
                .unwrap_or_else(|| DEFAULT_OPENAI_MODEL.to_string()),
            base_url: optional(lookup, &["OPENAI_BASE_URL"])
                .map_or_else(
                    || DEFAULT_OPENAI_BASE_URL.to_string(),
                    |url| url.trim_end_matches('/').to_string(),
                ),
            poll_interval: Duration::from_millis(500),
            timeout: positive_secs_or(lookup, "ASSISTANT_TIMEOUT_SECS", Duration::from_secs(60))?,
        })
    }
}

impl Config {
    /// Load the full configuration from the environment
    ///
    /// # Errors
    ///
    /// Returns error if a required value is missing or any value fails to parse
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(&env_lookup)
    }

    /// Load the full configuration from a lookup function
    ///
    /// # Errors
    ///
    /// Returns error if a required value is missing or any value fails to parse
    pub fn from_lookup(lookup: &impl Fn(&str) -> Option<String>) -> Result<Self> {
        let token = required(lookup, &["DISCORD_TOKEN"])?;
        let channel_allowlist = optional(lookup, &["DISCORD_CHANNEL_IDS"])
            .map(|ids| {
                ids.split(',')
                    .map(str::trim)
                    .filter(|id| !id.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            discord: DiscordConfig {
                token: SecretString::from(token),
                channel_allowlist,
            },
            assistant: AssistantConfig::from_lookup(lookup)?,
            store: StoreConfig::from_lookup(lookup)?,
            window: WindowPolicy::from_lookup(lookup)?,
            identity_scope: optional(lookup, &["RELAY_IDENTITY_SCOPE"])
                .map(|s| s.parse())
                .transpose()?
                .unwrap_or_default(),
        })
    }
}

impl WindowPolicy {
    /// Load history window bounds from the environment
    ///
    /// # Errors
    ///
    /// Returns error if a present value fails to parse or the horizon is not positive
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(&env_lookup)
    }

    /// Load history window bounds from a lookup function
    ///
    /// # Errors
    ///
    /// Returns error if a present value fails to parse or the horizon is not positive
    pub fn from_lookup(lookup: &impl Fn(&str) -> Option<String>) -> Result<Self> {
        let days: i64 = parse_or(lookup, "RELAY_HISTORY_HORIZON_DAYS", DEFAULT_HORIZON_DAYS)?;
        let max_entries = parse_or(lookup, "RELAY_HISTORY_WINDOW", DEFAULT_MAX_ENTRIES)?;

        let horizon = Some(days)
            .filter(|d| (1..=MAX_HORIZON_DAYS).contains(d))
            .and_then(TimeDelta::try_days)
            .ok_or_else(|| {
                Error::Config(format!("RELAY_HISTORY_HORIZON_DAYS out of range: {days}"))
            })?;

        Ok(Self::new(horizon, max_entries))
    }
}

fn env_lookup(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

/// First non-empty value among `keys` (primary name first, then aliases)
fn optional(lookup: &impl Fn(&str) -> Option<String>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| lookup(key))
        .map(|v| v.trim().to_string())
        .find(|v| !v.is_empty())
}

fn required(lookup: &impl Fn(&str) -> Option<String>, keys: &[&str]) -> Result<String> {
    optional(lookup, keys).ok_or_else(|| Error::Config(format!("{} is not set", keys[0])))
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    optional(lookup, &[key]).map_or(Ok(default), |raw| {
        raw.parse()
            .map_err(|e| Error::Config(format!("invalid {key} '{raw}': {e}")))
    })
}

fn secs_or(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: Duration,
) -> Result<Duration> {
    parse_or(lookup, key, default.as_secs()).map(Duration::from_secs)
}

/// Like [`secs_or`], but a zero duration is rejected
fn positive_secs_or(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: Duration,
) -> Result<Duration> {
    let duration = secs_or(lookup, key, default)?;
    if duration.is_zero() {
        return Err(Error::Config(format!("{key} must be at least 1 second")));
    }
    Ok(duration)
}
