//! Error types for the chat relay

use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Result type alias for relay operations
pub type Result<T> = std::result::Result<T, Error>;

/// Store operation that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOp {
    Connect,
    Append,
    Fetch,
    Close,
}

impl StoreOp {
    /// Operation name as it appears in logs and error messages
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Connect => "connect",
            Self::Append => "append",
            Self::Fetch => "fetch",
            Self::Close => "close",
        }
    }
}

impl fmt::Display for StoreOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that can occur in the chat relay
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Store could not be reached after exhausting connection attempts
    #[error("store unavailable after {attempts} attempts: {message}")]
    StoreUnavailable { attempts: u32, message: String },

    /// A store operation failed
    #[error("store {op} failed: {message}")]
    Store { op: StoreOp, message: String },

    /// A store operation exceeded its time bound
    #[error("store {op} timed out after {timeout:?}")]
    StoreTimeout { op: StoreOp, timeout: Duration },

    /// Resource not found
    #[error("not found: {0}")]
    NotFound(String),

    /// Channel error
    #[error("channel error: {0}")]
    Channel(String),

    /// Assistant API error
    #[error("assistant error: {0}")]
    Assistant(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Wrap an underlying storage fault, naming the operation that hit it
    pub(crate) fn store(op: StoreOp, err: impl fmt::Display) -> Self {
        Self::Store {
            op,
            message: err.to_string(),
        }
    }

    /// Whether this is a `NotFound`
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_error_names_operation() {
        let err = Error::store(StoreOp::Append, "disk I/O error");
        assert_eq!(err.to_string(), "store append failed: disk I/O error");

        let err = Error::store(StoreOp::Fetch, "no such table");
        assert_eq!(err.to_string(), "store fetch failed: no such table");
    }

    #[test]
    fn timeout_message_includes_bound() {
        let err = Error::StoreTimeout {
            op: StoreOp::Fetch,
            timeout: Duration::from_secs(5),
        };
        assert_eq!(err.to_string(), "store fetch timed out after 5s");
    }
}
