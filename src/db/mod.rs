//! Storage connector for conversation persistence
//!
//! Owns the pooled `SQLite` connection. The pool is created once by
//! [`StoreConnector::connect`], handed to [`ConversationStore`], and released
//! by [`StoreConnector::close`] at shutdown.

pub mod conversation;
mod schema;

use std::time::Duration;

use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;

use crate::config::{StoreConfig, StoreTarget};
use crate::error::StoreOp;
use crate::{Error, Result};

pub use conversation::ConversationStore;
pub use schema::SCHEMA_VERSION;

/// Database connection pool
pub type DbPool = Pool<SqliteConnectionManager>;

/// Pooled database connection
pub type DbConn = PooledConnection<SqliteConnectionManager>;

/// How long a connection waits on a locked database before failing
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Manages the lifetime of the store's connection pool
pub struct StoreConnector {
    config: StoreConfig,
    pool: Option<DbPool>,
}

impl StoreConnector {
    /// Create a connector; no connection is made until [`Self::connect`]
    #[must_use]
    pub const fn new(config: StoreConfig) -> Self {
        Self { config, pool: None }
    }

    /// Open the pool and initialize the schema, retrying on failure
    ///
    /// Calling this when already connected is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `StoreUnavailable` once every attempt has failed
    pub async fn connect(&mut self) -> Result<()> {
        if self.pool.is_some() {
            tracing::debug!("store already connected");
            return Ok(());
        }

        let attempts = self.config.connect_attempts.max(1);
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            let config = self.config.clone();
            match tokio::task::spawn_blocking(move || open_pool(&config)).await {
                Ok(Ok(pool)) => {
                    tracing::info!(
                        store = %self.config.target,
                        pool_size = self.config.pool_size,
                        version = SCHEMA_VERSION,
                        "store connected"
                    );
                    self.pool = Some(pool);
                    return Ok(());
                }
                Ok(Err(e)) => last_error = e.to_string(),
                Err(e) => last_error = e.to_string(),
            }

            tracing::warn!(attempt, attempts, error = %last_error, "store connection failed");

            if attempt < attempts {
                tokio::time::sleep(self.config.connect_delay).await;
            }
        }

        Err(Error::StoreUnavailable {
            attempts,
            message: last_error,
        })
    }

    /// Check if connected
    #[must_use]
    pub const fn is_connected(&self) -> bool {
        self.pool.is_some()
    }

    /// Conversation store backed by this connector's pool
    ///
    /// # Errors
    ///
    /// Returns error if [`Self::connect`] has not succeeded
    pub fn conversations(&self) -> Result<ConversationStore> {
        let pool = self.pool.clone().ok_or_else(|| Error::Store {
            op: StoreOp::Connect,
            message: "store not connected".to_string(),
        })?;
        Ok(ConversationStore::new(pool, self.config.op_timeout))
    }

    /// Flush and release the pool
    ///
    /// Stores handed out earlier keep their pool clone alive until dropped.
    ///
    /// # Errors
    ///
    /// Returns error if the final checkpoint fails
    pub async fn close(&mut self) -> Result<()> {
        let Some(pool) = self.pool.take() else {
            return Ok(());
        };

        let wal = matches!(self.config.target, StoreTarget::File(_));
        tokio::task::spawn_blocking(move || {
            if wal {
                let conn = pool.get().map_err(|e| Error::store(StoreOp::Close, e))?;
                conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")
                    .map_err(|e| Error::store(StoreOp::Close, e))?;
            }
            drop(pool);
            Ok::<_, Error>(())
        })
        .await
        .map_err(|e| Error::store(StoreOp::Close, e))??;

        tracing::info!("store closed");
        Ok(())
    }
}

/// Build the pool and run migrations
fn open_pool(config: &StoreConfig) -> Result<DbPool> {
    let (manager, max_size) = match &config.target {
        StoreTarget::File(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            let manager = SqliteConnectionManager::file(path).with_init(|conn| {
                conn.busy_timeout(BUSY_TIMEOUT)?;
                conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| {
                    row.get::<_, String>(0)
                })?;
                conn.pragma_update(None, "foreign_keys", "ON")
            });
            (manager, config.pool_size.max(1))
        }
        // Each in-memory connection is its own database, so share one
        StoreTarget::Memory => (SqliteConnectionManager::memory(), 1),
    };

    let pool = Pool::builder()
        .max_size(max_size)
        .connection_timeout(config.op_timeout)
        .build(manager)
        .map_err(|e| Error::store(StoreOp::Connect, e))?;

    let mut conn = pool.get().map_err(|e| Error::store(StoreOp::Connect, e))?;
    schema::init(&mut conn)?;

    Ok(pool)
}

/// Initialize an in-memory database (for testing)
///
/// # Errors
///
/// Returns error if database cannot be initialized
pub fn init_memory() -> Result<DbPool> {
    open_pool(&StoreConfig::memory())
}
