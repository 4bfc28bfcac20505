//! Conversation store: append and fetch per-identity history
//!
//! Every operation checks a connection out of the pool on a blocking thread,
//! uses it, and returns it before completing. Operations are bounded by the
//! store timeout; a timed-out operation is reported but not cancelled.

use std::time::Duration;

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, TransactionBehavior, params};

use super::DbPool;
use crate::error::StoreOp;
use crate::history::{ConversationDocument, Entry, Identity, day_of};
use crate::{Error, Result};

/// Calendar day format for the `day` column
const DAY_FORMAT: &str = "%Y-%m-%d";

/// Store of conversation documents, one per identity
#[derive(Clone)]
pub struct ConversationStore {
    pool: DbPool,
    timeout: Duration,
}

impl ConversationStore {
    /// Create a new conversation store
    #[must_use]
    #[allow(clippy::missing_const_for_fn)]
    pub fn new(pool: DbPool, timeout: Duration) -> Self {
        Self { pool, timeout }
    }

    /// Record one exchange for `identity`
    ///
    /// Creates the identity's document on first use. Concurrent appends for
    /// the same identity are serialized by the database write lock.
    ///
    /// # Errors
    ///
    /// Returns `Store { op: Append, .. }` or `StoreTimeout` on failure
    pub async fn append(
        &self,
        identity: &Identity,
        user_message: &str,
        bot_response: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<()> {
        let identity = identity.clone();
        let entry = Entry::new(user_message, bot_response, timestamp);

        self.run(StoreOp::Append, move |conn| {
            append_entry(conn, &identity, &entry)
        })
        .await?;

        tracing::debug!(day = %day_of(timestamp), "conversation entry appended");
        Ok(())
    }

    /// Fetch the document for `identity`, optionally narrowed to one day
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the identity (or the requested day) has no
    /// history, `Store { op: Fetch, .. }` or `StoreTimeout` on failure
    pub async fn fetch(
        &self,
        identity: &Identity,
        day: Option<NaiveDate>,
    ) -> Result<ConversationDocument> {
        let identity = identity.clone();
        self.run(StoreOp::Fetch, move |conn| fetch_document(conn, identity, day))
            .await
    }

    async fn run<T, F>(&self, op: StoreOp, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
    {
        let pool = self.pool.clone();
        let task = tokio::task::spawn_blocking(move || {
            let mut conn = pool.get().map_err(|e| Error::store(op, e))?;
            f(&mut *conn)
        });

        match tokio::time::timeout(self.timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => Err(Error::store(op, e)),
            Err(_) => {
                tracing::warn!(
                    %op,
                    timeout_ms = self.timeout.as_millis(),
                    "store operation timed out; it may still complete in the background"
                );
                Err(Error::StoreTimeout {
                    op,
                    timeout: self.timeout,
                })
            }
        }
    }
}

/// Upsert the identity row and append the entry in one write transaction
fn append_entry(conn: &mut Connection, identity: &Identity, entry: &Entry) -> Result<()> {
    let timestamp = entry.timestamp.to_rfc3339_opts(SecondsFormat::Micros, true);
    let day = entry.day().format(DAY_FORMAT).to_string();

    // IMMEDIATE takes the write lock up front so two writers never both
    // observe "no document" for the same identity
    let tx = conn
        .transaction_with_behavior(TransactionBehavior::Immediate)
        .map_err(|e| Error::store(StoreOp::Append, e))?;

    let conversation_id: i64 = tx
        .query_row(
            "INSERT INTO conversations (user_id, channel_id, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?3)
             ON CONFLICT(user_id, channel_id) DO UPDATE SET updated_at = excluded.updated_at
             RETURNING id",
            params![identity.user_id, identity.channel_key(), timestamp],
            |row| row.get(0),
        )
        .map_err(|e| Error::store(StoreOp::Append, e))?;

    tx.execute(
        "INSERT INTO entries (conversation_id, day, user_message, bot_response, timestamp)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            conversation_id,
            day,
            entry.user_message,
            entry.bot_response,
            timestamp
        ],
    )
    .map_err(|e| Error::store(StoreOp::Append, e))?;

    tx.commit().map_err(|e| Error::store(StoreOp::Append, e))
}

/// Raw entry columns; text fields tolerate NULL from partially written rows
struct StoredEntry {
    user_message: Option<String>,
    bot_response: Option<String>,
    timestamp: String,
}

fn fetch_document(
    conn: &mut Connection,
    identity: Identity,
    day: Option<NaiveDate>,
) -> Result<ConversationDocument> {
    let conversation_id: Option<i64> = conn
        .query_row(
            "SELECT id FROM conversations WHERE user_id = ?1 AND channel_id = ?2",
            params![identity.user_id, identity.channel_key()],
            |row| row.get(0),
        )
        .optional()
        .map_err(|e| Error::store(StoreOp::Fetch, e))?;

    let Some(conversation_id) = conversation_id else {
        return Err(Error::NotFound(format!("conversation for {identity}")));
    };

    let day_filter = day.map(|d| d.format(DAY_FORMAT).to_string());
    let mut stmt = conn
        .prepare(
            "SELECT user_message, bot_response, timestamp FROM entries
             WHERE conversation_id = ?1 AND (?2 IS NULL OR day = ?2)
             ORDER BY id",
        )
        .map_err(|e| Error::store(StoreOp::Fetch, e))?;

    let rows = stmt
        .query_map(params![conversation_id, day_filter], |row| {
            Ok(StoredEntry {
                user_message: row.get(0)?,
                bot_response: row.get(1)?,
                timestamp: row.get(2)?,
            })
        })
        .map_err(|e| Error::store(StoreOp::Fetch, e))?;

    let mut document = ConversationDocument::new(identity);
    for row in rows {
        let stored = row.map_err(|e| Error::store(StoreOp::Fetch, e))?;
        let Ok(timestamp) = DateTime::parse_from_rfc3339(&stored.timestamp) else {
            tracing::warn!(
                identity = %document.identity,
                timestamp = %stored.timestamp,
                "skipping entry with unparseable timestamp"
            );
            continue;
        };

        document.push(Entry {
            user_message: stored.user_message.unwrap_or_default(),
            bot_response: stored.bot_response.unwrap_or_default(),
            timestamp: timestamp.with_timezone(&Utc),
        });
    }

    match day {
        Some(day) if document.is_empty() => Err(Error::NotFound(format!(
            "conversation for {} on {day}",
            document.identity
        ))),
        _ => Ok(document),
    }
}
