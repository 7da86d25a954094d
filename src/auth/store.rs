// Durable single-record credential storage backed by SQLite

use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use super::clock::{Clock, SystemClock};
use super::notifier::SignInNotifier;
use super::types::CredentialRecord;
use crate::error::{AuthError, Result};

/// Credential storage holding at most one token pair.
///
/// # Schema
/// ```sql
/// CREATE TABLE access (
///     id INTEGER PRIMARY KEY AUTOINCREMENT,
///     access_token TEXT,
///     refresh_token TEXT,
///     expires_in INTEGER      -- absolute expiry, epoch milliseconds
/// );
/// ```
///
/// Every successful [`write`](Self::write) wakes the waiters registered on
/// [`notifier`](Self::notifier).
///
/// Reads and writes are synchronous and block the calling thread (an async
/// worker, when called from the provider) for the duration of one small
/// transaction. Move them to `spawn_blocking` if the table ever grows.
pub struct CredentialStore {
    conn: Mutex<Connection>,
    clock: Arc<dyn Clock>,
    notifier: SignInNotifier,
}

impl CredentialStore {
    /// Open (or create) the store at `path`
    pub fn open(path: &Path) -> Result<Self> {
        tracing::info!("Opening credential store: {}", path.display());
        let conn = Connection::open(path)?;
        Self::from_connection(conn, Arc::new(SystemClock))
    }

    /// Non-durable store, mostly for tests
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?, Arc::new(SystemClock))
    }

    /// Wrap an already-open connection, creating the schema if missing
    pub fn from_connection(conn: Connection, clock: Arc<dyn Clock>) -> Result<Self> {
        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS access (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                access_token TEXT,
                refresh_token TEXT,
                expires_in INTEGER
            )
            "#,
            [],
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
            clock,
            notifier: SignInNotifier::new(),
        })
    }

    /// Close the underlying connection, flushing anything pending
    pub fn close(self) -> Result<()> {
        let conn = self.conn.into_inner().map_err(|_| AuthError::StorageLock)?;
        conn.close().map_err(|(_, e)| AuthError::Storage(e))?;
        tracing::debug!("Credential store closed");
        Ok(())
    }

    pub fn notifier(&self) -> &SignInNotifier {
        &self.notifier
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        self.clock.clone()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| AuthError::StorageLock)
    }

    /// Current token pair, or `None` when absent or only partially populated
    pub fn read(&self) -> Result<Option<CredentialRecord>> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                "SELECT id, access_token, refresh_token, expires_in FROM access ORDER BY id LIMIT 1",
                [],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, Option<String>>(1)?,
                        row.get::<_, Option<String>>(2)?,
                        row.get::<_, Option<i64>>(3)?,
                    ))
                },
            )
            .optional()?;

        let Some((id, access_token, refresh_token, expires_ms)) = row else {
            tracing::debug!("No credentials stored");
            return Ok(None);
        };

        let access_token = access_token.filter(|t| !t.is_empty());
        let refresh_token = refresh_token.filter(|t| !t.is_empty());
        let (Some(access_token), Some(refresh_token)) = (access_token, refresh_token) else {
            tracing::debug!(id, "Stored credentials are incomplete");
            return Ok(None);
        };

        Ok(Some(CredentialRecord {
            id,
            access_token,
            refresh_token,
            expires_at: expires_ms.and_then(DateTime::<Utc>::from_timestamp_millis),
        }))
    }

    /// Store a token pair issued now with the given lifetime.
    ///
    /// Creates the record when none exists, otherwise overwrites it in place
    /// keeping its `id`. Wakes every pending sign-in waiter afterwards.
    pub fn write(
        &self,
        access_token: &str,
        refresh_token: &str,
        lifetime_secs: u64,
    ) -> Result<()> {
        if access_token.is_empty() || refresh_token.is_empty() {
            return Err(AuthError::InvalidCredentials(
                "access and refresh tokens must not be empty".to_string(),
            ));
        }

        let expires_at = expiry_from_lifetime(self.clock.now(), lifetime_secs)?;
        let expires_ms = expires_at.timestamp_millis();

        {
            let mut conn = self.lock()?;
            let tx = conn.transaction()?;

            let existing: Option<i64> = tx
                .query_row("SELECT id FROM access ORDER BY id LIMIT 1", [], |row| {
                    row.get(0)
                })
                .optional()?;

            match existing {
                Some(id) => {
                    tx.execute(
                        "UPDATE access SET access_token = ?1, refresh_token = ?2, expires_in = ?3 WHERE id = ?4",
                        params![access_token, refresh_token, expires_ms, id],
                    )?;
                    tracing::debug!(id, "Updated stored credentials");
                }
                None => {
                    tx.execute(
                        "INSERT INTO access (access_token, refresh_token, expires_in) VALUES (?1, ?2, ?3)",
                        params![access_token, refresh_token, expires_ms],
                    )?;
                    tracing::debug!(id = tx.last_insert_rowid(), "Created stored credentials");
                }
            }

            tx.commit()?;

            // Still under the lock so waiters see writes in commit order
            self.notifier.notify(access_token);
        }

        tracing::info!("Credentials stored, expires: {}", expires_at.to_rfc3339());

        Ok(())
    }
}

/// Absolute expiry for a token issued at `issued_at`
fn expiry_from_lifetime(issued_at: DateTime<Utc>, lifetime_secs: u64) -> Result<DateTime<Utc>> {
    i64::try_from(lifetime_secs)
        .ok()
        .and_then(Duration::try_seconds)
        .and_then(|lifetime| issued_at.checked_add_signed(lifetime))
        .ok_or_else(|| {
            AuthError::InvalidCredentials(format!("token lifetime out of range: {}s", lifetime_secs))
        })
}
