//! Login sessions: `tower-sessions` with records kept in the user database.
//!
//! The cookie carries only a random session id. The logged-in user lives in
//! the `sessions` table next to `users`, so removing a user can end their
//! sessions in the same transaction, and sessions idle for longer than the
//! configured timeout stop loading.

use crate::store::Role;
use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::StatusCode;
use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::fmt;
use time::OffsetDateTime;
use tokio_rusqlite::Connection;
use tower_sessions::cookie::SameSite;
use tower_sessions::session::{Id, Record};
use tower_sessions::session_store::{self, ExpiredDeletion, SessionStore};
use tower_sessions::{Expiry, Session, SessionManagerLayer};

pub use tower_sessions::session::Error as SessionError;

pub const SESSION_COOKIE: &str = "suspectsight_session";

/// Session key holding the [`SessionUser`]. `UserStore::remove_user` looks
/// sessions up by `$.user.username`.
pub(crate) const USER_KEY: &str = "user";

/// The logged-in user of a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionUser {
    pub username: String,
    pub role: Role,
}

/// Cookie and lifetime settings for dashboard sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSettings {
    /// A session not used for this long is gone.
    pub idle_timeout: time::Duration,
    /// Mark the cookie `Secure` (only sent over HTTPS).
    pub secure_cookie: bool,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            idle_timeout: time::Duration::minutes(30),
            secure_cookie: false,
        }
    }
}

/// Session middleware over `store`. Every response refreshes the idle timer.
pub fn session_layer(store: SqliteSessionStore, settings: SessionSettings) -> SessionManagerLayer<SqliteSessionStore> {
    SessionManagerLayer::new(store)
        .with_name(SESSION_COOKIE)
        .with_http_only(true)
        .with_same_site(SameSite::Lax)
        .with_secure(settings.secure_cookie)
        .with_always_save(true)
        .with_expiry(Expiry::OnInactivity(settings.idle_timeout))
}

/// Typed view of the request's session.
#[derive(Debug, Clone)]
pub struct SessionContext(Session);

impl SessionContext {
    pub fn new(session: Session) -> Self {
        Self(session)
    }

    /// The logged-in user, if any.
    pub async fn user(&self) -> Result<Option<SessionUser>, SessionError> {
        self.0.get(USER_KEY).await
    }

    /// Log `user` in under a fresh session id.
    pub async fn log_in(&self, user: &SessionUser) -> Result<(), SessionError> {
        self.0.cycle_id().await?;
        self.0.insert(USER_KEY, user).await
    }

    /// Drop the session from the store and expire the cookie.
    pub async fn log_out(&self) -> Result<(), SessionError> {
        self.0.flush().await
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for SessionContext
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        Session::from_request_parts(parts, state).await.map(Self)
    }
}

/// `tower-sessions` store over the `sessions` table.
#[derive(Clone)]
pub struct SqliteSessionStore {
    conn: Connection,
}

impl fmt::Debug for SqliteSessionStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqliteSessionStore").finish_non_exhaustive()
    }
}

fn backend(e: tokio_rusqlite::Error) -> session_store::Error {
    session_store::Error::Backend(e.to_string())
}

fn decode(e: impl fmt::Display) -> session_store::Error {
    session_store::Error::Decode(e.to_string())
}

/// Columns for a record: id, JSON data, expiry as unix seconds.
fn encode(record: &Record) -> session_store::Result<(String, String, i64)> {
    let data = serde_json::to_string(&record.data).map_err(|e| session_store::Error::Encode(e.to_string()))?;
    Ok((record.id.to_string(), data, record.expiry_date.unix_timestamp()))
}

impl SqliteSessionStore {
    pub(crate) fn new(conn: Connection) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl SessionStore for SqliteSessionStore {
    async fn create(&self, record: &mut Record) -> session_store::Result<()> {
        loop {
            let (id, data, expiry) = encode(record)?;
            let inserted = self
                .conn
                .call(move |c| {
                    Ok(c.execute(
                        "INSERT INTO sessions (id, data, expiry_date) VALUES (?1, ?2, ?3)
                         ON CONFLICT(id) DO NOTHING",
                        params![id, data, expiry],
                    )?)
                })
                .await
                .map_err(backend)?;
            if inserted == 1 {
                return Ok(());
            }
            record.id = Id::default();
        }
    }

    /// Only updates: a session deleted meanwhile (logout, user removed) stays deleted.
    async fn save(&self, record: &Record) -> session_store::Result<()> {
        let (id, data, expiry) = encode(record)?;
        self.conn
            .call(move |c| {
                Ok(c.execute(
                    "UPDATE sessions SET data = ?2, expiry_date = ?3 WHERE id = ?1",
                    params![id, data, expiry],
                )?)
            })
            .await
            .map_err(backend)?;
        Ok(())
    }

    async fn load(&self, id: &Id) -> session_store::Result<Option<Record>> {
        let key = id.to_string();
        let now = OffsetDateTime::now_utc().unix_timestamp();
        let row = self
            .conn
            .call(move |c| {
                Ok(c.query_row(
                    "SELECT data, expiry_date FROM sessions WHERE id = ?1 AND expiry_date > ?2",
                    params![key, now],
                    |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)),
                )
                .optional()?)
            })
            .await
            .map_err(backend)?;

        let Some((data, expiry)) = row else {
            return Ok(None);
        };
        Ok(Some(Record {
            id: *id,
            data: serde_json::from_str(&data).map_err(decode)?,
            expiry_date: OffsetDateTime::from_unix_timestamp(expiry).map_err(decode)?,
        }))
    }

    async fn delete(&self, id: &Id) -> session_store::Result<()> {
        let key = id.to_string();
        self.conn
            .call(move |c| Ok(c.execute("DELETE FROM sessions WHERE id = ?1", params![key])?))
            .await
            .map_err(backend)?;
        Ok(())
    }
}

#[async_trait]
impl ExpiredDeletion for SqliteSessionStore {
    async fn delete_expired(&self) -> session_store::Result<()> {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        let deleted = self
            .conn
            .call(move |c| Ok(c.execute("DELETE FROM sessions WHERE expiry_date <= ?1", params![now])?))
            .await
            .map_err(backend)?;
        if deleted > 0 {
            tracing::debug!(deleted, "expired sessions deleted");
        }
        Ok(())
    }
}

/// Purge expired sessions every `period` until the runtime shuts down.
pub fn spawn_expired_deletion(store: SqliteSessionStore, period: std::time::Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        loop {
            ticker.tick().await;
            if let Err(e) = store.delete_expired().await {
                tracing::warn!(error = %e, "failed to delete expired sessions");
            }
        }
    })
}
