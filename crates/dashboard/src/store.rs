//! SQLite-backed user documents and their uploaded suspect records.
//!
//! Every mutation is a single statement so that "already exists" and
//! "not found" come from the database itself rather than a prior lookup.

use crate::session::SqliteSessionStore;
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use suspectsight_core::{Encoding, MatchSettings};
use thiserror::Error;
use tokio_rusqlite::Connection;

const SCHEMA: &str = "
    PRAGMA foreign_keys = ON;

    CREATE TABLE IF NOT EXISTS users (
        id            INTEGER PRIMARY KEY AUTOINCREMENT,
        username      TEXT NOT NULL UNIQUE,
        password_hash TEXT NOT NULL,
        role          TEXT NOT NULL,
        created_at    TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS images (
        id         INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id    INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        image_url  TEXT NOT NULL,
        name       TEXT NOT NULL,
        age        TEXT NOT NULL,
        place      TEXT NOT NULL,
        crime      TEXT NOT NULL,
        phone      TEXT NOT NULL,
        encoding   TEXT,
        created_at TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_images_user_id ON images(user_id);

    CREATE TABLE IF NOT EXISTS sessions (
        id          TEXT PRIMARY KEY,
        data        TEXT NOT NULL,
        expiry_date INTEGER NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_sessions_expiry_date ON sessions(expiry_date);
";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] tokio_rusqlite::Error),
    #[error("failed to create database directory: {0}")]
    Io(#[from] std::io::Error),
    #[error("stored encoding is malformed: {0}")]
    Encoding(#[from] serde_json::Error),
    #[error("stored timestamp is malformed: {0}")]
    Timestamp(#[from] chrono::ParseError),
    #[error("stored role is unknown: {0}")]
    Role(#[from] ParseRoleError),
}

/// Dashboard roles. Each sees exactly one screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    Officer,
    Admin,
    Administrator,
}

impl Role {
    /// Roles offered at signup.
    pub const ALL: [Role; 3] = [Role::Officer, Role::Admin, Role::Administrator];
    /// Roles an Administrator may create.
    pub const ASSIGNABLE: [Role; 2] = [Role::Officer, Role::Admin];

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Officer => "Officer",
            Role::Admin => "Admin",
            Role::Administrator => "Administrator",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown role {0:?}")]
pub struct ParseRoleError(String);

impl FromStr for Role {
    type Err = ParseRoleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::ALL
            .into_iter()
            .find(|role| role.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ParseRoleError(s.to_string()))
    }
}

/// Credentials and role of one user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    pub username: String,
    pub password_hash: String,
    pub role: Role,
}

/// One row of the Administrator's user list.
#[derive(Debug, Clone, PartialEq)]
pub struct UserSummary {
    pub username: String,
    pub role: Role,
    pub image_count: usize,
    pub created_at: DateTime<Utc>,
}

/// Free-text details entered alongside an uploaded photo.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ImageDetails {
    pub name: String,
    pub age: String,
    pub place: String,
    pub crime: String,
    pub phone: String,
}

/// A photo uploaded by an Admin. `encoding` is `None` when no face was found.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredImage {
    pub image_url: String,
    pub details: ImageDetails,
    pub encoding: Option<Encoding>,
}

/// A stored photo whose encoding matched a lookup.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageMatch {
    /// Username of the Admin who uploaded the photo.
    pub owner: String,
    pub image: StoredImage,
    pub similarity: f32,
}

/// Handle to the user database. Clones share one connection thread.
#[derive(Clone)]
pub struct UserStore {
    conn: Connection,
}

impl UserStore {
    /// Open (creating if needed) the database at `path`.
    pub async fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path).await?;
        Self::init(conn).await
    }

    pub async fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().await?;
        Self::init(conn).await
    }

    async fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.call(|c| Ok(c.execute_batch(SCHEMA)?)).await?;
        tracing::debug!("user store ready");
        Ok(Self { conn })
    }

    /// Login sessions kept in the same database.
    pub fn sessions(&self) -> SqliteSessionStore {
        SqliteSessionStore::new(self.conn.clone())
    }

    #[cfg(test)]
    pub(crate) fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Insert a user unless the username is taken. Returns whether it was inserted.
    pub async fn insert_user(&self, username: &str, password_hash: &str, role: Role) -> Result<bool, StoreError> {
        let username = username.to_string();
        let password_hash = password_hash.to_string();
        let created_at = Utc::now().to_rfc3339();

        let inserted = self
            .conn
            .call(move |c| {
                Ok(c.execute(
                    "INSERT INTO users (username, password_hash, role, created_at)
                     VALUES (?1, ?2, ?3, ?4)
                     ON CONFLICT(username) DO NOTHING",
                    params![username, password_hash, role.as_str(), created_at],
                )?)
            })
            .await?;
        Ok(inserted == 1)
    }

    pub async fn find_user(&self, username: &str) -> Result<Option<UserRecord>, StoreError> {
        let username = username.to_string();
        let row = self
            .conn
            .call(move |c| {
                Ok(c.query_row(
                    "SELECT username, password_hash, role FROM users WHERE username = ?1",
                    params![username],
                    |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?, row.get::<_, String>(2)?)),
                )
                .optional()?)
            })
            .await?;

        row.map(|(username, password_hash, role)| {
            Ok(UserRecord {
                username,
                password_hash,
                role: role.parse()?,
            })
        })
        .transpose()
    }

    /// Delete a user, their images (by cascade) and their sessions.
    /// Returns whether a user was deleted.
    pub async fn remove_user(&self, username: &str) -> Result<bool, StoreError> {
        let username = username.to_string();
        let (deleted, ended) = self
            .conn
            .call(move |c| {
                let tx = c.transaction()?;
                let deleted = tx.execute("DELETE FROM users WHERE username = ?1", params![username])?;
                let ended = if deleted > 0 {
                    tx.execute(
                        "DELETE FROM sessions WHERE json_extract(data, '$.user.username') = ?1",
                        params![username],
                    )?
                } else {
                    0
                };
                tx.commit()?;
                Ok((deleted, ended))
            })
            .await?;
        if deleted > 0 {
            tracing::debug!(ended, "sessions of removed user deleted");
        }
        Ok(deleted > 0)
    }

    /// Append a photo to `username`'s document. Returns `false` if the user does not exist.
    pub async fn append_image(&self, username: &str, image: StoredImage) -> Result<bool, StoreError> {
        let username = username.to_string();
        let encoding = image.encoding.as_ref().map(serde_json::to_string).transpose()?;
        let created_at = Utc::now().to_rfc3339();
        let StoredImage { image_url, details, .. } = image;

        let inserted = self
            .conn
            .call(move |c| {
                Ok(c.execute(
                    "INSERT INTO images (user_id, image_url, name, age, place, crime, phone, encoding, created_at)
                     SELECT id, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9 FROM users WHERE username = ?1",
                    params![
                        username,
                        image_url,
                        details.name,
                        details.age,
                        details.place,
                        details.crime,
                        details.phone,
                        encoding,
                        created_at
                    ],
                )?)
            })
            .await?;
        Ok(inserted == 1)
    }

    /// All users in signup order.
    pub async fn list_users(&self) -> Result<Vec<UserSummary>, StoreError> {
        let rows = self
            .conn
            .call(|c| {
                let mut stmt = c.prepare(
                    "SELECT u.username, u.role, u.created_at, COUNT(i.id)
                     FROM users u LEFT JOIN images i ON i.user_id = u.id
                     GROUP BY u.id ORDER BY u.id",
                )?;
                let rows = stmt
                    .query_map([], |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, String>(1)?,
                            row.get::<_, String>(2)?,
                            row.get::<_, i64>(3)?,
                        ))
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await?;

        rows.into_iter()
            .map(|(username, role, created_at, count)| {
                Ok(UserSummary {
                    username,
                    role: role.parse()?,
                    image_count: usize::try_from(count).unwrap_or(0),
                    created_at: DateTime::parse_from_rfc3339(&created_at)?.with_timezone(&Utc),
                })
            })
            .collect()
    }

    /// Every stored photo with its owner, users in signup order and each
    /// user's photos in upload order.
    pub async fn images(&self) -> Result<Vec<(String, StoredImage)>, StoreError> {
        let rows = self
            .conn
            .call(|c| {
                let mut stmt = c.prepare(
                    "SELECT u.username, i.image_url, i.name, i.age, i.place, i.crime, i.phone, i.encoding
                     FROM images i JOIN users u ON u.id = i.user_id
                     ORDER BY u.id, i.id",
                )?;
                let rows = stmt
                    .query_map([], |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, String>(1)?,
                            ImageDetails {
                                name: row.get(2)?,
                                age: row.get(3)?,
                                place: row.get(4)?,
                                crime: row.get(5)?,
                                phone: row.get(6)?,
                            },
                            row.get::<_, Option<String>>(7)?,
                        ))
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await?;

        rows.into_iter()
            .map(|(owner, image_url, details, encoding)| {
                let encoding = encoding.as_deref().map(serde_json::from_str).transpose()?;
                Ok((
                    owner,
                    StoredImage {
                        image_url,
                        details,
                        encoding,
                    },
                ))
            })
            .collect()
    }

    /// Scan every stored encoding and pick a match for `probe` per `settings`.
    /// Photos stored without an encoding are never candidates.
    pub async fn find_matching_image(
        &self,
        probe: &Encoding,
        settings: MatchSettings,
    ) -> Result<Option<ImageMatch>, StoreError> {
        let candidates: Vec<(String, StoredImage)> = self
            .images()
            .await?
            .into_iter()
            .filter(|(_, image)| image.encoding.is_some())
            .collect();

        let selection = settings.policy.select(
            probe,
            candidates.iter().filter_map(|(_, image)| image.encoding.as_ref()),
            settings.threshold,
        );

        Ok(selection.and_then(|s| {
            candidates
                .into_iter()
                .nth(s.index)
                .map(|(owner, image)| ImageMatch {
                    owner,
                    image,
                    similarity: s.similarity,
                })
        }))
    }
}
