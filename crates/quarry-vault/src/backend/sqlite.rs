//! Tier 2: a durable key-to-secret table in a local SQLite file.
//!
//! All access goes through one connection behind a mutex, so there is never
//! more than one writer. On Unix the database file is created with mode
//! `0600` before SQLite opens it.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use rusqlite::{Connection, OptionalExtension, params};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use super::{SecretBackend, Tier};
use crate::error::VaultError;
use crate::secret::Secret;

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS credentials (
    key TEXT PRIMARY KEY NOT NULL,
    secret TEXT NOT NULL,
    updated_at TEXT NOT NULL
)";

const UPSERT: &str = "INSERT INTO credentials (key, secret, updated_at) VALUES (?1, ?2, ?3)
    ON CONFLICT(key) DO UPDATE SET secret = excluded.secret, updated_at = excluded.updated_at";

/// Stores secrets in a SQLite database file.
#[derive(Debug)]
pub struct SqliteBackend {
    path: PathBuf,
    connection: Mutex<Option<Connection>>,
}

impl SqliteBackend {
    /// Opens or creates the database at `path`, creating parent
    /// directories as needed.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Backend`] when the file cannot be created or
    /// the schema cannot be applied.
    pub fn open(location: impl Into<PathBuf>) -> Result<Self, VaultError> {
        let path: PathBuf = location.into();
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|err| VaultError::backend(Tier::Embedded, err))?;
        }
        restrict_permissions(&path)?;
        let connection =
            Connection::open(&path).map_err(|err| VaultError::backend(Tier::Embedded, err))?;
        connection
            .execute(SCHEMA, [])
            .map_err(|err| VaultError::backend(Tier::Embedded, err))?;
        Ok(Self {
            path,
            connection: Mutex::new(Some(connection)),
        })
    }

    /// Returns the database path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns every stored entry, ordered by key.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Backend`] when the table cannot be read.
    pub fn entries(&self) -> Result<Vec<(String, Secret)>, VaultError> {
        let rows = self.with_connection(|connection| {
            let mut statement =
                connection.prepare("SELECT key, secret FROM credentials ORDER BY key")?;
            let mapped = statement.query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?;
            let collected: rusqlite::Result<Vec<(String, String)>> = mapped.collect();
            collected
        })?;
        Ok(rows
            .into_iter()
            .map(|(key, secret)| (key, Secret::from(secret)))
            .collect())
    }

    fn with_connection<T>(
        &self,
        operation: impl FnOnce(&Connection) -> rusqlite::Result<T>,
    ) -> Result<T, VaultError> {
        let guard = self.lock()?;
        let connection = guard.as_ref().ok_or(VaultError::Closed)?;
        operation(connection).map_err(|err| VaultError::backend(Tier::Embedded, err))
    }

    fn lock(&self) -> Result<MutexGuard<'_, Option<Connection>>, VaultError> {
        self.connection.lock().map_err(|_| VaultError::Poisoned {
            tier: Tier::Embedded,
        })
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> Result<(), VaultError> {
    use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};

    fs::OpenOptions::new()
        .create(true)
        .append(true)
        .mode(0o600)
        .open(path)
        .and_then(|file| file.set_permissions(fs::Permissions::from_mode(0o600)))
        .map_err(|err| VaultError::backend(Tier::Embedded, err))
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> Result<(), VaultError> {
    Ok(())
}

fn timestamp() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_default()
}

impl SecretBackend for SqliteBackend {
    fn tier(&self) -> Tier {
        Tier::Embedded
    }

    fn store(&self, key: &str, secret: &Secret) -> Result<(), VaultError> {
        let updated_at = timestamp();
        self.with_connection(|connection| {
            connection.execute(UPSERT, params![key, secret.expose(), updated_at])
        })
        .map(drop)
    }

    fn get(&self, key: &str) -> Result<Option<Secret>, VaultError> {
        self.with_connection(|connection| {
            connection
                .query_row(
                    "SELECT secret FROM credentials WHERE key = ?1",
                    params![key],
                    |row| row.get::<_, String>(0),
                )
                .optional()
        })
        .map(|secret| secret.map(Secret::from))
    }

    fn delete(&self, key: &str) -> Result<(), VaultError> {
        self.with_connection(|connection| {
            connection.execute("DELETE FROM credentials WHERE key = ?1", params![key])
        })
        .map(drop)
    }

    fn close(&self) -> Result<(), VaultError> {
        let Some(connection) = self.lock()?.take() else {
            return Ok(());
        };
        connection
            .close()
            .map_err(|(_, err)| VaultError::backend(Tier::Embedded, err))
    }
}
