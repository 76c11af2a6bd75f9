//! Secret storage backends, one per tier.

use std::fmt;

use crate::error::VaultError;
use crate::secret::Secret;

mod memory;
mod native;
mod sqlite;

pub use self::memory::MemoryBackend;
pub use self::native::KeyringBackend;
pub use self::sqlite::SqliteBackend;

/// The vault's storage tiers, strongest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tier {
    /// The platform's native secret store.
    Keyring,
    /// A durable key-to-secret table in a local SQLite file.
    Embedded,
    /// A process-local map, lost on restart.
    Memory,
}

impl Tier {
    /// Returns a stable identifier for logging and display.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Keyring => "keyring",
            Self::Embedded => "embedded",
            Self::Memory => "memory",
        }
    }

    /// Returns `true` when secrets survive a process restart.
    #[must_use]
    pub const fn is_durable(self) -> bool {
        !matches!(self, Self::Memory)
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A place secrets can be kept.
///
/// Keys reaching a backend are never empty; the vault rejects them first.
pub trait SecretBackend: Send + Sync {
    /// Returns the tier this backend implements.
    fn tier(&self) -> Tier;

    /// Stores `secret` under `key`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Backend`] when the store rejects the write.
    fn store(&self, key: &str, secret: &Secret) -> Result<(), VaultError>;

    /// Fetches the secret under `key`, or `None` when absent.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Backend`] when the store cannot be read.
    fn get(&self, key: &str) -> Result<Option<Secret>, VaultError>;

    /// Removes the secret under `key`. Removing an absent key succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Backend`] when the store rejects the removal.
    fn delete(&self, key: &str) -> Result<(), VaultError>;

    /// Releases any open handle. Called at most once.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Backend`] when the handle fails to close.
    fn close(&self) -> Result<(), VaultError> {
        Ok(())
    }
}
