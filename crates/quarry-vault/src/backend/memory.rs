//! Tier 3: a process-local map.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::{SecretBackend, Tier};
use crate::error::VaultError;
use crate::secret::Secret;

/// Keeps secrets in memory for the life of the process.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    secrets: RwLock<HashMap<String, Secret>>,
}

impl MemoryBackend {
    /// Creates an empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, HashMap<String, Secret>>, VaultError> {
        self.secrets.read().map_err(|_| VaultError::Poisoned {
            tier: Tier::Memory,
        })
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, HashMap<String, Secret>>, VaultError> {
        self.secrets.write().map_err(|_| VaultError::Poisoned {
            tier: Tier::Memory,
        })
    }
}

impl SecretBackend for MemoryBackend {
    fn tier(&self) -> Tier {
        Tier::Memory
    }

    fn store(&self, key: &str, secret: &Secret) -> Result<(), VaultError> {
        self.write()?.insert(key.to_owned(), secret.clone());
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<Secret>, VaultError> {
        Ok(self.read()?.get(key).cloned())
    }

    fn delete(&self, key: &str) -> Result<(), VaultError> {
        self.write()?.remove(key);
        Ok(())
    }
}
