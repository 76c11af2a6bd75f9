//! Tier 1: the platform secret store, through the `keyring` crate.

use keyring::Entry;
use keyring::credential::CredentialPersistence;

use super::{SecretBackend, Tier};
use crate::error::VaultError;
use crate::secret::Secret;

/// Stores secrets in the native keychain under a fixed service name.
#[derive(Debug, Clone)]
pub struct KeyringBackend {
    service: String,
}

impl KeyringBackend {
    /// Creates a backend storing entries under `service`.
    #[must_use]
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    /// Returns `true` when the platform store keeps entries until they are
    /// deleted, rather than only until logout or reboot.
    #[must_use]
    pub fn is_persistent() -> bool {
        matches!(
            keyring::default::default_credential_builder().persistence(),
            CredentialPersistence::UntilDelete
        )
    }

    /// Returns the service name entries are filed under.
    #[must_use]
    pub const fn service(&self) -> &str {
        self.service.as_str()
    }

    fn entry(&self, key: &str) -> Result<Entry, VaultError> {
        Entry::new(&self.service, key).map_err(|err| VaultError::backend(Tier::Keyring, err))
    }
}

impl SecretBackend for KeyringBackend {
    fn tier(&self) -> Tier {
        Tier::Keyring
    }

    fn store(&self, key: &str, secret: &Secret) -> Result<(), VaultError> {
        self.entry(key)?
            .set_password(secret.expose())
            .map_err(|err| VaultError::backend(Tier::Keyring, err))
    }

    fn get(&self, key: &str) -> Result<Option<Secret>, VaultError> {
        match self.entry(key)?.get_password() {
            Ok(secret) => Ok(Some(Secret::from(secret))),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(err) => Err(VaultError::backend(Tier::Keyring, err)),
        }
    }

    fn delete(&self, key: &str) -> Result<(), VaultError> {
        match self.entry(key)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(err) => Err(VaultError::backend(Tier::Keyring, err)),
        }
    }
}
