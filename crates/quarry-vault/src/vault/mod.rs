//! The tiered vault and its backend selection policy.

use std::iter;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use time::OffsetDateTime;
use tracing::{debug, info, warn};

use crate::backend::{KeyringBackend, MemoryBackend, SecretBackend, SqliteBackend, Tier};
use crate::error::VaultError;
use crate::secret::Secret;

/// Tracing target for vault operations.
const VAULT_TARGET: &str = "quarry_vault";

/// Key used for the construction-time round trip.
const SENTINEL_KEY: &str = "__quarry_vault_probe__";

/// Where a vault may keep its secrets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VaultOptions {
    /// Service name for native keychain entries.
    pub service: String,
    /// Path of the embedded database used when the keychain is unusable.
    pub path: PathBuf,
    /// Whether the native keychain may be tried at all.
    pub keyring: bool,
}

impl VaultOptions {
    /// Creates options for the given keychain service and database path.
    #[must_use]
    pub fn new(service: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            service: service.into(),
            path: path.into(),
            keyring: true,
        }
    }

    /// Starts the vault at the embedded database, never touching the
    /// native keychain.
    #[must_use]
    pub const fn without_keyring(mut self) -> Self {
        self.keyring = false;
        self
    }
}

/// A candidate backend offered to [`Vault::with_backends`].
pub type Candidate = Result<Box<dyn SecretBackend>, VaultError>;

/// Tiered credential store.
///
/// The backend is chosen once, at construction, and kept for the vault's
/// lifetime: candidates are tried in order, each must complete a
/// write/read/delete round trip of a sentinel key, and the first that does
/// is committed. When none does, secrets are kept in memory. Later
/// failures of the committed backend are reported, never routed to another
/// tier, so one vault never splits its secrets across stores.
pub struct Vault {
    backend: Box<dyn SecretBackend>,
    closed: AtomicBool,
}

impl Vault {
    /// Opens a vault, preferring the native keychain, then the embedded
    /// database, then memory.
    ///
    /// The keychain is skipped when [`VaultOptions::keyring`] is off or the
    /// platform store does not outlive a reboot. When the keychain is
    /// committed, entries left in the embedded database by earlier runs are
    /// moved into it, so a secret stored while the keychain was unusable is
    /// still found once it recovers.
    #[must_use]
    pub fn open(options: &VaultOptions) -> Self {
        let persistent = options.keyring && KeyringBackend::is_persistent();
        if options.keyring && !persistent {
            warn!(
                target: VAULT_TARGET,
                "platform keychain does not persist across restarts; skipping it"
            );
        }
        let native = persistent.then_some(|| -> Candidate {
            Ok(Box::new(KeyringBackend::new(&options.service)))
        });
        Self::open_with(options, native)
    }

    pub(crate) fn open_with<F>(options: &VaultOptions, native: Option<F>) -> Self
    where
        F: FnOnce() -> Candidate,
    {
        let embedded = iter::once_with(|| {
            SqliteBackend::open(&options.path)
                .map(|backend| Box::new(backend) as Box<dyn SecretBackend>)
        });
        let vault = Self::with_backends(native.map(|open| open()).into_iter().chain(embedded));
        if vault.tier() == Tier::Keyring {
            vault.absorb_embedded(&options.path);
        }
        vault
    }

    /// Commits to the first candidate that opens and passes the sentinel
    /// round trip, falling back to memory.
    ///
    /// Candidates are consumed lazily, so later ones are not opened once
    /// one is committed.
    #[must_use]
    pub fn with_backends(candidates: impl IntoIterator<Item = Candidate>) -> Self {
        for candidate in candidates {
            let backend = match candidate {
                Ok(backend) => backend,
                Err(err) => {
                    warn!(target: VAULT_TARGET, error = %err, "credential backend unavailable");
                    continue;
                }
            };
            match round_trip(backend.as_ref()) {
                Ok(()) => return Self::commit(backend),
                Err(err) => {
                    warn!(
                        target: VAULT_TARGET,
                        tier = %backend.tier(),
                        error = %err,
                        "credential backend failed its probe"
                    );
                    if let Err(close_err) = backend.close() {
                        debug!(target: VAULT_TARGET, error = %close_err, "close failed");
                    }
                }
            }
        }
        Self::commit(Box::new(MemoryBackend::new()))
    }

    fn commit(backend: Box<dyn SecretBackend>) -> Self {
        let tier = backend.tier();
        if tier.is_durable() {
            info!(target: VAULT_TARGET, %tier, "credential vault committed");
        } else {
            warn!(
                target: VAULT_TARGET,
                %tier,
                "credential vault committed to memory; secrets will not survive a restart"
            );
        }
        Self {
            backend,
            closed: AtomicBool::new(false),
        }
    }

    /// Moves every entry of the database at `path` into the committed
    /// backend. An entry is deleted from the database only after the
    /// committed backend accepted it.
    fn absorb_embedded(&self, path: &Path) {
        if !path.exists() {
            return;
        }
        let embedded = match SqliteBackend::open(path) {
            Ok(embedded) => embedded,
            Err(err) => {
                warn!(
                    target: VAULT_TARGET,
                    error = %err,
                    "embedded credential store unreadable; its entries stay there"
                );
                return;
            }
        };
        match embedded.entries() {
            Ok(entries) => {
                let moved = entries
                    .into_iter()
                    .filter(|(key, _)| key != SENTINEL_KEY)
                    .filter(|(key, secret)| self.absorb_entry(&embedded, key, secret))
                    .count();
                if moved > 0 {
                    info!(
                        target: VAULT_TARGET,
                        moved,
                        tier = %self.tier(),
                        "moved credentials out of the embedded store"
                    );
                }
            }
            Err(err) => {
                warn!(target: VAULT_TARGET, error = %err, "embedded credential store unreadable");
            }
        }
        if let Err(err) = embedded.close() {
            debug!(target: VAULT_TARGET, error = %err, "close failed");
        }
    }

    fn absorb_entry(&self, embedded: &SqliteBackend, key: &str, secret: &Secret) -> bool {
        match self.backend.store(key, secret).and_then(|()| embedded.delete(key)) {
            Ok(()) => true,
            Err(err) => {
                warn!(
                    target: VAULT_TARGET,
                    key,
                    error = %err,
                    "credential left in the embedded store"
                );
                false
            }
        }
    }

    /// Returns the committed tier.
    #[must_use]
    pub fn tier(&self) -> Tier {
        self.backend.tier()
    }

    /// Stores `secret` under `key`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::EmptyKey`] for an empty key,
    /// [`VaultError::Closed`] after [`close`](Self::close), and backend
    /// failures otherwise.
    pub fn store(&self, key: &str, secret: &Secret) -> Result<(), VaultError> {
        self.check(key)?;
        self.backend.store(key, secret)?;
        debug!(target: VAULT_TARGET, key, tier = %self.tier(), "credential stored");
        Ok(())
    }

    /// Fetches the secret under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::NotFound`] when nothing is stored under the
    /// key, alongside the errors of [`store`](Self::store).
    pub fn get(&self, key: &str) -> Result<Secret, VaultError> {
        self.check(key)?;
        self.backend.get(key)?.ok_or_else(|| VaultError::NotFound {
            key: key.to_owned(),
        })
    }

    /// Removes the secret under `key`. Removing an absent key succeeds.
    ///
    /// # Errors
    ///
    /// As for [`store`](Self::store).
    pub fn delete(&self, key: &str) -> Result<(), VaultError> {
        self.check(key)?;
        self.backend.delete(key)?;
        debug!(target: VAULT_TARGET, key, tier = %self.tier(), "credential deleted");
        Ok(())
    }

    /// Releases the backend. Later calls fail with [`VaultError::Closed`];
    /// closing again is a no-op.
    ///
    /// # Errors
    ///
    /// Returns the backend's error if its handle fails to close.
    pub fn close(&self) -> Result<(), VaultError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.backend.close()
    }

    /// Returns `true` once [`close`](Self::close) has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn check(&self, key: &str) -> Result<(), VaultError> {
        if key.is_empty() {
            return Err(VaultError::EmptyKey);
        }
        if self.is_closed() {
            return Err(VaultError::Closed);
        }
        Ok(())
    }
}

impl std::fmt::Debug for Vault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Vault")
            .field("tier", &self.tier())
            .field("closed", &self.is_closed())
            .finish()
    }
}

fn round_trip(backend: &dyn SecretBackend) -> Result<(), VaultError> {
    let tier = backend.tier();
    let probe = Secret::new(format!(
        "probe-{}",
        OffsetDateTime::now_utc().unix_timestamp_nanos()
    ));
    backend.store(SENTINEL_KEY, &probe)?;
    let read_back = backend.get(SENTINEL_KEY);
    backend.delete(SENTINEL_KEY)?;
    match read_back? {
        Some(secret) if secret == probe => Ok(()),
        _ => Err(VaultError::Backend {
            tier,
            message: String::from("sentinel did not read back"),
            source: None,
        }),
    }
}

#[cfg(test)]
mod tests;
