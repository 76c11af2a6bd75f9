//! Tiered credential storage for Quarry connections.
//!
//! Secrets live in exactly one of three backends, chosen once when the
//! [`Vault`] is opened: the platform keychain, an embedded SQLite file, or
//! a process-local map. The choice is probed with a sentinel round trip and
//! then kept for the vault's lifetime.
//!
//! Secret values are wrapped in [`Secret`], whose `Debug` output is
//! redacted, and are never written to logs.

pub mod backend;
mod error;
mod secret;
mod vault;

pub use self::backend::{KeyringBackend, MemoryBackend, SecretBackend, SqliteBackend, Tier};
pub use self::error::{BackendSource, VaultError};
pub use self::secret::Secret;
pub use self::vault::{Candidate, Vault, VaultOptions};
