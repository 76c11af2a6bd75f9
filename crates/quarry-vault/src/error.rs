//! Errors raised by the credential vault.

use std::sync::Arc;

use thiserror::Error;

use crate::backend::Tier;

/// Shareable source error from a backend library.
pub type BackendSource = Arc<dyn std::error::Error + Send + Sync>;

/// Errors arising from vault operations.
#[derive(Debug, Clone, Error)]
pub enum VaultError {
    /// No secret is stored under the key.
    #[error("credential '{key}' not found")]
    NotFound {
        /// Key that was looked up.
        key: String,
    },

    /// An empty key was supplied.
    #[error("credential key must not be empty")]
    EmptyKey,

    /// The vault was closed.
    #[error("credential vault is closed")]
    Closed,

    /// The committed backend failed.
    #[error("{tier} credential backend failed: {message}")]
    Backend {
        /// Backend that failed.
        tier: Tier,
        /// Description of the failure.
        message: String,
        /// Underlying library error, when there is one.
        #[source]
        source: Option<BackendSource>,
    },

    /// A thread panicked while holding the backend lock.
    #[error("{tier} credential backend lock poisoned")]
    Poisoned {
        /// Backend whose lock was poisoned.
        tier: Tier,
    },
}

impl VaultError {
    pub(crate) fn backend(
        tier: Tier,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Backend {
            tier,
            message: source.to_string(),
            source: Some(Arc::new(source)),
        }
    }

    /// Returns `true` when the key is simply absent.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}
