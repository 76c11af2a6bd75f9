//! Domain errors raised by plugin operations.
//!
//! All errors use `thiserror`-derived enums with structured context so callers
//! can inspect the failure programmatically. I/O errors are wrapped in `Arc`
//! to satisfy the `result_large_err` Clippy lint.

use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

use quarry_vault::VaultError;

use crate::protocol::PluginCommand;

/// Errors arising from plugin operations.
#[derive(Debug, Error)]
pub enum PluginError {
    /// The requested plugin is not in the registry.
    #[error("plugin '{name}' not found in registry")]
    NotFound {
        /// Name that was looked up.
        name: String,
    },

    /// The plugin process could not be spawned.
    #[error("plugin '{name}' failed to start: {message}")]
    SpawnFailed {
        /// Plugin name.
        name: String,
        /// Human-readable failure description.
        message: String,
        /// Optional underlying I/O error.
        #[source]
        source: Option<Arc<std::io::Error>>,
    },

    /// The plugin did not answer within its deadline and was killed.
    #[error("plugin '{name}' timed out after {timeout_ms}ms running '{command}'")]
    Timeout {
        /// Plugin name.
        name: String,
        /// Command that was running.
        command: PluginCommand,
        /// Deadline in milliseconds.
        timeout_ms: u64,
    },

    /// The plugin crashed: it exited unsuccessfully or wrote to stderr
    /// without producing a parseable response.
    #[error("plugin '{name}' failed running '{command}': {message}")]
    Crashed {
        /// Plugin name.
        name: String,
        /// Command that was running.
        command: PluginCommand,
        /// Exit code, when the process exited normally.
        status: Option<i32>,
        /// Captured stderr, or a description of the exit status.
        message: String,
    },

    /// The plugin produced output that does not conform to the protocol.
    #[error("plugin '{name}' wrote invalid output: {message}")]
    InvalidOutput {
        /// Plugin name.
        name: String,
        /// Description of the protocol violation.
        message: String,
    },

    /// The plugin answered with a well-formed error report.
    #[error("plugin '{name}' reported an error running '{command}': {message}")]
    Reported {
        /// Plugin name.
        name: String,
        /// Command that was running.
        command: PluginCommand,
        /// Error text from the plugin.
        message: String,
    },

    /// A request could not be serialised to JSON.
    #[error("failed to serialise plugin request: {0}")]
    SerializeRequest(#[source] serde_json::Error),

    /// A response could not be decoded into the expected shape.
    #[error("failed to decode '{command}' response from plugin '{name}': {message}")]
    Decode {
        /// Plugin name.
        name: String,
        /// Command whose response failed to decode.
        command: PluginCommand,
        /// Human-readable description of the parse failure.
        message: String,
        /// Optional underlying JSON error.
        #[source]
        source: Option<serde_json::Error>,
    },

    /// An I/O error occurred while communicating with the plugin process.
    #[error("I/O error communicating with plugin '{name}': {source}")]
    Io {
        /// Plugin name.
        name: String,
        /// Underlying I/O error.
        #[source]
        source: Arc<std::io::Error>,
    },

    /// The plugin directory could not be enumerated.
    #[error("failed to scan plugin directory '{}': {source}", .path.display())]
    Discovery {
        /// Directory that was scanned.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: Arc<std::io::Error>,
    },

    /// A credential referenced by a connection could not be resolved.
    #[error("failed to resolve credential '{key}' for plugin '{name}': {source}")]
    Credential {
        /// Plugin name.
        name: String,
        /// Credential key referenced by the connection.
        key: String,
        /// Underlying vault error.
        #[source]
        source: VaultError,
    },

    /// A connection references a credential but no vault is attached.
    #[error("no credential vault is attached")]
    VaultUnavailable,

    /// A credential vault operation failed.
    #[error("credential vault operation failed: {0}")]
    Vault(#[from] VaultError),

    /// The background discovery thread could not be started or joined.
    #[error("discovery thread failure: {message}")]
    DiscoveryThread {
        /// Description of the failure.
        message: String,
    },
}

impl PluginError {
    /// Returns `true` when the failure was a deadline expiry.
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}
