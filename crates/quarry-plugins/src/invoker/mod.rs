//! The invocation seam between the facade and plugin processes.
//!
//! An [`InvocationRequest`] describes exactly one call: which executable to
//! run, which command to pass, what to write to stdin and how long to wait.
//! A [`PluginInvoker`] turns it into the raw bytes the plugin wrote to
//! stdout. The production implementation is
//! [`ProcessInvoker`](crate::process::ProcessInvoker), which spawns a fresh
//! OS process per call; tests substitute doubles.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::PluginError;
use crate::protocol::PluginCommand;

/// One bounded call against one plugin executable.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use quarry_plugins::invoker::InvocationRequest;
/// use quarry_plugins::protocol::PluginCommand;
///
/// let request = InvocationRequest::new(
///     "sqlite",
///     "/opt/quarry/plugins/sqlite",
///     PluginCommand::Info,
///     Duration::from_secs(2),
/// );
/// assert!(request.payload().is_none());
/// assert_eq!(request.command(), PluginCommand::Info);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationRequest {
    plugin: String,
    executable: PathBuf,
    command: PluginCommand,
    payload: Option<Vec<u8>>,
    timeout: Duration,
}

impl InvocationRequest {
    /// Creates a request with no stdin payload.
    #[must_use]
    pub fn new(
        plugin: impl Into<String>,
        executable: impl Into<PathBuf>,
        command: PluginCommand,
        timeout: Duration,
    ) -> Self {
        Self {
            plugin: plugin.into(),
            executable: executable.into(),
            command,
            payload: None,
            timeout,
        }
    }

    /// Attaches the encoded request line written to the plugin's stdin.
    #[must_use]
    pub fn with_payload(mut self, payload: Vec<u8>) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Returns the registry key of the plugin.
    #[must_use]
    pub const fn plugin(&self) -> &str {
        self.plugin.as_str()
    }

    /// Returns the path of the executable.
    #[must_use]
    pub fn executable(&self) -> &Path {
        &self.executable
    }

    /// Returns the command passed as the sole argument.
    #[must_use]
    pub const fn command(&self) -> PluginCommand {
        self.command
    }

    /// Returns the stdin payload, if any.
    #[must_use]
    pub fn payload(&self) -> Option<&[u8]> {
        self.payload.as_deref()
    }

    /// Returns the deadline for the whole call.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Returns the deadline in whole milliseconds, saturating.
    #[must_use]
    pub fn timeout_ms(&self) -> u64 {
        u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX)
    }
}

/// Executes a single plugin call.
///
/// Implementations must be safe to call concurrently: there is no global
/// serialisation of plugin calls.
pub trait PluginInvoker: Send + Sync {
    /// Runs the request and returns the plugin's stdout.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::SpawnFailed`] when the executable cannot be
    /// started, [`PluginError::Timeout`] when the deadline expires,
    /// [`PluginError::Crashed`] when the process fails without producing a
    /// parseable response, and [`PluginError::InvalidOutput`] when it exits
    /// cleanly without writing anything.
    fn invoke(&self, request: &InvocationRequest) -> Result<Vec<u8>, PluginError>;
}
