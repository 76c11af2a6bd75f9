//! Wire types for host-plugin communication.
//!
//! A plugin is invoked as `<executable> <command>`. When the command takes
//! input, the host writes one JSON line to the plugin's stdin and closes it.
//! The plugin writes its response to stdout and exits. Plugin stderr is
//! captured for diagnostics but is not part of the protocol.
//!
//! Response decoding (including repair of legacy shapes) lives in
//! [`crate::codec`]; this module only defines the shapes themselves.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

mod forms;
pub(crate) mod result;
mod tree;

pub use self::forms::{AuthField, AuthFieldType, AuthForm, AuthForms};
pub use self::result::{
    Column, DocumentResult, ExecResult, KeyValueResult, RESERVED_KEY, ResultPayload, SqlResult,
};
pub use self::tree::{ConnectionTree, ConnectionTreeNode, TreeAction};

/// Connection parameters handed to a plugin, such as `host` or `file`.
pub type ConnectionParams = BTreeMap<String, String>;

/// Free-form per-call options, such as `limit` or `timeout`.
pub type ExecOptions = BTreeMap<String, String>;

/// Environment variable carrying the registry key of the invoked plugin.
pub const PLUGIN_NAME_ENV: &str = "QUARRY_PLUGIN_NAME";

/// The capability set a plugin may implement.
///
/// A plugin advertises a capability simply by answering the command; an
/// unanswered command is a normal negotiation outcome.
///
/// # Example
///
/// ```
/// use quarry_plugins::protocol::PluginCommand;
///
/// assert_eq!(PluginCommand::ConnectionTree.as_str(), "connection-tree");
/// assert!(PluginCommand::Info.is_probe());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PluginCommand {
    /// Report identity metadata.
    Info,
    /// Execute a query against a connection.
    Exec,
    /// Describe the authentication forms the plugin accepts.
    #[serde(rename = "authforms")]
    AuthForms,
    /// Produce a browsable tree for a connection.
    ConnectionTree,
}

impl PluginCommand {
    /// Returns the command-line argument for this command.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Exec => "exec",
            Self::AuthForms => "authforms",
            Self::ConnectionTree => "connection-tree",
        }
    }

    /// Returns `true` for the bounded capability probes (`info`, `authforms`).
    #[must_use]
    pub const fn is_probe(self) -> bool {
        matches!(self, Self::Info | Self::AuthForms)
    }
}

impl fmt::Display for PluginCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity reported by a plugin in answer to `info`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginInfo {
    /// Self-reported plugin name. The registry key is derived from the
    /// filename instead.
    #[serde(default)]
    pub name: String,
    /// Plugin version string.
    #[serde(default)]
    pub version: String,
    /// Human-readable description.
    #[serde(default)]
    pub description: String,
    /// Database family served by the plugin, such as `sql` or `document`.
    #[serde(default, rename = "type")]
    pub kind: String,
}

/// Request written to a plugin's stdin for `exec`.
///
/// # Example
///
/// ```
/// use quarry_plugins::protocol::{ConnectionParams, ExecRequest};
///
/// let mut connection = ConnectionParams::new();
/// connection.insert("file".into(), "/tmp/t.db".into());
/// let request = ExecRequest::new(connection, "SELECT 1");
/// assert_eq!(request.query(), "SELECT 1");
/// assert!(request.options().is_empty());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecRequest {
    connection: ConnectionParams,
    query: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    options: ExecOptions,
}

impl ExecRequest {
    /// Creates a request without options.
    #[must_use]
    pub fn new(connection: ConnectionParams, query: impl Into<String>) -> Self {
        Self {
            connection,
            query: query.into(),
            options: ExecOptions::new(),
        }
    }

    /// Attaches per-call options.
    #[must_use]
    pub fn with_options(mut self, options: ExecOptions) -> Self {
        self.options = options;
        self
    }

    /// Returns the connection parameters.
    #[must_use]
    pub const fn connection(&self) -> &ConnectionParams {
        &self.connection
    }

    /// Returns the query text.
    #[must_use]
    pub const fn query(&self) -> &str {
        self.query.as_str()
    }

    /// Returns the per-call options.
    #[must_use]
    pub const fn options(&self) -> &ExecOptions {
        &self.options
    }
}

/// Request written to a plugin's stdin for `connection-tree`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeRequest {
    connection: ConnectionParams,
}

impl TreeRequest {
    /// Creates a tree request for the given connection.
    #[must_use]
    pub const fn new(connection: ConnectionParams) -> Self {
        Self { connection }
    }

    /// Returns the connection parameters.
    #[must_use]
    pub const fn connection(&self) -> &ConnectionParams {
        &self.connection
    }
}
