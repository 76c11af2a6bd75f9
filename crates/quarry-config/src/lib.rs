//! Shared configuration for the Quarry plugin host.
//!
//! [`Config`] is loaded through `ortho_config`, which layers built-in
//! defaults, an optional TOML file (`--config-path` or `QUARRY_CONFIG_PATH`),
//! `QUARRY_*` environment variables, and command-line flags, in increasing
//! order of precedence. The plugin engine and the credential vault consume the
//! resolved values through the typed accessors below.

use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use ortho_config::OrthoConfig;
use serde::{Deserialize, Serialize};

mod defaults;
mod logging;

pub use defaults::{
    DEFAULT_EXEC_TIMEOUT_MS, DEFAULT_LOG_FILTER, DEFAULT_PROBE_TIMEOUT_MS,
    DEFAULT_SCAN_INTERVAL_MS, DEFAULT_VAULT_SERVICE, default_log_filter,
    default_log_filter_string, default_log_format, default_plugin_dir, default_vault_path,
    default_vault_service,
};
pub use logging::{LogFormat, LogFormatParseError};

use defaults::{default_exec_timeout_ms, default_probe_timeout_ms, default_scan_interval_ms};

/// Resolved configuration shared by the CLI and the plugin engine.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, OrthoConfig)]
#[ortho_config(prefix = "QUARRY")]
pub struct Config {
    /// Directory scanned for plugin executables.
    #[serde(default = "default_plugin_dir")]
    #[ortho_config(default = default_plugin_dir())]
    pub plugin_dir: Utf8PathBuf,
    /// Interval between background discovery passes, in milliseconds.
    #[serde(default = "default_scan_interval_ms")]
    #[ortho_config(default = DEFAULT_SCAN_INTERVAL_MS)]
    pub scan_interval_ms: u64,
    /// Deadline applied to `info` and `authforms` probes, in milliseconds.
    #[serde(default = "default_probe_timeout_ms")]
    #[ortho_config(default = DEFAULT_PROBE_TIMEOUT_MS)]
    pub probe_timeout_ms: u64,
    /// Deadline applied to `exec` and `connection-tree` calls, in milliseconds.
    #[serde(default = "default_exec_timeout_ms")]
    #[ortho_config(default = DEFAULT_EXEC_TIMEOUT_MS)]
    pub exec_timeout_ms: u64,
    /// Location of the embedded credential store.
    #[serde(default = "default_vault_path")]
    #[ortho_config(default = default_vault_path())]
    pub vault_path: Utf8PathBuf,
    /// Service name used for entries in the platform keyring.
    #[serde(default = "default_vault_service")]
    #[ortho_config(default = default_vault_service())]
    pub vault_service: String,
    /// Keeps secrets out of the platform keyring, starting the vault at
    /// the embedded store.
    #[serde(default)]
    #[ortho_config(default = false)]
    pub vault_skip_keyring: bool,
    /// Tracing filter expression, for example `info` or `quarry_plugins=debug`.
    #[serde(default = "default_log_filter_string")]
    #[ortho_config(default = default_log_filter_string())]
    pub log_filter: String,
    /// Output format for log records.
    #[serde(default = "default_log_format")]
    #[ortho_config(default = default_log_format())]
    pub log_format: LogFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            plugin_dir: default_plugin_dir(),
            scan_interval_ms: DEFAULT_SCAN_INTERVAL_MS,
            probe_timeout_ms: DEFAULT_PROBE_TIMEOUT_MS,
            exec_timeout_ms: DEFAULT_EXEC_TIMEOUT_MS,
            vault_path: default_vault_path(),
            vault_service: default_vault_service(),
            vault_skip_keyring: false,
            log_filter: default_log_filter_string(),
            log_format: default_log_format(),
        }
    }
}

impl Config {
    /// Directory scanned for plugin executables.
    #[must_use]
    pub fn plugin_dir(&self) -> &Utf8Path {
        self.plugin_dir.as_path()
    }

    /// Interval between background discovery passes.
    #[must_use]
    pub const fn scan_interval(&self) -> Duration {
        Duration::from_millis(self.scan_interval_ms)
    }

    /// Deadline for capability probes.
    #[must_use]
    pub const fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    /// Deadline for functional plugin calls.
    #[must_use]
    pub const fn exec_timeout(&self) -> Duration {
        Duration::from_millis(self.exec_timeout_ms)
    }

    /// Location of the embedded credential store.
    #[must_use]
    pub fn vault_path(&self) -> &Utf8Path {
        self.vault_path.as_path()
    }

    /// Keyring service name for stored secrets.
    #[must_use]
    pub fn vault_service(&self) -> &str {
        self.vault_service.as_str()
    }

    /// Whether the vault bypasses the platform keyring.
    #[must_use]
    pub const fn vault_skip_keyring(&self) -> bool {
        self.vault_skip_keyring
    }

    /// Tracing filter expression.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        self.log_filter.as_str()
    }

    /// Output format for log records.
    #[must_use]
    pub const fn log_format(&self) -> LogFormat {
        self.log_format
    }
}
