use std::env;

use camino::Utf8PathBuf;

/// Default interval between background discovery passes, in milliseconds.
pub const DEFAULT_SCAN_INTERVAL_MS: u64 = 2_000;

/// Default deadline for `info` and `authforms` probes, in milliseconds.
pub const DEFAULT_PROBE_TIMEOUT_MS: u64 = 2_000;

/// Default deadline for `exec` and `connection-tree` calls, in milliseconds.
pub const DEFAULT_EXEC_TIMEOUT_MS: u64 = 30_000;

/// Default service name under which secrets are filed in the platform keyring.
pub const DEFAULT_VAULT_SERVICE: &str = "quarry";

/// Default log filter expression used by the binaries.
pub const DEFAULT_LOG_FILTER: &str = "info";

const APPLICATION_DIR: &str = "quarry";

/// Default log filter expression used by the binaries.
pub fn default_log_filter() -> &'static str {
    DEFAULT_LOG_FILTER
}

/// Owned log filter value used where allocation is required (e.g. serde).
pub fn default_log_filter_string() -> String {
    DEFAULT_LOG_FILTER.to_owned()
}

/// Default logging format for the binaries.
pub fn default_log_format() -> crate::logging::LogFormat {
    crate::logging::LogFormat::Json
}

/// Directory scanned for plugin executables when none is configured.
pub fn default_plugin_dir() -> Utf8PathBuf {
    application_directory().join("plugins")
}

/// Location of the embedded credential store when none is configured.
pub fn default_vault_path() -> Utf8PathBuf {
    application_directory().join("credentials.db")
}

/// Owned keyring service name used by serde defaults.
pub fn default_vault_service() -> String {
    DEFAULT_VAULT_SERVICE.to_owned()
}

pub(crate) const fn default_scan_interval_ms() -> u64 {
    DEFAULT_SCAN_INTERVAL_MS
}

pub(crate) const fn default_probe_timeout_ms() -> u64 {
    DEFAULT_PROBE_TIMEOUT_MS
}

pub(crate) const fn default_exec_timeout_ms() -> u64 {
    DEFAULT_EXEC_TIMEOUT_MS
}

fn application_directory() -> Utf8PathBuf {
    let base = dirs::data_dir()
        .and_then(|path| Utf8PathBuf::from_path_buf(path).ok())
        .unwrap_or_else(fallback_base_directory);
    base.join(APPLICATION_DIR)
}

fn fallback_base_directory() -> Utf8PathBuf {
    let candidate = env::temp_dir();
    Utf8PathBuf::from_path_buf(candidate).unwrap_or_else(|_| Utf8PathBuf::from("/tmp"))
}
