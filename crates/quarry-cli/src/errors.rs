//! Error types for the CLI runtime.

use std::io;
use std::sync::Arc;

use thiserror::Error;

use quarry_plugins::PluginError;
use quarry_vault::VaultError;

use crate::telemetry::TelemetryError;

#[derive(Debug, Error)]
pub(crate) enum AppError {
    #[error("failed to load configuration: {0}")]
    LoadConfiguration(Arc<ortho_config::OrthoError>),
    #[error("{0}")]
    CliUsage(clap::Error),
    #[error(transparent)]
    Telemetry(#[from] TelemetryError),
    #[error(transparent)]
    Plugin(#[from] PluginError),
    #[error(transparent)]
    Vault(#[from] VaultError),
    #[error("plugin '{plugin}' reported an error: {message}")]
    QueryFailed { plugin: String, message: String },
    #[error("failed to read secret from stdin: {0}")]
    ReadSecret(io::Error),
    #[error("secret set requires a value argument or a line on stdin")]
    MissingSecret,
    #[error("failed to serialise command output: {0}")]
    SerialiseOutput(serde_json::Error),
    #[error("failed to write command output: {0}")]
    WriteOutput(io::Error),
}
