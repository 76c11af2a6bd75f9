//! CLI argument definitions for the Quarry plugin host.

use clap::{Parser, Subcommand};

/// Command-line interface for the Quarry plugin host.
#[derive(Parser, Debug)]
#[command(
    name = "quarry",
    version,
    about = "Runs database plugins and manages their credentials",
    disable_help_subcommand = true
)]
pub(crate) struct Cli {
    #[command(subcommand)]
    pub(crate) command: CliCommand,
}

/// Top-level subcommands. Each writes one JSON document to stdout.
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub(crate) enum CliCommand {
    /// Lists the plugins found in the plugin directory.
    Plugins,
    /// Runs a query through a plugin.
    Exec {
        /// Registry name of the plugin.
        plugin: String,
        /// Query text handed to the plugin.
        query: String,
        /// Connection parameter, repeatable.
        #[arg(long = "conn", value_name = "KEY=VALUE", value_parser = parse_key_value)]
        connection: Vec<(String, String)>,
        /// Per-call option, repeatable.
        #[arg(long = "opt", value_name = "KEY=VALUE", value_parser = parse_key_value)]
        options: Vec<(String, String)>,
    },
    /// Prints the browsable tree a plugin builds for a connection.
    Tree {
        /// Registry name of the plugin.
        plugin: String,
        /// Connection parameter, repeatable.
        #[arg(long = "conn", value_name = "KEY=VALUE", value_parser = parse_key_value)]
        connection: Vec<(String, String)>,
    },
    /// Prints the authentication forms a plugin accepts.
    AuthForms {
        /// Registry name of the plugin.
        plugin: String,
    },
    /// Keeps rescanning the plugin directory, printing the listing each
    /// time it changes.
    Watch {
        /// Stops after this many discovery passes instead of running until
        /// interrupted.
        #[arg(long, value_name = "COUNT")]
        passes: Option<u64>,
    },
    /// Manages secrets in the credential vault.
    Secret {
        /// The vault action to perform.
        #[command(subcommand)]
        action: SecretAction,
    },
}

/// Credential vault actions.
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub(crate) enum SecretAction {
    /// Stores a secret. Reads one line from stdin when no value is given.
    Set {
        /// Vault key.
        key: String,
        /// Secret value.
        value: Option<String>,
    },
    /// Prints a stored secret.
    Get {
        /// Vault key.
        key: String,
    },
    /// Removes a secret. Removing an absent key succeeds.
    Delete {
        /// Vault key.
        key: String,
    },
}

fn parse_key_value(argument: &str) -> Result<(String, String), String> {
    match argument.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_owned(), value.to_owned())),
        _ => Err(format!("expected KEY=VALUE, got '{argument}'")),
    }
}
