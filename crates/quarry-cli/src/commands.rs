//! Command execution against the plugin engine and the credential vault.

use std::collections::BTreeMap;
use std::io::{self, BufRead, Write};
use std::process::ExitCode;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use serde::Serialize;
use serde_json::json;
use tracing::{debug, info};

use quarry_config::Config;
use quarry_plugins::facade::CREDENTIAL_KEY_PARAM;
use quarry_plugins::process::ProcessInvoker;
use quarry_plugins::registry::{DiscoveryLoop, IntervalTicker, PluginDescriptor};
use quarry_plugins::{Orchestrator, PluginRegistry};
use quarry_vault::{Secret, Vault, VaultOptions};

use crate::AppError;
use crate::cli::{CliCommand, SecretAction};

const CLI_TARGET: &str = "quarry_cli";

/// How often `watch` checks the registry for a finished pass.
const WATCH_POLL: Duration = Duration::from_millis(20);

/// Runs one subcommand and writes its JSON answer to `stdout`.
pub(crate) fn execute<W: Write>(
    command: CliCommand,
    config: &Config,
    stdout: &mut W,
) -> Result<ExitCode, AppError> {
    match command {
        CliCommand::Plugins => {
            let host = orchestrator(config, None)?;
            emit(stdout, &host.list_plugins())
        }
        CliCommand::Exec {
            plugin,
            query,
            connection,
            options,
        } => {
            let params: BTreeMap<_, _> = connection.into_iter().collect();
            let call_options: BTreeMap<_, _> = options.into_iter().collect();
            let host = orchestrator(config, vault_for(config, &params))?;
            let result = host.exec_plugin(&plugin, &params, &query, Some(&call_options))?;
            emit(stdout, &result)?;
            match result.error() {
                Some(message) if !result.is_success() => Err(AppError::QueryFailed {
                    plugin,
                    message: message.to_owned(),
                }),
                _ => Ok(ExitCode::SUCCESS),
            }
        }
        CliCommand::Tree { plugin, connection } => {
            let params: BTreeMap<_, _> = connection.into_iter().collect();
            let host = orchestrator(config, vault_for(config, &params))?;
            emit(stdout, &host.connection_tree(&plugin, &params)?)
        }
        CliCommand::AuthForms { plugin } => {
            let host = orchestrator(config, None)?;
            emit(stdout, &host.plugin_auth_forms(&plugin)?)
        }
        CliCommand::Watch { passes } => watch(config, passes, stdout),
        CliCommand::Secret { action } => secret(action, config, stdout),
    }
}

/// Runs the background discovery loop at the configured scan interval and
/// prints the listing after every pass that changed it.
fn watch<W: Write>(
    config: &Config,
    passes: Option<u64>,
    stdout: &mut W,
) -> Result<ExitCode, AppError> {
    let registry = registry(config);
    let ticker = IntervalTicker::new(config.scan_interval());
    let handle = DiscoveryLoop::spawn(Arc::clone(&registry), ticker)?;
    info!(
        target: CLI_TARGET,
        dir = %config.plugin_dir(),
        interval_ms = config.scan_interval_ms,
        "watching plugin directory"
    );

    let mut seen = 0;
    let mut shown: Option<Vec<PluginDescriptor>> = None;
    let outcome = loop {
        let completed = registry.passes();
        if completed > seen {
            seen = completed;
            let listing = registry.list();
            if shown.as_ref() != Some(&listing) {
                if let Err(err) = emit(stdout, &listing).and_then(|_| flush(stdout)) {
                    break Err(err);
                }
                shown = Some(listing);
            }
        }
        if passes.is_some_and(|limit| seen >= limit) {
            break Ok(ExitCode::SUCCESS);
        }
        thread::sleep(WATCH_POLL);
    };
    handle.shutdown()?;
    outcome
}

fn flush<W: Write>(stdout: &mut W) -> Result<ExitCode, AppError> {
    stdout.flush().map_err(AppError::WriteOutput)?;
    Ok(ExitCode::SUCCESS)
}

fn secret<W: Write>(
    action: SecretAction,
    config: &Config,
    stdout: &mut W,
) -> Result<ExitCode, AppError> {
    let vault = open_vault(config);
    let outcome = match action {
        SecretAction::Set { key, value } => {
            let secret = match value {
                Some(text) => Secret::new(text),
                None => read_secret(&mut io::stdin().lock())?,
            };
            vault.store(&key, &secret)?;
            emit(stdout, &json!({ "key": key, "tier": vault.tier().as_str() }))
        }
        SecretAction::Get { key } => {
            let secret = vault.get(&key)?;
            emit(stdout, &json!({ "key": key, "secret": secret.expose() }))
        }
        SecretAction::Delete { key } => {
            vault.delete(&key)?;
            emit(stdout, &json!({ "key": key, "deleted": true }))
        }
    };
    vault.close()?;
    outcome
}

fn read_secret(input: &mut impl BufRead) -> Result<Secret, AppError> {
    let mut line = String::new();
    input.read_line(&mut line).map_err(AppError::ReadSecret)?;
    let value = line.trim_end_matches(['\r', '\n']);
    if value.is_empty() {
        return Err(AppError::MissingSecret);
    }
    Ok(Secret::new(value))
}

fn open_vault(config: &Config) -> Vault {
    let options = VaultOptions::new(config.vault_service(), config.vault_path().as_std_path());
    if config.vault_skip_keyring() {
        Vault::open(&options.without_keyring())
    } else {
        Vault::open(&options)
    }
}

/// Opens the vault only when the connection references a stored secret.
fn vault_for(config: &Config, connection: &BTreeMap<String, String>) -> Option<Arc<Vault>> {
    connection
        .contains_key(CREDENTIAL_KEY_PARAM)
        .then(|| Arc::new(open_vault(config)))
}

fn registry(config: &Config) -> Arc<PluginRegistry> {
    Arc::new(PluginRegistry::new(
        config.plugin_dir().as_std_path(),
        Arc::new(ProcessInvoker),
        config.probe_timeout(),
    ))
}

fn orchestrator(config: &Config, vault: Option<Arc<Vault>>) -> Result<Orchestrator, AppError> {
    let registry = registry(config);
    registry.rescan()?;
    debug!(
        target: CLI_TARGET,
        dir = %config.plugin_dir(),
        plugins = registry.list().len(),
        "plugin directory scanned"
    );

    let host = Orchestrator::new(registry, Arc::new(ProcessInvoker), config.exec_timeout());
    Ok(match vault {
        Some(vault) => host.with_vault(vault),
        None => host,
    })
}

fn emit<W: Write, T: Serialize + ?Sized>(stdout: &mut W, value: &T) -> Result<ExitCode, AppError> {
    serde_json::to_writer(&mut *stdout, value).map_err(AppError::SerialiseOutput)?;
    writeln!(stdout).map_err(AppError::WriteOutput)?;
    Ok(ExitCode::SUCCESS)
}
