//! Behaviour tests for configuration layering.

use std::cell::RefCell;
use std::ffi::OsString;
use std::fs;

use camino::Utf8Path;
use ortho_config::OrthoConfig;
use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};
use tempfile::TempDir;

use quarry_config::{
    Config, DEFAULT_EXEC_TIMEOUT_MS, DEFAULT_PROBE_TIMEOUT_MS, DEFAULT_SCAN_INTERVAL_MS,
    default_log_filter, default_log_format, default_plugin_dir,
};

struct Harness {
    temp_dir: TempDir,
    cli_args: RefCell<Vec<OsString>>,
    env_overrides: RefCell<Vec<(String, Option<OsString>)>>,
    loaded: RefCell<Option<Config>>,
    error: RefCell<Option<String>>,
}

impl Harness {
    fn new() -> Self {
        let temp_dir = match TempDir::new() {
            Ok(dir) => dir,
            Err(error) => panic!("failed to create temporary directory: {error}"),
        };
        Self {
            temp_dir,
            cli_args: RefCell::new(vec![OsString::from("quarry")]),
            env_overrides: RefCell::new(Vec::new()),
            loaded: RefCell::new(None),
            error: RefCell::new(None),
        }
    }

    fn write_config(&self, toml: &str) {
        let path = self.temp_dir.path().join("quarry.toml");
        if let Err(error) = fs::write(&path, toml) {
            panic!("failed to write configuration: {error}");
        }

        let mut args = self.cli_args.borrow_mut();
        args.push(OsString::from("--config-path"));
        args.push(path.into_os_string());
    }

    fn set_env(&self, key: &str, value: &str) {
        let previous = std::env::var_os(key);
        // Environment mutation is `unsafe` under edition 2024; `Drop`
        // restores the previous value.
        unsafe { std::env::set_var(key, value) };
        self.env_overrides
            .borrow_mut()
            .push((key.to_owned(), previous));
    }

    fn push_cli_arg(&self, arg: impl Into<OsString>) {
        self.cli_args.borrow_mut().push(arg.into());
    }

    fn load(&self) {
        if self.loaded.borrow().is_some() || self.error.borrow().is_some() {
            return;
        }

        let args = self.cli_args.borrow().clone();
        match Config::load_from_iter(args) {
            Ok(config) => {
                *self.loaded.borrow_mut() = Some(config);
            }
            Err(error) => {
                *self.error.borrow_mut() = Some(error.to_string());
            }
        }
    }

    fn loaded_config(&self) -> Config {
        self.load();
        if let Some(error) = self.error.borrow().as_ref() {
            panic!("configuration failed to load: {error}");
        }
        match self.loaded.borrow().as_ref() {
            Some(config) => config.clone(),
            None => panic!("configuration was not loaded"),
        }
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        let mut overrides = self.env_overrides.borrow_mut();
        while let Some((key, value)) = overrides.pop() {
            match value {
                Some(previous) => unsafe { std::env::set_var(&key, previous) },
                None => unsafe { std::env::remove_var(&key) },
            }
        }
    }
}

#[fixture]
fn harness() -> Harness {
    Harness::new()
}

#[given("a configuration file setting the plugin directory to \"{dir}\"")]
fn given_configuration_file(harness: &Harness, dir: String) {
    harness.write_config(&format!(
        "plugin_dir = \"{dir}\"\nexec_timeout_ms = 45000\n"
    ));
}

#[given("a configuration file setting the vault service to \"{service}\"")]
fn given_vault_service_file(harness: &Harness, service: String) {
    harness.write_config(&format!("vault_service = \"{service}\"\n"));
}

#[given("the environment sets the vault service to \"{service}\"")]
fn given_vault_service_env(harness: &Harness, service: String) {
    harness.set_env("QUARRY_VAULT_SERVICE", &service);
}

#[when("the CLI sets the plugin directory to \"{dir}\"")]
fn when_cli_override(harness: &Harness, dir: String) {
    harness.push_cli_arg("--plugin-dir");
    harness.push_cli_arg(OsString::from(&dir));
}

#[when("the configuration loads without overrides")]
fn when_load_without_overrides(harness: &Harness) {
    harness.load();
}

#[then("loading the configuration resolves the plugin directory to \"{dir}\"")]
fn then_resolved_plugin_dir(harness: &Harness, dir: String) {
    let config = harness.loaded_config();
    assert_eq!(config.plugin_dir(), Utf8Path::new(&dir));
    assert_eq!(config.exec_timeout_ms, 45_000);
}

#[then("loading the configuration resolves the vault service to \"{service}\"")]
fn then_resolved_vault_service(harness: &Harness, service: String) {
    let config = harness.loaded_config();
    assert_eq!(config.vault_service(), service);
}

#[then("loading the configuration applies the built-in defaults")]
fn then_defaults_applied(harness: &Harness) {
    let config = harness.loaded_config();
    assert_eq!(config.plugin_dir(), default_plugin_dir());
    assert_eq!(config.log_filter(), default_log_filter());
    assert_eq!(config.log_format(), default_log_format());
    assert_eq!(config.scan_interval_ms, DEFAULT_SCAN_INTERVAL_MS);
    assert_eq!(config.probe_timeout_ms, DEFAULT_PROBE_TIMEOUT_MS);
    assert_eq!(config.exec_timeout_ms, DEFAULT_EXEC_TIMEOUT_MS);
}

#[scenario(path = "tests/features/configuration_precedence.feature")]
fn configuration_precedence(#[from(harness)] harness: Harness) {
    let _ = harness;
}
