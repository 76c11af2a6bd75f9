//! The entry surface consumed by the host application.
//!
//! [`Orchestrator`] resolves plugins through the [`PluginRegistry`], runs
//! them through a [`PluginInvoker`], and decodes their answers with the
//! [`codec`](crate::codec). It holds no state of its own beyond those
//! references and an optional credential [`Vault`].
//!
//! Capability calls degrade instead of failing: a plugin that cannot
//! describe its auth forms or build a tree yields an empty answer, because
//! an absent capability is a normal outcome of negotiation. Only `exec`
//! surfaces invocation failures to the caller.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use quarry_vault::{Secret, Vault};

use crate::codec::{
    decode_auth_forms, decode_connection_tree, decode_exec_response, encode_exec_request,
    encode_tree_request,
};
use crate::error::PluginError;
use crate::invoker::{InvocationRequest, PluginInvoker};
use crate::protocol::{
    AuthForms, ConnectionParams, ConnectionTree, ExecOptions, ExecRequest, ExecResult,
    PluginCommand, TreeRequest,
};
use crate::registry::{PluginDescriptor, PluginRegistry};

/// Tracing target for facade operations.
const FACADE_TARGET: &str = "quarry_plugins::facade";

/// Connection parameter naming a vault entry to use as the password.
pub const CREDENTIAL_KEY_PARAM: &str = "credential_key";

/// Connection parameter receiving the resolved secret.
pub const PASSWORD_PARAM: &str = "password";

/// Composes the registry, the invoker and the vault behind one API.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use std::time::Duration;
/// use quarry_plugins::facade::Orchestrator;
/// use quarry_plugins::process::ProcessInvoker;
/// use quarry_plugins::protocol::ConnectionParams;
/// use quarry_plugins::registry::PluginRegistry;
///
/// let invoker = Arc::new(ProcessInvoker);
/// let registry = Arc::new(PluginRegistry::new(
///     "/opt/quarry/plugins",
///     invoker.clone(),
///     Duration::from_secs(2),
/// ));
/// registry.rescan().expect("plugin directory is readable");
///
/// let orchestrator = Orchestrator::new(registry, invoker, Duration::from_secs(30));
/// let mut connection = ConnectionParams::new();
/// connection.insert("file".into(), "/tmp/t.db".into());
/// let result = orchestrator.exec_plugin("sqlite", &connection, "SELECT 1", None);
/// ```
pub struct Orchestrator {
    registry: Arc<PluginRegistry>,
    invoker: Arc<dyn PluginInvoker>,
    vault: Option<Arc<Vault>>,
    exec_timeout: Duration,
}

impl Orchestrator {
    /// Creates a facade without a credential vault.
    #[must_use]
    pub fn new(
        registry: Arc<PluginRegistry>,
        invoker: Arc<dyn PluginInvoker>,
        exec_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            invoker,
            vault: None,
            exec_timeout,
        }
    }

    /// Attaches a vault used to resolve `credential_key` parameters.
    #[must_use]
    pub fn with_vault(mut self, vault: Arc<Vault>) -> Self {
        self.vault = Some(vault);
        self
    }

    /// Returns the registry.
    #[must_use]
    pub const fn registry(&self) -> &Arc<PluginRegistry> {
        &self.registry
    }

    /// Returns the current plugin listing without spawning anything.
    #[must_use]
    pub fn list_plugins(&self) -> Vec<PluginDescriptor> {
        self.registry.list()
    }

    /// Forces an immediate discovery pass.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::Discovery`] when the plugin directory cannot
    /// be listed.
    pub fn rescan(&self) -> Result<(), PluginError> {
        self.registry.rescan()
    }

    /// Runs `query` against a connection through the named plugin.
    ///
    /// A business failure reported by the plugin is returned inside the
    /// [`ExecResult`]; only failures to obtain an answer are errors.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::NotFound`] for an unknown plugin,
    /// [`PluginError::Credential`] when a referenced secret cannot be
    /// resolved, and the invoker's errors (timeout, crash, spawn failure).
    pub fn exec_plugin(
        &self,
        name: &str,
        connection: &ConnectionParams,
        query: &str,
        options: Option<&ExecOptions>,
    ) -> Result<ExecResult, PluginError> {
        let plugin = self.resolve(name)?;
        let resolved = self.resolve_credentials(name, connection)?;
        let request = ExecRequest::new(resolved, query)
            .with_options(options.cloned().unwrap_or_default());
        let payload = encode_exec_request(&request)?;

        let call =
            InvocationRequest::new(name, plugin.path(), PluginCommand::Exec, self.exec_timeout)
                .with_payload(payload);
        let stdout = self.invoker.invoke(&call)?;

        let decoded = decode_exec_response(&stdout);
        if decoded.strategy().is_repair() {
            warn!(
                target: FACADE_TARGET,
                plugin = name,
                strategy = %decoded.strategy(),
                "plugin answered in a legacy shape"
            );
        }
        let result = decoded.into_result();
        debug!(
            target: FACADE_TARGET,
            plugin = name,
            success = result.is_success(),
            "exec completed"
        );
        Ok(result)
    }

    /// Runs a tree action's query. Tree actions share the `exec` path.
    ///
    /// # Errors
    ///
    /// As for [`exec_plugin`](Self::exec_plugin).
    pub fn exec_tree_action(
        &self,
        name: &str,
        connection: &ConnectionParams,
        action_query: &str,
        options: Option<&ExecOptions>,
    ) -> Result<ExecResult, PluginError> {
        self.exec_plugin(name, connection, action_query, options)
    }

    /// Fetches the auth forms a plugin accepts.
    ///
    /// A plugin that does not answer `authforms` yields an empty map.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::NotFound`] for an unknown plugin only.
    pub fn plugin_auth_forms(&self, name: &str) -> Result<AuthForms, PluginError> {
        let plugin = self.resolve(name)?;
        let call = InvocationRequest::new(
            name,
            plugin.path(),
            PluginCommand::AuthForms,
            self.registry.probe_timeout(),
        );
        let forms = self
            .invoker
            .invoke(&call)
            .and_then(|stdout| decode_auth_forms(name, &stdout));
        Ok(forms.unwrap_or_else(|err| {
            warn!(
                target: FACADE_TARGET,
                plugin = name,
                error = %err,
                "auth forms unavailable"
            );
            AuthForms::new()
        }))
    }

    /// Builds the browse tree for a connection.
    ///
    /// Any failure, including an error reported by the plugin, yields an
    /// empty tree. Sibling nodes with duplicate keys are dropped, keeping
    /// the first.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::NotFound`] for an unknown plugin only.
    pub fn connection_tree(
        &self,
        name: &str,
        connection: &ConnectionParams,
    ) -> Result<ConnectionTree, PluginError> {
        let plugin = self.resolve(name)?;
        let tree = self
            .fetch_tree(name, &plugin, connection)
            .map(|mut tree| {
                for key in tree.dedup_siblings() {
                    warn!(
                        target: FACADE_TARGET,
                        plugin = name,
                        key = %key,
                        "dropped duplicate tree node"
                    );
                }
                tree
            });
        Ok(tree.unwrap_or_else(|err| {
            warn!(
                target: FACADE_TARGET,
                plugin = name,
                error = %err,
                "connection tree unavailable"
            );
            ConnectionTree::default()
        }))
    }

    fn fetch_tree(
        &self,
        name: &str,
        plugin: &PluginDescriptor,
        connection: &ConnectionParams,
    ) -> Result<ConnectionTree, PluginError> {
        let resolved = self.resolve_credentials(name, connection)?;
        let payload = encode_tree_request(&TreeRequest::new(resolved))?;
        let call = InvocationRequest::new(
            name,
            plugin.path(),
            PluginCommand::ConnectionTree,
            self.exec_timeout,
        )
        .with_payload(payload);
        let stdout = self.invoker.invoke(&call)?;
        decode_connection_tree(name, &stdout)
    }

    /// Stores a secret in the attached vault.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::VaultUnavailable`] without a vault, or
    /// [`PluginError::Vault`] when the vault rejects the write.
    pub fn store_credential(&self, key: &str, secret: &Secret) -> Result<(), PluginError> {
        Ok(self.vault()?.store(key, secret)?)
    }

    /// Deletes a secret from the attached vault.
    ///
    /// # Errors
    ///
    /// As for [`store_credential`](Self::store_credential).
    pub fn delete_credential(&self, key: &str) -> Result<(), PluginError> {
        Ok(self.vault()?.delete(key)?)
    }

    fn vault(&self) -> Result<&Vault, PluginError> {
        self.vault.as_deref().ok_or(PluginError::VaultUnavailable)
    }

    fn resolve(&self, name: &str) -> Result<PluginDescriptor, PluginError> {
        self.registry.get(name).ok_or_else(|| PluginError::NotFound {
            name: name.to_owned(),
        })
    }

    /// Replaces a `credential_key` reference with the stored secret. An
    /// explicit password is left alone; the reference never reaches the
    /// plugin.
    fn resolve_credentials(
        &self,
        name: &str,
        connection: &ConnectionParams,
    ) -> Result<ConnectionParams, PluginError> {
        let mut resolved = connection.clone();
        let Some(key) = resolved.remove(CREDENTIAL_KEY_PARAM) else {
            return Ok(resolved);
        };
        if resolved.contains_key(PASSWORD_PARAM) {
            return Ok(resolved);
        }
        let secret = self
            .vault()?
            .get(&key)
            .map_err(|source| PluginError::Credential {
                name: name.to_owned(),
                key,
                source,
            })?;
        resolved.insert(PASSWORD_PARAM.to_owned(), secret.into_inner());
        Ok(resolved)
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("registry", &self.registry)
            .field("vault", &self.vault)
            .field("exec_timeout", &self.exec_timeout)
            .finish_non_exhaustive()
    }
}
