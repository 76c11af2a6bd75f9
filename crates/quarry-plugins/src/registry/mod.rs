//! Discovery and bookkeeping of plugin executables.
//!
//! The [`PluginRegistry`] keeps an eventually consistent view of the plugin
//! directory. Each discovery pass lists the directory, probes new or
//! replaced executables with `info`, and drops descriptors whose file has
//! vanished. A failed probe is recorded on the descriptor; it never removes
//! the plugin from the listing.
//!
//! The map lock is held only to copy a snapshot or apply a finished pass,
//! never across a probe, so queries are never blocked by a slow plugin.
//! Whole passes are serialised by a separate lock so a [`rescan`] racing
//! the background loop does not probe the same file twice.
//!
//! [`rescan`]: PluginRegistry::rescan

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, SystemTime};

use serde::Serialize;
use time::OffsetDateTime;
use tracing::{debug, info, warn};

use crate::codec::decode_info;
use crate::error::PluginError;
use crate::invoker::{InvocationRequest, PluginInvoker};
use crate::protocol::{PluginCommand, PluginInfo};

mod scan;
mod schedule;

pub use self::schedule::{
    Clock, DiscoveryHandle, DiscoveryLoop, IntervalTicker, SystemClock, Ticker,
};

use self::scan::Candidate;

/// Tracing target for discovery and probing.
const REGISTRY_TARGET: &str = "quarry_plugins::registry";

/// A discovered plugin executable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginDescriptor {
    name: String,
    path: PathBuf,
    version: String,
    description: String,
    #[serde(rename = "type")]
    kind: String,
    last_probe_error: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    discovered_at: OffsetDateTime,
    #[serde(skip)]
    modified: Option<SystemTime>,
}

impl PluginDescriptor {
    fn probed(
        candidate: Candidate,
        probe: Result<PluginInfo, PluginError>,
        discovered_at: OffsetDateTime,
    ) -> Self {
        let (info, last_probe_error) = match probe {
            Ok(info) => (info, None),
            Err(err) => (PluginInfo::default(), Some(err.to_string())),
        };
        Self {
            name: candidate.name,
            path: candidate.path,
            version: info.version,
            description: info.description,
            kind: info.kind,
            last_probe_error,
            discovered_at,
            modified: candidate.modified,
        }
    }

    /// Returns the registry key, derived from the executable's file stem.
    #[must_use]
    pub const fn name(&self) -> &str {
        self.name.as_str()
    }

    /// Returns the executable path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the version reported by the last `info` probe.
    #[must_use]
    pub const fn version(&self) -> &str {
        self.version.as_str()
    }

    /// Returns the description reported by the last `info` probe.
    #[must_use]
    pub const fn description(&self) -> &str {
        self.description.as_str()
    }

    /// Returns the database family reported by the last `info` probe.
    #[must_use]
    pub const fn kind(&self) -> &str {
        self.kind.as_str()
    }

    /// Returns the error from the last `info` probe, if it failed.
    #[must_use]
    pub fn last_probe_error(&self) -> Option<&str> {
        self.last_probe_error.as_deref()
    }

    /// Returns when the executable was first discovered.
    #[must_use]
    pub const fn discovered_at(&self) -> OffsetDateTime {
        self.discovered_at
    }

    fn is_current(&self, candidate: &Candidate) -> bool {
        self.path == candidate.path && self.modified == candidate.modified
    }
}

/// Registry of discovered plugin executables.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use std::time::Duration;
/// use quarry_plugins::process::ProcessInvoker;
/// use quarry_plugins::registry::PluginRegistry;
///
/// let registry = PluginRegistry::new(
///     "/opt/quarry/plugins",
///     Arc::new(ProcessInvoker),
///     Duration::from_secs(2),
/// );
/// registry.rescan().expect("plugin directory is readable");
/// for plugin in registry.list() {
///     println!("{} {}", plugin.name(), plugin.version());
/// }
/// ```
pub struct PluginRegistry {
    dir: PathBuf,
    probe_timeout: Duration,
    invoker: Arc<dyn PluginInvoker>,
    clock: Arc<dyn Clock>,
    plugins: Mutex<HashMap<String, PluginDescriptor>>,
    pass: Mutex<()>,
    passes: AtomicU64,
}

impl PluginRegistry {
    /// Creates an empty registry over `dir`. Nothing is scanned until the
    /// first pass.
    #[must_use]
    pub fn new(
        dir: impl Into<PathBuf>,
        invoker: Arc<dyn PluginInvoker>,
        probe_timeout: Duration,
    ) -> Self {
        Self {
            dir: dir.into(),
            probe_timeout,
            invoker,
            clock: Arc::new(SystemClock),
            plugins: Mutex::new(HashMap::new()),
            pass: Mutex::new(()),
            passes: AtomicU64::new(0),
        }
    }

    /// Replaces the clock used to stamp newly discovered plugins.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Returns the scanned directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns the deadline applied to `info` probes.
    #[must_use]
    pub const fn probe_timeout(&self) -> Duration {
        self.probe_timeout
    }

    /// Returns a snapshot of all descriptors, ordered by name.
    #[must_use]
    pub fn list(&self) -> Vec<PluginDescriptor> {
        let mut plugins: Vec<_> = self.plugins().values().cloned().collect();
        plugins.sort_by(|left, right| left.name.cmp(&right.name));
        plugins
    }

    /// Looks up a single descriptor.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<PluginDescriptor> {
        self.plugins().get(name).cloned()
    }

    /// Returns the number of discovery passes run to completion, counting
    /// passes that failed to list the directory.
    #[must_use]
    pub fn passes(&self) -> u64 {
        self.passes.load(Ordering::SeqCst)
    }

    /// Runs a discovery pass now.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::Discovery`] when the plugin directory cannot
    /// be listed. No descriptors are removed in that case.
    pub fn rescan(&self) -> Result<(), PluginError> {
        self.discover(&|| false)
    }

    /// Runs a pass, abandoning it before the next probe once `cancelled`
    /// returns `true`. An abandoned pass leaves the map untouched.
    pub(crate) fn discover(&self, cancelled: &dyn Fn() -> bool) -> Result<(), PluginError> {
        let _pass = self.pass.lock().unwrap_or_else(PoisonError::into_inner);

        let candidates = match scan::scan(&self.dir) {
            Ok(candidates) => candidates,
            Err(err) => {
                self.passes.fetch_add(1, Ordering::SeqCst);
                return Err(err);
            }
        };
        let known = self.plugins().clone();

        let mut probed = Vec::new();
        for candidate in candidates.values() {
            let previous = known.get(&candidate.name);
            if previous.is_some_and(|descriptor| descriptor.is_current(candidate)) {
                continue;
            }
            if cancelled() {
                debug!(target: REGISTRY_TARGET, "discovery pass abandoned");
                return Ok(());
            }
            let discovered_at = previous.map_or_else(|| self.clock.now(), |d| d.discovered_at);
            let probe = self.probe(candidate);
            probed.push(PluginDescriptor::probed(candidate.clone(), probe, discovered_at));
        }

        let mut plugins = self.plugins();
        plugins.retain(|name, _| {
            let present = candidates.contains_key(name);
            if !present {
                info!(target: REGISTRY_TARGET, plugin = %name, "plugin removed");
            }
            present
        });
        for descriptor in probed {
            let name = descriptor.name.clone();
            if plugins.insert(name.clone(), descriptor).is_none() {
                info!(target: REGISTRY_TARGET, plugin = %name, "plugin discovered");
            } else {
                debug!(target: REGISTRY_TARGET, plugin = %name, "plugin refreshed");
            }
        }
        drop(plugins);

        self.passes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn probe(&self, candidate: &Candidate) -> Result<PluginInfo, PluginError> {
        let request = InvocationRequest::new(
            candidate.name.as_str(),
            candidate.path.as_path(),
            PluginCommand::Info,
            self.probe_timeout,
        );
        let probe = self
            .invoker
            .invoke(&request)
            .and_then(|stdout| decode_info(&candidate.name, &stdout));
        match &probe {
            Ok(info) => debug!(
                target: REGISTRY_TARGET,
                plugin = %candidate.name,
                version = %info.version,
                "probe succeeded"
            ),
            Err(err) => warn!(
                target: REGISTRY_TARGET,
                plugin = %candidate.name,
                error = %err,
                "probe failed; plugin stays listed"
            ),
        }
        probe
    }

    fn plugins(&self) -> MutexGuard<'_, HashMap<String, PluginDescriptor>> {
        // Every mutation completes between statements, so a poisoned map is
        // still consistent.
        self.plugins.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("dir", &self.dir)
            .field("probe_timeout", &self.probe_timeout)
            .field("plugins", &self.plugins().len())
            .field("passes", &self.passes())
            .finish_non_exhaustive()
    }
}

#[cfg(all(test, unix))]
mod tests;
