//! Directory enumeration for plugin discovery.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use tracing::{debug, warn};

use super::REGISTRY_TARGET;
use crate::error::PluginError;

/// An executable found in the plugin directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) struct Candidate {
    pub(super) name: String,
    pub(super) path: PathBuf,
    pub(super) modified: Option<SystemTime>,
}

/// Lists the plugin executables in `dir`, keyed by file stem.
///
/// Entries are visited in path order so that when two files share a stem
/// the lexicographically first one wins.
pub(super) fn scan(dir: &Path) -> Result<BTreeMap<String, Candidate>, PluginError> {
    let entries = fs::read_dir(dir).map_err(|err| PluginError::Discovery {
        path: dir.to_path_buf(),
        source: Arc::new(err),
    })?;

    let mut paths: Vec<PathBuf> = entries
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry.path()),
            Err(err) => {
                debug!(target: REGISTRY_TARGET, error = %err, "skipping unreadable entry");
                None
            }
        })
        .collect();
    paths.sort();

    let mut found: BTreeMap<String, Candidate> = BTreeMap::new();
    for path in paths {
        let Some(candidate) = inspect(&path) else {
            continue;
        };
        if let Some(winner) = found.get(&candidate.name) {
            warn!(
                target: REGISTRY_TARGET,
                plugin = %candidate.name,
                kept = %winner.path.display(),
                ignored = %candidate.path.display(),
                "duplicate plugin name"
            );
            continue;
        }
        found.insert(candidate.name.clone(), candidate);
    }
    Ok(found)
}

fn inspect(path: &Path) -> Option<Candidate> {
    let file_name = path.file_name()?.to_str()?;
    if file_name.starts_with('.') {
        return None;
    }
    // Follows symlinks so a linked plugin is judged by its target.
    let metadata = match fs::metadata(path) {
        Ok(metadata) => metadata,
        Err(err) => {
            debug!(
                target: REGISTRY_TARGET,
                path = %path.display(),
                error = %err,
                "skipping entry without metadata"
            );
            return None;
        }
    };
    if !metadata.is_file() || !is_executable(path, &metadata) {
        return None;
    }
    let name = path.file_stem()?.to_str()?.to_owned();
    Some(Candidate {
        name,
        path: path.to_path_buf(),
        modified: metadata.modified().ok(),
    })
}

#[cfg(unix)]
fn is_executable(_path: &Path, metadata: &fs::Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o111 != 0
}

#[cfg(windows)]
fn is_executable(path: &Path, _metadata: &fs::Metadata) -> bool {
    const EXTENSIONS: [&str; 3] = ["exe", "bat", "cmd"];
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| EXTENSIONS.iter().any(|known| ext.eq_ignore_ascii_case(known)))
}

#[cfg(not(any(unix, windows)))]
fn is_executable(_path: &Path, _metadata: &fs::Metadata) -> bool {
    true
}
