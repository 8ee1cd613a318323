use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::config::Config;
use crate::error::{InstallError, Result};
use crate::install::validate_app_name;
use crate::registry::Registry;
use crate::types::{AppOutcome, UninstallOptions, UninstallReport};

/// Removes each app's directory and registry entry.
///
/// Leftover files do not fail the batch; they are listed in the report.
pub fn uninstall<S: AsRef<str>>(
    config: &Config,
    names: &[S],
    _options: &UninstallOptions,
) -> Vec<AppOutcome<UninstallReport>> {
    let registry_path = config.registry_path();
    let mut registry = match Registry::load(&registry_path) {
        Ok(registry) => Some(registry),
        Err(e) => {
            tracing::error!("{}", e);
            None
        }
    };

    names
        .iter()
        .map(|name| {
            let name = name.as_ref();
            let result = match registry.as_mut() {
                Some(registry) => uninstall_app(config, registry, name),
                None => Err(InstallError::Registry {
                    path: registry_path.clone(),
                    reason: "registry could not be loaded".to_string(),
                }),
            };
            match &result {
                Ok(report) if !report.removed => tracing::warn!("{} is not installed", name),
                Ok(report) => match report.incomplete() {
                    Some(incomplete) => tracing::warn!("Uninstalled {}, but {}", name, incomplete),
                    None => tracing::info!("Uninstalled {}", name),
                },
                Err(e) => tracing::error!("Failed to uninstall {}: {}", name, e),
            }
            AppOutcome {
                name: name.to_string(),
                result,
            }
        })
        .collect()
}

fn uninstall_app(config: &Config, registry: &mut Registry, name: &str) -> Result<UninstallReport> {
    validate_app_name(name)?;

    let registered = registry.get(name).is_some();
    let target = registry
        .get(name)
        .map(|entry| entry.target.clone())
        .unwrap_or_else(|| config.app_dir(name));

    // A hand-edited registry must not turn into `rm -rf` of a root
    if config.is_protected(&target)? {
        return Err(InstallError::ProtectedTarget { target });
    }

    let exists = target.symlink_metadata().is_ok();
    if !registered && !exists {
        return Ok(UninstallReport {
            name: name.to_string(),
            target,
            removed: false,
            residue: Vec::new(),
        });
    }

    let residue = if exists {
        tracing::info!("Removing directory: {}", target.display());
        remove_tree_best_effort(&target)
    } else {
        Vec::new()
    };

    registry.remove(name)?;

    Ok(UninstallReport {
        name: name.to_string(),
        target,
        removed: true,
        residue,
    })
}

/// Deletes `root` recursively and returns the paths that could not be removed.
///
/// Read-only entries (version-control object stores on some platforms) are
/// made writable and retried once.
pub fn remove_tree_best_effort(root: &Path) -> Vec<PathBuf> {
    if root.symlink_metadata().is_err() {
        return Vec::new();
    }
    if fs::remove_dir_all(root).is_ok() {
        return Vec::new();
    }
    if root.symlink_metadata().map(|m| !m.is_dir()).unwrap_or(false) {
        return match remove_entry(root, false) {
            Ok(()) => Vec::new(),
            Err(_) => vec![root.to_path_buf()],
        };
    }

    let mut residue = Vec::new();
    for entry in WalkDir::new(root).contents_first(true) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                if let Some(path) = e.path() {
                    residue.push(path.to_path_buf());
                }
                continue;
            }
        };
        let is_dir = entry.file_type().is_dir();
        if let Err(e) = remove_entry(entry.path(), is_dir) {
            tracing::debug!("Could not remove {}: {}", entry.path().display(), e);
            residue.push(entry.path().to_path_buf());
        }
    }
    residue
}

fn remove_entry(path: &Path, is_dir: bool) -> io::Result<()> {
    let remove = || {
        if is_dir {
            fs::remove_dir(path)
        } else {
            fs::remove_file(path)
        }
    };
    match remove() {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(_) => {
            make_writable(path)?;
            remove()
        }
    }
}

#[cfg(unix)]
fn make_writable(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    // Unlinking needs write permission on the containing directory
    if let Some(parent) = path.parent() {
        let mode = fs::metadata(parent)?.permissions().mode();
        fs::set_permissions(parent, fs::Permissions::from_mode(mode | 0o700))?;
    }
    Ok(())
}

#[cfg(not(unix))]
fn make_writable(path: &Path) -> io::Result<()> {
    let mut perms = fs::symlink_metadata(path)?.permissions();
    #[allow(clippy::permissions_set_readonly_false)]
    perms.set_readonly(false);
    fs::set_permissions(path, perms)
}
