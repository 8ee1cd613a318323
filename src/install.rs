use chrono::Utc;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;

use crate::config::Config;
use crate::download::{
    download_file, download_name, extract_archive, normalize_root, ArchiveFormat,
};
use crate::error::{InstallError, Result};
use crate::place::{copy_tree, place_tree, replace_in_place, staging_dir, STAGING_PREFIX};
use crate::platform::{describe_failure, shell_command};
use crate::probe::ToolProber;
use crate::registry::Registry;
use crate::setup::run_setup;
use crate::source::{render_command, resolve_source, CommandPlan, SourceStrategy};
use crate::types::*;

/// Installs each app in `names` with the same `options`.
///
/// Names are processed in order and independently: one failure does not stop
/// the rest. Each successful install is recorded in the registry before the
/// next name starts.
pub fn install<S: AsRef<str>>(
    config: &Config,
    names: &[S],
    options: &InstallOptions,
    prober: &dyn ToolProber,
) -> Vec<AppOutcome<InstallReport>> {
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
                Some(registry) => install_app(config, registry, name, options, prober),
                None => Err(InstallError::Registry {
                    path: registry_path.clone(),
                    reason: "registry could not be loaded".to_string(),
                }),
            };
            match &result {
                Ok(_) => tracing::info!("Installed {}", name),
                Err(e) => tracing::error!("Failed to install {}: {}", name, e),
            }
            AppOutcome {
                name: name.to_string(),
                result,
            }
        })
        .collect()
}

pub fn validate_app_name(name: &str) -> Result<()> {
    let invalid = |reason: &str| InstallError::InvalidAppName {
        name: name.to_string(),
        reason: reason.to_string(),
    };

    if name.trim().is_empty() {
        return Err(invalid("name is empty"));
    }
    if name == "." || name == ".." {
        return Err(invalid("name is a relative path"));
    }
    if name.starts_with('.') {
        return Err(invalid("names starting with '.' are reserved"));
    }
    if name.contains(['/', '\\']) || name.contains('\0') {
        return Err(invalid("name contains a path separator"));
    }
    if name == crate::config::REGISTRY_FILE_NAME {
        return Err(invalid("name collides with the registry file"));
    }
    Ok(())
}

/// Fills in source and policy from an earlier install when none is given.
fn effective_options(name: &str, options: &InstallOptions, registry: &Registry) -> Result<InstallOptions> {
    if options.has_source() {
        return Ok(options.clone());
    }

    let entry = registry
        .get(name)
        .ok_or_else(|| InstallError::UnresolvableSource {
            name: name.to_string(),
            reason: "neither url nor cmd given, and the app is not registered".to_string(),
        })?;
    tracing::info!("Reinstalling {} from its registered source", name);

    let mut merged = options.clone();
    match &entry.source {
        AppSource::Url(url) => merged.url = Some(url.clone()),
        AppSource::Cmd(cmd) => merged.cmd = Some(cmd.clone()),
    }
    if merged.rootdir.is_none() {
        merged.rootdir = entry.rootdir.clone();
    }
    if merged.contentdir.is_none() {
        merged.contentdir = entry.contentdir;
    }
    if merged.target.is_none() {
        merged.target = Some(entry.target.clone());
    }
    Ok(merged)
}

fn absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}

fn install_app(
    config: &Config,
    registry: &mut Registry,
    name: &str,
    options: &InstallOptions,
    prober: &dyn ToolProber,
) -> Result<InstallReport> {
    validate_app_name(name)?;

    let options = effective_options(name, options, registry)?;
    let strategy = resolve_source(name, &options)?;
    let policy = options.policy();

    let target = match (&options.target, registry.get(name)) {
        (Some(target), _) => absolute(target)?,
        (None, Some(entry)) => entry.target.clone(),
        (None, None) => absolute(&config.app_dir(name))?,
    };
    if config.is_protected(&target)? {
        return Err(InstallError::ProtectedTarget { target });
    }
    tracing::info!(
        "Installing {} from {} into {}",
        name,
        strategy.kind(),
        target.display()
    );

    fs::create_dir_all(config.apps_root())?;
    if target.exists() && registry.get(name).is_none() {
        tracing::warn!(
            "{} exists but is not a registered app; overwriting it",
            target.display()
        );
    }

    // Dropping the staging directory discards anything left in it
    let staging = staging_dir(&target)?;
    match materialize(config, name, &strategy, &policy, &staging, &target)? {
        Built::Staged(root) => place_tree(&root, &target)?,
        Built::InPlace => tracing::info!("Built {} in place", target.display()),
    }
    drop(staging);

    let (setup, setup_failures) = if config.settings.run_setup && !options.skip_setup {
        run_setup(&target, prober)
    } else {
        tracing::debug!("Setup disabled for {}", name);
        (Vec::new(), Vec::new())
    };

    let source = match &strategy {
        SourceStrategy::Command { cmd } => AppSource::Cmd(cmd.clone()),
        SourceStrategy::RemoteArchive { url, .. } => AppSource::Url(url.clone()),
        SourceStrategy::LocalDirectory { path } | SourceStrategy::LocalArchive { path, .. } => {
            AppSource::Url(absolute(path)?.to_string_lossy().into_owned())
        }
    };
    let entry = AppEntry {
        target,
        source,
        rootdir: options.rootdir.clone(),
        contentdir: options.contentdir,
        installed: Installed { time: Utc::now() },
    };
    registry.upsert(name, entry.clone())?;

    Ok(InstallReport {
        name: name.to_string(),
        entry,
        setup,
        setup_failures,
    })
}

/// Where `materialize` left the finished tree.
enum Built {
    /// Inside the staging directory, still to be placed.
    Staged(PathBuf),
    /// Already at the target.
    InPlace,
}

/// Produces the finished tree for `target`.
fn materialize(
    config: &Config,
    name: &str,
    strategy: &SourceStrategy,
    policy: &ExtractionPolicy,
    staging: &TempDir,
    target: &Path,
) -> Result<Built> {
    let content = staging.path().join("content");
    // Directories and substituted commands are already rooted where asked
    let rootdir_only = ExtractionPolicy {
        rootdir: policy.rootdir.clone(),
        contentdir: false,
    };

    match strategy {
        SourceStrategy::LocalDirectory { path } => {
            tracing::debug!("Copying {} to {}", path.display(), content.display());
            copy_tree(path, &content)?;
            normalize_root(&content, &rootdir_only).map(Built::Staged)
        }
        SourceStrategy::LocalArchive { path, format } => {
            extract_archive(path, *format, &content)?;
            normalize_root(&content, policy).map(Built::Staged)
        }
        SourceStrategy::RemoteArchive { url, format } => {
            let download_dir = tempfile::Builder::new().prefix(STAGING_PREFIX).tempdir()?;
            let archive_path = download_dir.path().join(download_name(url));
            let timeout = config.settings.download_timeout_secs.map(Duration::from_secs);
            download_file(url, &archive_path, timeout)?;

            let format = (*format)
                .or_else(|| ArchiveFormat::detect(&archive_path))
                .ok_or_else(|| InstallError::UnresolvableSource {
                    name: name.to_string(),
                    reason: format!("{} did not return a supported archive", url),
                })?;
            extract_archive(&archive_path, format, &content)?;
            normalize_root(&content, policy).map(Built::Staged)
        }
        SourceStrategy::Command { cmd } => {
            match render_command(cmd, target, &config.settings.target_placeholder) {
                CommandPlan::Substituted(command) => {
                    // The command sees the real target path, so it builds there
                    replace_in_place(target, |target| {
                        run_command(&command, staging.path())?;
                        if !target.is_dir() {
                            return Err(InstallError::CommandFailed {
                                cmd: command.clone(),
                                reason: "command did not create the target directory".to_string(),
                            });
                        }
                        if policy.rootdir.is_some() {
                            fs::rename(target, &content)?;
                            let root = normalize_root(&content, &rootdir_only)?;
                            place_tree(&root, target)?;
                        }
                        Ok(())
                    })?;
                    Ok(Built::InPlace)
                }
                CommandPlan::RunInTarget(command) => {
                    fs::create_dir_all(&content)?;
                    run_command(&command, &content)?;
                    normalize_root(&content, policy).map(Built::Staged)
                }
            }
        }
    }
}

fn run_command(command: &str, cwd: &Path) -> Result<()> {
    tracing::info!("Running `{}`", command);
    tracing::debug!("Working directory: {}", cwd.display());

    let output = shell_command(command, cwd)
        .output()
        .map_err(|e| InstallError::CommandFailed {
            cmd: command.to_string(),
            reason: e.to_string(),
        })?;

    if !output.status.success() {
        return Err(InstallError::CommandFailed {
            cmd: command.to_string(),
            reason: describe_failure(&output),
        });
    }
    Ok(())
}
