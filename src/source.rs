//! Decides how an app's content is materialized.

use regex::{NoExpand, Regex};
use std::path::{Path, PathBuf};

use crate::download::ArchiveFormat;
use crate::error::{InstallError, Result};
use crate::platform::shell_quote;
use crate::types::InstallOptions;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceStrategy {
    /// A shell command (typically a version-control clone).
    Command { cmd: String },
    LocalDirectory { path: PathBuf },
    LocalArchive { path: PathBuf, format: ArchiveFormat },
    /// Format is only known once the download completes, unless the URL names it.
    RemoteArchive { url: String, format: Option<ArchiveFormat> },
}

impl SourceStrategy {
    pub fn kind(&self) -> &'static str {
        match self {
            SourceStrategy::Command { .. } => "command",
            SourceStrategy::LocalDirectory { .. } => "directory",
            SourceStrategy::LocalArchive { .. } => "local archive",
            SourceStrategy::RemoteArchive { .. } => "remote archive",
        }
    }
}

pub fn is_remote(url: &str) -> bool {
    let lower = url.to_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// Picks the materialization strategy for one app.
///
/// `cmd` wins over `url`. A `url` naming a directory is copied, a local file
/// must be a recognised archive, and network addresses are downloaded.
pub fn resolve_source(name: &str, options: &InstallOptions) -> Result<SourceStrategy> {
    let unresolvable = |reason: String| InstallError::UnresolvableSource {
        name: name.to_string(),
        reason,
    };

    if let Some(cmd) = &options.cmd {
        if cmd.trim().is_empty() {
            return Err(unresolvable("cmd is empty".to_string()));
        }
        return Ok(SourceStrategy::Command { cmd: cmd.clone() });
    }

    let url = match &options.url {
        Some(url) if !url.trim().is_empty() => url.trim(),
        _ => return Err(unresolvable("neither url nor cmd given".to_string())),
    };

    if is_remote(url) {
        return Ok(SourceStrategy::RemoteArchive {
            url: url.to_string(),
            format: ArchiveFormat::from_name(url.split(['?', '#']).next().unwrap_or(url)),
        });
    }

    let path = Path::new(url.strip_prefix("file://").unwrap_or(url));
    if path.is_dir() {
        return Ok(SourceStrategy::LocalDirectory {
            path: path.to_path_buf(),
        });
    }
    if path.is_file() {
        return match ArchiveFormat::detect(path) {
            Some(format) => Ok(SourceStrategy::LocalArchive {
                path: path.to_path_buf(),
                format,
            }),
            None => Err(unresolvable(format!(
                "{} is not a supported archive",
                path.display()
            ))),
        };
    }

    Err(unresolvable(format!("{} does not exist", url)))
}

/// A command line after target templating.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandPlan {
    /// The placeholder was replaced by the target path.
    Substituted(String),
    /// No placeholder: run the command as-is with the target as working directory.
    RunInTarget(String),
}

fn placeholder_regex(placeholder: &str) -> Option<Regex> {
    let name = placeholder.trim_start_matches('$');
    if name.is_empty() {
        return None;
    }
    let name = regex::escape(name);
    // Accepts both `$NAME` and `${NAME}`
    Regex::new(&format!(r"\$(?:\{{{name}\}}|{name}\b)")).ok()
}

/// Substitutes `placeholder` in `cmd` with `target`.
pub fn render_command(cmd: &str, target: &Path, placeholder: &str) -> CommandPlan {
    match placeholder_regex(placeholder) {
        Some(re) if re.is_match(cmd) => {
            let quoted = shell_quote(target);
            CommandPlan::Substituted(re.replace_all(cmd, NoExpand(&quoted)).into_owned())
        }
        _ => CommandPlan::RunInTarget(cmd.to_string()),
    }
}
