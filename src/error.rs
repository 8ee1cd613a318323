use std::path::PathBuf;
use thiserror::Error;

use crate::probe::Tool;

/// Failures surfaced by the install engine.
///
/// Every variant is scoped to a single app name. Batch operations collect
/// them per name instead of aborting.
#[derive(Debug, Error)]
pub enum InstallError {
    #[error("invalid app name '{name}': {reason}")]
    InvalidAppName { name: String, reason: String },

    #[error("cannot resolve a source for '{name}': {reason}")]
    UnresolvableSource { name: String, reason: String },

    #[error("download of {url} failed: {reason}")]
    DownloadError { url: String, reason: String },

    #[error("archive {} is corrupt or unsafe: {reason}", path.display())]
    CorruptArchive { path: PathBuf, reason: String },

    #[error("rootdir '{rootdir}' not found in extracted content")]
    RootDirNotFound { rootdir: String },

    #[error("could not place content at {}: {source}", target.display())]
    Placement {
        target: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("refusing to use {} as an app target: it contains the apps root or the registry", target.display())]
    ProtectedTarget { target: PathBuf },

    #[error("command `{cmd}` failed: {reason}")]
    CommandFailed { cmd: String, reason: String },

    #[error("{tool} setup for {} failed: {reason}", descriptor.display())]
    SetupActionFailure {
        descriptor: PathBuf,
        tool: Tool,
        reason: String,
    },

    #[error("{} could not be fully removed ({} paths left)", target.display(), residue.len())]
    UninstallIncomplete {
        target: PathBuf,
        residue: Vec<PathBuf>,
    },

    #[error("registry {} error: {reason}", path.display())]
    Registry { path: PathBuf, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, InstallError>;
