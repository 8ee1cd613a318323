use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::InstallError;

/// Where an app's content comes from.
///
/// Flattened into [`AppEntry`] so the registry reads `url: ...` or `cmd: ...`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AppSource {
    Url(String),
    Cmd(String),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Installed {
    pub time: DateTime<Utc>,
}

/// One registry record per installed app.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppEntry {
    pub target: PathBuf,
    #[serde(flatten)]
    pub source: AppSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rootdir: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contentdir: Option<bool>,
    pub installed: Installed,
}

/// Options accepted by [`crate::install::install`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallOptions {
    pub url: Option<String>,
    pub cmd: Option<String>,
    pub rootdir: Option<String>,
    /// `Some(false)` keeps a single top-level archive directory.
    pub contentdir: Option<bool>,
    pub target: Option<PathBuf>,
    /// Skip the setup runner when set.
    pub skip_setup: bool,
}

impl InstallOptions {
    pub fn url(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            ..Self::default()
        }
    }

    pub fn cmd(cmd: impl Into<String>) -> Self {
        Self {
            cmd: Some(cmd.into()),
            ..Self::default()
        }
    }

    pub fn policy(&self) -> ExtractionPolicy {
        ExtractionPolicy {
            rootdir: self.rootdir.clone(),
            contentdir: self.contentdir.unwrap_or(true),
        }
    }

    pub fn has_source(&self) -> bool {
        self.url.is_some() || self.cmd.is_some()
    }
}

/// How an extracted tree is re-rooted before placement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionPolicy {
    pub rootdir: Option<String>,
    pub contentdir: bool,
}

impl Default for ExtractionPolicy {
    fn default() -> Self {
        Self {
            rootdir: None,
            contentdir: true,
        }
    }
}

/// Options accepted by [`crate::uninstall::uninstall`]. Currently empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UninstallOptions {}

/// Result of running one setup descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SetupStatus {
    Ran,
    Skipped,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetupRecord {
    pub descriptor: PathBuf,
    pub status: SetupStatus,
}

#[derive(Debug)]
pub struct InstallReport {
    pub name: String,
    pub entry: AppEntry,
    pub setup: Vec<SetupRecord>,
    /// Non-fatal setup failures, always [`InstallError::SetupActionFailure`].
    pub setup_failures: Vec<InstallError>,
}

#[derive(Debug)]
pub struct UninstallReport {
    pub name: String,
    pub target: PathBuf,
    /// False when the app was neither registered nor present on disk.
    pub removed: bool,
    pub residue: Vec<PathBuf>,
}

impl UninstallReport {
    /// Residue as an [`InstallError::UninstallIncomplete`], if any was left.
    pub fn incomplete(&self) -> Option<InstallError> {
        if self.residue.is_empty() {
            return None;
        }
        Some(InstallError::UninstallIncomplete {
            target: self.target.clone(),
            residue: self.residue.clone(),
        })
    }
}

/// Per-name result of a batch operation.
#[derive(Debug)]
pub struct AppOutcome<T> {
    pub name: String,
    pub result: Result<T, InstallError>,
}

impl<T> AppOutcome<T> {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}
