//! Persistent record of installed apps, stored as YAML.
//!
//! Every mutation re-reads the file, applies the change and writes it back
//! immediately, so completed installs survive a crash later in a batch.
//! There is no locking; concurrent writers must serialize externally.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::{InstallError, Result};
use crate::types::AppEntry;

#[derive(Debug, Clone)]
pub struct Registry {
    path: PathBuf,
    apps: BTreeMap<String, AppEntry>,
}

impl Registry {
    /// Loads the registry at `path`. A missing or empty file is an empty registry.
    pub fn load(path: &Path) -> Result<Self> {
        let apps = read_apps(path)?;
        tracing::debug!("Loaded {} registry entries from {}", apps.len(), path.display());
        Ok(Self {
            path: path.to_path_buf(),
            apps,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, name: &str) -> Option<&AppEntry> {
        self.apps.get(name)
    }

    pub fn entries(&self) -> &BTreeMap<String, AppEntry> {
        &self.apps
    }

    pub fn is_empty(&self) -> bool {
        self.apps.is_empty()
    }

    /// Inserts or replaces `name` and persists.
    pub fn upsert(&mut self, name: &str, entry: AppEntry) -> Result<()> {
        self.refresh()?;
        self.apps.insert(name.to_string(), entry);
        self.save()
    }

    /// Removes `name` and persists. Absent names are a no-op.
    pub fn remove(&mut self, name: &str) -> Result<Option<AppEntry>> {
        self.refresh()?;
        let removed = self.apps.remove(name);
        if removed.is_some() {
            self.save()?;
        }
        Ok(removed)
    }

    /// Writes the registry through a temporary file and a rename.
    pub fn save(&self) -> Result<()> {
        let registry_error = |reason: String| InstallError::Registry {
            path: self.path.clone(),
            reason,
        };

        let dir = self
            .path
            .parent()
            .ok_or_else(|| registry_error("invalid registry path".to_string()))?;
        fs::create_dir_all(dir)?;

        let content = serde_yaml::to_string(&self.apps).map_err(|e| registry_error(e.to_string()))?;
        let mut file = tempfile::NamedTempFile::new_in(dir)?;
        file.write_all(content.as_bytes())?;
        file.persist(&self.path)
            .map_err(|e| registry_error(e.error.to_string()))?;

        tracing::debug!("Saved registry to {}", self.path.display());
        Ok(())
    }

    /// Picks up changes other processes wrote since the last load.
    fn refresh(&mut self) -> Result<()> {
        self.apps = read_apps(&self.path)?;
        Ok(())
    }
}

fn read_apps(path: &Path) -> Result<BTreeMap<String, AppEntry>> {
    if !path.exists() {
        return Ok(BTreeMap::new());
    }

    let content = fs::read_to_string(path)?;
    if content.trim().is_empty() {
        return Ok(BTreeMap::new());
    }

    let registry_error = |reason: String| InstallError::Registry {
        path: path.to_path_buf(),
        reason,
    };

    let raw: Option<BTreeMap<String, serde_yaml::Value>> =
        serde_yaml::from_str(&content).map_err(|e| registry_error(e.to_string()))?;

    raw.unwrap_or_default()
        .into_iter()
        .map(|(name, fields)| {
            // Flattening would silently keep whichever source comes first
            if fields.get("url").is_some() && fields.get("cmd").is_some() {
                return Err(registry_error(format!("app '{}' has both url and cmd", name)));
            }
            let entry: AppEntry = serde_yaml::from_value(fields)
                .map_err(|e| registry_error(format!("app '{}': {}", name, e)))?;
            Ok((name, entry))
        })
        .collect()
}
