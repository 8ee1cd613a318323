use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

pub const APP_NAME: &str = "appkeeper";
pub const APPS_DIR_NAME: &str = "apps";
pub const REGISTRY_FILE_NAME: &str = "apps.yaml";
pub const SETTINGS_FILE_NAME: &str = "config.yaml";
pub const DATA_ENV: &str = "APPKEEPER_DATA";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Settings {
    #[serde(default = "default_run_setup")]
    pub run_setup: bool,
    #[serde(default = "default_target_placeholder")]
    pub target_placeholder: String,
    #[serde(default)]
    pub download_timeout_secs: Option<u64>,
}

fn default_run_setup() -> bool {
    true
}
fn default_target_placeholder() -> String {
    "$TARGET".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            run_setup: default_run_setup(),
            target_placeholder: default_target_placeholder(),
            download_timeout_secs: None,
        }
    }
}

/// Everything the engine needs to know about its surroundings.
///
/// Passed explicitly into `install`/`uninstall`; the engine never reads the
/// environment on its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub data_root: PathBuf,
    pub settings: Settings,
}

impl Config {
    pub fn with_data_root(data_root: impl Into<PathBuf>) -> Self {
        Self {
            data_root: data_root.into(),
            settings: Settings::default(),
        }
    }

    pub fn apps_root(&self) -> PathBuf {
        self.data_root.join(APPS_DIR_NAME)
    }

    pub fn registry_path(&self) -> PathBuf {
        self.apps_root().join(REGISTRY_FILE_NAME)
    }

    /// Conventional target for an app when nothing else is recorded.
    pub fn app_dir(&self, name: &str) -> PathBuf {
        self.apps_root().join(name)
    }

    /// Whether replacing or deleting `target` would take the data root, the
    /// apps root or the registry file with it.
    pub fn is_protected(&self, target: &Path) -> io::Result<bool> {
        let target = resolve_path(target)?;
        if target.parent().is_none() {
            return Ok(true);
        }
        for guarded in [self.data_root.clone(), self.apps_root(), self.registry_path()] {
            if resolve_path(&guarded)?.starts_with(&target) {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

/// Absolute form of `path` with `.` and `..` folded away and the longest
/// existing prefix canonicalized.
pub fn resolve_path(path: &Path) -> io::Result<PathBuf> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };

    let mut normal = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normal.pop();
            }
            other => normal.push(other),
        }
    }

    let mut missing = Vec::new();
    let mut existing = normal.as_path();
    loop {
        if let Ok(canonical) = existing.canonicalize() {
            return Ok(missing
                .iter()
                .rev()
                .fold(canonical, |path, name| path.join(name)));
        }
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                missing.push(name.to_os_string());
                existing = parent;
            }
            _ => return Ok(normal.clone()),
        }
    }
}

pub fn get_data_root() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var(DATA_ENV) {
        if !dir.is_empty() {
            return Ok(PathBuf::from(dir));
        }
    }
    let path = dirs::data_dir()
        .ok_or_else(|| anyhow::anyhow!("Could not determine data directory"))?
        .join(APP_NAME);
    tracing::debug!("Data root: {}", path.display());
    Ok(path)
}

/// Loads the configuration from the data root and environment overrides.
pub fn load_config() -> Result<Config> {
    let data_root = get_data_root()?;
    let mut settings = load_settings(&data_root.join(SETTINGS_FILE_NAME))?;

    if let Ok(run_setup) = std::env::var("APPKEEPER_RUN_SETUP") {
        settings.run_setup = parse_bool(&run_setup).unwrap_or(settings.run_setup);
    }

    Ok(Config {
        data_root,
        settings,
    })
}

pub fn load_settings(path: &Path) -> Result<Settings> {
    if !path.exists() {
        return Ok(Settings::default());
    }

    let content = fs::read_to_string(path)
        .with_context(|| format!("Could not read settings file at {}", path.display()))?;
    if content.trim().is_empty() {
        return Ok(Settings::default());
    }

    serde_yaml::from_str(&content)
        .with_context(|| format!("Could not parse settings file {} as YAML", path.display()))
}

pub fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}
