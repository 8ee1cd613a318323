//! Host tool discovery.
//!
//! The setup runner asks a [`ToolProber`] whether each build tool exists
//! instead of assuming anything about the platform.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Tool {
    PowerShell,
    Make,
    Bash,
    Python,
    Npm,
    Bower,
}

impl Tool {
    pub const ALL: [Tool; 6] = [
        Tool::PowerShell,
        Tool::Make,
        Tool::Bash,
        Tool::Python,
        Tool::Npm,
        Tool::Bower,
    ];

    /// Executable names to look for on PATH, most preferred first.
    pub fn candidates(self) -> &'static [&'static str] {
        match self {
            Tool::PowerShell => &["powershell", "pwsh"],
            Tool::Make => &["make"],
            Tool::Bash => &["bash"],
            Tool::Python => &["python", "python3"],
            Tool::Npm => &["npm"],
            Tool::Bower => &["bower"],
        }
    }
}

impl fmt::Display for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Tool::PowerShell => "powershell",
            Tool::Make => "make",
            Tool::Bash => "bash",
            Tool::Python => "python",
            Tool::Npm => "npm",
            Tool::Bower => "bower",
        };
        f.write_str(name)
    }
}

pub trait ToolProber {
    /// Full path of the executable for `tool`, if it is installed.
    fn locate(&self, tool: Tool) -> Option<PathBuf>;

    fn is_available(&self, tool: Tool) -> bool {
        self.locate(tool).is_some()
    }
}

/// Probes the host's executable search path once and remembers the answer.
#[derive(Debug, Clone, Default)]
pub struct PathProber {
    found: HashMap<Tool, PathBuf>,
}

impl PathProber {
    pub fn new() -> Self {
        let mut found = HashMap::new();
        for tool in Tool::ALL {
            if let Some(path) = tool
                .candidates()
                .iter()
                .find_map(|name| which::which(name).ok())
            {
                tracing::debug!("Found {} at {}", tool, path.display());
                found.insert(tool, path);
            } else {
                tracing::debug!("{} not found on PATH", tool);
            }
        }
        Self { found }
    }

    /// Availability map for every known tool.
    pub fn availability(&self) -> Vec<(Tool, bool)> {
        Tool::ALL
            .iter()
            .map(|tool| (*tool, self.found.contains_key(tool)))
            .collect()
    }
}

impl ToolProber for PathProber {
    fn locate(&self, tool: Tool) -> Option<PathBuf> {
        self.found.get(&tool).cloned()
    }
}

/// A prober that reports nothing as installed.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoTools;

impl ToolProber for NoTools {
    fn locate(&self, _tool: Tool) -> Option<PathBuf> {
        None
    }
}

impl ToolProber for HashMap<Tool, PathBuf> {
    fn locate(&self, tool: Tool) -> Option<PathBuf> {
        self.get(&tool).cloned()
    }
}
