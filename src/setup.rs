//! Runs per-app build steps for descriptors found in an installed tree.

use std::path::{Path, PathBuf};
use std::process::Command;
use walkdir::WalkDir;

use crate::error::InstallError;
use crate::platform::describe_failure;
use crate::probe::{Tool, ToolProber};
use crate::types::{SetupRecord, SetupStatus};

/// A recognised descriptor file and how to act on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetupAction {
    pub descriptor: &'static str,
    pub tool: Tool,
    pub args: &'static [&'static str],
}

pub const SETUP_ACTIONS: &[SetupAction] = &[
    SetupAction {
        descriptor: "setup.ps1",
        tool: Tool::PowerShell,
        args: &["-NoProfile", "-ExecutionPolicy", "Bypass", "-File", "setup.ps1"],
    },
    SetupAction {
        descriptor: "Makefile",
        tool: Tool::Make,
        args: &[],
    },
    SetupAction {
        descriptor: "makefile",
        tool: Tool::Make,
        args: &[],
    },
    SetupAction {
        descriptor: "setup.sh",
        tool: Tool::Bash,
        args: &["setup.sh"],
    },
    SetupAction {
        descriptor: "setup.py",
        tool: Tool::Python,
        args: &["setup.py"],
    },
    SetupAction {
        descriptor: "package.json",
        tool: Tool::Npm,
        args: &["install"],
    },
    SetupAction {
        descriptor: "bower.json",
        tool: Tool::Bower,
        args: &["--allow-root", "install"],
    },
];

/// Directories whose contents are produced by tools, never app descriptors.
const SKIP_DIRS: &[&str] = &[".git", "node_modules", "bower_components"];

pub fn action_for(file_name: &str) -> Option<&'static SetupAction> {
    SETUP_ACTIONS.iter().find(|a| a.descriptor == file_name)
}

/// All descriptors under `root`, in walk order.
pub fn find_descriptors(root: &Path) -> Vec<(PathBuf, &'static SetupAction)> {
    WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| {
            !(e.file_type().is_dir()
                && e.depth() > 0
                && SKIP_DIRS.iter().any(|d| e.file_name() == *d))
        })
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| {
            let action = action_for(e.file_name().to_str()?)?;
            Some((e.into_path(), action))
        })
        .collect()
}

/// Runs every descriptor whose tool is available.
///
/// Each action is independent. A failing action is recorded and the rest
/// still run. Missing tools are skipped without error.
pub fn run_setup(root: &Path, prober: &dyn ToolProber) -> (Vec<SetupRecord>, Vec<InstallError>) {
    let mut records = Vec::new();
    let mut failures = Vec::new();

    for (descriptor, action) in find_descriptors(root) {
        let Some(program) = prober.locate(action.tool) else {
            tracing::debug!(
                "Skipping {}: {} is not installed",
                descriptor.display(),
                action.tool
            );
            records.push(SetupRecord {
                descriptor,
                status: SetupStatus::Skipped,
            });
            continue;
        };

        let cwd = descriptor.parent().unwrap_or(root);
        tracing::info!("Running {} setup in {}", action.tool, cwd.display());
        tracing::debug!("Executing: {:?} {:?}", program, action.args);

        let outcome = Command::new(&program)
            .args(action.args)
            .current_dir(cwd)
            .output();

        let status = match outcome {
            Ok(output) if output.status.success() => SetupStatus::Ran,
            Ok(output) => SetupStatus::Failed(describe_failure(&output)),
            Err(e) => SetupStatus::Failed(e.to_string()),
        };

        if let SetupStatus::Failed(reason) = &status {
            let failure = InstallError::SetupActionFailure {
                descriptor: descriptor.clone(),
                tool: action.tool,
                reason: reason.clone(),
            };
            tracing::warn!("{}", failure);
            failures.push(failure);
        }

        records.push(SetupRecord { descriptor, status });
    }

    (records, failures)
}
