//! Installs "apps" (bundles of files) into a managed directory from zip or
//! tar archives, local directories or clone commands, runs their setup
//! scripts and keeps a YAML registry so they can be uninstalled cleanly.

pub mod config;
pub mod download;
pub mod error;
pub mod install;
pub mod place;
pub mod platform;
pub mod probe;
pub mod registry;
pub mod setup;
pub mod source;
pub mod types;
pub mod uninstall;


pub use config::Config;
pub use error::{InstallError, Result};
pub use install::install;
pub use probe::{PathProber, Tool, ToolProber};
pub use registry::Registry;
pub use types::{
    AppEntry, AppOutcome, AppSource, ExtractionPolicy, InstallOptions, InstallReport,
    UninstallOptions, UninstallReport,
};
pub use uninstall::uninstall;
