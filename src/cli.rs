use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

fn get_version() -> &'static str {
    if let Some(tag) = option_env!("APPKEEPER_GIT_TAG") {
        return tag;
    }

    let commit = option_env!("APPKEEPER_GIT_COMMIT").unwrap_or("unknown");
    // Built once at startup
    let version = format!("v{}-{}", env!("CARGO_PKG_VERSION"), commit);
    Box::leak(version.into_boxed_str())
}

#[derive(Parser)]
#[command(name = "appkeeper")]
#[command(about = "Install and uninstall apps from archives, directories and clone commands")]
#[command(version = get_version(), propagate_version = true)]
pub struct Cli {
    /// Increase verbosity (use multiple times for more detail)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Reduce output to errors only
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Install one or more apps
    #[command(
        after_help = "Examples:\n  appkeeper install site --url https://example.com/site.zip\n  appkeeper install docs --url ./docs.zip --rootdir docs/html\n  appkeeper install repo --cmd 'git clone https://example.com/repo.git $TARGET'\n  appkeeper install site   (reinstall from the registered source)"
    )]
    Install {
        /// App names
        #[arg(required = true)]
        names: Vec<String>,
        /// Archive URL, local archive or local directory
        #[arg(long, conflicts_with = "cmd")]
        url: Option<String>,
        /// Shell command that produces the app, e.g. a git clone. `$TARGET` is
        /// replaced with the target directory
        #[arg(long)]
        cmd: Option<String>,
        /// Subdirectory of the content to install as the app root
        #[arg(long)]
        rootdir: Option<String>,
        /// Keep a single top-level archive directory instead of collapsing it
        #[arg(long)]
        no_contentdir: bool,
        /// Install into this directory instead of the apps root
        #[arg(long)]
        target: Option<PathBuf>,
        /// Do not run setup scripts
        #[arg(long)]
        no_setup: bool,
    },

    /// Uninstall one or more apps
    Uninstall {
        /// App names
        #[arg(required = true)]
        names: Vec<String>,
    },

    /// List installed apps
    List {
        #[arg(long, value_enum, default_value_t = ListFormat::Plain)]
        format: ListFormat,
    },

    /// Show which setup tools are available on this host
    Tools,

    /// Show the current version
    Version,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ListFormat {
    Plain,
    Yaml,
    Json,
}
