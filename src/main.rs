mod cli;

use anyhow::Result;
use appkeeper::config::load_config;
use appkeeper::types::SetupStatus;
use appkeeper::{
    install, uninstall, InstallOptions, PathProber, Registry, UninstallOptions,
};
use clap::Parser;
use cli::{Cli, Commands, ListFormat};

fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(&cli)?;

    let config = load_config()?;

    match cli.command {
        Commands::Version => {
            println!("appkeeper v{}", env!("CARGO_PKG_VERSION"));
        }

        Commands::Install {
            names,
            url,
            cmd,
            rootdir,
            no_contentdir,
            target,
            no_setup,
        } => {
            let options = InstallOptions {
                url,
                cmd,
                rootdir,
                contentdir: no_contentdir.then_some(false),
                target,
                skip_setup: no_setup,
            };
            let prober = PathProber::new();
            let outcomes = install(&config, &names, &options, &prober);

            let mut failed = 0;
            for outcome in &outcomes {
                match &outcome.result {
                    Ok(report) => {
                        println!("{}: installed at {}", outcome.name, report.entry.target.display());
                        for record in &report.setup {
                            if let SetupStatus::Ran = record.status {
                                println!("  setup: {}", record.descriptor.display());
                            }
                        }
                        for failure in &report.setup_failures {
                            eprintln!("  warning: {}", failure);
                        }
                    }
                    Err(e) => {
                        failed += 1;
                        eprintln!("{}: {}", outcome.name, e);
                    }
                }
            }
            if failed > 0 {
                std::process::exit(1);
            }
        }

        Commands::Uninstall { names } => {
            let outcomes = uninstall(&config, &names, &UninstallOptions::default());

            let mut failed = 0;
            for outcome in &outcomes {
                match &outcome.result {
                    Ok(report) if !report.removed => {
                        println!("{}: not installed", outcome.name);
                    }
                    Ok(report) => {
                        println!("{}: uninstalled", outcome.name);
                        if let Some(incomplete) = report.incomplete() {
                            eprintln!("  warning: {}", incomplete);
                            for path in &report.residue {
                                eprintln!("    {}", path.display());
                            }
                        }
                    }
                    Err(e) => {
                        failed += 1;
                        eprintln!("{}: {}", outcome.name, e);
                    }
                }
            }
            if failed > 0 {
                std::process::exit(1);
            }
        }

        Commands::List { format } => {
            let registry = Registry::load(&config.registry_path())?;
            match format {
                ListFormat::Yaml => print!("{}", serde_yaml::to_string(registry.entries())?),
                ListFormat::Json => println!("{}", serde_json::to_string_pretty(registry.entries())?),
                ListFormat::Plain => list_installed_apps(&registry),
            }
        }

        Commands::Tools => {
            for (tool, available) in PathProber::new().availability() {
                println!("  {:<12} {}", tool.to_string(), if available { "yes" } else { "no" });
            }
        }
    }

    Ok(())
}

fn setup_logging(cli: &Cli) -> Result<()> {
    use tracing_subscriber::{fmt, EnvFilter};

    let level = if cli.quiet {
        "error"
    } else if cli.verbose == 0 {
        "warn"
    } else if cli.verbose == 1 {
        "info"
    } else {
        "debug"
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    Ok(())
}

fn list_installed_apps(registry: &Registry) {
    println!("--- Installed apps ---");
    if registry.is_empty() {
        println!("  No apps installed yet.");
        return;
    }

    for (name, entry) in registry.entries() {
        let source = match &entry.source {
            appkeeper::AppSource::Url(url) => format!("url: {}", url),
            appkeeper::AppSource::Cmd(cmd) => format!("cmd: {}", cmd),
        };
        println!("  - {} [{}]", name, source);
        println!("    Path:      {}", entry.target.display());
        println!("    Installed: {}\n", entry.installed.time.to_rfc3339());
    }
    println!("----------------------");
}
