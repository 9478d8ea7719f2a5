use anyhow::{Context, Result};
use clap::Parser;

use confcache::cli::{Cli, Commands, ConfigCommands};
use confcache::commands;
use confcache::config_discovery::{load_config_with_discovery, LoadedConfig};
use confcache::logging;

fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Validating an explicit file must not depend on the discovered one
    if let Commands::Config(args) = &cli.command {
        if let ConfigCommands::Validate { path: Some(_) } = &args.command {
            logging::init("info", None);
            return commands::config::run(&args.command, &LoadedConfig::default());
        }
    }

    let current_dir =
        std::env::current_dir().context("Failed to get current directory for config discovery")?;
    let loaded = load_config_with_discovery(cli.config.as_deref(), &current_dir)?;

    // Initialize structured logging
    logging::init(
        &loaded.config.observability.log_level,
        loaded.config.log_format(),
    );
    if let Some(path) = &loaded.path {
        tracing::debug!("Using config: {}", path.display());
    }

    // Dispatch to appropriate command handler
    match &cli.command {
        Commands::Cache(args) => commands::cache::run(args, &loaded),
        Commands::Config(args) => commands::config::run(&args.command, &loaded),
    }
}
