use anyhow::{bail, Result};
use std::path::Path;
use tracing::info;

use crate::cli::ConfigCommands;
use crate::config::ConfCacheConfig;
use crate::config_discovery::LoadedConfig;

pub fn run(command: &ConfigCommands, loaded: &LoadedConfig) -> Result<()> {
    match command {
        ConfigCommands::Validate { path } => match path {
            Some(path) => validate(path),
            None => match &loaded.path {
                Some(path) => validate(path),
                None => bail!("No confcache.toml found; pass a path to validate"),
            },
        },
        ConfigCommands::Example => example(),
        ConfigCommands::Show => show(loaded),
    }
}

fn validate(path: &Path) -> Result<()> {
    info!("Validating config file: {}", path.display());

    let config = ConfCacheConfig::from_file(path)?;
    config.validate()?;

    println!("✓ Configuration file is valid: {}", path.display());
    println!("\nSummary:");
    println!("  - Cache directory: {}", config.cache.dir);
    println!(
        "  - Max age: {}",
        config.cache.max_age.as_deref().unwrap_or("none")
    );
    println!("  - Compression level: {}", config.cache.compression_level);
    println!("  - Problems: {}", config.codec.problems);
    println!("  - Disallowed types: {}", config.codec.disallowed.len());

    for (i, disallowed) in config.codec.disallowed.iter().enumerate() {
        println!(
            "    {}. {} (via {})",
            i + 1,
            disallowed.type_name,
            disallowed.capability
        );
    }

    Ok(())
}

fn example() -> Result<()> {
    println!("{}", ConfCacheConfig::example()?);
    Ok(())
}

fn show(loaded: &LoadedConfig) -> Result<()> {
    match &loaded.path {
        Some(path) => println!("# Loaded from {}\n", path.display()),
        None => println!("# No configuration file found, showing defaults\n"),
    }
    println!("{}", toml::to_string_pretty(&loaded.config)?);
    Ok(())
}
