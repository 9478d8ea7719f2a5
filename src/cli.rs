use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// confcache - configuration cache maintenance
///
/// Inspects and maintains the entries a build tool persists in its
/// configuration cache. It never evaluates or executes builds.
#[derive(Parser, Debug)]
#[command(name = "confcache")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Configuration cache maintenance", long_about = None)]
pub struct Cli {
    /// Config file path (default: discover confcache.toml)
    #[arg(short = 'c', long, global = true, env = "CONFCACHE_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Manage cache entries
    Cache(CacheArgs),

    /// Configuration management utilities
    Config(ConfigArgs),
}

#[derive(Parser, Debug)]
pub struct CacheArgs {
    #[command(subcommand)]
    pub command: CacheCommands,

    /// Cache directory (overrides cache.dir)
    #[arg(long, env = "CONFCACHE_CACHE_DIR")]
    pub cache_dir: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum CacheCommands {
    /// List cache entries
    List {
        /// Verbose output
        #[arg(short, long)]
        verbose: bool,
    },

    /// Show cache statistics
    Stats,

    /// Remove one entry, or all of them
    Clean {
        /// Key of the entry to remove
        #[arg(long, conflicts_with = "all")]
        key: Option<String>,

        /// Remove every entry
        #[arg(long)]
        all: bool,
    },

    /// Print an entry's metadata and encoded graph as JSON
    Inspect {
        /// Entry key (graph-...)
        key: String,

        /// Skip decoding the payload
        #[arg(long)]
        metadata_only: bool,
    },
}

#[derive(Parser, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommands,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Validate configuration file
    Validate {
        /// Path to config file (default: the discovered one)
        path: Option<PathBuf>,
    },

    /// Print an example config file
    Example,

    /// Show effective configuration
    Show,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_clean_key() {
        let cli = Cli::try_parse_from([
            "confcache",
            "cache",
            "--cache-dir",
            "/tmp/cc",
            "clean",
            "--key",
            "graph-0123456789abcdef0123456789abcdef",
        ])
        .unwrap();

        let Commands::Cache(args) = cli.command else {
            panic!("expected cache command");
        };
        assert_eq!(args.cache_dir, Some(PathBuf::from("/tmp/cc")));
        assert!(matches!(
            args.command,
            CacheCommands::Clean { key: Some(_), all: false }
        ));
    }

    #[test]
    fn test_clean_key_conflicts_with_all() {
        let result = Cli::try_parse_from([
            "confcache",
            "cache",
            "clean",
            "--key",
            "graph-0123456789abcdef0123456789abcdef",
            "--all",
        ]);
        assert!(result.is_err());
    }
}
