use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::config::ConfCacheConfig;

pub const CONFIG_FILE_NAME: &str = "confcache.toml";

/// Discovers configuration by traversing up the directory tree
pub fn discover_config(start_dir: &Path) -> Option<PathBuf> {
    for dir in start_dir.ancestors() {
        let config_path = dir.join(CONFIG_FILE_NAME);
        if config_path.is_file() {
            return Some(config_path);
        }
    }

    // Fallback to global config
    let global_config = dirs::config_dir()?.join("confcache").join("config.toml");
    global_config.is_file().then_some(global_config)
}

/// A loaded configuration and the file it came from
#[derive(Debug, Clone, Default)]
pub struct LoadedConfig {
    pub config: ConfCacheConfig,
    pub path: Option<PathBuf>,
}

impl LoadedConfig {
    /// Directory relative `cache.dir` values resolve against
    pub fn base_dir(&self) -> Option<&Path> {
        self.path.as_deref().and_then(Path::parent)
    }
}

/// Loads configuration with auto-discovery support
///
/// If `explicit_path` is provided, loads config from that path. Otherwise,
/// auto-discovers config by traversing up the directory tree from `start_dir`.
/// Defaults are used when nothing is found.
pub fn load_config_with_discovery(
    explicit_path: Option<&Path>,
    start_dir: &Path,
) -> Result<LoadedConfig> {
    let path = match explicit_path {
        Some(path) => Some(path.to_path_buf()),
        None => discover_config(start_dir),
    };

    let config = match &path {
        Some(path) => {
            let config = ConfCacheConfig::from_file(path)?;
            config
                .validate()
                .with_context(|| format!("Invalid configuration: {}", path.display()))?;
            config
        }
        None => ConfCacheConfig::default(),
    };

    Ok(LoadedConfig { config, path })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_discover_config_in_parent() {
        let temp = TempDir::new().unwrap();
        let nested = temp.path().join("app").join("src");
        fs::create_dir_all(&nested).unwrap();
        fs::write(temp.path().join(CONFIG_FILE_NAME), "[cache]\n").unwrap();

        let found = discover_config(&nested).unwrap();
        assert_eq!(found, temp.path().join(CONFIG_FILE_NAME));
    }

    #[test]
    fn test_explicit_path_wins() {
        let temp = TempDir::new().unwrap();
        fs::write(
            temp.path().join(CONFIG_FILE_NAME),
            "[cache]\ndir = \"discovered\"\n",
        )
        .unwrap();
        let explicit = temp.path().join("other.toml");
        fs::write(&explicit, "[cache]\ndir = \"explicit\"\n").unwrap();

        let loaded = load_config_with_discovery(Some(&explicit), temp.path()).unwrap();
        assert_eq!(loaded.config.cache.dir, "explicit");
        assert_eq!(loaded.base_dir(), Some(temp.path()));
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(CONFIG_FILE_NAME);
        fs::write(&path, "[cache]\ncompression_level = 99\n").unwrap();

        assert!(load_config_with_discovery(Some(&path), temp.path()).is_err());
    }
}
