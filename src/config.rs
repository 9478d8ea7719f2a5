use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::cache::{OrchestratorOptions, ProblemsPolicy};
use crate::codec::CodecRegistry;
use crate::logging::LogFormat;

/// Main configuration structure (`confcache.toml`)
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ConfCacheConfig {
    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub codec: CodecConfig,

    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// Entry storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Cache directory; relative paths resolve against the config file's directory
    #[serde(default = "default_cache_dir_name")]
    pub dir: String,

    /// Entries older than this are treated as misses (e.g. "7d", "12h")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_age: Option<String>,

    /// zstd level for entry payloads
    #[serde(default = "default_compression_level")]
    pub compression_level: i32,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: default_cache_dir_name(),
            max_age: None,
            compression_level: default_compression_level(),
        }
    }
}

/// Encoding configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodecConfig {
    /// What to do with disallowed references ("warn" or "fail")
    #[serde(default)]
    pub problems: ProblemsPolicy,

    /// How many problems are listed individually
    #[serde(default = "default_max_problems")]
    pub max_problems: usize,

    /// Runtime types that must never be persisted
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub disallowed: Vec<DisallowedType>,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            problems: ProblemsPolicy::default(),
            max_problems: default_max_problems(),
            disallowed: Vec::new(),
        }
    }
}

/// A type that is reported instead of encoded
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisallowedType {
    /// Concrete runtime type name
    pub type_name: String,

    /// Capability the object is reached through
    pub capability: String,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Default filter when RUST_LOG is not set
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// pretty, compact or json
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

// Default value functions
fn default_cache_dir_name() -> String {
    ".confcache".to_string()
}

fn default_compression_level() -> i32 {
    3
}

fn default_max_problems() -> usize {
    512
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

/// Default cache directory when no configuration file is found
///
/// - Linux/Unix: $XDG_CACHE_HOME/confcache or ~/.cache/confcache
/// - macOS: ~/Library/Caches/confcache
/// - Windows: %LOCALAPPDATA%/confcache
pub fn default_cache_dir() -> PathBuf {
    match dirs::cache_dir() {
        Some(cache_dir) => cache_dir.join("confcache"),
        None => PathBuf::from(default_cache_dir_name()),
    }
}

/// Parse a duration such as "30s", "15m", "12h" or "7d"
pub fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim();
    let Some(unit) = s.chars().last() else {
        bail!("Empty duration string");
    };

    let num_str = &s[..s.len() - unit.len_utf8()];
    let num: u64 = num_str
        .parse()
        .map_err(|_| anyhow!("Invalid duration: {}", s))?;

    let multiplier = match unit {
        's' => 1,
        'm' => 60,
        'h' => 3600,
        'd' => 86400,
        _ => bail!("Invalid duration unit: {}. Use: s, m, h, d", unit),
    };

    num.checked_mul(multiplier)
        .map(Duration::from_secs)
        .ok_or_else(|| anyhow!("Duration out of range: {}", s))
}

impl ConfCacheConfig {
    /// Load configuration from TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: ConfCacheConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))?;

        Ok(config)
    }

    /// Example configuration as TOML string
    pub fn example() -> Result<String> {
        let config = ConfCacheConfig {
            cache: CacheConfig {
                max_age: Some("7d".to_string()),
                ..Default::default()
            },
            codec: CodecConfig {
                disallowed: vec![
                    DisallowedType {
                        type_name: "DefaultProject".to_string(),
                        capability: "Project".to_string(),
                    },
                    DisallowedType {
                        type_name: "DefaultGradle".to_string(),
                        capability: "Gradle".to_string(),
                    },
                ],
                ..Default::default()
            },
            ..Default::default()
        };

        toml::to_string_pretty(&config).context("Failed to render example configuration")
    }

    pub fn validate(&self) -> Result<()> {
        if self.cache.dir.trim().is_empty() {
            bail!("cache.dir must be set");
        }

        if let Some(max_age) = &self.cache.max_age {
            parse_duration(max_age).with_context(|| format!("cache.max_age: {}", max_age))?;
        }

        if !(1..=22).contains(&self.cache.compression_level) {
            bail!(
                "cache.compression_level must be between 1 and 22, got {}",
                self.cache.compression_level
            );
        }

        for disallowed in &self.codec.disallowed {
            if disallowed.type_name.trim().is_empty() {
                bail!("codec.disallowed entries need a type_name");
            }
            if disallowed.capability.trim().is_empty() {
                bail!(
                    "codec.disallowed entry {} needs a capability",
                    disallowed.type_name
                );
            }
        }

        if LogFormat::parse(&self.observability.log_format).is_none() {
            bail!(
                "observability.log_format must be one of: pretty, compact, json (got {})",
                self.observability.log_format
            );
        }

        Ok(())
    }

    pub fn max_age(&self) -> Result<Option<Duration>> {
        self.cache.max_age.as_deref().map(parse_duration).transpose()
    }

    pub fn log_format(&self) -> Option<LogFormat> {
        LogFormat::parse(&self.observability.log_format)
    }

    /// Cache directory, resolving a relative `cache.dir` against `base`
    pub fn cache_dir(&self, base: Option<&Path>) -> PathBuf {
        let dir = PathBuf::from(&self.cache.dir);
        match base {
            Some(base) if dir.is_relative() => base.join(dir),
            _ => dir,
        }
    }

    pub fn orchestrator_options(&self) -> Result<OrchestratorOptions> {
        Ok(OrchestratorOptions {
            compression_level: self.cache.compression_level,
            max_age: self.max_age()?,
            problems: self.codec.problems,
            max_problems: self.codec.max_problems,
        })
    }

    /// Registry with the configured disallowed types
    pub fn codec_registry(&self) -> CodecRegistry {
        let mut registry = CodecRegistry::new();
        for disallowed in &self.codec.disallowed {
            registry.disallow(&disallowed.type_name, &disallowed.capability);
        }
        registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ConfCacheConfig::default();
        assert_eq!(config.cache.dir, ".confcache");
        assert_eq!(config.cache.compression_level, 3);
        assert_eq!(config.codec.problems, ProblemsPolicy::Warn);
        assert_eq!(config.codec.max_problems, 512);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_toml() {
        let config: ConfCacheConfig = toml::from_str(
            r#"
            [cache]
            max_age = "12h"

            [codec]
            problems = "fail"

            [[codec.disallowed]]
            type_name = "DefaultProject"
            capability = "Project"
            "#,
        )
        .unwrap();

        assert!(config.validate().is_ok());
        assert_eq!(config.cache.dir, ".confcache");

        let options = config.orchestrator_options().unwrap();
        assert_eq!(options.problems, ProblemsPolicy::Fail);
        assert_eq!(options.max_age, Some(Duration::from_secs(12 * 3600)));

        let registry = config.codec_registry();
        assert!(registry.is_disallowed("DefaultProject"));
        assert!(!registry.is_disallowed("Project"));
    }

    #[test]
    fn test_unknown_problems_policy() {
        let result: Result<ConfCacheConfig, _> = toml::from_str("[codec]\nproblems = \"ignore\"\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_invalid_values() {
        let mut config = ConfCacheConfig::default();
        config.cache.compression_level = 0;
        assert!(config.validate().is_err());

        let mut config = ConfCacheConfig::default();
        config.cache.max_age = Some("7w".to_string());
        assert!(config.validate().is_err());

        let mut config = ConfCacheConfig::default();
        config.cache.dir = " ".to_string();
        assert!(config.validate().is_err());

        let mut config = ConfCacheConfig::default();
        config.codec.disallowed.push(DisallowedType {
            type_name: String::new(),
            capability: "Project".to_string(),
        });
        assert!(config.validate().is_err());

        let mut config = ConfCacheConfig::default();
        config.observability.log_format = "xml".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("1s").unwrap(), Duration::from_secs(1));
        assert_eq!(parse_duration("5m").unwrap(), Duration::from_secs(300));
        assert_eq!(parse_duration("2h").unwrap(), Duration::from_secs(7200));
        assert_eq!(parse_duration("7d").unwrap(), Duration::from_secs(604800));
        assert!(parse_duration("").is_err());
        assert!(parse_duration("d").is_err());
        assert!(parse_duration("1x").is_err());
    }

    #[test]
    fn test_example_is_valid() {
        let example = ConfCacheConfig::example().unwrap();
        let config: ConfCacheConfig = toml::from_str(&example).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.codec.disallowed.len(), 2);
    }

    #[test]
    fn test_cache_dir_resolution() {
        let config = ConfCacheConfig::default();
        assert_eq!(
            config.cache_dir(Some(Path::new("/work/project"))),
            PathBuf::from("/work/project/.confcache")
        );
        assert_eq!(config.cache_dir(None), PathBuf::from(".confcache"));

        let mut config = ConfCacheConfig::default();
        config.cache.dir = "/var/cache/confcache".to_string();
        assert_eq!(
            config.cache_dir(Some(Path::new("/work/project"))),
            PathBuf::from("/var/cache/confcache")
        );
        assert!(default_cache_dir().to_string_lossy().contains("confcache"));
    }
}
