/// Cache key derivation
///
/// Keys identify a requested task set plus the build parameters that change what
/// evaluation produces. Build input files are not part of the key: they are
/// fingerprinted into the entry and checked when the entry is loaded.
use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::env;
use std::fmt;
use std::path::PathBuf;

use crate::codec::wire::FORMAT_VERSION;

const KEY_PREFIX: &str = "graph-";
const KEY_HASH_LEN: usize = 32;

/// Identifier of one cache entry: `graph-<32 hex chars>`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CacheKey(String);

impl CacheKey {
    pub fn parse(key: &str) -> Result<Self> {
        let Some(hash) = key.strip_prefix(KEY_PREFIX) else {
            bail!("Invalid cache key '{}': missing '{}' prefix", key, KEY_PREFIX);
        };
        if hash.len() != KEY_HASH_LEN || !hash.bytes().all(|b| b.is_ascii_hexdigit()) {
            bail!(
                "Invalid cache key '{}': expected {} hex characters after the prefix",
                key,
                KEY_HASH_LEN
            );
        }
        Ok(Self(key.to_ascii_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for CacheKey {
    type Error = anyhow::Error;

    fn try_from(key: String) -> Result<Self> {
        Self::parse(&key)
    }
}

impl From<CacheKey> for String {
    fn from(key: CacheKey) -> Self {
        key.0
    }
}

/// Everything an invocation asks for
#[derive(Debug, Clone, Default)]
pub struct BuildRequest {
    /// Requested task paths, e.g. `:app:assemble`
    pub tasks: Vec<String>,
    /// Build properties passed on the command line
    pub properties: BTreeMap<String, String>,
    /// Environment variables read during evaluation
    pub env_vars: Vec<String>,
    /// Glob patterns, relative to `root_dir`, of files read during evaluation
    pub file_inputs: Vec<String>,
    pub root_dir: PathBuf,
}

impl BuildRequest {
    pub fn new<I, S>(root_dir: impl Into<PathBuf>, tasks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tasks: tasks.into_iter().map(Into::into).collect(),
            root_dir: root_dir.into(),
            ..Self::default()
        }
    }

    pub fn property(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    pub fn env_var(mut self, name: impl Into<String>) -> Self {
        self.env_vars.push(name.into());
        self
    }

    pub fn file_input(mut self, pattern: impl Into<String>) -> Self {
        self.file_inputs.push(pattern.into());
        self
    }

    /// Requested tasks, sorted and de-duplicated
    pub fn task_set(&self) -> Vec<String> {
        let mut tasks = self.tasks.clone();
        tasks.sort();
        tasks.dedup();
        tasks
    }
}

/// Maps a build request to its cache key
#[derive(Debug, Clone)]
pub struct CacheKeyResolver {
    salt: Option<String>,
}

impl Default for CacheKeyResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheKeyResolver {
    pub fn new() -> Self {
        Self { salt: None }
    }

    /// Extra key component; changing it invalidates every existing entry
    pub fn with_salt(salt: impl Into<String>) -> Self {
        Self {
            salt: Some(salt.into()),
        }
    }

    /// Deterministic for a given request and environment. Task order and duplicates
    /// do not matter.
    ///
    /// Every component is hashed length-prefixed behind a tag, so no two different
    /// requests feed the hasher the same bytes.
    pub fn resolve(&self, request: &BuildRequest) -> CacheKey {
        let mut hasher = Sha256::new();

        // 1. Stream format version
        hasher.update(FORMAT_VERSION.to_le_bytes());

        // 2. Requested task set
        for task in request.task_set() {
            update_component(&mut hasher, b"task");
            update_component(&mut hasher, task.as_bytes());
        }

        // 3. Build properties (sorted by name)
        for (name, value) in &request.properties {
            update_component(&mut hasher, b"property");
            update_component(&mut hasher, name.as_bytes());
            update_component(&mut hasher, value.as_bytes());
        }

        // 4. Environment variables
        let mut env_vars = request.env_vars.clone();
        env_vars.sort();
        env_vars.dedup();
        for var in &env_vars {
            update_component(&mut hasher, b"env");
            update_component(&mut hasher, var.as_bytes());
            match env::var(var) {
                Ok(value) => {
                    hasher.update([1u8]);
                    update_component(&mut hasher, value.as_bytes());
                }
                // Unset is distinct from every value, including the empty string
                Err(_) => hasher.update([0u8]),
            }
        }

        // 5. Salt
        if let Some(salt) = &self.salt {
            update_component(&mut hasher, b"salt");
            update_component(&mut hasher, salt.as_bytes());
        }

        // 6. Include OS for cross-platform considerations
        update_component(&mut hasher, b"os");
        update_component(&mut hasher, env::consts::OS.as_bytes());

        let hash = hex::encode(hasher.finalize());
        CacheKey(format!("{}{}", KEY_PREFIX, &hash[..KEY_HASH_LEN]))
    }
}

fn update_component(hasher: &mut Sha256, bytes: &[u8]) {
    hasher.update((bytes.len() as u64).to_le_bytes());
    hasher.update(bytes);
}
