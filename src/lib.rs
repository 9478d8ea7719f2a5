// Library interface for confcache
// This allows integration tests and embedding build tools to use the cache directly

pub mod cache;
pub mod cli;
pub mod cli_utils;
pub mod codec;
pub mod commands;
pub mod config;
pub mod config_discovery;
pub mod graph;
pub mod logging;

// Re-export commonly used types
pub use cache::{
    BuildRequest, CacheKey, CacheKeyResolver, CacheStore, Decision, FilesystemCacheStore,
    MemoryCacheStore, Orchestrator, OrchestratorOptions, Outcome, ProblemsPolicy,
};
pub use codec::{CodecRegistry, DecodeError, EncodedGraph, GraphReader, GraphWriter};
pub use config::{default_cache_dir, ConfCacheConfig};
pub use config_discovery::{discover_config, load_config_with_discovery, LoadedConfig};
pub use graph::{ObjRef, Value};
