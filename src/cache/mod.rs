//! Configuration cache entry lifecycle
//!
//! [`CacheKeyResolver`] maps a build request to a key, [`CacheStore`] persists
//! serialized [`CacheEntry`]s, and the [`Orchestrator`] decides per invocation whether
//! to evaluate and store or to load.

pub mod entry;
pub mod inputs;
pub mod key;
pub mod orchestrator;
pub mod store;

pub use entry::{CacheEntry, EntryError, EntryMetadata, SealParams};
pub use inputs::InputFingerprint;
pub use key::{BuildRequest, CacheKey, CacheKeyResolver};
pub use orchestrator::{
    CacheState, Decision, Orchestrator, OrchestratorOptions, Outcome, ProblemsPolicy,
};
pub use store::{CacheStore, FilesystemCacheStore, MemoryCacheStore, StoreStats};
