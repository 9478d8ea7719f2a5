/// Store/load decision for one invocation
///
/// On a hit the stored graph is decoded and evaluation is skipped. On a miss the
/// evaluation callback builds the live graph, which is encoded and persisted before it
/// is handed to execution. An entry that cannot be used (corrupt, stale, expired) is
/// treated as a miss and superseded by the new entry.
use anyhow::{bail, Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::entry::{CacheEntry, SealParams};
use super::inputs::{find_mismatch, fingerprint_inputs};
use super::key::{BuildRequest, CacheKey, CacheKeyResolver};
use super::store::CacheStore;
use crate::codec::wire::FORMAT_VERSION;
use crate::codec::{
    CodecRegistry, CollectingSink, Diagnostic, DiagnosticSink, GraphReader, GraphWriter,
    TracingSink,
};
use crate::graph::{ServiceLocator, Value};
use crate::logging::{operations, status};

/// Which path an invocation took
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    /// Evaluated and persisted
    Stored,
    /// Rehydrated from the cache
    Loaded,
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Decision::Stored => f.write_str("stored"),
            Decision::Loaded => f.write_str("loaded"),
        }
    }
}

/// Last known state of one key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheState {
    #[default]
    NoEntry,
    Stored,
    Loaded,
}

/// What to do when an encode reports disallowed references
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProblemsPolicy {
    /// Log the problems and store the entry anyway
    #[default]
    Warn,
    /// Discard the entry and fail the invocation
    Fail,
}

impl fmt::Display for ProblemsPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProblemsPolicy::Warn => f.write_str("warn"),
            ProblemsPolicy::Fail => f.write_str("fail"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct OrchestratorOptions {
    pub compression_level: i32,
    pub max_age: Option<Duration>,
    pub problems: ProblemsPolicy,
    /// How many problems are listed individually
    pub max_problems: usize,
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        Self {
            compression_level: 3,
            max_age: None,
            problems: ProblemsPolicy::Warn,
            max_problems: 512,
        }
    }
}

/// Result of one invocation
#[derive(Debug)]
pub struct Outcome<R> {
    pub decision: Decision,
    pub key: CacheKey,
    pub value: R,
}

pub struct Orchestrator {
    store: Box<dyn CacheStore>,
    registry: CodecRegistry,
    locator: Box<dyn ServiceLocator>,
    sink: Box<dyn DiagnosticSink>,
    resolver: CacheKeyResolver,
    options: OrchestratorOptions,
    states: HashMap<CacheKey, CacheState>,
    last_problems: Vec<Diagnostic>,
}

impl Orchestrator {
    pub fn new(
        store: impl CacheStore + 'static,
        registry: CodecRegistry,
        locator: impl ServiceLocator + 'static,
    ) -> Self {
        Self {
            store: Box::new(store),
            registry,
            locator: Box::new(locator),
            sink: Box::new(TracingSink),
            resolver: CacheKeyResolver::new(),
            options: OrchestratorOptions::default(),
            states: HashMap::new(),
            last_problems: Vec::new(),
        }
    }

    pub fn with_options(mut self, options: OrchestratorOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_resolver(mut self, resolver: CacheKeyResolver) -> Self {
        self.resolver = resolver;
        self
    }

    /// Where disallowed-reference diagnostics are sent (default: `tracing` warnings)
    pub fn with_sink(mut self, sink: impl DiagnosticSink + 'static) -> Self {
        self.sink = Box::new(sink);
        self
    }

    pub fn registry(&self) -> &CodecRegistry {
        &self.registry
    }

    pub fn store(&self) -> &dyn CacheStore {
        self.store.as_ref()
    }

    pub fn key_for(&self, request: &BuildRequest) -> CacheKey {
        self.resolver.resolve(request)
    }

    pub fn state(&self, key: &CacheKey) -> CacheState {
        self.states.get(key).copied().unwrap_or_default()
    }

    /// Diagnostics of the most recent encode
    pub fn last_problems(&self) -> &[Diagnostic] {
        &self.last_problems
    }

    /// Run one invocation. `evaluate` is called only on a miss; `execute` always
    /// receives a materialized graph.
    pub fn run<R, E, X>(
        &mut self,
        request: &BuildRequest,
        evaluate: E,
        execute: X,
    ) -> Result<Outcome<R>>
    where
        E: FnOnce() -> Result<Value>,
        X: FnOnce(&Value) -> Result<R>,
    {
        let key = self.resolver.resolve(request);

        if let Some(graph) = self.load(&key, request)? {
            self.states.insert(key.clone(), CacheState::Loaded);
            info!(
                operation = operations::LOAD,
                status = status::HIT,
                key = %key,
                "reusing configuration cache entry"
            );
            let value = execute(&graph)?;
            return Ok(Outcome {
                decision: Decision::Loaded,
                key,
                value,
            });
        }

        info!(
            operation = operations::LOAD,
            status = status::MISS,
            key = %key,
            "evaluating build configuration"
        );
        let graph = evaluate().context("Build evaluation failed")?;
        self.store_graph(&key, request, &graph)?;
        self.states.insert(key.clone(), CacheState::Stored);

        let value = execute(&graph)?;
        Ok(Outcome {
            decision: Decision::Stored,
            key,
            value,
        })
    }

    /// Decode the entry for `key` if it exists and is usable. Store I/O errors are
    /// returned; anything wrong with the entry itself is a miss.
    fn load(&self, key: &CacheKey, request: &BuildRequest) -> Result<Option<Value>> {
        let Some(bytes) = self.store.retrieve(key)? else {
            debug!(operation = operations::LOAD, key = %key, "no entry");
            return Ok(None);
        };

        let entry = match CacheEntry::from_bytes(&bytes) {
            Ok(entry) => entry,
            Err(e) => return Ok(self.discard(key, &e.to_string())),
        };

        let metadata = &entry.metadata;
        if metadata.format_version != FORMAT_VERSION {
            let reason = format!("format version {} is not supported", metadata.format_version);
            return Ok(self.discard(key, &reason));
        }
        if &metadata.key != key {
            let reason = format!("entry was written for key {}", metadata.key);
            return Ok(self.discard(key, &reason));
        }
        if metadata.is_expired(Utc::now()) {
            return Ok(self.discard(key, "entry expired"));
        }

        let current = fingerprint_inputs(&request.file_inputs, &request.root_dir)?;
        if let Some(reason) = find_mismatch(&metadata.file_inputs, &current) {
            return Ok(self.discard(key, &reason));
        }

        let graph = match entry.open() {
            Ok(graph) => graph,
            Err(e) => return Ok(self.discard(key, &e.to_string())),
        };
        match GraphReader::new(&self.registry, self.locator.as_ref()).read(&graph) {
            Ok(value) => Ok(Some(value)),
            Err(e) => Ok(self.discard(key, &e.to_string())),
        }
    }

    fn discard(&self, key: &CacheKey, reason: &str) -> Option<Value> {
        warn!(
            operation = operations::LOAD,
            status = status::INVALID,
            key = %key,
            reason = %reason,
            "configuration cache entry cannot be reused"
        );
        None
    }

    fn store_graph(&mut self, key: &CacheKey, request: &BuildRequest, graph: &Value) -> Result<()> {
        let collector = CollectingSink::new();
        let encoded = GraphWriter::new(&self.registry, &collector).write(graph);
        self.last_problems = collector.take();
        let problem_count = self.last_problems.len();

        for problem in self.last_problems.iter().take(self.options.max_problems) {
            self.sink.report(problem);
        }
        if problem_count > self.options.max_problems {
            warn!(
                operation = operations::ENCODE,
                problem_count,
                "{} more problems not listed",
                problem_count - self.options.max_problems
            );
        }

        if problem_count > 0 && self.options.problems == ProblemsPolicy::Fail {
            let listed: Vec<String> = self
                .last_problems
                .iter()
                .take(self.options.max_problems)
                .map(|problem| format!("  - {}", problem))
                .collect();
            bail!(
                "Configuration cache problems found ({} total); no entry was stored:\n{}",
                problem_count,
                listed.join("\n")
            );
        }

        let file_inputs = fingerprint_inputs(&request.file_inputs, &request.root_dir)?;
        let entry = CacheEntry::seal(
            &encoded,
            SealParams {
                key: key.clone(),
                tasks: request.task_set(),
                compression_level: self.options.compression_level,
                ttl: self.options.max_age,
                file_inputs,
                problem_count,
            },
        )?;
        let bytes = entry.to_bytes()?;
        self.store
            .persist(key, &bytes)
            .with_context(|| format!("Failed to store configuration cache entry {}", key))?;

        info!(
            operation = operations::STORE,
            status = status::STORED,
            key = %key,
            size_bytes = bytes.len(),
            problem_count,
            "configuration cache entry stored"
        );
        Ok(())
    }
}
