// Acceptance tests for the store/load decision
//
// Each invocation builds a fresh Orchestrator over the same cache directory, the way
// consecutive build processes would.

mod common;

use anyhow::Result;
use common::{build_model, field, record, TestProject};
use confcache::cache::{
    BuildRequest, CacheEntry, CacheKey, CacheStore, Decision, FilesystemCacheStore,
    Orchestrator, OrchestratorOptions, ProblemsPolicy, StoreStats,
};
use confcache::codec::CodecRegistry;
use confcache::graph::{Deferred, EvalFailure, Node, ObjRef, ServiceRegistry, Value};
use std::cell::Cell;
use std::fs;

fn orchestrator(project: &TestProject, registry: CodecRegistry) -> Orchestrator {
    let store = FilesystemCacheStore::new(&project.cache_dir).unwrap();
    Orchestrator::new(store, registry, ServiceRegistry::new())
}

/// Filesystem store that rejects every write, as a read-only cache directory would
struct ReadOnlyStore(FilesystemCacheStore);

impl CacheStore for ReadOnlyStore {
    fn persist(&self, key: &CacheKey, _entry: &[u8]) -> Result<()> {
        anyhow::bail!("Read-only file system: {}", self.0.entry_path(key).display())
    }

    fn retrieve(&self, key: &CacheKey) -> Result<Option<Vec<u8>>> {
        self.0.retrieve(key)
    }

    fn remove(&self, key: &CacheKey) -> Result<bool> {
        self.0.remove(key)
    }

    fn keys(&self) -> Result<Vec<CacheKey>> {
        self.0.keys()
    }

    fn clean_all(&self) -> Result<usize> {
        self.0.clean_all()
    }

    fn stats(&self) -> Result<StoreStats> {
        self.0.stats()
    }
}

/// Runs one invocation and reports whether evaluation was needed
fn invoke(project: &TestProject, request: &BuildRequest) -> (Decision, bool) {
    let evaluated = Cell::new(false);
    let outcome = orchestrator(project, CodecRegistry::new())
        .run(
            request,
            || {
                evaluated.set(true);
                Ok(build_model())
            },
            |graph| Ok(field(graph, "name")),
        )
        .unwrap();
    assert_eq!(outcome.value, Value::str("app"));
    (outcome.decision, evaluated.get())
}

#[test]
fn test_second_invocation_loads_from_disk() {
    let project = TestProject::new();
    let request = BuildRequest::new(&project.root, ["test"]);

    assert_eq!(invoke(&project, &request), (Decision::Stored, true));
    assert_eq!(invoke(&project, &request), (Decision::Loaded, false));

    let store = FilesystemCacheStore::new(&project.cache_dir).unwrap();
    let keys = store.keys().unwrap();
    assert_eq!(keys.len(), 1);
    assert!(store.entry_path(&keys[0]).exists());
}

#[test]
fn test_loaded_graph_keeps_identity() {
    let project = TestProject::new();
    let request = BuildRequest::new(&project.root, ["test"]);
    invoke(&project, &request);

    let outcome = orchestrator(&project, CodecRegistry::new())
        .run(
            &request,
            || anyhow::bail!("evaluation must be skipped"),
            |graph| -> Result<bool> {
                let tasks = field(graph, "tasks");
                let tasks = tasks.as_object().unwrap().borrow();
                let Node::Container(tasks) = &*tasks else {
                    anyhow::bail!("tasks is not a map");
                };
                let compile = tasks.lookup(&Value::str("compile")).unwrap();
                Ok(&field(compile, "project") == graph)
            },
        )
        .unwrap();
    assert_eq!(outcome.decision, Decision::Loaded);
    assert!(outcome.value);
}

#[test]
fn test_different_task_sets_use_different_entries() {
    let project = TestProject::new();
    let a = BuildRequest::new(&project.root, ["a"]);
    let b = BuildRequest::new(&project.root, ["b"]);

    assert_eq!(invoke(&project, &a).0, Decision::Stored);
    assert_eq!(invoke(&project, &b).0, Decision::Stored);
    assert_eq!(invoke(&project, &a).0, Decision::Loaded);
    assert_eq!(invoke(&project, &b).0, Decision::Loaded);

    // Task order and duplicates do not matter
    let ab = BuildRequest::new(&project.root, ["b", "a", "b"]);
    let ba = BuildRequest::new(&project.root, ["a", "b"]);
    assert_eq!(invoke(&project, &ab).0, Decision::Stored);
    assert_eq!(invoke(&project, &ba).0, Decision::Loaded);

    let store = FilesystemCacheStore::new(&project.cache_dir).unwrap();
    assert_eq!(store.keys().unwrap().len(), 3);
}

#[test]
fn test_properties_change_the_key() {
    let project = TestProject::new();
    let debug = BuildRequest::new(&project.root, ["assemble"]).property("profile", "debug");
    let release = BuildRequest::new(&project.root, ["assemble"]).property("profile", "release");

    assert_eq!(invoke(&project, &debug).0, Decision::Stored);
    assert_eq!(invoke(&project, &release).0, Decision::Stored);
    assert_eq!(invoke(&project, &debug).0, Decision::Loaded);
}

#[test]
fn test_changed_input_file_invalidates_entry() {
    let project = TestProject::new();
    project.write("build.conf", "version = 1\n");
    project.write("conf.d/extra.conf", "jobs = 4\n");
    let request = BuildRequest::new(&project.root, ["assemble"])
        .file_input("build.conf")
        .file_input("conf.d/*.conf");

    assert_eq!(invoke(&project, &request), (Decision::Stored, true));
    assert_eq!(invoke(&project, &request), (Decision::Loaded, false));

    project.write("build.conf", "version = 2\n");
    assert_eq!(invoke(&project, &request), (Decision::Stored, true));
    assert_eq!(invoke(&project, &request), (Decision::Loaded, false));

    // A new file matching a glob is a change as well
    project.write("conf.d/more.conf", "jobs = 8\n");
    assert_eq!(invoke(&project, &request), (Decision::Stored, true));

    let store = FilesystemCacheStore::new(&project.cache_dir).unwrap();
    assert_eq!(store.keys().unwrap().len(), 1);
}

#[test]
fn test_corrupt_entry_on_disk_is_superseded() {
    let project = TestProject::new();
    let request = BuildRequest::new(&project.root, ["check"]);
    invoke(&project, &request);

    let store = FilesystemCacheStore::new(&project.cache_dir).unwrap();
    let key = store.keys().unwrap().remove(0);
    let path = store.entry_path(&key);
    let mut bytes = fs::read(&path).unwrap();
    let last = bytes.len() - 1;
    bytes[last] ^= 0x5a;
    fs::write(&path, &bytes).unwrap();

    assert_eq!(invoke(&project, &request), (Decision::Stored, true));
    assert_eq!(invoke(&project, &request), (Decision::Loaded, false));

    fs::write(&path, b"garbage").unwrap();
    assert_eq!(invoke(&project, &request), (Decision::Stored, true));
}

#[test]
fn test_entry_metadata() {
    let project = TestProject::new();
    project.write("build.conf", "version = 1\n");
    let request = BuildRequest::new(&project.root, ["test", "assemble"]).file_input("build.conf");
    invoke(&project, &request);

    let store = FilesystemCacheStore::new(&project.cache_dir).unwrap();
    let key = store.keys().unwrap().remove(0);
    let bytes = store.retrieve(&key).unwrap().unwrap();
    let entry = CacheEntry::from_bytes(&bytes).unwrap();

    assert_eq!(entry.metadata.key, key);
    assert_eq!(entry.metadata.tasks, vec!["assemble", "test"]);
    assert_eq!(entry.metadata.file_inputs.len(), 1);
    assert_eq!(entry.metadata.file_inputs[0].file_count, 1);
    assert_eq!(entry.metadata.problem_count, 0);
    assert!(entry.metadata.expires_at.is_none());
    assert!(entry.open().unwrap().records().len() > 1);
}

#[test]
fn test_problems_policy() {
    let project = TestProject::new();
    let request = BuildRequest::new(&project.root, ["build"]);
    let evaluate = || -> Result<Value> {
        Ok(record(
            "Task",
            vec![
                ("name", Value::str("build")),
                (
                    "project",
                    record("DefaultProject", vec![("name", Value::str("app"))]).into(),
                ),
            ],
        )
        .into())
    };
    let registry = || {
        let mut registry = CodecRegistry::new();
        registry.disallow("DefaultProject", "Project");
        registry
    };

    let mut failing = orchestrator(&project, registry()).with_options(OrchestratorOptions {
        problems: ProblemsPolicy::Fail,
        ..OrchestratorOptions::default()
    });
    let error = failing.run(&request, evaluate, |_| Ok(())).unwrap_err();
    assert!(format!("{:#}", error).contains("DefaultProject"));
    let store = FilesystemCacheStore::new(&project.cache_dir).unwrap();
    assert!(store.keys().unwrap().is_empty());

    // Warn stores the entry; the reference comes back as null
    let mut warning = orchestrator(&project, registry());
    let stored = warning.run(&request, evaluate, |_| Ok(())).unwrap();
    assert_eq!(stored.decision, Decision::Stored);
    assert_eq!(warning.last_problems().len(), 1);

    let loaded = orchestrator(&project, registry())
        .run(&request, evaluate, |graph| Ok(field(graph, "project")))
        .unwrap();
    assert_eq!(loaded.decision, Decision::Loaded);
    assert_eq!(loaded.value, Value::Null);
}

#[test]
fn test_failing_deferred_value_fails_on_read_after_load() {
    let project = TestProject::new();
    let request = BuildRequest::new(&project.root, ["publish"]);
    let registry = || {
        let mut registry = CodecRegistry::new();
        registry.register_function("read-version", |_, _| {
            Err(EvalFailure::new("version.txt not found"))
        });
        registry
    };
    let read_version = |graph: &Value| -> Result<Result<Option<Value>, EvalFailure>> {
        let version = field(graph, "version");
        let node = version.as_object().unwrap().borrow();
        let Node::Deferred(deferred) = &*node else {
            anyhow::bail!("version is not deferred");
        };
        Ok(deferred.get())
    };

    let evaluation_registry = registry();
    let supplier = evaluation_registry
        .functions()
        .instantiate("read-version", None, vec![])
        .unwrap();
    let root: Value = record(
        "Publication",
        vec![("version", ObjRef::deferred(Deferred::supplied(supplier)).into())],
    )
    .into();

    // Storing succeeds even though the supplier fails
    let stored = orchestrator(&project, evaluation_registry)
        .run(&request, || Ok(root), read_version)
        .unwrap();
    assert_eq!(stored.decision, Decision::Stored);
    assert!(stored.value.is_err());

    let loaded = orchestrator(&project, registry())
        .run(&request, || anyhow::bail!("evaluation must be skipped"), read_version)
        .unwrap();
    assert_eq!(loaded.decision, Decision::Loaded);
    assert_eq!(loaded.value.unwrap_err().message(), "version.txt not found");
}

#[test]
fn test_failed_store_stops_before_execution() {
    let project = TestProject::new();
    project.write("build.conf", "version = 1\n");
    let request = BuildRequest::new(&project.root, ["assemble"]).file_input("build.conf");
    assert_eq!(invoke(&project, &request), (Decision::Stored, true));

    let store = FilesystemCacheStore::new(&project.cache_dir).unwrap();
    let key = store.keys().unwrap().remove(0);
    let before = store.retrieve(&key).unwrap().unwrap();

    // The entry is stale, so this invocation evaluates and has to store
    project.write("build.conf", "version = 2\n");
    let executed = Cell::new(false);
    let read_only = ReadOnlyStore(FilesystemCacheStore::new(&project.cache_dir).unwrap());
    let error = Orchestrator::new(read_only, CodecRegistry::new(), ServiceRegistry::new())
        .run(
            &request,
            || Ok(build_model()),
            |_| {
                executed.set(true);
                Ok(())
            },
        )
        .unwrap_err();

    assert!(format!("{:#}", error).contains("Failed to store configuration cache entry"));
    assert!(format!("{:#}", error).contains("Read-only file system"));
    assert!(!executed.get());
    assert_eq!(store.retrieve(&key).unwrap().unwrap(), before);
    assert_eq!(store.keys().unwrap(), vec![key]);
}
