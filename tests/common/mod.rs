// Common test utilities shared across acceptance tests
//
// ## Test Isolation Strategy
//
// Every test gets its own temp directory holding the project root and the cache
// directory. Nothing is written under the user's real cache or config directories:
// binary invocations always pass --cache-dir and run with the project root as cwd.

#![allow(dead_code)]

use assert_cmd::Command;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

use confcache::codec::{wire, CodecRegistry, CollectingSink, GraphReader, GraphWriter};
use confcache::graph::{ObjRef, ServiceLocator, Value};

/// Isolated project root with its own cache directory
pub struct TestProject {
    temp_dir: TempDir,
    pub root: PathBuf,
    pub cache_dir: PathBuf,
}

impl TestProject {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let root = temp_dir.path().join("project");
        let cache_dir = temp_dir.path().join("cache");
        fs::create_dir_all(&root).expect("Failed to create project dir");

        Self {
            temp_dir,
            root,
            cache_dir,
        }
    }

    pub fn write(&self, relative: &str, content: &str) -> PathBuf {
        let path = self.root.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("Failed to create parent dir");
        }
        fs::write(&path, content).expect("Failed to write file");
        path
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// `confcache` binary running in the project root against the test cache
    pub fn confcache(&self) -> Command {
        let mut cmd = Command::cargo_bin("confcache").expect("Failed to find confcache binary");
        cmd.current_dir(&self.root)
            .env_remove("CONFCACHE_CONFIG")
            .env_remove("CONFCACHE_CACHE_DIR")
            .env_remove("CONFCACHE_LOG_FORMAT")
            .env("RUST_LOG", "warn");
        cmd
    }

    /// Like [`TestProject::confcache`], with `cache --cache-dir <test cache>` prepended
    pub fn cache_cmd(&self) -> Command {
        let mut cmd = self.confcache();
        cmd.arg("cache").arg("--cache-dir").arg(&self.cache_dir);
        cmd
    }
}

/// Encode to bytes and decode again, as a store and a later process would
pub fn round_trip(
    registry: &CodecRegistry,
    locator: &dyn ServiceLocator,
    root: &Value,
) -> (Value, CollectingSink) {
    let sink = CollectingSink::new();
    let encoded = GraphWriter::new(registry, &sink).write(root);
    let bytes = wire::encode(&encoded);
    let decoded = wire::decode(&bytes).expect("wire stream should decode");
    let value = GraphReader::new(registry, locator)
        .read(&decoded)
        .expect("graph should decode");
    (value, sink)
}

pub fn record(type_name: &str, fields: Vec<(&str, Value)>) -> ObjRef {
    ObjRef::record(type_name, fields)
}

/// Field of a record value, panicking with a readable message when absent
pub fn field(value: &Value, name: &str) -> Value {
    value
        .as_object()
        .and_then(|obj| obj.get(name))
        .unwrap_or_else(|| panic!("missing field '{}'", name))
}

/// A small build model: a project owning two tasks, each pointing back at the
/// project, one depending on the other, with shared source set lists.
pub fn build_model() -> Value {
    let project = record("Project", vec![("name", Value::str("app"))]);
    let sources = ObjRef::list(vec![Value::str("src/main.rs"), Value::str("src/lib.rs")]);
    let compile = record(
        "Task",
        vec![
            ("name", Value::str("compile")),
            ("project", project.clone().into()),
            ("inputs", sources.clone().into()),
        ],
    );
    let test = record(
        "Task",
        vec![
            ("name", Value::str("test")),
            ("project", project.clone().into()),
            ("inputs", sources.into()),
            ("depends_on", ObjRef::list(vec![compile.clone().into()]).into()),
        ],
    );
    project.set(
        "tasks",
        ObjRef::map(vec![
            (Value::str("compile"), compile.into()),
            (Value::str("test"), test.into()),
        ]),
    );
    project.into()
}
