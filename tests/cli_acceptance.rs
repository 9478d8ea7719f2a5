// Acceptance tests for the confcache maintenance binary

mod common;

use common::{build_model, TestProject};
use confcache::cache::{BuildRequest, FilesystemCacheStore, Orchestrator};
use confcache::codec::CodecRegistry;
use confcache::graph::ServiceRegistry;
use predicates::prelude::*;

/// Stores one entry for `tasks` and returns its key
fn populate(project: &TestProject, tasks: &[&str]) -> String {
    let store = FilesystemCacheStore::new(&project.cache_dir).unwrap();
    let mut orchestrator = Orchestrator::new(store, CodecRegistry::new(), ServiceRegistry::new());
    let outcome = orchestrator
        .run(
            &BuildRequest::new(&project.root, tasks.iter().copied()),
            || Ok(build_model()),
            |_| Ok(()),
        )
        .unwrap();
    outcome.key.to_string()
}

#[test]
fn test_list_and_stats() {
    let project = TestProject::new();

    project
        .cache_cmd()
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("No cache entries."));

    let key = populate(&project, &[":app:assemble"]);

    project
        .cache_cmd()
        .args(["list", "--verbose"])
        .assert()
        .success()
        .stdout(predicate::str::contains(&key))
        .stdout(predicate::str::contains(":app:assemble"))
        .stdout(predicate::str::contains("Expires: Never"));

    project
        .cache_cmd()
        .arg("stats")
        .assert()
        .success()
        .stdout(predicate::str::contains("Total entries: 1"));
}

#[test]
fn test_inspect_prints_json() {
    let project = TestProject::new();
    let key = populate(&project, &["test"]);

    let output = project
        .cache_cmd()
        .args(["inspect", key.as_str()])
        .output()
        .unwrap();
    assert!(output.status.success());

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["metadata"]["key"], key.as_str());
    assert_eq!(report["metadata"]["tasks"][0], "test");
    assert_eq!(report["graph"]["root"]["ref"], 0);
    assert_eq!(report["graph"]["records"][0]["type_name"], "Project");
    assert!(report["back_references"].as_u64().unwrap() >= 3);

    let output = project
        .cache_cmd()
        .args(["inspect", key.as_str(), "--metadata-only"])
        .output()
        .unwrap();
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert!(report.get("graph").is_none());

    project
        .cache_cmd()
        .args(["inspect", "graph-00000000000000000000000000000000"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("No cache entry"));

    project
        .cache_cmd()
        .args(["inspect", "not-a-key"])
        .assert()
        .failure();
}

#[test]
fn test_clean() {
    let project = TestProject::new();
    let first = populate(&project, &["a"]);
    populate(&project, &["b"]);

    project
        .cache_cmd()
        .arg("clean")
        .assert()
        .failure()
        .stderr(predicate::str::contains("--all"));

    project
        .cache_cmd()
        .args(["clean", "--key", first.as_str()])
        .assert()
        .success()
        .stdout(predicate::str::contains("Removed"));

    project
        .cache_cmd()
        .args(["clean", "--key", first.as_str()])
        .assert()
        .success()
        .stdout(predicate::str::contains("No entry"));

    project
        .cache_cmd()
        .args(["clean", "--all"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Removed 1 entries."));

    project
        .cache_cmd()
        .arg("stats")
        .assert()
        .success()
        .stdout(predicate::str::contains("Total entries: 0"));
}

#[test]
fn test_cache_dir_from_discovered_config() {
    let project = TestProject::new();
    project.write("confcache.toml", "[cache]\ndir = \"build-cache\"\n");
    let nested = project.write("app/src/main.conf", "");

    project
        .confcache()
        .current_dir(nested.parent().unwrap())
        .args(["cache", "stats"])
        .assert()
        .success()
        .stdout(predicate::str::contains("build-cache"));

    assert!(project.root.join("build-cache").join("entries").is_dir());
}

#[test]
fn test_invalid_discovered_config_is_reported() {
    let project = TestProject::new();
    project.write("confcache.toml", "[cache]\ncompression_level = 40\n");

    project
        .confcache()
        .args(["cache", "stats"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("compression_level"));
}

#[test]
fn test_config_commands() {
    let project = TestProject::new();

    let output = project.confcache().args(["config", "example"]).output().unwrap();
    assert!(output.status.success());
    let example = String::from_utf8(output.stdout).unwrap();
    assert!(example.contains("[codec]"));
    assert!(example.contains("DefaultProject"));

    let path = project.write("example.toml", &example);
    project
        .confcache()
        .args(["config", "validate"])
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("Configuration file is valid"))
        .stdout(predicate::str::contains("DefaultProject (via Project)"));

    let bad = project.write("bad.toml", "[codec]\nproblems = \"ignore\"\n");
    project
        .confcache()
        .args(["config", "validate"])
        .arg(&bad)
        .assert()
        .failure();

    project
        .confcache()
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("showing defaults"))
        .stdout(predicate::str::contains("compression_level = 3"));
}
