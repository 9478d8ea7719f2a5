/// `confcache cache` command implementation
///
/// Maintains configuration cache entries (list, stats, clean, inspect).
use anyhow::{Context, Result};
use chrono::Utc;
use serde_json::json;
use std::path::PathBuf;
use tracing::info;

use crate::cache::{CacheEntry, CacheKey, CacheStore, FilesystemCacheStore};
use crate::cli::{CacheArgs, CacheCommands};
use crate::cli_utils::{confcache_prefix, format_size};
use crate::config::default_cache_dir;
use crate::config_discovery::LoadedConfig;
use crate::logging::operations;

pub fn run(args: &CacheArgs, loaded: &LoadedConfig) -> Result<()> {
    let cache_dir = resolve_cache_dir(args, loaded);
    let store = FilesystemCacheStore::new(&cache_dir)
        .with_context(|| format!("Failed to open cache at {}", cache_dir.display()))?;

    match &args.command {
        CacheCommands::List { verbose } => list(&store, *verbose),
        CacheCommands::Stats => stats(&store, &cache_dir),
        CacheCommands::Clean { key, all } => clean(&store, key.as_deref(), *all),
        CacheCommands::Inspect { key, metadata_only } => inspect(&store, key, *metadata_only),
    }
}

/// `--cache-dir` wins, then a configuration file's `cache.dir`, then the user cache dir
fn resolve_cache_dir(args: &CacheArgs, loaded: &LoadedConfig) -> PathBuf {
    if let Some(dir) = &args.cache_dir {
        return dir.clone();
    }
    match loaded.path {
        Some(_) => loaded.config.cache_dir(loaded.base_dir()),
        None => default_cache_dir(),
    }
}

fn list(store: &FilesystemCacheStore, verbose: bool) -> Result<()> {
    let keys = store.keys().context("Failed to list cache entries")?;

    if keys.is_empty() {
        println!("No cache entries.");
        return Ok(());
    }

    println!("Cache entries ({} entries):", keys.len());
    println!();

    let now = Utc::now();
    for key in keys {
        let Some(bytes) = store.retrieve(&key)? else {
            continue;
        };

        println!("  {}", key);
        match CacheEntry::read_metadata(&bytes) {
            Ok(metadata) => {
                println!("    Tasks: {}", metadata.tasks.join(" "));
                println!(
                    "    Created: {}",
                    metadata.created_at.format("%Y-%m-%d %H:%M:%S")
                );
                if metadata.is_expired(now) {
                    println!("    Status: EXPIRED");
                }

                if verbose {
                    match metadata.expires_at {
                        Some(expires_at) => println!(
                            "    Expires: {}",
                            expires_at.format("%Y-%m-%d %H:%M:%S")
                        ),
                        None => println!("    Expires: Never"),
                    }
                    println!("    Payload: {}", format_size(metadata.payload_size));
                    println!("    File inputs: {}", metadata.file_inputs.len());
                    println!("    Problems: {}", metadata.problem_count);
                }
            }
            Err(e) => println!("    Status: UNREADABLE ({})", e),
        }
        println!();
    }

    Ok(())
}

fn stats(store: &FilesystemCacheStore, cache_dir: &std::path::Path) -> Result<()> {
    let stats = store.stats().context("Failed to get cache statistics")?;

    println!("Configuration Cache Statistics");
    println!();
    println!("Directory: {}", cache_dir.display());
    println!("Total entries: {}", stats.total_entries);
    println!("Total size: {}", format_size(stats.total_bytes));

    if stats.total_entries > 0 {
        println!(
            "Average size per entry: {}",
            format_size(stats.total_bytes / stats.total_entries as u64)
        );
    }

    Ok(())
}

fn clean(store: &FilesystemCacheStore, key: Option<&str>, all: bool) -> Result<()> {
    if all {
        let removed = store.clean_all().context("Failed to clean cache")?;
        info!(operation = operations::CLEAN, removed, "cache cleaned");
        println!("{} Removed {} entries.", confcache_prefix(), removed);
        return Ok(());
    }

    let Some(key) = key else {
        anyhow::bail!("Specify --all to clean all entries, or --key <KEY>");
    };
    let key = CacheKey::parse(key)?;

    if store.remove(&key)? {
        info!(operation = operations::CLEAN, key = %key, "entry removed");
        println!("{} Removed {}.", confcache_prefix(), key);
    } else {
        println!("{} No entry for {}.", confcache_prefix(), key);
    }

    Ok(())
}

fn inspect(store: &FilesystemCacheStore, key: &str, metadata_only: bool) -> Result<()> {
    let key = CacheKey::parse(key)?;
    let Some(bytes) = store.retrieve(&key)? else {
        anyhow::bail!("No cache entry for {}", key);
    };

    let entry = CacheEntry::from_bytes(&bytes)
        .with_context(|| format!("Entry {} is unreadable", key))?;

    let report = if metadata_only {
        json!({ "metadata": entry.metadata })
    } else {
        let graph = entry
            .open()
            .with_context(|| format!("Entry {} cannot be decoded", key))?;
        json!({
            "metadata": entry.metadata,
            "records": graph.records().len(),
            "back_references": graph.back_reference_count(),
            "graph": graph,
        })
    };

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
