/// Build input fingerprinting
///
/// Files read while evaluating the build (settings scripts, property files) are
/// fingerprinted into each entry. A changed fingerprint makes the entry stale.
use anyhow::{Context, Result};
use glob::glob;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};

/// Fingerprint of the files one glob pattern matched
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputFingerprint {
    pub pattern: String,
    pub file_count: usize,
    pub combined_hash: String,
}

/// Fingerprint every pattern, in declaration order
pub fn fingerprint_inputs(patterns: &[String], base_dir: &Path) -> Result<Vec<InputFingerprint>> {
    let mut results = Vec::new();

    for pattern in patterns {
        let fingerprint = fingerprint_input(pattern, base_dir)
            .with_context(|| format!("Failed to hash input: {}", pattern))?;
        results.push(fingerprint);
    }

    Ok(results)
}

fn fingerprint_input(pattern: &str, base_dir: &Path) -> Result<InputFingerprint> {
    let files = expand_glob(pattern, base_dir)?;

    if files.is_empty() {
        // Empty input is valid (might be optional files)
        return Ok(InputFingerprint {
            pattern: pattern.to_string(),
            file_count: 0,
            combined_hash: String::from("empty"),
        });
    }

    let mut hasher = Sha256::new();
    for file in &files {
        // Include file path (relative to base_dir) so renames are detected
        let rel_path = file
            .strip_prefix(base_dir)
            .unwrap_or(file)
            .to_string_lossy();
        hasher.update(rel_path.as_bytes());
        hasher.update(hash_file_content(file)?);
    }

    Ok(InputFingerprint {
        pattern: pattern.to_string(),
        file_count: files.len(),
        combined_hash: hex::encode(hasher.finalize()),
    })
}

/// Expand glob pattern relative to base directory
pub fn expand_glob(pattern: &str, base_dir: &Path) -> Result<Vec<PathBuf>> {
    let full_pattern = if Path::new(pattern).is_absolute() {
        pattern.to_string()
    } else {
        base_dir.join(pattern).to_string_lossy().to_string()
    };

    let mut paths = Vec::new();
    for entry in
        glob(&full_pattern).with_context(|| format!("Invalid glob pattern: {}", pattern))?
    {
        let path = entry.with_context(|| format!("Failed to read glob entry for: {}", pattern))?;
        if path.is_file() {
            paths.push(path);
        }
    }

    // Sort for deterministic ordering
    paths.sort();
    Ok(paths)
}

fn hash_file_content(path: &Path) -> Result<Vec<u8>> {
    let content =
        fs::read(path).with_context(|| format!("Failed to read file: {}", path.display()))?;
    Ok(Sha256::digest(&content).to_vec())
}

/// Describe the first difference between recorded and current fingerprints
pub fn find_mismatch(recorded: &[InputFingerprint], current: &[InputFingerprint]) -> Option<String> {
    if recorded.len() != current.len() {
        return Some(format!(
            "{} input patterns recorded, {} declared now",
            recorded.len(),
            current.len()
        ));
    }

    recorded
        .iter()
        .zip(current)
        .find(|(before, now)| before != now)
        .map(|(before, now)| {
            if before.pattern != now.pattern {
                format!(
                    "input pattern changed from '{}' to '{}'",
                    before.pattern, now.pattern
                )
            } else {
                format!("files matching '{}' changed", now.pattern)
            }
        })
}
