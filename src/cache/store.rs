use anyhow::{Context, Result};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::debug;

use super::key::CacheKey;
use crate::logging::operations;

const ENTRY_EXTENSION: &str = "entry";

/// Storage backend for serialized cache entries, addressed by key
pub trait CacheStore {
    /// Store an entry, replacing any previous entry under the same key
    fn persist(&self, key: &CacheKey, entry: &[u8]) -> Result<()>;

    /// Retrieve an entry
    fn retrieve(&self, key: &CacheKey) -> Result<Option<Vec<u8>>>;

    /// Delete an entry. Returns whether it existed.
    fn remove(&self, key: &CacheKey) -> Result<bool>;

    /// All stored keys, sorted
    fn keys(&self) -> Result<Vec<CacheKey>>;

    /// Delete every entry. Returns how many were removed.
    fn clean_all(&self) -> Result<usize>;

    fn stats(&self) -> Result<StoreStats>;
}

/// Store statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub total_entries: usize,
    pub total_bytes: u64,
}

/// One file per entry under `<cache dir>/entries/`
pub struct FilesystemCacheStore {
    entries_dir: PathBuf,
}

impl FilesystemCacheStore {
    pub fn new(cache_dir: impl AsRef<Path>) -> Result<Self> {
        let entries_dir = cache_dir.as_ref().join("entries");
        fs::create_dir_all(&entries_dir).with_context(|| {
            format!(
                "Failed to create cache directory: {}",
                entries_dir.display()
            )
        })?;
        Ok(Self { entries_dir })
    }

    pub fn entries_dir(&self) -> &Path {
        &self.entries_dir
    }

    pub fn entry_path(&self, key: &CacheKey) -> PathBuf {
        self.entries_dir
            .join(format!("{}.{}", key.as_str(), ENTRY_EXTENSION))
    }

    /// Paths of well-formed entry files. Temp files and foreign files are skipped.
    fn entry_files(&self) -> Result<Vec<(CacheKey, PathBuf)>> {
        let mut entries = Vec::new();
        if !self.entries_dir.exists() {
            return Ok(entries);
        }

        for entry in fs::read_dir(&self.entries_dir).with_context(|| {
            format!(
                "Failed to read cache directory: {}",
                self.entries_dir.display()
            )
        })? {
            let path = entry?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(ENTRY_EXTENSION) {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) else {
                continue;
            };
            if let Ok(key) = CacheKey::parse(stem) {
                entries.push((key, path));
            }
        }

        entries.sort();
        Ok(entries)
    }
}

impl CacheStore for FilesystemCacheStore {
    fn persist(&self, key: &CacheKey, entry: &[u8]) -> Result<()> {
        let path = self.entry_path(key);

        // Write to a temp file in the same directory, then rename over the entry. A
        // failed write never touches the previous entry.
        let mut file = NamedTempFile::new_in(&self.entries_dir)
            .context("Failed to create temp file")?;
        file.write_all(entry).context("Failed to write entry")?;
        file.as_file().sync_all().context("Failed to sync entry")?;
        file.persist(&path)
            .with_context(|| format!("Failed to move entry into place: {}", path.display()))?;

        debug!(
            operation = operations::PERSIST,
            key = %key,
            size_bytes = entry.len(),
            "entry written"
        );
        Ok(())
    }

    fn retrieve(&self, key: &CacheKey) -> Result<Option<Vec<u8>>> {
        let path = self.entry_path(key);
        match fs::read(&path) {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => {
                Err(e).with_context(|| format!("Failed to read entry: {}", path.display()))
            }
        }
    }

    fn remove(&self, key: &CacheKey) -> Result<bool> {
        let path = self.entry_path(key);
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => {
                Err(e).with_context(|| format!("Failed to remove entry: {}", path.display()))
            }
        }
    }

    fn keys(&self) -> Result<Vec<CacheKey>> {
        Ok(self
            .entry_files()?
            .into_iter()
            .map(|(key, _)| key)
            .collect())
    }

    fn clean_all(&self) -> Result<usize> {
        let entries = self.entry_files()?;
        for (_, path) in &entries {
            fs::remove_file(path)
                .with_context(|| format!("Failed to remove entry: {}", path.display()))?;
        }
        Ok(entries.len())
    }

    fn stats(&self) -> Result<StoreStats> {
        let mut stats = StoreStats::default();
        for (_, path) in self.entry_files()? {
            let metadata = fs::metadata(&path)
                .with_context(|| format!("Failed to stat entry: {}", path.display()))?;
            stats.total_entries += 1;
            stats.total_bytes += metadata.len();
        }
        Ok(stats)
    }
}

/// In-process store; entries live as long as the store
#[derive(Debug, Default)]
pub struct MemoryCacheStore {
    entries: RefCell<BTreeMap<CacheKey, Vec<u8>>>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite stored bytes in place, bypassing `persist`
    pub fn tamper(&self, key: &CacheKey, edit: impl FnOnce(&mut Vec<u8>)) -> bool {
        match self.entries.borrow_mut().get_mut(key) {
            Some(entry) => {
                edit(entry);
                true
            }
            None => false,
        }
    }
}

impl CacheStore for MemoryCacheStore {
    fn persist(&self, key: &CacheKey, entry: &[u8]) -> Result<()> {
        self.entries
            .borrow_mut()
            .insert(key.clone(), entry.to_vec());
        Ok(())
    }

    fn retrieve(&self, key: &CacheKey) -> Result<Option<Vec<u8>>> {
        Ok(self.entries.borrow().get(key).cloned())
    }

    fn remove(&self, key: &CacheKey) -> Result<bool> {
        Ok(self.entries.borrow_mut().remove(key).is_some())
    }

    fn keys(&self) -> Result<Vec<CacheKey>> {
        Ok(self.entries.borrow().keys().cloned().collect())
    }

    fn clean_all(&self) -> Result<usize> {
        let mut entries = self.entries.borrow_mut();
        let count = entries.len();
        entries.clear();
        Ok(count)
    }

    fn stats(&self) -> Result<StoreStats> {
        let entries = self.entries.borrow();
        Ok(StoreStats {
            total_entries: entries.len(),
            total_bytes: entries.values().map(|entry| entry.len() as u64).sum(),
        })
    }
}

impl<S: CacheStore + ?Sized> CacheStore for std::rc::Rc<S> {
    fn persist(&self, key: &CacheKey, entry: &[u8]) -> Result<()> {
        (**self).persist(key, entry)
    }

    fn retrieve(&self, key: &CacheKey) -> Result<Option<Vec<u8>>> {
        (**self).retrieve(key)
    }

    fn remove(&self, key: &CacheKey) -> Result<bool> {
        (**self).remove(key)
    }

    fn keys(&self) -> Result<Vec<CacheKey>> {
        (**self).keys()
    }

    fn clean_all(&self) -> Result<usize> {
        (**self).clean_all()
    }

    fn stats(&self) -> Result<StoreStats> {
        (**self).stats()
    }
}
