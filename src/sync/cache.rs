//! Durable local cache of synced documents.
//!
//! Entries are raw JSON text keyed by a versioned storage key such as
//! `finance_data_v1`. Reads and writes are synchronous so an edit is on disk
//! before the call that made it returns.

use anyhow::{Context, Result};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::PathBuf;

pub trait LocalCache: Send + Sync {
    fn read(&self, key: &str) -> Result<Option<String>>;
    fn write(&self, key: &str, value: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
}

/// One `<key>.json` file per entry under a directory
pub struct FileCache {
    dir: PathBuf,
}

impl FileCache {
    /// Create the cache, making its directory if needed
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create cache directory: {}", dir.display()))?;
        Ok(Self { dir })
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
            && !key.starts_with('.');
        if !valid {
            anyhow::bail!("Invalid cache key: {:?}", key);
        }
        Ok(self.dir.join(format!("{}.json", key)))
    }
}

impl LocalCache for FileCache {
    fn read(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key)?;
        match std::fs::read_to_string(&path) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("Failed to read {}", path.display())),
        }
    }

    fn write(&self, key: &str, value: &str) -> Result<()> {
        let path = self.path_for(key)?;
        // Write then rename so a crash never leaves a half-written entry
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, value)
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        std::fs::rename(&tmp, &path)
            .with_context(|| format!("Failed to replace {}", path.display()))?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let path = self.path_for(key)?;
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("Failed to remove {}", path.display())),
        }
    }
}

/// Process-local cache, used by tests and short-lived tools
#[derive(Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LocalCache for MemoryCache {
    fn read(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn write(&self, key: &str, value: &str) -> Result<()> {
        self.entries.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.entries.lock().remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_cache_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileCache::new(dir.path().join("cache")).unwrap();

        assert_eq!(cache.read("finance_data_v1").unwrap(), None);

        cache.write("finance_data_v1", r#"{"a":1}"#).unwrap();
        assert_eq!(
            cache.read("finance_data_v1").unwrap().as_deref(),
            Some(r#"{"a":1}"#)
        );
        assert!(dir.path().join("cache/finance_data_v1.json").exists());

        cache.write("finance_data_v1", "[]").unwrap();
        assert_eq!(cache.read("finance_data_v1").unwrap().as_deref(), Some("[]"));

        cache.remove("finance_data_v1").unwrap();
        cache.remove("finance_data_v1").unwrap();
        assert_eq!(cache.read("finance_data_v1").unwrap(), None);
    }

    #[test]
    fn test_file_cache_rejects_path_like_keys() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileCache::new(dir.path()).unwrap();

        assert!(cache.write("../escape", "x").is_err());
        assert!(cache.write("a/b", "x").is_err());
        assert!(cache.read("").is_err());
        assert!(cache.read(".hidden").is_err());
    }

    #[test]
    fn test_memory_cache() {
        let cache = MemoryCache::new();
        cache.write("k", "v").unwrap();
        assert_eq!(cache.read("k").unwrap().as_deref(), Some("v"));
        cache.remove("k").unwrap();
        assert_eq!(cache.read("k").unwrap(), None);
    }
}
