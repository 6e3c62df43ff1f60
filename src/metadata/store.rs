//! Named local blob stores for the persisted caches.
//!
//! Files are keyed by appliance software version (`columns-<version>.json`,
//! `areas-<version>.json`) so an appliance upgrade starts from a clean slate.

use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::error::Result;

/// Reads and writes opaque named blobs.
pub trait LocalStore: Send + Sync {
    /// Contents of `name`, or `None` when it has never been written.
    fn read(&self, name: &str) -> Result<Option<String>>;

    fn write(&self, name: &str, contents: &str) -> Result<()>;
}

pub fn columns_file_name(appliance_version: &str) -> String {
    format!("columns-{}.json", appliance_version)
}

pub fn areas_file_name(appliance_version: &str) -> String {
    format!("areas-{}.json", appliance_version)
}

/// Default directory for cache files, under the user's data dir.
pub fn default_cache_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("netprofiler")
}

/// Store backed by one directory on disk.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Store rooted at [`default_cache_dir`].
    pub fn with_defaults() -> Self {
        Self::new(default_cache_dir())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }
}

impl LocalStore for FileStore {
    fn read(&self, name: &str) -> Result<Option<String>> {
        let path = self.path_for(name);
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(fs::read_to_string(path)?))
    }

    fn write(&self, name: &str, contents: &str) -> Result<()> {
        if !self.root.exists() {
            fs::create_dir_all(&self.root)?;
        }

        let path = self.path_for(name);
        let tmp_path = path.with_extension("json.tmp");
        {
            let mut file = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&tmp_path)?;
            file.write_all(contents.as_bytes())?;
            file.flush()?;
        }
        fs::rename(tmp_path, &path)?;

        log::debug!("STORE_WRITE path={} bytes={}", path.display(), contents.len());
        Ok(())
    }
}

/// In-process store, used for tests and throwaway sessions.
#[derive(Debug, Default)]
pub struct MemoryStore {
    blobs: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.blobs.lock().keys().cloned().collect();
        names.sort();
        names
    }
}

impl LocalStore for MemoryStore {
    fn read(&self, name: &str) -> Result<Option<String>> {
        Ok(self.blobs.lock().get(name).cloned())
    }

    fn write(&self, name: &str, contents: &str) -> Result<()> {
        self.blobs.lock().insert(name.to_string(), contents.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_names() {
        assert_eq!(columns_file_name("10.8.0"), "columns-10.8.0.json");
        assert_eq!(areas_file_name("10.8.0"), "areas-10.8.0.json");
    }

    #[test]
    fn test_file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("nested"));

        assert_eq!(store.read("columns-1.json").unwrap(), None);
        store.write("columns-1.json", "{\"a\":1}").unwrap();
        assert_eq!(store.read("columns-1.json").unwrap().as_deref(), Some("{\"a\":1}"));

        store.write("columns-1.json", "{}").unwrap();
        assert_eq!(store.read("columns-1.json").unwrap().as_deref(), Some("{}"));
        assert!(!dir.path().join("nested").join("columns-1.json.tmp").exists());
    }

    #[test]
    fn test_memory_store() {
        let store = MemoryStore::new();
        store.write("b", "2").unwrap();
        store.write("a", "1").unwrap();
        assert_eq!(store.read("a").unwrap().as_deref(), Some("1"));
        assert_eq!(store.read("missing").unwrap(), None);
        assert_eq!(store.names(), vec!["a".to_string(), "b".to_string()]);
    }
}
