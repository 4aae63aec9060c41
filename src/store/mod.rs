//! `ObjectStore` abstraction (§4.8 "ADDED" object-access note).
//!
//! list/get/put are expressed as a small trait with a local-filesystem
//! implementation used for both tests and any deployment that doesn't need a
//! remote object store; a real cloud backend is out of scope for this crate
//! (§1 scope note — "credential brokering are interface-level only") and is
//! expected to be supplied by an external implementor of the same trait,
//! matching the engine-trait-with-one-production-backend shape used for
//! [`crate::writer::ColumnarSink`] (itself grounded on the teacher's
//! `src/engine/mod.rs`).

use crate::Result;
use anyhow::Context;
use std::path::{Path, PathBuf};

/// A minimal object store: list keys under a prefix, read a key's bytes,
/// write bytes to a key.
pub trait ObjectStore {
    fn list(&self, prefix: &str) -> Result<Vec<String>>;
    fn get(&self, key: &str) -> Result<Vec<u8>>;
    fn put(&self, key: &str, contents: &[u8]) -> Result<()>;
}

/// Local-filesystem-backed `ObjectStore`, rooted at `root`. Keys are
/// relative paths under `root`.
pub struct LocalObjectStore {
    root: PathBuf,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }
}

impl ObjectStore for LocalObjectStore {
    fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let dir = self.resolve(prefix);
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut keys = Vec::new();
        for entry in std::fs::read_dir(&dir).with_context(|| format!("listing {}", dir.display()))? {
            let entry = entry?;
            if entry.path().is_file() {
                let name = entry.file_name().to_string_lossy().into_owned();
                keys.push(format!("{}/{}", prefix.trim_end_matches('/'), name));
            }
        }
        keys.sort();
        Ok(keys)
    }

    fn get(&self, key: &str) -> Result<Vec<u8>> {
        let path = self.resolve(key);
        std::fs::read(&path).with_context(|| format!("reading object {}", path.display()))
    }

    fn put(&self, key: &str, contents: &[u8]) -> Result<()> {
        let path = self.resolve(key);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        crate::util::atomic_file::write_atomic(&path, contents)
    }
}

/// True if `path` is directly under `root` (used by the Catalog Builder to
/// confirm an archive landed where it was asked to, per §4.8).
pub fn is_under(root: &Path, path: &Path) -> bool {
    path.starts_with(root)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn put_then_get_round_trips() {
        let dir = tempdir().unwrap();
        let store = LocalObjectStore::new(dir.path());
        store.put("archives/2016-Q4.tar.zst", b"archive-bytes").unwrap();
        assert_eq!(store.get("archives/2016-Q4.tar.zst").unwrap(), b"archive-bytes");
    }

    #[test]
    fn list_returns_only_files_under_prefix() {
        let dir = tempdir().unwrap();
        let store = LocalObjectStore::new(dir.path());
        store.put("archives/a.tar.zst", b"a").unwrap();
        store.put("archives/b.tar.zst", b"b").unwrap();
        let keys = store.list("archives").unwrap();
        assert_eq!(keys, vec!["archives/a.tar.zst".to_string(), "archives/b.tar.zst".to_string()]);
    }

    #[test]
    fn list_of_missing_prefix_is_empty() {
        let dir = tempdir().unwrap();
        let store = LocalObjectStore::new(dir.path());
        assert!(store.list("nope").unwrap().is_empty());
    }
}
