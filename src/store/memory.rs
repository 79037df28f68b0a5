//! In-memory artifact store for rehearsals and tests.

use super::ArtifactStore;
use crate::error::StoreError;
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

#[derive(Debug, Default)]
struct Inner {
    files: BTreeMap<PathBuf, Vec<u8>>,
    dirs: BTreeSet<PathBuf>,
}

/// Artifact store held entirely in memory. Paths are treated as opaque keys.
#[derive(Debug, Default)]
pub struct MemoryArtifactStore {
    inner: RwLock<Inner>,
}

impl MemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a file, creating its parent directories.
    pub fn put(&self, path: impl AsRef<Path>, contents: impl Into<Vec<u8>>) {
        let path = path.as_ref().to_path_buf();
        let mut inner = self.inner.write();
        add_ancestors(&mut inner.dirs, &path);
        inner.files.insert(path, contents.into());
    }

    /// Every file path currently stored.
    pub fn paths(&self) -> Vec<PathBuf> {
        self.inner.read().files.keys().cloned().collect()
    }

    pub fn is_dir(&self, path: &Path) -> bool {
        self.inner.read().dirs.contains(path)
    }
}

fn add_ancestors(dirs: &mut BTreeSet<PathBuf>, path: &Path) {
    let mut current = path.parent();
    while let Some(dir) = current {
        if dir.as_os_str().is_empty() {
            break;
        }
        dirs.insert(dir.to_path_buf());
        current = dir.parent();
    }
}

impl ArtifactStore for MemoryArtifactStore {
    fn list_names(&self, dir: &Path) -> Result<Vec<String>, StoreError> {
        let inner = self.inner.read();
        let names = inner
            .files
            .keys()
            .filter(|p| p.parent() == Some(dir))
            .filter_map(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
            .collect();
        Ok(names)
    }

    fn exists(&self, path: &Path) -> Result<bool, StoreError> {
        let inner = self.inner.read();
        Ok(inner.files.contains_key(path) || inner.dirs.contains(path))
    }

    fn read(&self, path: &Path) -> Result<Vec<u8>, StoreError> {
        self.inner
            .read()
            .files
            .get(path)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(path.to_path_buf()))
    }

    fn write_atomic(&self, path: &Path, contents: &[u8]) -> Result<(), StoreError> {
        self.put(path, contents);
        Ok(())
    }

    fn copy_atomic(&self, from: &Path, to: &Path) -> Result<(), StoreError> {
        let contents = self.read(from)?;
        self.put(to, contents);
        Ok(())
    }

    fn rename(&self, from: &Path, to: &Path) -> Result<(), StoreError> {
        let mut inner = self.inner.write();
        if let Some(contents) = inner.files.remove(from) {
            add_ancestors(&mut inner.dirs, to);
            inner.files.insert(to.to_path_buf(), contents);
            return Ok(());
        }
        if !inner.dirs.contains(from) {
            return Err(StoreError::NotFound(from.to_path_buf()));
        }
        let moved_files: Vec<PathBuf> = inner
            .files
            .keys()
            .filter(|p| p.starts_with(from))
            .cloned()
            .collect();
        for old in moved_files {
            if let (Some(contents), Ok(rel)) = (inner.files.remove(&old), old.strip_prefix(from)) {
                inner.files.insert(to.join(rel), contents);
            }
        }
        let moved_dirs: Vec<PathBuf> = inner
            .dirs
            .iter()
            .filter(|p| p.starts_with(from))
            .cloned()
            .collect();
        for old in moved_dirs {
            inner.dirs.remove(&old);
            if let Ok(rel) = old.strip_prefix(from) {
                inner.dirs.insert(to.join(rel));
            }
        }
        add_ancestors(&mut inner.dirs, to);
        Ok(())
    }

    fn remove(&self, path: &Path) -> Result<(), StoreError> {
        self.inner.write().files.remove(path);
        Ok(())
    }

    fn create_dir_all(&self, dir: &Path) -> Result<(), StoreError> {
        let mut inner = self.inner.write();
        add_ancestors(&mut inner.dirs, dir);
        inner.dirs.insert(dir.to_path_buf());
        Ok(())
    }
}
