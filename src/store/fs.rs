//! Filesystem-backed artifact store.

use super::ArtifactStore;
use crate::error::StoreError;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Artifact store over the local (or shared, mounted) filesystem.
#[derive(Debug, Clone, Default)]
pub struct FsArtifactStore;

impl FsArtifactStore {
    pub fn new() -> Self {
        Self
    }
}

fn temp_path_for(path: &Path) -> Result<PathBuf, StoreError> {
    let name = path
        .file_name()
        .ok_or_else(|| StoreError::InvalidPath(format!("{:?} has no file name", path)))?;
    let mut temp_name = name.to_os_string();
    temp_name.push(format!(".{}.tmp", std::process::id()));
    Ok(path.with_file_name(temp_name))
}

fn ensure_parent(path: &Path) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

impl ArtifactStore for FsArtifactStore {
    fn list_names(&self, dir: &Path) -> Result<Vec<String>, StoreError> {
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut names = Vec::new();
        for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
            let entry = entry.map_err(|e| {
                StoreError::Io(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    format!("Failed to list {:?}: {}", dir, e),
                ))
            })?;
            if entry.file_type().is_file() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();
        Ok(names)
    }

    fn exists(&self, path: &Path) -> Result<bool, StoreError> {
        Ok(path.try_exists()?)
    }

    fn read(&self, path: &Path) -> Result<Vec<u8>, StoreError> {
        fs::read(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => StoreError::NotFound(path.to_path_buf()),
            _ => StoreError::Io(e),
        })
    }

    fn write_atomic(&self, path: &Path, contents: &[u8]) -> Result<(), StoreError> {
        ensure_parent(path)?;
        let temp_path = temp_path_for(path)?;
        {
            let mut file = fs::File::create(&temp_path)?;
            file.write_all(contents)?;
            file.sync_all()?;
        }
        fs::rename(&temp_path, path).map_err(|e| {
            let _ = fs::remove_file(&temp_path);
            StoreError::Io(e)
        })
    }

    fn copy_atomic(&self, from: &Path, to: &Path) -> Result<(), StoreError> {
        if !from.is_file() {
            return Err(StoreError::NotFound(from.to_path_buf()));
        }
        ensure_parent(to)?;
        let temp_path = temp_path_for(to)?;
        fs::copy(from, &temp_path)?;
        fs::rename(&temp_path, to).map_err(|e| {
            let _ = fs::remove_file(&temp_path);
            StoreError::Io(e)
        })
    }

    fn rename(&self, from: &Path, to: &Path) -> Result<(), StoreError> {
        if !from.exists() {
            return Err(StoreError::NotFound(from.to_path_buf()));
        }
        ensure_parent(to)?;
        fs::rename(from, to)?;
        Ok(())
    }

    fn remove(&self, path: &Path) -> Result<(), StoreError> {
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::Io(e)),
        }
    }

    fn create_dir_all(&self, dir: &Path) -> Result<(), StoreError> {
        fs::create_dir_all(dir)?;
        Ok(())
    }
}
