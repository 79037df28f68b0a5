//! Artifact Store
//!
//! The filesystem is the only synchronization medium between orchestrator
//! instances and the execution engine. This module wraps it behind a narrow
//! interface (list, exists, atomic write/copy/move, remove) so components can
//! be driven against an in-memory store in tests.

pub mod fs;
pub mod memory;

pub use fs::FsArtifactStore;
pub use memory::MemoryArtifactStore;

use crate::artifact::{ArtifactId, ArtifactPattern};
use crate::error::StoreError;
use std::path::Path;

/// Artifact store interface
pub trait ArtifactStore: Send + Sync {
    /// File names directly inside `dir`, sorted. A missing directory is empty.
    fn list_names(&self, dir: &Path) -> Result<Vec<String>, StoreError>;

    fn exists(&self, path: &Path) -> Result<bool, StoreError>;

    fn read(&self, path: &Path) -> Result<Vec<u8>, StoreError>;

    /// Write `contents` so readers see either the old file or the new one.
    fn write_atomic(&self, path: &Path, contents: &[u8]) -> Result<(), StoreError>;

    /// Copy `from` to `to`; `to` appears complete or not at all.
    fn copy_atomic(&self, from: &Path, to: &Path) -> Result<(), StoreError>;

    /// Atomically move a file or directory.
    fn rename(&self, from: &Path, to: &Path) -> Result<(), StoreError>;

    fn remove(&self, path: &Path) -> Result<(), StoreError>;

    fn create_dir_all(&self, dir: &Path) -> Result<(), StoreError>;

    /// Parsed artifacts in `dir` matching `pattern`.
    fn list(&self, dir: &Path, pattern: &ArtifactPattern) -> Result<Vec<ArtifactId>, StoreError> {
        Ok(pattern.select(self.list_names(dir)?))
    }

    fn count(&self, dir: &Path, pattern: &ArtifactPattern) -> Result<usize, StoreError> {
        Ok(self.list(dir, pattern)?.len())
    }
}
