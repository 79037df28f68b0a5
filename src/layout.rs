//! Directory layout for per-target, per-iteration artifacts, and preparation
//! of result/log directories before a fresh run.

use crate::artifact::{ArtifactId, StageId};
use crate::error::StoreError;
use crate::store::ArtifactStore;
use crate::types::{ChunkId, TargetId};
use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

/// Where each kind of artifact lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Layout {
    /// Transient chunk outputs as delivered by the grid.
    pub receiving_dir: PathBuf,
    /// Durable destination for transferred outputs, verdicts and merges.
    pub archive_dir: PathBuf,
    /// Per-chunk log files (completion evidence).
    pub log_dir: PathBuf,
    /// Generated graphs and the engine's recovery artifacts.
    pub graph_dir: PathBuf,
}

impl Layout {
    /// Layout with every directory under `root`.
    pub fn under(root: &Path) -> Self {
        Self {
            receiving_dir: root.join("results"),
            archive_dir: root.join("archive"),
            log_dir: root.join("logs"),
            graph_dir: root.join("graphs"),
        }
    }

    pub fn receiving(&self, target: &TargetId) -> PathBuf {
        self.receiving_dir.join(target.as_str())
    }

    pub fn archive(&self, target: &TargetId, iteration: u32) -> PathBuf {
        self.archive_dir
            .join(target.as_str())
            .join(format!("iter{iteration}"))
    }

    pub fn target_archive(&self, target: &TargetId) -> PathBuf {
        self.archive_dir.join(target.as_str())
    }

    pub fn logs(&self, target: &TargetId, iteration: u32) -> PathBuf {
        self.log_dir
            .join(target.as_str())
            .join(format!("iter{iteration}"))
    }

    pub fn graphs(&self, target: &TargetId) -> PathBuf {
        self.graph_dir.join(target.as_str())
    }

    pub fn stage_graph(&self, stage: &StageId) -> PathBuf {
        self.graphs(&stage.target)
            .join(ArtifactId::StageGraph(stage.clone()).name())
    }

    pub fn chunk_output(&self, chunk: &ChunkId) -> PathBuf {
        self.receiving(&chunk.target)
            .join(ArtifactId::ChunkOutput(chunk.clone()).name())
    }

    pub fn chunk_log(&self, chunk: &ChunkId) -> PathBuf {
        self.logs(&chunk.target, chunk.iteration)
            .join(ArtifactId::ChunkLog(chunk.clone()).name())
    }

    pub fn mask_verdict(&self, target: &TargetId, iteration: u32) -> PathBuf {
        self.target_archive(target).join(
            ArtifactId::MaskVerdict {
                target: target.clone(),
                iteration,
            }
            .name(),
        )
    }

    /// Prepare a target's directories for a fresh run.
    ///
    /// Existing results and logs directories are moved aside to
    /// `<dir>_<YYYYMMDD>_<8 hex>` and recreated empty; per-iteration log
    /// directories `iter0..iter{max-1}` are created. Returns the rotated paths.
    pub fn prepare_target<R: Rng + ?Sized>(
        &self,
        store: &dyn ArtifactStore,
        target: &TargetId,
        max_iterations: u32,
        now: DateTime<Utc>,
        rng: &mut R,
    ) -> Result<Vec<PathBuf>, StoreError> {
        let mut rotated = Vec::new();
        let results = self.receiving(target);
        let logs = self.log_dir.join(target.as_str());
        for (kind, dir) in [("results", &results), ("logs", &logs)] {
            if store.exists(dir)? {
                let suffix = hex::encode(rng.gen::<[u8; 4]>());
                let moved = append_to_file_name(dir, &format!("_{}_{}", now.format("%Y%m%d"), suffix));
                store.rename(dir, &moved)?;
                info!(kind, from = %dir.display(), to = %moved.display(), "Moved existing directory aside");
                rotated.push(moved);
            }
            store.create_dir_all(dir)?;
            info!(kind, dir = %dir.display(), "Created directory");
        }
        for iteration in 0..max_iterations {
            store.create_dir_all(&self.logs(target, iteration))?;
        }
        Ok(rotated)
    }
}

fn append_to_file_name(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(suffix);
    path.with_file_name(name)
}
