//! Fan-in Aggregator
//!
//! Waits for a stage's chunk outputs in the receiving directory. The stage is
//! ready only when the matched count equals `total_chunks` exactly; more than
//! that is an anomaly (a naming collision or a duplicate submission) and is
//! reported, never truncated. On readiness the set is copied into the
//! archive and the receiving copies are removed. If a transfer stopped
//! between copying and removing, the receiving leftovers duplicate a complete
//! archive; the next poll removes them and reports the stage transferred.

use crate::artifact::{ArtifactId, ArtifactKind, ArtifactPattern, StageId};
use crate::clock::{PollTimer, Tick};
use crate::error::{NameError, OrchestratorError};
use crate::runtime::Runtime;
use crate::types::ChunkId;
use std::collections::BTreeSet;
use std::path::PathBuf;
use tracing::{debug, error, info, warn};

/// A chunk output as found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkFile {
    pub chunk: ChunkId,
    pub name: String,
}

/// Count-based readiness of a stage's outputs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FanInStatus {
    Pending { found: usize },
    Ready(Vec<ChunkFile>),
    Overcount { found: usize },
}

/// How a wait ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FanInOutcome {
    Transferred { count: usize, destination: PathBuf },
    /// Nothing left to move: the archive already holds the full set.
    AlreadyTransferred { destination: PathBuf },
    Overcount { found: usize },
}

pub struct FanInAggregator<'a> {
    rt: &'a Runtime,
}

impl<'a> FanInAggregator<'a> {
    pub fn new(rt: &'a Runtime) -> Self {
        Self { rt }
    }

    /// Chunk outputs for the stage currently in the receiving directory.
    ///
    /// Ready needs exactly `total_chunks` files naming distinct chunks. An
    /// output for the same target and iteration but a different chunk total
    /// is a fatal consistency error.
    pub fn status(&self, stage: &StageId) -> Result<FanInStatus, OrchestratorError> {
        let files = self.receiving_files(stage)?;
        let expected = stage.total_chunks as usize;
        let distinct: BTreeSet<u32> = files.iter().map(|f| f.chunk.chunk_index).collect();
        Ok(match files.len() {
            n if n > expected => FanInStatus::Overcount { found: n },
            n if n == expected && distinct.len() == expected => FanInStatus::Ready(files),
            n => {
                if distinct.len() < n {
                    warn!(
                        target = %stage.target,
                        iteration = stage.iteration,
                        files = n,
                        distinct = distinct.len(),
                        "Several files name the same chunk"
                    );
                }
                FanInStatus::Pending { found: n }
            }
        })
    }

    fn receiving_files(&self, stage: &StageId) -> Result<Vec<ChunkFile>, OrchestratorError> {
        let dir = self.rt.layout.receiving(&stage.target);
        let pattern = ArtifactPattern::kind(ArtifactKind::ChunkOutput)
            .target(&stage.target)
            .iteration(stage.iteration);
        let mut files = Vec::new();
        for name in self.rt.store.list_names(&dir)? {
            let chunk = match ArtifactId::parse(&name) {
                Ok(id) if pattern.matches(&id) => match id {
                    ArtifactId::ChunkOutput(chunk) => chunk,
                    _ => continue,
                },
                Ok(_) | Err(NameError::Unrecognized(_)) => continue,
                Err(e) => {
                    warn!(name = %name, error = %e, "Skipping malformed chunk output");
                    continue;
                }
            };
            chunk.check_total(stage.total_chunks)?;
            files.push(ChunkFile { chunk, name });
        }
        Ok(files)
    }

    /// Copy every chunk into the archive under its canonical name, then
    /// clear the receiving copies.
    pub fn finalize(
        &self,
        stage: &StageId,
        files: &[ChunkFile],
    ) -> Result<PathBuf, OrchestratorError> {
        let source = self.rt.layout.receiving(&stage.target);
        let destination = self.rt.layout.archive(&stage.target, stage.iteration);
        self.rt.store.create_dir_all(&destination)?;
        for file in files {
            let canonical = ArtifactId::ChunkOutput(file.chunk.clone()).name();
            self.rt
                .store
                .copy_atomic(&source.join(&file.name), &destination.join(canonical))?;
        }
        for file in files {
            self.rt.store.remove(&source.join(&file.name))?;
        }
        info!(
            target = %stage.target,
            iteration = stage.iteration,
            count = files.len(),
            destination = %destination.display(),
            "Transferred chunk outputs"
        );
        Ok(destination)
    }

    fn archived(&self, stage: &StageId) -> Result<usize, OrchestratorError> {
        let pattern = ArtifactPattern::kind(ArtifactKind::ChunkOutput)
            .target(&stage.target)
            .iteration(stage.iteration)
            .total_chunks(stage.total_chunks);
        let dir = self.rt.layout.archive(&stage.target, stage.iteration);
        Ok(self.rt.store.count(&dir, &pattern)?)
    }

    /// Remove receiving copies of outputs the archive already holds. Returns
    /// `false`, removing nothing, if any leftover is missing from the archive.
    fn clear_leftovers(&self, stage: &StageId) -> Result<bool, OrchestratorError> {
        let source = self.rt.layout.receiving(&stage.target);
        let destination = self.rt.layout.archive(&stage.target, stage.iteration);
        let leftovers = self.receiving_files(stage)?;
        for file in &leftovers {
            let canonical = ArtifactId::ChunkOutput(file.chunk.clone()).name();
            if !self.rt.store.exists(&destination.join(canonical))? {
                warn!(
                    target = %stage.target,
                    iteration = stage.iteration,
                    name = %file.name,
                    "Receiving file is not in the complete archive"
                );
                return Ok(false);
            }
        }
        for file in &leftovers {
            self.rt.store.remove(&source.join(&file.name))?;
        }
        warn!(
            target = %stage.target,
            iteration = stage.iteration,
            count = leftovers.len(),
            "Removed receiving copies left by an interrupted transfer"
        );
        Ok(true)
    }

    /// One poll: finalize when ready, report overcount, otherwise pending.
    pub fn poll_once(&self, stage: &StageId) -> Result<Tick<FanInOutcome>, OrchestratorError> {
        match self.status(stage)? {
            FanInStatus::Ready(files) => {
                let count = files.len();
                let destination = self.finalize(stage, &files)?;
                Ok(Tick::Ready(FanInOutcome::Transferred { count, destination }))
            }
            FanInStatus::Overcount { found } => {
                error!(
                    target = %stage.target,
                    iteration = stage.iteration,
                    expected = stage.total_chunks,
                    found,
                    "More chunk outputs than chunks; refusing to aggregate"
                );
                Ok(Tick::Ready(FanInOutcome::Overcount { found }))
            }
            FanInStatus::Pending { found }
                if self.archived(stage)? == stage.total_chunks as usize =>
            {
                if found > 0 && !self.clear_leftovers(stage)? {
                    return Ok(Tick::Pending);
                }
                let destination = self.rt.layout.archive(&stage.target, stage.iteration);
                info!(
                    target = %stage.target,
                    iteration = stage.iteration,
                    "Stage outputs already archived"
                );
                Ok(Tick::Ready(FanInOutcome::AlreadyTransferred { destination }))
            }
            FanInStatus::Pending { found } => {
                debug!(
                    target = %stage.target,
                    iteration = stage.iteration,
                    found,
                    expected = stage.total_chunks,
                    "Waiting for chunk outputs"
                );
                Ok(Tick::Pending)
            }
        }
    }

    /// Poll until the stage is ready (then transfer) or overcounted.
    pub fn await_chunks(
        &self,
        stage: &StageId,
        timer: &PollTimer,
    ) -> Result<FanInOutcome, OrchestratorError> {
        timer.poll_until(|_| self.poll_once(stage))
    }
}
