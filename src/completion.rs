//! Completion Detector
//!
//! Decides from filesystem evidence whether a target's stage has finished:
//! each chunk leaves `<target>_<chunk>_<total>_iter<i>.log` under
//! `<log_dir>/<target>/iter<i>/`, and a stage is complete when exactly
//! `total_chunks` of them exist. An iteration's mask step is complete once
//! its verdict `<target>_mask_iter<i>.snr` is in the target's archive.

use crate::artifact::{ArtifactKind, ArtifactPattern, StageId};
use crate::clock::{PollTimer, Tick};
use crate::error::OrchestratorError;
use crate::layout::Layout;
use crate::store::ArtifactStore;
use crate::types::TargetId;
use std::collections::BTreeSet;
use tracing::{debug, error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageStatus {
    Pending { found: usize },
    Complete,
    Overcount { found: usize },
}

/// Result of a monitoring loop.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MonitorReport {
    pub completed: Vec<StageId>,
    pub anomalies: Vec<StageId>,
    pub sweeps: u64,
}

pub struct CompletionDetector<'a> {
    store: &'a dyn ArtifactStore,
    layout: &'a Layout,
}

impl<'a> CompletionDetector<'a> {
    pub fn new(store: &'a dyn ArtifactStore, layout: &'a Layout) -> Self {
        Self { store, layout }
    }

    pub fn stage_status(&self, stage: &StageId) -> Result<StageStatus, OrchestratorError> {
        let pattern = ArtifactPattern::kind(ArtifactKind::ChunkLog)
            .target(&stage.target)
            .iteration(stage.iteration)
            .total_chunks(stage.total_chunks);
        let found = self
            .store
            .count(&self.layout.logs(&stage.target, stage.iteration), &pattern)?;
        let expected = stage.total_chunks as usize;
        Ok(match found {
            n if n == expected => StageStatus::Complete,
            n if n > expected => StageStatus::Overcount { found: n },
            n => StageStatus::Pending { found: n },
        })
    }

    pub fn is_stage_complete(
        &self,
        target: &TargetId,
        iteration: u32,
        total_chunks: u32,
    ) -> Result<bool, OrchestratorError> {
        let stage = StageId::new(target.clone(), iteration, total_chunks);
        Ok(self.stage_status(&stage)? == StageStatus::Complete)
    }

    /// Whether the mask step of `iteration` has written its verdict.
    pub fn is_mask_complete(
        &self,
        target: &TargetId,
        iteration: u32,
    ) -> Result<bool, OrchestratorError> {
        let done = self.store.exists(&self.layout.mask_verdict(target, iteration))?;
        if !done {
            debug!(target = %target, iteration, "Mask step still running");
        }
        Ok(done)
    }

    /// Sweep `pending` until every stage has completed, sleeping one
    /// interval between sweeps. No deadline.
    pub fn monitor(
        &self,
        pending: impl IntoIterator<Item = StageId>,
        timer: &PollTimer,
    ) -> Result<MonitorReport, OrchestratorError> {
        let mut pending: BTreeSet<StageId> = pending.into_iter().collect();
        let mut report = MonitorReport::default();
        info!(targets = pending.len(), "Monitoring stage completion");

        timer.poll_until(|sweep| -> Result<Tick<()>, OrchestratorError> {
            report.sweeps = sweep + 1;
            let mut finished = Vec::new();
            for stage in &pending {
                match self.stage_status(stage)? {
                    StageStatus::Complete => {
                        info!(target = %stage.target, iteration = stage.iteration, "Stage complete");
                        report.completed.push(stage.clone());
                        finished.push(stage.clone());
                    }
                    StageStatus::Overcount { found } => {
                        error!(
                            target = %stage.target,
                            iteration = stage.iteration,
                            expected = stage.total_chunks,
                            found,
                            "More completion logs than chunks"
                        );
                        report.anomalies.push(stage.clone());
                        finished.push(stage.clone());
                    }
                    StageStatus::Pending { found } => {
                        debug!(target = %stage.target, iteration = stage.iteration, found, "Stage pending");
                    }
                }
            }
            for stage in &finished {
                pending.remove(stage);
            }
            if pending.is_empty() {
                Ok(Tick::Ready(()))
            } else {
                info!(remaining = pending.len(), "Targets still running");
                Ok(Tick::Pending)
            }
        })?;
        Ok(report)
    }
}
