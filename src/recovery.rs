//! Recovery Monitor
//!
//! Watches for the engine's numbered recovery artifacts
//! (`<target>_iter<i>_N<n>.dag.rescue<NNN>`) and resubmits the stage graph
//! they belong to. Per target only the highest-numbered artifact is
//! actionable; lower ones are superseded.
//!
//! An artifact is acted on at most once. Before resubmitting, a monitor
//! claims the artifact in the ledger; a claim that is already taken means
//! another instance owns it, and the artifact is skipped. A failed
//! resubmission gives the claim back so a later scan retries it, up to
//! `max_resubmit_attempts`, after which the artifact is abandoned and the
//! claim kept. Only tracked targets with a ledger row are considered.

use crate::artifact::{ArtifactId, ArtifactKind, ArtifactPattern, StageId};
use crate::clock::{PollTimer, Tick};
use crate::engine::Resubmission;
use crate::error::OrchestratorError;
use crate::runtime::Runtime;
use crate::types::TargetId;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, error, info, warn};

/// In-memory bookkeeping owned by one monitor. Durable state lives in the ledger.
#[derive(Debug, Clone, Default)]
pub struct RecoveryState {
    seen: BTreeSet<String>,
    attempts: BTreeMap<String, u32>,
}

impl RecoveryState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_seen(&self, artifact: &str) -> bool {
        self.seen.contains(artifact)
    }

    pub fn attempts(&self, artifact: &str) -> u32 {
        self.attempts.get(artifact).copied().unwrap_or(0)
    }
}

/// An artifact acted on during a scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resubmitted {
    pub stage: StageId,
    pub sequence: u32,
    pub artifact: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanReport {
    pub resubmitted: Vec<Resubmitted>,
    /// Failed this scan; will be retried.
    pub failed: Vec<String>,
    /// Failed too often; marked and dropped.
    pub abandoned: Vec<String>,
}

impl ScanReport {
    /// Unseen artifacts encountered by the scan.
    pub fn new_artifacts(&self) -> usize {
        self.resubmitted.len() + self.failed.len() + self.abandoned.len()
    }
}

pub struct RecoveryMonitor<'a> {
    rt: &'a Runtime,
    state: RecoveryState,
}

impl<'a> RecoveryMonitor<'a> {
    pub fn new(rt: &'a Runtime) -> Self {
        Self::with_state(rt, RecoveryState::new())
    }

    pub fn with_state(rt: &'a Runtime, state: RecoveryState) -> Self {
        Self { rt, state }
    }

    pub fn state(&self) -> &RecoveryState {
        &self.state
    }

    pub fn into_state(self) -> RecoveryState {
        self.state
    }

    /// One pass over `tracked`.
    pub fn scan(&mut self, tracked: &[TargetId]) -> Result<ScanReport, OrchestratorError> {
        let mut report = ScanReport::default();
        for target in tracked {
            self.scan_target(target, &mut report)?;
        }
        Ok(report)
    }

    fn scan_target(
        &mut self,
        target: &TargetId,
        report: &mut ScanReport,
    ) -> Result<(), OrchestratorError> {
        let Some(record) = self.rt.ledger.get(target)? else {
            debug!(target = %target, "Target not in ledger; not recovering");
            return Ok(());
        };
        let dir = self.rt.layout.graphs(target);
        let pattern = ArtifactPattern::kind(ArtifactKind::Recovery).target(target);
        let latest = self
            .rt
            .store
            .list(&dir, &pattern)?
            .into_iter()
            .filter_map(|id| match id {
                ArtifactId::Recovery { stage, sequence } => Some((stage, sequence)),
                _ => None,
            })
            .max_by_key(|(stage, sequence)| (stage.iteration, *sequence));
        let Some((stage, sequence)) = latest else {
            return Ok(());
        };

        let artifact = ArtifactId::Recovery {
            stage: stage.clone(),
            sequence,
        }
        .name();
        if self.state.is_seen(&artifact) || record.has_acted_on(&artifact) {
            self.state.seen.insert(artifact);
            return Ok(());
        }
        if stage.total_chunks != record.params.total_chunks {
            return Err(OrchestratorError::ChunkCountMismatch {
                target: target.to_string(),
                expected: record.params.total_chunks,
                found: stage.total_chunks,
            });
        }

        if !self.rt.ledger.mark_acted(target, &artifact)? {
            debug!(target = %target, artifact = %artifact, "Recovery artifact claimed elsewhere");
            self.state.seen.insert(artifact);
            return Ok(());
        }

        let resubmission = Resubmission {
            graph: self.rt.layout.stage_graph(&stage),
            rescue: dir.join(&artifact),
            name: format!("{}_iter{}", target, stage.iteration),
        };
        match self.rt.engine.resubmit(&resubmission) {
            Ok(()) => {
                self.state.seen.insert(artifact.clone());
                self.rt.ledger.append_resubmission(target, self.rt.clock.now())?;
                info!(
                    target = %target,
                    iteration = stage.iteration,
                    sequence,
                    "Resubmitted from recovery artifact"
                );
                report.resubmitted.push(Resubmitted {
                    stage,
                    sequence,
                    artifact,
                });
            }
            Err(e) => {
                let attempts = {
                    let count = self.state.attempts.entry(artifact.clone()).or_insert(0);
                    *count += 1;
                    *count
                };
                let limit = self.rt.settings.max_resubmit_attempts;
                if attempts >= limit {
                    error!(
                        target = %target,
                        artifact = %artifact,
                        attempts,
                        error = %e,
                        "Giving up on recovery artifact"
                    );
                    self.state.seen.insert(artifact.clone());
                    report.abandoned.push(artifact);
                } else {
                    warn!(
                        target = %target,
                        artifact = %artifact,
                        attempts,
                        error = %e,
                        "Resubmission failed; will retry next scan"
                    );
                    self.rt.ledger.release_acted(target, &artifact)?;
                    report.failed.push(artifact);
                }
            }
        }
        Ok(())
    }

    /// Scan repeatedly until a pass finds no new artifacts. Returns every
    /// successful resubmission.
    pub fn sweep(
        &mut self,
        tracked: &[TargetId],
        timer: &PollTimer,
    ) -> Result<Vec<Resubmitted>, OrchestratorError> {
        let mut resubmitted = Vec::new();
        timer.poll_until(|pass| -> Result<Tick<()>, OrchestratorError> {
            let report = self.scan(tracked)?;
            let new = report.new_artifacts();
            resubmitted.extend(report.resubmitted);
            if new == 0 {
                info!(passes = pass + 1, resubmitted = resubmitted.len(), "Recovery sweep finished");
                Ok(Tick::Ready(()))
            } else {
                debug!(pass, new, "Recovery sweep pass found new artifacts");
                Ok(Tick::Pending)
            }
        })?;
        Ok(resubmitted)
    }
}
