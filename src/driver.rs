//! Submission Driver
//!
//! generate graph → write graph artifact → admission gate → submit → ledger.
//!
//! Submission failures are surfaced to the caller and never retried here;
//! retries happen through recovery artifacts once the engine produces them.

use crate::artifact::StageId;
use crate::engine::Submission;
use crate::error::OrchestratorError;
use crate::graph::TaskGraph;
use crate::runtime::Runtime;
use crate::types::{RunParams, TargetId};
use std::path::PathBuf;
use tracing::{error, info};

/// What a submission request did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    Submitted(StageId),
    /// The ledger already records this stage; nothing was sent.
    AlreadySubmitted(StageId),
}

impl SubmitOutcome {
    pub fn stage(&self) -> &StageId {
        match self {
            SubmitOutcome::Submitted(stage) | SubmitOutcome::AlreadySubmitted(stage) => stage,
        }
    }
}

pub struct SubmissionDriver<'a> {
    rt: &'a Runtime,
}

impl<'a> SubmissionDriver<'a> {
    pub fn new(rt: &'a Runtime) -> Self {
        Self { rt }
    }

    /// Submit the first stage of `target`'s run.
    pub fn submit(
        &self,
        target: &TargetId,
        params: &RunParams,
    ) -> Result<SubmitOutcome, OrchestratorError> {
        self.submit_iteration(target, params, 0)
    }

    /// Submit stage `iteration`, unless the ledger says it already was.
    pub fn submit_iteration(
        &self,
        target: &TargetId,
        params: &RunParams,
        iteration: u32,
    ) -> Result<SubmitOutcome, OrchestratorError> {
        params.validate()?;
        let stage = StageId::new(target.clone(), iteration, params.total_chunks);

        if let Some(record) = self.rt.ledger.get(target)? {
            if record.params.total_chunks != params.total_chunks {
                return Err(OrchestratorError::ChunkCountMismatch {
                    target: target.to_string(),
                    expected: record.params.total_chunks,
                    found: params.total_chunks,
                });
            }
            if record.stage_submitted(iteration) {
                info!(target = %target, iteration, "Stage already submitted; skipping");
                return Ok(SubmitOutcome::AlreadySubmitted(stage));
            }
        }

        let graph = self.write_stage_graph(&stage, params)?;

        self.rt.gate().wait_for_capacity(self.rt.settings.admission_cap);

        let submission = Submission {
            graph,
            name: format!("{}_iter{}", target, iteration),
        };
        let result = self.rt.engine.submit(&submission);
        let submitted_at = self.rt.clock.now();
        self.rt.clock.sleep(self.rt.settings.inter_submission_delay);

        if let Err(source) = result {
            error!(target = %target, iteration, error = %source, "Submission failed");
            return Err(OrchestratorError::Submission {
                target: target.to_string(),
                source,
            });
        }

        self.rt.ledger.append_first(target, params, submitted_at)?;
        self.rt.ledger.record_stage(target, iteration, submitted_at)?;
        info!(
            target = %target,
            iteration,
            total_chunks = params.total_chunks,
            "Submitted stage"
        );
        Ok(SubmitOutcome::Submitted(stage))
    }

    /// Render and write the stage graph, then confirm it is in place.
    pub fn write_stage_graph(
        &self,
        stage: &StageId,
        params: &RunParams,
    ) -> Result<PathBuf, OrchestratorError> {
        let graph = TaskGraph::for_run(&stage.target, params).stage(stage.iteration)?;
        let path = self.rt.layout.stage_graph(stage);
        let rendered = graph.render(&self.rt.settings.submit_files);
        self.rt.store.write_atomic(&path, rendered.as_bytes())?;
        if !self.rt.store.exists(&path)? {
            return Err(OrchestratorError::MissingArtifact(path));
        }
        Ok(path)
    }
}
