//! In-process engine that records calls instead of running anything.
//!
//! Backs `--dry-run` and drives tests: queue depths can be scripted and
//! submissions can be made to fail.

use super::{ExecutionEngine, Resubmission, Submission};
use crate::error::EngineError;
use parking_lot::Mutex;
use std::collections::VecDeque;
use tracing::info;

/// One call observed by a [`RecordingEngine`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineCall {
    Submit(Submission),
    Resubmit(Resubmission),
    QueueDepth,
}

#[derive(Debug, Default)]
struct State {
    calls: Vec<EngineCall>,
    /// `None` entries simulate a failed query.
    depths: VecDeque<Option<u64>>,
    failing_submits: u32,
    failing_resubmits: u32,
}

#[derive(Debug, Default)]
pub struct RecordingEngine {
    state: Mutex<State>,
}

impl RecordingEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue depths returned by successive samples; once exhausted the depth is 0.
    pub fn with_depths(depths: impl IntoIterator<Item = Option<u64>>) -> Self {
        let engine = Self::default();
        engine.state.lock().depths = depths.into_iter().collect();
        engine
    }

    /// Make the next `count` submissions fail.
    pub fn fail_submits(&self, count: u32) {
        self.state.lock().failing_submits = count;
    }

    /// Make the next `count` resubmissions fail.
    pub fn fail_resubmits(&self, count: u32) {
        self.state.lock().failing_resubmits = count;
    }

    pub fn calls(&self) -> Vec<EngineCall> {
        self.state.lock().calls.clone()
    }

    pub fn submissions(&self) -> Vec<Submission> {
        self.state
            .lock()
            .calls
            .iter()
            .filter_map(|c| match c {
                EngineCall::Submit(s) => Some(s.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn resubmissions(&self) -> Vec<Resubmission> {
        self.state
            .lock()
            .calls
            .iter()
            .filter_map(|c| match c {
                EngineCall::Resubmit(r) => Some(r.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn depth_samples(&self) -> usize {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|c| matches!(c, EngineCall::QueueDepth))
            .count()
    }
}

impl ExecutionEngine for RecordingEngine {
    fn submit(&self, submission: &Submission) -> Result<(), EngineError> {
        let mut state = self.state.lock();
        state.calls.push(EngineCall::Submit(submission.clone()));
        if state.failing_submits > 0 {
            state.failing_submits -= 1;
            return Err(EngineError::Rejected(format!(
                "scripted failure for {}",
                submission.name
            )));
        }
        info!(name = %submission.name, graph = %submission.graph.display(), "Dry run: would submit graph");
        Ok(())
    }

    fn resubmit(&self, resubmission: &Resubmission) -> Result<(), EngineError> {
        let mut state = self.state.lock();
        state.calls.push(EngineCall::Resubmit(resubmission.clone()));
        if state.failing_resubmits > 0 {
            state.failing_resubmits -= 1;
            return Err(EngineError::Rejected(format!(
                "scripted failure for {}",
                resubmission.name
            )));
        }
        info!(name = %resubmission.name, rescue = %resubmission.rescue.display(), "Dry run: would resubmit graph");
        Ok(())
    }

    fn queue_depth(&self) -> Result<u64, EngineError> {
        let mut state = self.state.lock();
        state.calls.push(EngineCall::QueueDepth);
        match state.depths.pop_front() {
            Some(Some(depth)) => Ok(depth),
            Some(None) => Err(EngineError::UnparseableDepth(String::new())),
            None => Ok(0),
        }
    }
}
