//! Per-target iterative pipeline.
//!
//! A [`TargetRun`] drives one target through
//! `Submit(i) → AwaitChunks(i) → Decide(i) → Submit(i+1) … → Done`.
//! `Decide(i)` first waits for iteration i's mask step to finish, since the
//! next search reads its masked output; only then does the policy choose.
//! Every wait tick first scans the target's recovery artifacts, so a
//! partially failed stage is resubmitted before the run polls again.
//! Restarting a run is safe: submitted stages and acted-on recovery
//! artifacts are read back from the ledger, and already archived outputs
//! count as a finished fan-in.

use crate::artifact::StageId;
use crate::clock::Tick;
use crate::completion::CompletionDetector;
use crate::driver::SubmissionDriver;
use crate::error::OrchestratorError;
use crate::fanin::{FanInAggregator, FanInOutcome};
use crate::policy::{Decision, DecisionContext, IterationPolicy};
use crate::recovery::RecoveryMonitor;
use crate::runtime::Runtime;
use crate::types::{RunParams, TargetId};
use serde::Serialize;
use std::fmt;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Submit(u32),
    AwaitChunks(u32),
    Decide(u32),
    Done,
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RunOutcome {
    /// Every iteration up to `max_iterations` ran.
    Completed { iterations: u32 },
    /// The policy stopped after `iteration`.
    Stopped { iteration: u32 },
    /// More chunk outputs than chunks; the target is abandoned.
    Anomaly { iteration: u32, count: usize },
    /// The engine refused a submission. Nothing was recorded for the stage.
    SubmitFailed { iteration: u32, reason: String },
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunOutcome::Completed { iterations } => write!(f, "completed {iterations} iteration(s)"),
            RunOutcome::Stopped { iteration } => write!(f, "stopped after iteration {iteration}"),
            RunOutcome::Anomaly { iteration, count } => {
                write!(f, "anomaly in iteration {iteration}: {count} chunk outputs")
            }
            RunOutcome::SubmitFailed { iteration, reason } => {
                write!(f, "submission of iteration {iteration} failed: {reason}")
            }
        }
    }
}

pub struct TargetRun<'a> {
    rt: &'a Runtime,
    policy: &'a dyn IterationPolicy,
    target: TargetId,
    params: RunParams,
    phase: Phase,
    recovery: RecoveryMonitor<'a>,
}

impl<'a> TargetRun<'a> {
    pub fn new(
        rt: &'a Runtime,
        policy: &'a dyn IterationPolicy,
        target: TargetId,
        params: RunParams,
    ) -> Result<Self, OrchestratorError> {
        params.validate()?;
        Ok(Self {
            rt,
            policy,
            target,
            params,
            phase: Phase::Submit(0),
            recovery: RecoveryMonitor::new(rt),
        })
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn target(&self) -> &TargetId {
        &self.target
    }

    /// Run to completion.
    pub fn run(mut self) -> Result<RunOutcome, OrchestratorError> {
        info!(
            target = %self.target,
            total_chunks = self.params.total_chunks,
            max_iterations = self.params.max_iterations,
            policy = self.policy.name(),
            "Starting target run"
        );
        loop {
            if let Some(outcome) = self.step()? {
                info!(target = %self.target, outcome = %outcome, "Target run finished");
                return Ok(outcome);
            }
        }
    }

    /// Advance one phase. Returns the outcome once the run is over.
    pub fn step(&mut self) -> Result<Option<RunOutcome>, OrchestratorError> {
        match self.phase {
            Phase::Submit(iteration) => self.submit(iteration),
            Phase::AwaitChunks(iteration) => self.await_chunks(iteration),
            Phase::Decide(iteration) => self.decide(iteration),
            Phase::Done => Ok(None),
        }
    }

    fn stage(&self, iteration: u32) -> StageId {
        StageId::new(self.target.clone(), iteration, self.params.total_chunks)
    }

    fn recover(&mut self) -> Result<(), OrchestratorError> {
        self.recovery.scan(std::slice::from_ref(&self.target))?;
        Ok(())
    }

    fn submit(&mut self, iteration: u32) -> Result<Option<RunOutcome>, OrchestratorError> {
        self.recover()?;
        match SubmissionDriver::new(self.rt).submit_iteration(&self.target, &self.params, iteration) {
            Ok(_) => {
                self.phase = Phase::AwaitChunks(iteration);
                Ok(None)
            }
            Err(e) if !e.is_fatal() => {
                warn!(target = %self.target, iteration, error = %e, "Giving up on target");
                self.phase = Phase::Done;
                Ok(Some(RunOutcome::SubmitFailed {
                    iteration,
                    reason: e.to_string(),
                }))
            }
            Err(e) => Err(e),
        }
    }

    fn await_chunks(&mut self, iteration: u32) -> Result<Option<RunOutcome>, OrchestratorError> {
        let stage = self.stage(iteration);
        let timer = self.rt.timer(self.rt.settings.fan_in_poll);
        let fan_in = FanInAggregator::new(self.rt);
        let recovery = &mut self.recovery;
        let tracked = std::slice::from_ref(&self.target);
        let outcome = timer.poll_until(|_| -> Result<Tick<FanInOutcome>, OrchestratorError> {
            recovery.scan(tracked)?;
            fan_in.poll_once(&stage)
        })?;

        match outcome {
            FanInOutcome::Transferred { .. } | FanInOutcome::AlreadyTransferred { .. } => {
                self.phase = Phase::Decide(iteration);
                Ok(None)
            }
            FanInOutcome::Overcount { found } => {
                error!(target = %self.target, iteration, found, "Abandoning target after overcount");
                self.phase = Phase::Done;
                Ok(Some(RunOutcome::Anomaly {
                    iteration,
                    count: found,
                }))
            }
        }
    }

    fn decide(&mut self, iteration: u32) -> Result<Option<RunOutcome>, OrchestratorError> {
        let rt = self.rt;
        let timer = rt.timer(rt.settings.fan_in_poll);
        let recovery = &mut self.recovery;
        let target = &self.target;
        let tracked = std::slice::from_ref(target);
        let detector = CompletionDetector::new(rt.store.as_ref(), &rt.layout);
        timer.poll_until(|_| -> Result<Tick<()>, OrchestratorError> {
            recovery.scan(tracked)?;
            Ok(if detector.is_mask_complete(target, iteration)? {
                Tick::Ready(())
            } else {
                Tick::Pending
            })
        })?;

        let next = iteration + 1;
        if next >= self.params.max_iterations {
            self.phase = Phase::Done;
            return Ok(Some(RunOutcome::Completed { iterations: next }));
        }

        let ctx = DecisionContext {
            store: rt.store.as_ref(),
            layout: &rt.layout,
            target,
            params: &self.params,
            iteration,
        };
        let policy = self.policy;
        let decision = timer.poll_until(|_| -> Result<Tick<Decision>, OrchestratorError> {
            recovery.scan(tracked)?;
            Ok(match policy.decide(&ctx)? {
                Decision::Pending => Tick::Pending,
                decided => Tick::Ready(decided),
            })
        })?;

        match decision {
            Decision::Stop => {
                self.phase = Phase::Done;
                Ok(Some(RunOutcome::Stopped { iteration }))
            }
            _ => {
                info!(target = %self.target, next_iteration = next, "Advancing to next iteration");
                self.phase = Phase::Submit(next);
                Ok(None)
            }
        }
    }
}
