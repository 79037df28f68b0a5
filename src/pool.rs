//! Worker pool running independent per-target pipelines.
//!
//! Workers pull requests from a shared queue and each drives its own
//! [`TargetRun`]. Runs share nothing in memory except the runtime handles;
//! they coordinate only through the artifact store and the ledger.

use crate::error::OrchestratorError;
use crate::pipeline::{RunOutcome, TargetRun};
use crate::policy::IterationPolicy;
use crate::runtime::Runtime;
use crate::types::{RunParams, TargetId};
use parking_lot::Mutex;
use std::collections::VecDeque;
use tracing::{debug, error, info};

/// One target to run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunRequest {
    pub target: TargetId,
    pub params: RunParams,
}

/// Result of one target's run, in request order.
#[derive(Debug)]
pub struct RunReport {
    pub target: TargetId,
    pub result: Result<RunOutcome, OrchestratorError>,
}

pub struct WorkerPool<'a> {
    rt: &'a Runtime,
    policy: &'a dyn IterationPolicy,
    workers: usize,
}

impl<'a> WorkerPool<'a> {
    pub fn new(rt: &'a Runtime, policy: &'a dyn IterationPolicy, workers: usize) -> Self {
        Self {
            rt,
            policy,
            workers: workers.max(1),
        }
    }

    /// Run every request to completion. A fatal error in one run is reported
    /// for that target and does not stop the others.
    pub fn run_all(&self, requests: Vec<RunRequest>) -> Vec<RunReport> {
        let total = requests.len();
        let targets: Vec<TargetId> = requests.iter().map(|r| r.target.clone()).collect();
        let queue: Mutex<VecDeque<(usize, RunRequest)>> =
            Mutex::new(requests.into_iter().enumerate().collect());
        let results: Mutex<Vec<Option<RunReport>>> = Mutex::new((0..total).map(|_| None).collect());
        let workers = self.workers.min(total.max(1));
        info!(targets = total, workers, "Starting worker pool");

        std::thread::scope(|scope| {
            let handles: Vec<_> = (0..workers)
                .map(|worker| {
                    let queue = &queue;
                    let results = &results;
                    scope.spawn(move || loop {
                        let Some((index, request)) = queue.lock().pop_front() else {
                            debug!(worker, "Worker idle; exiting");
                            break;
                        };
                        let target = request.target.clone();
                        let result = TargetRun::new(self.rt, self.policy, request.target, request.params)
                            .and_then(TargetRun::run);
                        if let Err(e) = &result {
                            error!(worker, target = %target, error = %e, "Target run failed");
                        }
                        results.lock()[index] = Some(RunReport { target, result });
                    })
                })
                .collect();
            for handle in handles {
                if handle.join().is_err() {
                    error!("Worker thread panicked");
                }
            }
        });

        results
            .into_inner()
            .into_iter()
            .zip(targets)
            .map(|(slot, target)| {
                slot.unwrap_or_else(|| RunReport {
                    result: Err(OrchestratorError::WorkerPanicked(target.to_string())),
                    target,
                })
            })
            .collect()
    }
}
