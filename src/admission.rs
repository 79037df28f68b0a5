//! Admission Gate
//!
//! Backpressure against the shared scheduler: block until the sampled queue
//! depth drops below the cap. A failed sample counts as zero so an
//! observability outage never stalls or aborts the pipeline.

use crate::clock::{PollTimer, Tick};
use crate::engine::ExecutionEngine;
use std::convert::Infallible;
use tracing::{debug, info, warn};

pub struct AdmissionGate<'a> {
    engine: &'a dyn ExecutionEngine,
    timer: PollTimer,
}

impl<'a> AdmissionGate<'a> {
    pub fn new(engine: &'a dyn ExecutionEngine, timer: PollTimer) -> Self {
        Self { engine, timer }
    }

    /// One depth sample; errors read as 0.
    pub fn sample(&self) -> u64 {
        match self.engine.queue_depth() {
            Ok(depth) => depth,
            Err(e) => {
                warn!(error = %e, "Queue depth query failed; treating depth as 0");
                0
            }
        }
    }

    /// Block until a sample is strictly below `cap`. Returns that sample.
    /// Unbounded: there is no deadline.
    pub fn wait_for_capacity(&self, cap: u64) -> u64 {
        let result: Result<u64, Infallible> = self.timer.poll_until(|attempt| {
            let depth = self.sample();
            if depth < cap {
                if attempt > 0 {
                    info!(depth, cap, waited_polls = attempt, "Queue below admission cap");
                }
                Ok(Tick::Ready(depth))
            } else {
                debug!(depth, cap, "Queue at or above admission cap");
                Ok(Tick::Pending)
            }
        });
        match result {
            Ok(depth) => depth,
            Err(never) => match never {},
        }
    }
}
