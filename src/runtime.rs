//! Shared handles for one orchestrator instance.
//!
//! Everything a component touches outside its own state: the artifact store,
//! the ledger, the engine, the clock, and the tunables. All handles are `Arc`s,
//! so a `Runtime` is cheap to clone into worker threads.

use crate::admission::AdmissionGate;
use crate::clock::{Clock, PollTimer};
use crate::engine::ExecutionEngine;
use crate::graph::SubmitFiles;
use crate::layout::Layout;
use crate::ledger::Ledger;
use crate::store::ArtifactStore;
use std::sync::Arc;
use std::time::Duration;

/// Intervals, caps and limits.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub admission_cap: u64,
    pub admission_poll: Duration,
    pub inter_submission_delay: Duration,
    pub fan_in_poll: Duration,
    pub completion_poll: Duration,
    pub sweep_interval: Duration,
    pub max_resubmit_attempts: u32,
    pub submit_files: SubmitFiles,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            admission_cap: 10_000,
            admission_poll: Duration::from_secs(30),
            inter_submission_delay: Duration::from_secs(5),
            fan_in_poll: Duration::from_secs(60),
            completion_poll: Duration::from_secs(300),
            sweep_interval: Duration::from_secs(60),
            max_resubmit_attempts: 3,
            submit_files: SubmitFiles::default(),
        }
    }
}

#[derive(Clone)]
pub struct Runtime {
    pub store: Arc<dyn ArtifactStore>,
    pub ledger: Arc<Ledger>,
    pub engine: Arc<dyn ExecutionEngine>,
    pub clock: Arc<dyn Clock>,
    pub layout: Layout,
    pub settings: Settings,
}

impl Runtime {
    pub fn timer(&self, interval: Duration) -> PollTimer {
        PollTimer::new(self.clock.clone(), interval)
    }

    pub fn gate(&self) -> AdmissionGate<'_> {
        AdmissionGate::new(
            self.engine.as_ref(),
            self.timer(self.settings.admission_poll),
        )
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("ledger", &self.ledger.path())
            .field("layout", &self.layout)
            .field("settings", &self.settings)
            .finish()
    }
}
