//! Execution Engine
//!
//! Narrow interface to the external DAG execution engine and its queue
//! service: submit a graph description, resubmit a partially failed graph
//! from its recovery artifact, and sample the global queue depth.

pub mod command;
pub mod recording;

pub use command::{CommandEngine, EngineCommands};
pub use recording::{EngineCall, RecordingEngine};

use crate::error::EngineError;
use std::path::PathBuf;

/// A graph handed to the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    /// Path of the rendered graph description.
    pub graph: PathBuf,
    /// Identifying batch name, `<target>_iter<i>`.
    pub name: String,
}

/// Resubmission of a partially failed graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resubmission {
    /// The graph the recovery artifact belongs to.
    pub graph: PathBuf,
    /// The recovery artifact being acted on.
    pub rescue: PathBuf,
    pub name: String,
}

/// Execution engine interface
///
/// Every error is transient from the orchestrator's point of view.
pub trait ExecutionEngine: Send + Sync {
    fn submit(&self, submission: &Submission) -> Result<(), EngineError>;

    fn resubmit(&self, resubmission: &Resubmission) -> Result<(), EngineError>;

    /// Total in-flight jobs for the operating identity.
    fn queue_depth(&self) -> Result<u64, EngineError>;
}
