//! Error types for the pblsflow orchestrator.
//!
//! Errors are layered: each component has its own enum and everything folds
//! into [`OrchestratorError`], which knows whether a failure is fatal or
//! should be retried on the next poll.

use std::path::PathBuf;
use thiserror::Error;

/// Malformed artifact or node names.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NameError {
    #[error("Invalid target id {0:?}: must be non-empty ASCII alphanumerics or one of `_-.+`")]
    InvalidTargetId(String),

    #[error("Unrecognized artifact name: {0}")]
    Unrecognized(String),

    #[error("Malformed {field} in artifact name {name}")]
    MalformedField { name: String, field: &'static str },

    #[error("Chunk index {chunk} out of range for {total} chunks in {name}")]
    ChunkOutOfRange { name: String, chunk: u32, total: u32 },

    #[error("Invalid injection suffix in {0}")]
    InvalidInjection(String),
}

/// Artifact store errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Artifact not found: {0:?}")]
    NotFound(PathBuf),

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Store I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Submission ledger errors
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Ledger schema mismatch in {path:?}: found header {found:?}")]
    SchemaMismatch { path: PathBuf, found: String },

    #[error("Malformed ledger row at line {line}: {reason}")]
    MalformedRow { line: usize, reason: String },

    #[error("No first-submission record for target {0}")]
    NotSubmitted(String),

    #[error("Timed out waiting for ledger lock {path:?}")]
    LockTimeout { path: PathBuf },

    #[error("Ledger I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Execution engine errors. All of these are transient from the
/// orchestrator's point of view.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Command {program} exited with {status}: {stderr}")]
    CommandFailed {
        program: String,
        status: String,
        stderr: String,
    },

    #[error("Could not parse queue depth from output: {0:?}")]
    UnparseableDepth(String),

    #[error("Engine command template is empty")]
    EmptyCommand,

    #[error("Engine rejected submission: {0}")]
    Rejected(String),
}

/// Top-level orchestrator error.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("Generated graph artifact missing: {0:?}")]
    MissingArtifact(PathBuf),

    #[error("Inconsistent batch input at line {line}: {reason}")]
    InconsistentBatch { line: usize, reason: String },

    #[error("Chunk count mismatch for {target}: run uses {expected}, artifact says {found}")]
    ChunkCountMismatch {
        target: String,
        expected: u32,
        found: u32,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Malformed mask verdict {path:?}: {content:?}")]
    MalformedVerdict { path: PathBuf, content: String },

    #[error("Submission failed for {target}: {source}")]
    Submission {
        target: String,
        #[source]
        source: EngineError,
    },

    #[error("Worker for {0} panicked")]
    WorkerPanicked(String),

    #[error("{summary}\n{failed} of {total} target run(s) did not finish cleanly")]
    RunsFailed {
        summary: String,
        failed: usize,
        total: usize,
    },

    #[error(transparent)]
    Name(#[from] NameError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Engine(#[from] EngineError),
}

impl OrchestratorError {
    /// Fatal errors abort the run with a nonzero exit. Everything else is
    /// logged and retried on the next poll or scan.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            OrchestratorError::Submission { .. } | OrchestratorError::Engine(_)
        )
    }
}

impl From<config::ConfigError> for OrchestratorError {
    fn from(err: config::ConfigError) -> Self {
        OrchestratorError::Config(err.to_string())
    }
}
