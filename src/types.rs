//! Core value types shared across the orchestrator.

use crate::error::{NameError, OrchestratorError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identifier of one subject of analysis.
///
/// Restricted to ASCII alphanumerics and `_ - . +` so the id can be embedded
/// in artifact names and ledger rows without quoting.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TargetId(String);

impl TargetId {
    pub fn new(id: impl Into<String>) -> Result<Self, NameError> {
        let id = id.into();
        let valid = !id.is_empty()
            && id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | '+'));
        if valid {
            Ok(Self(id))
        } else {
            Err(NameError::InvalidTargetId(id))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for TargetId {
    type Err = NameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for TargetId {
    type Error = NameError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<TargetId> for String {
    fn from(id: TargetId) -> Self {
        id.0
    }
}

/// Parameters fixed for the whole run of one target.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RunParams {
    /// Number of chunks the period grid is split into. Identical for every
    /// iteration of a target.
    pub total_chunks: u32,
    /// Detection-significance threshold handed to merge/mask stages.
    pub snr_threshold: f64,
    /// Hard upper bound on search iterations.
    pub max_iterations: u32,
}

impl RunParams {
    pub fn new(
        total_chunks: u32,
        snr_threshold: f64,
        max_iterations: u32,
    ) -> Result<Self, OrchestratorError> {
        let params = Self {
            total_chunks,
            snr_threshold,
            max_iterations,
        };
        params.validate()?;
        Ok(params)
    }

    pub fn validate(&self) -> Result<(), OrchestratorError> {
        if self.total_chunks < 1 {
            return Err(OrchestratorError::InvalidParameters(
                "total_chunks must be at least 1".to_string(),
            ));
        }
        if self.max_iterations < 1 {
            return Err(OrchestratorError::InvalidParameters(
                "max_iterations must be at least 1".to_string(),
            ));
        }
        if !self.snr_threshold.is_finite() {
            return Err(OrchestratorError::InvalidParameters(format!(
                "snr_threshold must be finite, got {}",
                self.snr_threshold
            )));
        }
        Ok(())
    }
}

/// One unit of parallel work.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChunkId {
    pub target: TargetId,
    pub iteration: u32,
    pub chunk_index: u32,
    pub total_chunks: u32,
}

impl ChunkId {
    pub fn new(
        target: TargetId,
        iteration: u32,
        chunk_index: u32,
        total_chunks: u32,
    ) -> Result<Self, OrchestratorError> {
        if chunk_index >= total_chunks {
            return Err(OrchestratorError::InvalidParameters(format!(
                "chunk index {} out of range for {} chunks",
                chunk_index, total_chunks
            )));
        }
        Ok(Self {
            target,
            iteration,
            chunk_index,
            total_chunks,
        })
    }

    /// Checks that this chunk belongs to a run using `expected_total` chunks.
    pub fn check_total(&self, expected_total: u32) -> Result<(), OrchestratorError> {
        if self.total_chunks != expected_total {
            return Err(OrchestratorError::ChunkCountMismatch {
                target: self.target.to_string(),
                expected: expected_total,
                found: self.total_chunks,
            });
        }
        Ok(())
    }
}
