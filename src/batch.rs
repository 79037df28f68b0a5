//! Batch input: one target per line, optionally with a shared chunk count.
//!
//! ```text
//! # target[,total_chunks]
//! kplr006184894,200
//! kplr010000009,200
//! ```
//!
//! Every line must agree with the first on the shared field (present or
//! absent, and the same value). The whole batch is validated before any
//! submission, so an inconsistent file submits nothing.

use crate::error::OrchestratorError;
use crate::pool::RunRequest;
use crate::types::{RunParams, TargetId};
use std::collections::BTreeSet;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchEntry {
    /// 1-based line number in the input.
    pub line: usize,
    pub target: TargetId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    pub entries: Vec<BatchEntry>,
    /// Chunk count shared by every line, when the input carries one.
    pub total_chunks: Option<u32>,
}

impl Batch {
    pub fn parse(input: &str) -> Result<Self, OrchestratorError> {
        let mut entries = Vec::new();
        let mut seen = BTreeSet::new();
        let mut shared: Option<Option<u32>> = None;

        for (index, raw) in input.lines().enumerate() {
            let line = index + 1;
            let text = raw.trim();
            if text.is_empty() || text.starts_with('#') {
                continue;
            }
            let inconsistent = |reason: String| OrchestratorError::InconsistentBatch { line, reason };

            let fields: Vec<&str> = text.split(',').map(str::trim).collect();
            if fields.len() > 2 {
                return Err(inconsistent(format!(
                    "expected `target[,total_chunks]`, found {} fields",
                    fields.len()
                )));
            }
            let target = TargetId::new(fields[0]).map_err(|e| inconsistent(e.to_string()))?;
            let total_chunks = match fields.get(1) {
                Some(raw_total) => Some(
                    raw_total
                        .parse::<u32>()
                        .ok()
                        .filter(|n| *n >= 1)
                        .ok_or_else(|| inconsistent(format!("invalid total_chunks {raw_total:?}")))?,
                ),
                None => None,
            };

            match shared {
                None => shared = Some(total_chunks),
                Some(expected) if expected != total_chunks => {
                    return Err(inconsistent(format!(
                        "total_chunks {} differs from the first line's {}",
                        describe(total_chunks),
                        describe(expected)
                    )));
                }
                Some(_) => {}
            }
            if !seen.insert(target.clone()) {
                return Err(inconsistent(format!("target {target} listed twice")));
            }
            entries.push(BatchEntry { line, target });
        }

        Ok(Self {
            entries,
            total_chunks: shared.flatten(),
        })
    }

    pub fn read(path: &Path) -> Result<Self, OrchestratorError> {
        let content = std::fs::read_to_string(path).map_err(crate::error::StoreError::from)?;
        Self::parse(&content)
    }

    /// Run requests for every entry.
    ///
    /// The chunk count comes from the batch or from `total_chunks`; when both
    /// are given they must agree.
    pub fn requests(
        &self,
        total_chunks: Option<u32>,
        snr_threshold: f64,
        max_iterations: u32,
    ) -> Result<Vec<RunRequest>, OrchestratorError> {
        let total = match (self.total_chunks, total_chunks) {
            (Some(batch), Some(given)) if batch != given => {
                return Err(OrchestratorError::InconsistentBatch {
                    line: self.entries.first().map_or(0, |e| e.line),
                    reason: format!("batch total_chunks {batch} differs from --total-chunks {given}"),
                });
            }
            (Some(n), _) | (None, Some(n)) => n,
            (None, None) => {
                return Err(OrchestratorError::InvalidParameters(
                    "total_chunks is required when the batch does not carry it".to_string(),
                ))
            }
        };
        let params = RunParams::new(total, snr_threshold, max_iterations)?;
        Ok(self
            .entries
            .iter()
            .map(|e| RunRequest {
                target: e.target.clone(),
                params,
            })
            .collect())
    }
}

fn describe(total: Option<u32>) -> String {
    total.map_or_else(|| "(absent)".to_string(), |n| n.to_string())
}
