//! Iteration policies: whether a target goes on to its next search iteration.
//!
//! `max_iterations` is always the hard bound; a policy may only stop earlier.

use crate::error::{OrchestratorError, StoreError};
use crate::layout::Layout;
use crate::store::ArtifactStore;
use crate::types::{RunParams, TargetId};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Continue,
    Stop,
    /// Evidence not available yet; ask again later.
    Pending,
}

/// Everything a policy may look at for one decision.
pub struct DecisionContext<'a> {
    pub store: &'a dyn ArtifactStore,
    pub layout: &'a Layout,
    pub target: &'a TargetId,
    pub params: &'a RunParams,
    /// The iteration that just finished.
    pub iteration: u32,
}

pub trait IterationPolicy: Send + Sync {
    fn name(&self) -> &'static str;

    fn decide(&self, ctx: &DecisionContext<'_>) -> Result<Decision, OrchestratorError>;
}

/// Continue until `max_iterations`.
#[derive(Debug, Clone, Copy, Default)]
pub struct MaxIterations;

impl IterationPolicy for MaxIterations {
    fn name(&self) -> &'static str {
        "max-iterations"
    }

    fn decide(&self, _ctx: &DecisionContext<'_>) -> Result<Decision, OrchestratorError> {
        Ok(Decision::Continue)
    }
}

/// Continue while the mask stage's verdict (`<target>_mask_iter<i>.snr`, the
/// highest SNR it saw) exceeds the run's threshold.
#[derive(Debug, Clone, Copy, Default)]
pub struct SnrVerdict;

impl IterationPolicy for SnrVerdict {
    fn name(&self) -> &'static str {
        "snr-verdict"
    }

    fn decide(&self, ctx: &DecisionContext<'_>) -> Result<Decision, OrchestratorError> {
        let path = ctx.layout.mask_verdict(ctx.target, ctx.iteration);
        let bytes = match ctx.store.read(&path) {
            Ok(bytes) => bytes,
            Err(StoreError::NotFound(_)) => {
                debug!(target = %ctx.target, iteration = ctx.iteration, "Mask verdict not written yet");
                return Ok(Decision::Pending);
            }
            Err(e) => return Err(e.into()),
        };
        let content = String::from_utf8_lossy(&bytes).trim().to_string();
        let snr: f64 = content
            .split_whitespace()
            .next()
            .and_then(|token| token.parse().ok())
            .filter(|snr: &f64| !snr.is_nan())
            .ok_or_else(|| OrchestratorError::MalformedVerdict {
                path: path.clone(),
                content: content.clone(),
            })?;
        let threshold = ctx.params.snr_threshold;
        if snr > threshold {
            info!(target = %ctx.target, iteration = ctx.iteration, snr, threshold, "Peak above threshold; masking and searching again");
            Ok(Decision::Continue)
        } else {
            info!(target = %ctx.target, iteration = ctx.iteration, snr, threshold, "No significant peak left; stopping");
            Ok(Decision::Stop)
        }
    }
}

/// Configurable policy selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PolicyKind {
    #[default]
    MaxIterations,
    SnrVerdict,
}

impl PolicyKind {
    pub fn build(self) -> Box<dyn IterationPolicy> {
        match self {
            PolicyKind::MaxIterations => Box::new(MaxIterations),
            PolicyKind::SnrVerdict => Box::new(SnrVerdict),
        }
    }
}
