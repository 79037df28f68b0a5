//! CLI output: error mapping from domain errors to stable CLI surface.

use crate::error::OrchestratorError;

/// Map domain errors to the text printed on stderr.
pub fn map_error(e: &OrchestratorError) -> String {
    match e {
        OrchestratorError::RunsFailed { .. } => e.to_string(),
        _ => format!("Error: {}", e),
    }
}
