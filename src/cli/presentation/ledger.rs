//! Ledger formatters.

use crate::error::OrchestratorError;
use crate::ledger::SubmissionRecord;
use comfy_table::Table;

pub fn format_ledger_text(records: &[SubmissionRecord]) -> String {
    if records.is_empty() {
        return "Ledger is empty.".to_string();
    }
    let mut table = Table::new();
    table.load_preset(comfy_table::presets::UTF8_FULL);
    table.set_header(vec![
        "Target",
        "Chunks",
        "SNR",
        "Max Iter",
        "First Submission",
        "Resubmissions",
        "Stages",
    ]);
    for r in records {
        let stages: Vec<String> = r.stages.iter().map(|s| s.iteration.to_string()).collect();
        table.add_row(vec![
            r.target.to_string(),
            r.params.total_chunks.to_string(),
            r.params.snr_threshold.to_string(),
            r.params.max_iterations.to_string(),
            r.first_submission.to_rfc3339(),
            r.resubmissions.len().to_string(),
            if stages.is_empty() {
                "-".to_string()
            } else {
                stages.join(",")
            },
        ]);
    }
    table.to_string()
}

pub fn format_ledger_json(records: &[SubmissionRecord]) -> Result<String, OrchestratorError> {
    serde_json::to_string_pretty(records)
        .map_err(|e| OrchestratorError::Config(format!("Failed to encode ledger: {}", e)))
}
