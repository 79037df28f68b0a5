//! Formatters for submissions, runs, recovery and waits.

use crate::artifact::StageId;
use crate::completion::MonitorReport;
use crate::driver::SubmitOutcome;
use crate::fanin::FanInOutcome;
use crate::pipeline::RunOutcome;
use crate::pool::RunReport;
use crate::recovery::Resubmitted;
use owo_colors::OwoColorize;

fn stage_label(stage: &StageId) -> String {
    format!("{} iter{} (N={})", stage.target, stage.iteration, stage.total_chunks)
}

pub fn format_submit_outcome(outcome: &SubmitOutcome) -> String {
    match outcome {
        SubmitOutcome::Submitted(stage) => format!("Submitted {}", stage_label(stage)),
        SubmitOutcome::AlreadySubmitted(stage) => {
            format!("Already submitted {}; nothing sent", stage_label(stage))
        }
    }
}

/// One line per target plus a tally. Returns the text and the number of runs
/// that did not finish cleanly.
pub fn format_run_reports(reports: &[RunReport], color: bool) -> (String, usize) {
    let mut lines = Vec::with_capacity(reports.len() + 1);
    let mut failed = 0;
    for report in reports {
        let (status, detail, ok) = match &report.result {
            Ok(outcome @ (RunOutcome::Completed { .. } | RunOutcome::Stopped { .. })) => {
                ("ok", outcome.to_string(), true)
            }
            Ok(outcome @ RunOutcome::Anomaly { .. }) => ("anomaly", outcome.to_string(), false),
            Ok(outcome @ RunOutcome::SubmitFailed { .. }) => ("failed", outcome.to_string(), false),
            Err(e) => ("error", e.to_string(), false),
        };
        if !ok {
            failed += 1;
        }
        let status = match (color, status) {
            (false, s) => s.to_string(),
            (true, "ok") => status.green().to_string(),
            (true, "anomaly") => status.yellow().to_string(),
            (true, s) => s.red().to_string(),
        };
        lines.push(format!("{:<8} {}: {}", status, report.target, detail));
    }
    lines.push(format!(
        "{} target(s): {} ok, {} not ok",
        reports.len(),
        reports.len() - failed,
        failed
    ));
    (lines.join("\n"), failed)
}

pub fn format_recovery(resubmitted: &[Resubmitted]) -> String {
    if resubmitted.is_empty() {
        return "No recovery artifacts to act on.".to_string();
    }
    let mut lines = vec![format!("Resubmitted {} stage(s):", resubmitted.len())];
    for r in resubmitted {
        lines.push(format!("  {} from {}", stage_label(&r.stage), r.artifact));
    }
    lines.join("\n")
}

pub fn format_fan_in_outcome(stage: &StageId, outcome: &FanInOutcome) -> String {
    match outcome {
        FanInOutcome::Transferred { count, destination } => format!(
            "Moved {} chunk output(s) for {} to {}",
            count,
            stage_label(stage),
            destination.display()
        ),
        FanInOutcome::AlreadyTransferred { destination } => format!(
            "Chunk outputs for {} already in {}",
            stage_label(stage),
            destination.display()
        ),
        FanInOutcome::Overcount { found } => format!(
            "Anomaly: {} chunk outputs for {}",
            found,
            stage_label(stage)
        ),
    }
}

pub fn format_monitor_report(report: &MonitorReport) -> String {
    let mut lines = vec![format!(
        "{} stage(s) complete after {} sweep(s)",
        report.completed.len(),
        report.sweeps
    )];
    for stage in &report.anomalies {
        lines.push(format!("  anomaly: {} has more logs than chunks", stage_label(stage)));
    }
    lines.join("\n")
}
