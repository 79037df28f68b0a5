//! CLI presentation: text and json formatters per command family.

mod ledger;
mod run;

pub use ledger::{format_ledger_json, format_ledger_text};
pub use run::{
    format_fan_in_outcome, format_monitor_report, format_recovery, format_run_reports,
    format_submit_outcome,
};
