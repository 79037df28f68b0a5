//! CLI domain: parse, route, output, and presentation only.
//! No orchestration logic; a single route table dispatches to the components.

mod output;
mod parse;
mod presentation;
mod route;

pub use output::map_error;
pub use parse::{Cli, Commands, RunArgs, StageArgs};
pub use presentation::{format_ledger_json, format_ledger_text, format_run_reports};
pub use route::RunContext;
