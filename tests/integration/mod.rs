//! Integration tests for the pblsflow orchestrator

mod admission_gate;
mod batch_input;
mod cli_commands;
mod completion_monitor;
mod end_to_end;
mod fan_in;
mod ledger_file;
mod recovery_monitor;
pub mod test_utils;
