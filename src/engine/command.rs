//! Engine driven through external command-line tools.

use super::{ExecutionEngine, Resubmission, Submission};
use crate::error::EngineError;
use serde::{Deserialize, Serialize};
use std::process::Command;
use tracing::{debug, info};

const DEPTH_MARKER: &str = "Total for query:";

/// Argv templates. `{graph}`, `{name}` and `{rescue}` are substituted per call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineCommands {
    #[serde(default = "default_submit")]
    pub submit_command: Vec<String>,
    #[serde(default = "default_resubmit")]
    pub resubmit_command: Vec<String>,
    #[serde(default = "default_queue_depth")]
    pub queue_depth_command: Vec<String>,
}

fn argv(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|s| s.to_string()).collect()
}

fn default_submit() -> Vec<String> {
    argv(&["condor_submit_dag", "-batch-name", "{name}", "{graph}"])
}

// The engine picks up the newest rescue file when the same graph is submitted again.
fn default_resubmit() -> Vec<String> {
    argv(&["condor_submit_dag", "-batch-name", "{name}", "{graph}"])
}

fn default_queue_depth() -> Vec<String> {
    argv(&["condor_q", "-totals"])
}

impl Default for EngineCommands {
    fn default() -> Self {
        Self {
            submit_command: default_submit(),
            resubmit_command: default_resubmit(),
            queue_depth_command: default_queue_depth(),
        }
    }
}

/// Runs the configured commands with `std::process::Command`.
#[derive(Debug, Clone, Default)]
pub struct CommandEngine {
    commands: EngineCommands,
}

impl CommandEngine {
    pub fn new(commands: EngineCommands) -> Self {
        Self { commands }
    }

    pub fn commands(&self) -> &EngineCommands {
        &self.commands
    }

    fn run(&self, template: &[String], vars: &[(&str, &str)]) -> Result<String, EngineError> {
        let args = expand(template, vars);
        let (program, rest) = args.split_first().ok_or(EngineError::EmptyCommand)?;
        debug!(program = %program, args = ?rest, "Running engine command");
        let output = Command::new(program)
            .args(rest)
            .output()
            .map_err(|source| EngineError::Spawn {
                program: program.clone(),
                source,
            })?;
        if !output.status.success() {
            return Err(EngineError::CommandFailed {
                program: program.clone(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl ExecutionEngine for CommandEngine {
    fn submit(&self, submission: &Submission) -> Result<(), EngineError> {
        let graph = submission.graph.to_string_lossy();
        self.run(
            &self.commands.submit_command,
            &[("{graph}", &graph), ("{name}", &submission.name)],
        )?;
        info!(name = %submission.name, graph = %graph, "Submitted graph");
        Ok(())
    }

    fn resubmit(&self, resubmission: &Resubmission) -> Result<(), EngineError> {
        let graph = resubmission.graph.to_string_lossy();
        let rescue = resubmission.rescue.to_string_lossy();
        self.run(
            &self.commands.resubmit_command,
            &[
                ("{graph}", &graph),
                ("{name}", &resubmission.name),
                ("{rescue}", &rescue),
            ],
        )?;
        info!(name = %resubmission.name, rescue = %rescue, "Resubmitted graph");
        Ok(())
    }

    fn queue_depth(&self) -> Result<u64, EngineError> {
        let stdout = self.run(&self.commands.queue_depth_command, &[])?;
        parse_queue_depth(&stdout)
    }
}

fn expand(template: &[String], vars: &[(&str, &str)]) -> Vec<String> {
    template
        .iter()
        .map(|arg| {
            vars.iter()
                .fold(arg.clone(), |acc, (key, value)| acc.replace(key, value))
        })
        .collect()
}

/// Extract the job count from queue-summary output.
///
/// Accepts either a `Total for query: <n> jobs; ...` line or output that is a
/// single integer.
pub fn parse_queue_depth(output: &str) -> Result<u64, EngineError> {
    for line in output.lines() {
        if let Some(rest) = line.trim().strip_prefix(DEPTH_MARKER) {
            if let Some(Ok(depth)) = rest.split_whitespace().next().map(str::parse::<u64>) {
                return Ok(depth);
            }
        }
    }
    output
        .trim()
        .parse::<u64>()
        .map_err(|_| EngineError::UnparseableDepth(output.trim().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_parses_query_totals_line() {
        let out = "\n-- Schedd: submit.example.org\n\
                   Total for query: 42 jobs; 0 completed, 0 removed, 40 idle, 2 running, 0 held, 0 suspended\n\
                   Total for all users: 900 jobs; ...\n";
        assert_eq!(parse_queue_depth(out).unwrap(), 42);
    }

    #[test]
    fn test_parses_bare_integer() {
        assert_eq!(parse_queue_depth(" 17\n").unwrap(), 17);
    }

    #[test]
    fn test_empty_or_garbage_output_is_unparseable() {
        assert!(matches!(
            parse_queue_depth(""),
            Err(EngineError::UnparseableDepth(_))
        ));
        assert!(matches!(
            parse_queue_depth("schedd unreachable"),
            Err(EngineError::UnparseableDepth(_))
        ));
    }

    #[test]
    fn test_expands_placeholders() {
        let template = argv(&["submit", "-batch-name", "{name}", "{graph}"]);
        let args = expand(&template, &[("{graph}", "g/T1_iter0_N4.dag"), ("{name}", "T1_iter0")]);
        assert_eq!(args, vec!["submit", "-batch-name", "T1_iter0", "g/T1_iter0_N4.dag"]);
    }

    #[test]
    fn test_empty_template_is_rejected() {
        let engine = CommandEngine::new(EngineCommands {
            submit_command: Vec::new(),
            ..EngineCommands::default()
        });
        let result = engine.submit(&Submission {
            graph: PathBuf::from("x.dag"),
            name: "x".into(),
        });
        assert!(matches!(result, Err(EngineError::EmptyCommand)));
    }

    #[cfg(unix)]
    #[test]
    fn test_failing_command_reports_status() {
        let engine = CommandEngine::new(EngineCommands {
            queue_depth_command: argv(&["false"]),
            ..EngineCommands::default()
        });
        assert!(matches!(
            engine.queue_depth(),
            Err(EngineError::CommandFailed { .. })
        ));
    }

    #[test]
    fn test_missing_program_is_spawn_error() {
        let engine = CommandEngine::new(EngineCommands {
            queue_depth_command: argv(&["pblsflow-no-such-program-xyz"]),
            ..EngineCommands::default()
        });
        assert!(matches!(engine.queue_depth(), Err(EngineError::Spawn { .. })));
    }
}
