//! Configuration System
//!
//! Layered configuration, lowest to highest precedence: built-in defaults,
//! the global file, the workspace `pblsflow.toml`, `PBLSFLOW__SECTION__KEY`
//! environment variables. An explicit `--config FILE` replaces both files.

use crate::engine::EngineCommands;
use crate::error::OrchestratorError;
use crate::graph::SubmitFiles;
use crate::layout::Layout;
use crate::logging::LoggingConfig;
use crate::policy::PolicyKind;
use crate::runtime::Settings;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

mod loader;
mod merge {
    pub mod merge_policy;
}
mod sources {
    pub mod global_file;
    pub mod workspace_file;
}

pub use loader::ConfigLoader;
pub use sources::global_file::global_config_path;
pub use sources::workspace_file::{workspace_config_path, WORKSPACE_CONFIG_FILE};

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PblsflowConfig {
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub admission: AdmissionConfig,
    #[serde(default)]
    pub submission: SubmissionConfig,
    #[serde(default)]
    pub fan_in: FanInConfig,
    #[serde(default)]
    pub completion: CompletionConfig,
    #[serde(default)]
    pub recovery: RecoveryConfig,
    #[serde(default)]
    pub pool: PoolConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    /// Submit descriptions referenced by rendered graphs
    #[serde(default)]
    pub graph: SubmitFiles,
    #[serde(default)]
    pub policy: PolicyConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Directory layout and ledger location. Relative paths resolve against the
/// workspace root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathsConfig {
    #[serde(default = "default_receiving_dir")]
    pub receiving_dir: PathBuf,
    #[serde(default = "default_archive_dir")]
    pub archive_dir: PathBuf,
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
    #[serde(default = "default_graph_dir")]
    pub graph_dir: PathBuf,
    #[serde(default = "default_ledger_path")]
    pub ledger_path: PathBuf,
}

fn default_receiving_dir() -> PathBuf {
    PathBuf::from("results")
}

fn default_archive_dir() -> PathBuf {
    PathBuf::from("archive")
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}

fn default_graph_dir() -> PathBuf {
    PathBuf::from("graphs")
}

fn default_ledger_path() -> PathBuf {
    PathBuf::from("pblsflow_ledger.psv")
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            receiving_dir: default_receiving_dir(),
            archive_dir: default_archive_dir(),
            log_dir: default_log_dir(),
            graph_dir: default_graph_dir(),
            ledger_path: default_ledger_path(),
        }
    }
}

impl PathsConfig {
    pub fn layout(&self, workspace_root: &Path) -> Layout {
        Layout {
            receiving_dir: resolve(workspace_root, &self.receiving_dir),
            archive_dir: resolve(workspace_root, &self.archive_dir),
            log_dir: resolve(workspace_root, &self.log_dir),
            graph_dir: resolve(workspace_root, &self.graph_dir),
        }
    }

    pub fn ledger(&self, workspace_root: &Path) -> PathBuf {
        resolve(workspace_root, &self.ledger_path)
    }
}

fn resolve(root: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdmissionConfig {
    /// Queue depth at or above which submissions wait
    #[serde(default = "default_cap")]
    pub cap: u64,
    #[serde(default = "default_admission_poll")]
    pub poll_interval_secs: u64,
}

fn default_cap() -> u64 {
    10_000
}

fn default_admission_poll() -> u64 {
    30
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            cap: default_cap(),
            poll_interval_secs: default_admission_poll(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionConfig {
    #[serde(default = "default_inter_submission_delay")]
    pub inter_submission_delay_secs: u64,
}

fn default_inter_submission_delay() -> u64 {
    5
}

impl Default for SubmissionConfig {
    fn default() -> Self {
        Self {
            inter_submission_delay_secs: default_inter_submission_delay(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FanInConfig {
    #[serde(default = "default_fan_in_poll")]
    pub poll_interval_secs: u64,
}

fn default_fan_in_poll() -> u64 {
    60
}

impl Default for FanInConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_fan_in_poll(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionConfig {
    #[serde(default = "default_completion_poll")]
    pub poll_interval_secs: u64,
}

fn default_completion_poll() -> u64 {
    300
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_completion_poll(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryConfig {
    /// Failed resubmissions of one recovery artifact before it is abandoned
    #[serde(default = "default_max_resubmit_attempts")]
    pub max_resubmit_attempts: u32,
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

fn default_max_resubmit_attempts() -> u32 {
    3
}

fn default_sweep_interval() -> u64 {
    60
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            max_resubmit_attempts: default_max_resubmit_attempts(),
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolConfig {
    #[serde(default = "default_workers")]
    pub workers: usize,
}

fn default_workers() -> usize {
    4
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EngineKind {
    #[default]
    Command,
    DryRun,
}

/// Which engine the CLI builds, and the argv templates for `command`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub kind: EngineKind,
    #[serde(default = "default_submit_command")]
    pub submit_command: Vec<String>,
    #[serde(default = "default_resubmit_command")]
    pub resubmit_command: Vec<String>,
    #[serde(default = "default_queue_depth_command")]
    pub queue_depth_command: Vec<String>,
}

fn default_submit_command() -> Vec<String> {
    EngineCommands::default().submit_command
}

fn default_resubmit_command() -> Vec<String> {
    EngineCommands::default().resubmit_command
}

fn default_queue_depth_command() -> Vec<String> {
    EngineCommands::default().queue_depth_command
}

impl Default for EngineConfig {
    fn default() -> Self {
        let commands = EngineCommands::default();
        Self {
            kind: EngineKind::default(),
            submit_command: commands.submit_command,
            resubmit_command: commands.resubmit_command,
            queue_depth_command: commands.queue_depth_command,
        }
    }
}

impl EngineConfig {
    pub fn commands(&self) -> EngineCommands {
        EngineCommands {
            submit_command: self.submit_command.clone(),
            resubmit_command: self.resubmit_command.clone(),
            queue_depth_command: self.queue_depth_command.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PolicyConfig {
    #[serde(default)]
    pub kind: PolicyKind,
}

/// Configuration validation errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub section: &'static str,
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.section, self.message)
    }
}

impl std::error::Error for ValidationError {}

impl PblsflowConfig {
    /// Validate the entire configuration, reporting every problem.
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();
        let mut check = |ok: bool, section: &'static str, message: &str| {
            if !ok {
                errors.push(ValidationError {
                    section,
                    message: message.to_string(),
                });
            }
        };

        for (name, path) in [
            ("receiving_dir", &self.paths.receiving_dir),
            ("archive_dir", &self.paths.archive_dir),
            ("log_dir", &self.paths.log_dir),
            ("graph_dir", &self.paths.graph_dir),
            ("ledger_path", &self.paths.ledger_path),
        ] {
            check(
                !path.as_os_str().is_empty(),
                "paths",
                &format!("{} cannot be empty", name),
            );
        }
        check(self.admission.cap >= 1, "admission", "cap must be at least 1");
        check(
            self.admission.poll_interval_secs >= 1,
            "admission",
            "poll_interval_secs must be at least 1",
        );
        check(
            self.fan_in.poll_interval_secs >= 1,
            "fan_in",
            "poll_interval_secs must be at least 1",
        );
        check(
            self.completion.poll_interval_secs >= 1,
            "completion",
            "poll_interval_secs must be at least 1",
        );
        check(
            self.recovery.max_resubmit_attempts >= 1,
            "recovery",
            "max_resubmit_attempts must be at least 1",
        );
        check(
            self.recovery.sweep_interval_secs >= 1,
            "recovery",
            "sweep_interval_secs must be at least 1",
        );
        check(self.pool.workers >= 1, "pool", "workers must be at least 1");
        if self.engine.kind == EngineKind::Command {
            let engine = &self.engine;
            check(
                !engine.submit_command.is_empty(),
                "engine",
                "submit_command cannot be empty",
            );
            check(
                !engine.resubmit_command.is_empty(),
                "engine",
                "resubmit_command cannot be empty",
            );
            check(
                !engine.queue_depth_command.is_empty(),
                "engine",
                "queue_depth_command cannot be empty",
            );
        }
        for (kind, file) in [
            ("search", &self.graph.search),
            ("merge", &self.graph.merge),
            ("postprocess", &self.graph.postprocess),
            ("mask", &self.graph.mask),
        ] {
            check(
                !file.trim().is_empty(),
                "graph",
                &format!("{} submit file cannot be empty", kind),
            );
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Validate, folding every problem into one error.
    pub fn validated(self) -> Result<Self, OrchestratorError> {
        self.validate().map_err(|errors| {
            let msgs: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
            OrchestratorError::Config(format!(
                "Configuration validation failed:\n{}",
                msgs.join("\n")
            ))
        })?;
        Ok(self)
    }

    pub fn settings(&self) -> Settings {
        Settings {
            admission_cap: self.admission.cap,
            admission_poll: Duration::from_secs(self.admission.poll_interval_secs),
            inter_submission_delay: Duration::from_secs(
                self.submission.inter_submission_delay_secs,
            ),
            fan_in_poll: Duration::from_secs(self.fan_in.poll_interval_secs),
            completion_poll: Duration::from_secs(self.completion.poll_interval_secs),
            sweep_interval: Duration::from_secs(self.recovery.sweep_interval_secs),
            max_resubmit_attempts: self.recovery.max_resubmit_attempts,
            submit_files: self.graph.clone(),
        }
    }

    /// The default configuration as TOML, for `pblsflow init`.
    pub fn default_toml() -> Result<String, OrchestratorError> {
        toml::to_string_pretty(&PblsflowConfig::default())
            .map_err(|e| OrchestratorError::Config(format!("Failed to render defaults: {}", e)))
    }
}
