//! Stacks the configuration sources and deserializes the result.

use super::merge::merge_policy;
use super::sources::{global_file, workspace_file};
use super::PblsflowConfig;
use crate::error::OrchestratorError;
use config::{Environment, File};
use std::path::Path;
use tracing::debug;

const ENV_PREFIX: &str = "PBLSFLOW";

pub struct ConfigLoader;

impl ConfigLoader {
    /// Defaults, then the global file, then `<workspace>/pblsflow.toml`, then
    /// `PBLSFLOW__SECTION__KEY` variables.
    pub fn load(workspace_root: &Path) -> Result<PblsflowConfig, OrchestratorError> {
        let builder = merge_policy::builder_with_defaults()?;
        let builder = global_file::add_to_builder(builder)?;
        let builder = workspace_file::add_to_builder(builder, workspace_root)?;
        let config = builder.add_source(environment()).build()?;
        let parsed: PblsflowConfig = config.try_deserialize()?;
        debug!(workspace = %workspace_root.display(), "Configuration loaded");
        parsed.validated()
    }

    /// Load from one explicit file. Environment variables still apply.
    pub fn load_from_file(path: &Path) -> Result<PblsflowConfig, OrchestratorError> {
        if !path.is_file() {
            return Err(OrchestratorError::Config(format!(
                "Config file not found: {}",
                path.display()
            )));
        }
        let config = merge_policy::builder_with_defaults()?
            .add_source(File::from(path))
            .add_source(environment())
            .build()?;
        let parsed: PblsflowConfig = config.try_deserialize()?;
        parsed.validated()
    }

    /// Write the defaults to `<workspace>/pblsflow.toml` unless it exists.
    /// Returns whether a file was written.
    pub fn write_default(workspace_root: &Path) -> Result<bool, OrchestratorError> {
        let path = workspace_file::workspace_config_path(workspace_root);
        if path.exists() {
            return Ok(false);
        }
        let text = PblsflowConfig::default_toml()?;
        std::fs::write(&path, text).map_err(|e| {
            OrchestratorError::Config(format!("Failed to write {}: {}", path.display(), e))
        })?;
        Ok(true)
    }
}

fn environment() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("__")
        .separator("__")
        .try_parsing(true)
        .list_separator(" ")
        .with_list_parse_key("engine.submit_command")
        .with_list_parse_key("engine.resubmit_command")
        .with_list_parse_key("engine.queue_depth_command")
}
