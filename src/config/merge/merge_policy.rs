//! Merge rules: built-in defaults first, every later source overrides.

use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError};

/// Create a Config builder with the built-in defaults applied.
pub fn builder_with_defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    Config::builder()
        .set_default("paths.receiving_dir", "results")?
        .set_default("paths.archive_dir", "archive")?
        .set_default("paths.log_dir", "logs")?
        .set_default("paths.graph_dir", "graphs")?
        .set_default("paths.ledger_path", "pblsflow_ledger.psv")?
        .set_default("admission.cap", 10_000_i64)?
        .set_default("admission.poll_interval_secs", 30_i64)?
        .set_default("submission.inter_submission_delay_secs", 5_i64)?
        .set_default("fan_in.poll_interval_secs", 60_i64)?
        .set_default("completion.poll_interval_secs", 300_i64)?
        .set_default("recovery.max_resubmit_attempts", 3_i64)?
        .set_default("recovery.sweep_interval_secs", 60_i64)?
        .set_default("pool.workers", 4_i64)
}
