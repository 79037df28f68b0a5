//! CLI parse: clap types for pblsflow. No behavior; definitions only.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// pblsflow - iterative periodogram search orchestration
#[derive(Parser, Debug)]
#[command(name = "pblsflow")]
#[command(about = "Submit, recover and collect iterative chunked periodogram searches")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Workspace root directory
    #[arg(long, global = true, default_value = ".")]
    pub workspace: PathBuf,

    /// Configuration file path (replaces the global and workspace files)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub verbose: bool,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Log format (text, json)
    #[arg(long, global = true)]
    pub log_format: Option<String>,

    /// Log output (stdout, stderr, file)
    #[arg(long, global = true)]
    pub log_output: Option<String>,

    /// Log file path (used with --log-output file)
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    /// Record engine calls instead of running the engine commands
    #[arg(long, global = true)]
    pub dry_run: bool,
}

/// Parameters fixed for the run of one target.
#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Target id
    #[arg(long)]
    pub target: String,

    /// Number of chunks the period grid is split into
    #[arg(long)]
    pub total_chunks: u32,

    /// Detection-significance threshold
    #[arg(long)]
    pub snr_threshold: f64,

    /// Upper bound on search iterations
    #[arg(long)]
    pub max_iterations: u32,
}

/// One stage of one target.
#[derive(Args, Debug, Clone)]
pub struct StageArgs {
    #[arg(long)]
    pub target: String,

    #[arg(long)]
    pub total_chunks: u32,

    #[arg(long, default_value = "0")]
    pub iteration: u32,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Write the default configuration to <workspace>/pblsflow.toml
    Init,
    /// Print the task graph for a target
    Generate {
        #[command(flatten)]
        run: RunArgs,
        /// Print only the slice for this iteration
        #[arg(long)]
        stage: Option<u32>,
        /// Print the graph fingerprint instead of the graph
        #[arg(long)]
        fingerprint: bool,
    },
    /// Print one `target,chunk,total` line per chunk
    Joblist {
        #[arg(long)]
        target: String,
        #[arg(long)]
        total_chunks: u32,
        /// Append the iteration as a fourth column
        #[arg(long)]
        iteration: Option<u32>,
    },
    /// Draw randomized injected-signal variants of a base target
    Inject {
        /// Base target id
        #[arg(long)]
        base: String,
        /// Number of variants to draw
        #[arg(long, default_value = "1")]
        count: u32,
        /// Seed for reproducible draws
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Rotate existing result/log directories and create fresh ones
    Prepare {
        /// Target ids
        #[arg(required = true)]
        targets: Vec<String>,
        #[arg(long)]
        max_iterations: u32,
    },
    /// Submit one stage of a target
    Submit {
        #[command(flatten)]
        run: RunArgs,
        #[arg(long, default_value = "0")]
        iteration: u32,
    },
    /// Run targets through every iteration
    Run {
        /// Batch file with one `target[,total_chunks]` per line
        #[arg(long, conflicts_with = "target")]
        batch: Option<PathBuf>,
        /// Single target id
        #[arg(long, required_unless_present = "batch")]
        target: Option<String>,
        #[arg(long)]
        total_chunks: Option<u32>,
        #[arg(long)]
        snr_threshold: f64,
        #[arg(long)]
        max_iterations: u32,
        /// Concurrent target runs (defaults to pool.workers)
        #[arg(long)]
        workers: Option<usize>,
    },
    /// Resubmit failed work from recovery artifacts
    Recover {
        /// Target ids (defaults to every target in the ledger)
        targets: Vec<String>,
        /// Single scan instead of sweeping until quiet
        #[arg(long)]
        once: bool,
    },
    /// Wait for a stage's chunk outputs and move them to the archive
    AwaitChunks {
        #[command(flatten)]
        stage: StageArgs,
    },
    /// Wait until stages have a completion log for every chunk
    Monitor {
        /// Target ids
        #[arg(required = true)]
        targets: Vec<String>,
        #[arg(long)]
        total_chunks: u32,
        #[arg(long, default_value = "0")]
        iteration: u32,
    },
    /// Show the submission ledger
    Ledger {
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
}
