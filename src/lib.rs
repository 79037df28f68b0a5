//! pblsflow: iterative periodogram search orchestration
//!
//! Drives chunked, multi-iteration PBLS searches on a shared execution grid:
//! generates per-target task graphs, submits them under a queue-depth cap,
//! resubmits failed work from recovery artifacts, and collects chunk outputs
//! once every chunk of an iteration has landed.

pub mod admission;
pub mod artifact;
pub mod batch;
pub mod cli;
pub mod clock;
pub mod completion;
pub mod config;
pub mod driver;
pub mod engine;
pub mod error;
pub mod fanin;
pub mod graph;
pub mod layout;
pub mod ledger;
pub mod logging;
pub mod pipeline;
pub mod policy;
pub mod pool;
pub mod recovery;
pub mod runtime;
pub mod store;
pub mod target;
pub mod types;
