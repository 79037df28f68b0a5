//! Shared fixtures for integration tests
//!
//! A [`Harness`] is a runtime over a real filesystem tree in a temp dir, with
//! a recording engine and a manual clock so nothing actually sleeps.

use pblsflow::clock::{Clock, ManualClock};
use pblsflow::engine::RecordingEngine;
use pblsflow::layout::Layout;
use pblsflow::ledger::Ledger;
use pblsflow::runtime::{Runtime, Settings};
use pblsflow::store::FsArtifactStore;
use pblsflow::types::{RunParams, TargetId};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

pub struct Harness {
    pub dir: TempDir,
    pub rt: Runtime,
    pub engine: Arc<RecordingEngine>,
    pub clock: Arc<ManualClock>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_engine(RecordingEngine::new())
    }

    pub fn with_engine(engine: RecordingEngine) -> Self {
        let dir = TempDir::new().unwrap();
        let engine = Arc::new(engine);
        let clock = Arc::new(ManualClock::default());
        let rt = Runtime {
            store: Arc::new(FsArtifactStore::new()),
            ledger: Arc::new(Ledger::open(dir.path().join("ledger.psv")).unwrap()),
            engine: engine.clone(),
            clock: clock.clone(),
            layout: Layout::under(dir.path()),
            settings: Settings::default(),
        };
        Self {
            dir,
            rt,
            engine,
            clock,
        }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// Drop a chunk output into the receiving directory.
    pub fn put_output(&self, target: &str, chunk: u32, total: u32, iteration: u32) -> PathBuf {
        put_output_at(&self.rt.layout, target, chunk, total, iteration)
    }

    /// Drop a completion log into the iteration's log directory.
    pub fn put_log(&self, target: &str, chunk: u32, total: u32, iteration: u32) -> PathBuf {
        let dir = self.rt.layout.logs(&t(target), iteration);
        write(&dir, &format!("{target}_{chunk}_{total}_iter{iteration}.log"))
    }

    /// Write the mask step's verdict for an iteration.
    pub fn put_verdict(&self, target: &str, iteration: u32, snr: &str) -> PathBuf {
        put_verdict_at(&self.rt.layout, target, iteration, snr)
    }

    /// Drop a recovery artifact next to the stage graph.
    pub fn put_rescue(&self, target: &str, iteration: u32, total: u32, sequence: u32) -> PathBuf {
        let dir = self.rt.layout.graphs(&t(target));
        write(
            &dir,
            &format!("{target}_iter{iteration}_N{total}.dag.rescue{sequence:03}"),
        )
    }

    /// Record a first submission so the target counts as tracked.
    pub fn track(&self, target: &str, params: &RunParams) {
        self.rt
            .ledger
            .append_first(&t(target), params, self.rt.clock.now())
            .unwrap();
    }
}

pub fn put_output_at(
    layout: &Layout,
    target: &str,
    chunk: u32,
    total: u32,
    iteration: u32,
) -> PathBuf {
    let dir = layout.receiving(&t(target));
    write(
        &dir,
        &format!("joboutput_{target}_{chunk}_{total}_iter{iteration}.tar.gz"),
    )
}

pub fn put_verdict_at(layout: &Layout, target: &str, iteration: u32, snr: &str) -> PathBuf {
    let path = layout.mask_verdict(&t(target), iteration);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, snr).unwrap();
    path
}

fn write(dir: &Path, name: &str) -> PathBuf {
    std::fs::create_dir_all(dir).unwrap();
    let path = dir.join(name);
    std::fs::write(&path, name.as_bytes()).unwrap();
    path
}

pub fn t(id: &str) -> TargetId {
    TargetId::new(id).unwrap()
}

pub fn params(total_chunks: u32, max_iterations: u32) -> RunParams {
    RunParams::new(total_chunks, 7.0, max_iterations).unwrap()
}

/// File names directly inside `dir`, sorted.
pub fn names_in(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = match std::fs::read_dir(dir) {
        Ok(entries) => entries
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect(),
        Err(_) => Vec::new(),
    };
    names.sort();
    names
}
