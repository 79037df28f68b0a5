//! Submission Ledger
//!
//! Durable, append-only record of what this orchestrator has submitted. One
//! pipe-delimited row per target:
//!
//! ```text
//! #pblsflow-ledger-v1|target_id|total_chunks|snr_threshold|max_iterations|first_submission|resubmissions|stages|acted_artifacts
//! T1|4|7|2|2025-01-01T00:00:00Z|2025-01-01T01:00:00Z|0@2025-01-01T00:00:00Z|T1_iter0_N4.dag.rescue001
//! ```
//!
//! Missing trailing columns read as empty. Every write reads the whole file
//! and replaces it through a per-writer temp file + rename, so a crash leaves
//! either the old or the new version on disk. Each read-modify-write holds the
//! in-process mutex and the `<ledger>.lock` sidecar file, so instances sharing
//! one ledger never lose each other's rows. A lock older than
//! [`LOCK_STALE_AFTER`] is treated as left behind by a dead writer.

use crate::error::LedgerError;
use crate::types::{RunParams, TargetId};
use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::{Mutex, MutexGuard};
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

const SCHEMA_TAG: &str = "#pblsflow-ledger-v";
const SCHEMA_VERSION: u32 = 1;
const COLUMNS: &str = "target_id|total_chunks|snr_threshold|max_iterations|first_submission|resubmissions|stages|acted_artifacts";
const REQUIRED_COLUMNS: usize = 5;

/// Age after which a lock file is considered abandoned.
pub const LOCK_STALE_AFTER: Duration = Duration::from_secs(60);
const LOCK_WAIT: Duration = Duration::from_secs(120);
const LOCK_BACKOFF_BASE: Duration = Duration::from_millis(5);
const LOCK_BACKOFF_MAX: Duration = Duration::from_millis(200);

static TEMP_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// A stage (iteration) submission timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageSubmission {
    pub iteration: u32,
    pub at: DateTime<Utc>,
}

/// One ledger row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionRecord {
    pub target: TargetId,
    pub params: RunParams,
    pub first_submission: DateTime<Utc>,
    pub resubmissions: Vec<DateTime<Utc>>,
    pub stages: Vec<StageSubmission>,
    /// Recovery artifacts already acted on; never acted on again.
    pub acted_artifacts: Vec<String>,
}

impl SubmissionRecord {
    pub fn stage_submitted(&self, iteration: u32) -> bool {
        self.stages.iter().any(|s| s.iteration == iteration)
    }

    pub fn has_acted_on(&self, artifact: &str) -> bool {
        self.acted_artifacts.iter().any(|a| a == artifact)
    }
}

/// File-backed submission ledger.
#[derive(Debug)]
pub struct Ledger {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl Ledger {
    /// Open the ledger at `path`, creating it with a header on first use.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, LedgerError> {
        let ledger = Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        };
        {
            let _guard = ledger.lock()?;
            if ledger.path.exists() && fs::metadata(&ledger.path)?.len() > 0 {
                ledger.load()?;
            } else {
                ledger.save(&[])?;
                info!(path = %ledger.path.display(), "Created submission ledger");
            }
        }
        Ok(ledger)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn records(&self) -> Result<Vec<SubmissionRecord>, LedgerError> {
        self.load()
    }

    pub fn get(&self, target: &TargetId) -> Result<Option<SubmissionRecord>, LedgerError> {
        Ok(self.load()?.into_iter().find(|r| &r.target == target))
    }

    /// Record the first submission of `target`. A no-op returning `false`
    /// when a row for `target` already exists.
    pub fn append_first(
        &self,
        target: &TargetId,
        params: &RunParams,
        at: DateTime<Utc>,
    ) -> Result<bool, LedgerError> {
        let _guard = self.lock()?;
        let mut records = self.load()?;
        if records.iter().any(|r| &r.target == target) {
            debug!(target = %target, "First submission already recorded");
            return Ok(false);
        }
        records.push(SubmissionRecord {
            target: target.clone(),
            params: *params,
            first_submission: at,
            resubmissions: Vec::new(),
            stages: Vec::new(),
            acted_artifacts: Vec::new(),
        });
        self.save(&records)?;
        Ok(true)
    }

    /// Append a resubmission timestamp. The first submission must already be
    /// recorded.
    pub fn append_resubmission(
        &self,
        target: &TargetId,
        at: DateTime<Utc>,
    ) -> Result<(), LedgerError> {
        self.update(target, |record| {
            record.resubmissions.push(at);
            true
        })
        .map(|_| ())
    }

    /// Record that stage `iteration` was submitted. Returns `false` when it
    /// already was.
    pub fn record_stage(
        &self,
        target: &TargetId,
        iteration: u32,
        at: DateTime<Utc>,
    ) -> Result<bool, LedgerError> {
        self.update(target, |record| {
            if record.stage_submitted(iteration) {
                return false;
            }
            record.stages.push(StageSubmission { iteration, at });
            true
        })
    }

    /// Mark a recovery artifact as acted on. Returns `false` when it already
    /// was, which makes this the claim every instance races for.
    pub fn mark_acted(&self, target: &TargetId, artifact: &str) -> Result<bool, LedgerError> {
        self.update(target, |record| {
            if record.has_acted_on(artifact) {
                return false;
            }
            record.acted_artifacts.push(artifact.to_string());
            true
        })
    }

    /// Give back a claim taken with [`Ledger::mark_acted`]. Returns `false`
    /// when the artifact was not marked.
    pub fn release_acted(&self, target: &TargetId, artifact: &str) -> Result<bool, LedgerError> {
        self.update(target, |record| {
            let before = record.acted_artifacts.len();
            record.acted_artifacts.retain(|a| a != artifact);
            record.acted_artifacts.len() != before
        })
    }

    fn update(
        &self,
        target: &TargetId,
        change: impl FnOnce(&mut SubmissionRecord) -> bool,
    ) -> Result<bool, LedgerError> {
        let _guard = self.lock()?;
        let mut records = self.load()?;
        let record = records
            .iter_mut()
            .find(|r| &r.target == target)
            .ok_or_else(|| LedgerError::NotSubmitted(target.to_string()))?;
        if !change(record) {
            return Ok(false);
        }
        self.save(&records)?;
        Ok(true)
    }

    fn lock(&self) -> Result<WriteGuard<'_>, LedgerError> {
        let local = self.write_lock.lock();
        ensure_parent(&self.path)?;
        let file = LockFile::acquire(sibling(&self.path, ".lock"))?;
        Ok(WriteGuard {
            _file: file,
            _local: local,
        })
    }

    fn load(&self) -> Result<Vec<SubmissionRecord>, LedgerError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut lines = content.lines().enumerate();
        match lines.next() {
            Some((_, header)) => check_header(&self.path, header)?,
            None => return Ok(Vec::new()),
        }
        let mut records = Vec::new();
        for (index, line) in lines {
            if line.trim().is_empty() {
                continue;
            }
            records.push(parse_row(index + 1, line)?);
        }
        Ok(records)
    }

    fn save(&self, records: &[SubmissionRecord]) -> Result<(), LedgerError> {
        ensure_parent(&self.path)?;
        let mut content = format!("{SCHEMA_TAG}{SCHEMA_VERSION}|{COLUMNS}\n");
        for record in records {
            content.push_str(&format_row(record));
            content.push('\n');
        }

        let temp_path = sibling(
            &self.path,
            &format!(
                ".{}.{}.tmp",
                std::process::id(),
                TEMP_SEQUENCE.fetch_add(1, Ordering::Relaxed)
            ),
        );
        {
            let mut file = fs::File::create(&temp_path)?;
            file.write_all(content.as_bytes())?;
            file.sync_all()?;
        }
        fs::rename(&temp_path, &self.path).map_err(|e| {
            let _ = fs::remove_file(&temp_path);
            LedgerError::Io(e)
        })
    }
}

/// Held for the duration of one read-modify-write. The file lock is
/// released before the in-process one.
struct WriteGuard<'a> {
    _file: LockFile,
    _local: MutexGuard<'a, ()>,
}

/// Exclusive sidecar lock file, removed on drop.
#[derive(Debug)]
struct LockFile {
    path: PathBuf,
}

impl LockFile {
    fn acquire(path: PathBuf) -> Result<Self, LedgerError> {
        let started = Instant::now();
        let mut backoff = LOCK_BACKOFF_BASE;
        loop {
            match fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
            {
                Ok(mut file) => {
                    let _ = writeln!(
                        file,
                        "pid={} acquired_at={}",
                        std::process::id(),
                        format_time(&Utc::now())
                    );
                    return Ok(Self { path });
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    if lock_is_stale(&path) {
                        warn!(path = %path.display(), "Removing stale ledger lock");
                        let _ = fs::remove_file(&path);
                        continue;
                    }
                    if started.elapsed() >= LOCK_WAIT {
                        return Err(LedgerError::LockTimeout { path });
                    }
                    std::thread::sleep(backoff);
                    backoff = (backoff * 2).min(LOCK_BACKOFF_MAX);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

impl Drop for LockFile {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

fn lock_is_stale(path: &Path) -> bool {
    fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|modified| modified.elapsed().ok())
        .is_some_and(|age| age > LOCK_STALE_AFTER)
}

/// `path` with `suffix` appended to its file name.
fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| OsString::from("ledger"));
    name.push(suffix);
    path.with_file_name(name)
}

fn ensure_parent(path: &Path) -> Result<(), LedgerError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

fn check_header(path: &Path, header: &str) -> Result<(), LedgerError> {
    let mismatch = || LedgerError::SchemaMismatch {
        path: path.to_path_buf(),
        found: header.to_string(),
    };
    let version = header
        .strip_prefix(SCHEMA_TAG)
        .and_then(|rest| rest.split('|').next())
        .and_then(|v| v.parse::<u32>().ok())
        .ok_or_else(mismatch)?;
    if version != SCHEMA_VERSION {
        return Err(mismatch());
    }
    Ok(())
}

fn format_time(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn parse_time(line: usize, raw: &str) -> Result<DateTime<Utc>, LedgerError> {
    DateTime::parse_from_rfc3339(raw.trim())
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| LedgerError::MalformedRow {
            line,
            reason: format!("bad timestamp {raw:?}: {e}"),
        })
}

fn format_row(record: &SubmissionRecord) -> String {
    let resubmissions: Vec<String> = record.resubmissions.iter().map(format_time).collect();
    let stages: Vec<String> = record
        .stages
        .iter()
        .map(|s| format!("{}@{}", s.iteration, format_time(&s.at)))
        .collect();
    [
        record.target.to_string(),
        record.params.total_chunks.to_string(),
        record.params.snr_threshold.to_string(),
        record.params.max_iterations.to_string(),
        format_time(&record.first_submission),
        resubmissions.join(","),
        stages.join(","),
        record.acted_artifacts.join(","),
    ]
    .join("|")
}

fn parse_row(line: usize, raw: &str) -> Result<SubmissionRecord, LedgerError> {
    let malformed = |reason: String| LedgerError::MalformedRow { line, reason };
    let columns: Vec<&str> = raw.split('|').collect();
    if columns.len() < REQUIRED_COLUMNS {
        return Err(malformed(format!(
            "expected at least {REQUIRED_COLUMNS} columns, found {}",
            columns.len()
        )));
    }
    let column = |i: usize| columns.get(i).map(|c| c.trim()).unwrap_or("");
    let list = |i: usize| -> Vec<&str> {
        column(i).split(',').filter(|s| !s.is_empty()).collect()
    };

    let target = TargetId::new(column(0)).map_err(|e| malformed(e.to_string()))?;
    let total_chunks = column(1)
        .parse()
        .map_err(|_| malformed(format!("bad total_chunks {:?}", column(1))))?;
    let snr_threshold = column(2)
        .parse()
        .map_err(|_| malformed(format!("bad snr_threshold {:?}", column(2))))?;
    let max_iterations = column(3)
        .parse()
        .map_err(|_| malformed(format!("bad max_iterations {:?}", column(3))))?;
    let first_submission = parse_time(line, column(4))?;

    let resubmissions = list(5)
        .into_iter()
        .map(|t| parse_time(line, t))
        .collect::<Result<Vec<_>, _>>()?;
    let stages = list(6)
        .into_iter()
        .map(|entry| {
            let (iteration, at) = entry
                .split_once('@')
                .ok_or_else(|| malformed(format!("bad stage entry {entry:?}")))?;
            let iteration = iteration
                .parse()
                .map_err(|_| malformed(format!("bad stage iteration {iteration:?}")))?;
            Ok(StageSubmission {
                iteration,
                at: parse_time(line, at)?,
            })
        })
        .collect::<Result<Vec<_>, LedgerError>>()?;
    let acted_artifacts = list(7).into_iter().map(str::to_string).collect();

    Ok(SubmissionRecord {
        target,
        params: RunParams {
            total_chunks,
            snr_threshold,
            max_iterations,
        },
        first_submission,
        resubmissions,
        stages,
        acted_artifacts,
    })
}
