//! Artifact naming
//!
//! Every artifact the orchestrator reads or writes encodes its full identity
//! in the file name, so any component can recover `(target, iteration,
//! chunk, total)` from a directory listing alone.
//!
//! | Kind | Name |
//! |---|---|
//! | chunk output | `joboutput_<target>_<chunk>_<total>_iter<i>.tar.gz` |
//! | chunk log | `<target>_<chunk>_<total>_iter<i>.log` |
//! | stage graph | `<target>_iter<i>_N<total>.dag` |
//! | recovery artifact | `<target>_iter<i>_N<total>.dag.rescue<NNN>` |
//! | mask verdict | `<target>_mask_iter<i>.snr` |
//! | merged periodogram | `<target>_merged_pbls_periodogram_iter<i>.csv` |
//!
//! Numeric fields are parsed from the right, so target ids may contain
//! underscores.

use crate::error::NameError;
use crate::types::{ChunkId, TargetId};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{trace, warn};

const CHUNK_OUTPUT_PREFIX: &str = "joboutput_";
const CHUNK_OUTPUT_SUFFIX: &str = ".tar.gz";
const CHUNK_LOG_SUFFIX: &str = ".log";
const GRAPH_SUFFIX: &str = ".dag";
const RESCUE_MARKER: &str = ".dag.rescue";
const VERDICT_SUFFIX: &str = ".snr";
const VERDICT_MARKER: &str = "_mask_iter";
const MERGED_SUFFIX: &str = ".csv";
const MERGED_MARKER: &str = "_merged_pbls_periodogram_iter";

/// Identity of one stage (one iteration) of a target's run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StageId {
    pub target: TargetId,
    pub iteration: u32,
    pub total_chunks: u32,
}

impl StageId {
    pub fn new(target: TargetId, iteration: u32, total_chunks: u32) -> Self {
        Self {
            target,
            iteration,
            total_chunks,
        }
    }
}

/// Artifact category, used for pattern matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    ChunkOutput,
    ChunkLog,
    StageGraph,
    Recovery,
    MaskVerdict,
    MergedPeriodogram,
}

/// Typed identity parsed from (or rendered to) an artifact file name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ArtifactId {
    ChunkOutput(ChunkId),
    ChunkLog(ChunkId),
    StageGraph(StageId),
    /// Numbered continuation marker left by a partially failed graph run.
    Recovery { stage: StageId, sequence: u32 },
    MaskVerdict { target: TargetId, iteration: u32 },
    MergedPeriodogram { target: TargetId, iteration: u32 },
}

impl ArtifactId {
    pub fn kind(&self) -> ArtifactKind {
        match self {
            ArtifactId::ChunkOutput(_) => ArtifactKind::ChunkOutput,
            ArtifactId::ChunkLog(_) => ArtifactKind::ChunkLog,
            ArtifactId::StageGraph(_) => ArtifactKind::StageGraph,
            ArtifactId::Recovery { .. } => ArtifactKind::Recovery,
            ArtifactId::MaskVerdict { .. } => ArtifactKind::MaskVerdict,
            ArtifactId::MergedPeriodogram { .. } => ArtifactKind::MergedPeriodogram,
        }
    }

    pub fn target(&self) -> &TargetId {
        match self {
            ArtifactId::ChunkOutput(c) | ArtifactId::ChunkLog(c) => &c.target,
            ArtifactId::StageGraph(s) | ArtifactId::Recovery { stage: s, .. } => &s.target,
            ArtifactId::MaskVerdict { target, .. }
            | ArtifactId::MergedPeriodogram { target, .. } => target,
        }
    }

    pub fn iteration(&self) -> u32 {
        match self {
            ArtifactId::ChunkOutput(c) | ArtifactId::ChunkLog(c) => c.iteration,
            ArtifactId::StageGraph(s) | ArtifactId::Recovery { stage: s, .. } => s.iteration,
            ArtifactId::MaskVerdict { iteration, .. }
            | ArtifactId::MergedPeriodogram { iteration, .. } => *iteration,
        }
    }

    /// Total chunk count, for kinds that carry one.
    pub fn total_chunks(&self) -> Option<u32> {
        match self {
            ArtifactId::ChunkOutput(c) | ArtifactId::ChunkLog(c) => Some(c.total_chunks),
            ArtifactId::StageGraph(s) | ArtifactId::Recovery { stage: s, .. } => {
                Some(s.total_chunks)
            }
            _ => None,
        }
    }

    /// Render the canonical file name.
    pub fn name(&self) -> String {
        match self {
            ArtifactId::ChunkOutput(c) => format!(
                "{}{}{}",
                CHUNK_OUTPUT_PREFIX,
                chunk_core(c),
                CHUNK_OUTPUT_SUFFIX
            ),
            ArtifactId::ChunkLog(c) => format!("{}{}", chunk_core(c), CHUNK_LOG_SUFFIX),
            ArtifactId::StageGraph(s) => format!("{}{}", stage_core(s), GRAPH_SUFFIX),
            ArtifactId::Recovery { stage, sequence } => {
                format!("{}{}{:03}", stage_core(stage), RESCUE_MARKER, sequence)
            }
            ArtifactId::MaskVerdict { target, iteration } => {
                format!("{}{}{}{}", target, VERDICT_MARKER, iteration, VERDICT_SUFFIX)
            }
            ArtifactId::MergedPeriodogram { target, iteration } => {
                format!("{}{}{}{}", target, MERGED_MARKER, iteration, MERGED_SUFFIX)
            }
        }
    }

    /// Parse a file name into a typed identity.
    ///
    /// Names that do not look like any artifact yield
    /// [`NameError::Unrecognized`]; names that look like one but carry bad
    /// fields yield a more specific error.
    pub fn parse(name: &str) -> Result<Self, NameError> {
        if let Some(core) = name
            .strip_prefix(CHUNK_OUTPUT_PREFIX)
            .and_then(|rest| rest.strip_suffix(CHUNK_OUTPUT_SUFFIX))
        {
            return parse_chunk_core(name, core).map(ArtifactId::ChunkOutput);
        }
        if let Some((core, sequence)) = name.split_once(RESCUE_MARKER) {
            let stage = parse_stage_core(name, core)?;
            let sequence = parse_number(name, sequence, "rescue sequence")?;
            return Ok(ArtifactId::Recovery { stage, sequence });
        }
        if let Some(core) = name.strip_suffix(GRAPH_SUFFIX) {
            return parse_stage_core(name, core).map(ArtifactId::StageGraph);
        }
        if let Some(core) = name.strip_suffix(VERDICT_SUFFIX) {
            let (target, iteration) = parse_marked(name, core, VERDICT_MARKER)?;
            return Ok(ArtifactId::MaskVerdict { target, iteration });
        }
        if let Some(core) = name.strip_suffix(MERGED_SUFFIX) {
            let (target, iteration) = parse_marked(name, core, MERGED_MARKER)?;
            return Ok(ArtifactId::MergedPeriodogram { target, iteration });
        }
        if let Some(core) = name.strip_suffix(CHUNK_LOG_SUFFIX) {
            return parse_chunk_core(name, core).map(ArtifactId::ChunkLog);
        }
        Err(NameError::Unrecognized(name.to_string()))
    }
}

impl fmt::Display for ArtifactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

/// Filter over parsed artifact identities.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPattern {
    pub kind: ArtifactKind,
    pub target: Option<TargetId>,
    pub iteration: Option<u32>,
    pub total_chunks: Option<u32>,
}

impl ArtifactPattern {
    pub fn kind(kind: ArtifactKind) -> Self {
        Self {
            kind,
            target: None,
            iteration: None,
            total_chunks: None,
        }
    }

    pub fn target(mut self, target: &TargetId) -> Self {
        self.target = Some(target.clone());
        self
    }

    pub fn iteration(mut self, iteration: u32) -> Self {
        self.iteration = Some(iteration);
        self
    }

    pub fn total_chunks(mut self, total_chunks: u32) -> Self {
        self.total_chunks = Some(total_chunks);
        self
    }

    pub fn matches(&self, id: &ArtifactId) -> bool {
        id.kind() == self.kind
            && self.target.as_ref().map_or(true, |t| t == id.target())
            && self.iteration.map_or(true, |i| i == id.iteration())
            && self
                .total_chunks
                .map_or(true, |n| id.total_chunks() == Some(n))
    }

    /// Parse `names` and keep those matching this pattern.
    ///
    /// Foreign files are skipped quietly; names that look like artifacts but
    /// fail to parse are logged, since they usually mean a producer bug.
    pub fn select<I, S>(&self, names: I) -> Vec<ArtifactId>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut out = Vec::new();
        for name in names {
            let name = name.as_ref();
            match ArtifactId::parse(name) {
                Ok(id) if self.matches(&id) => out.push(id),
                Ok(_) => {}
                Err(NameError::Unrecognized(_)) => trace!(name, "Skipping foreign file"),
                Err(e) => warn!(name, error = %e, "Skipping malformed artifact name"),
            }
        }
        out
    }
}

fn chunk_core(c: &ChunkId) -> String {
    format!(
        "{}_{}_{}_iter{}",
        c.target, c.chunk_index, c.total_chunks, c.iteration
    )
}

fn stage_core(s: &StageId) -> String {
    format!("{}_iter{}_N{}", s.target, s.iteration, s.total_chunks)
}

fn parse_chunk_core(name: &str, core: &str) -> Result<ChunkId, NameError> {
    let malformed = |field| NameError::MalformedField {
        name: name.to_string(),
        field,
    };
    let (rest, iter_part) = core.rsplit_once('_').ok_or_else(|| malformed("iteration"))?;
    let iteration = parse_tagged(name, iter_part, "iter", "iteration")?;
    let (rest, total_part) = rest.rsplit_once('_').ok_or_else(|| malformed("total_chunks"))?;
    let total_chunks = parse_number(name, total_part, "total_chunks")?;
    let (target, chunk_part) = rest.rsplit_once('_').ok_or_else(|| malformed("chunk_index"))?;
    let chunk_index = parse_number(name, chunk_part, "chunk_index")?;
    if total_chunks == 0 || chunk_index >= total_chunks {
        return Err(NameError::ChunkOutOfRange {
            name: name.to_string(),
            chunk: chunk_index,
            total: total_chunks,
        });
    }
    Ok(ChunkId {
        target: TargetId::new(target)?,
        iteration,
        chunk_index,
        total_chunks,
    })
}

fn parse_stage_core(name: &str, core: &str) -> Result<StageId, NameError> {
    let malformed = |field| NameError::MalformedField {
        name: name.to_string(),
        field,
    };
    let (rest, total_part) = core.rsplit_once('_').ok_or_else(|| malformed("total_chunks"))?;
    let total_chunks = parse_tagged(name, total_part, "N", "total_chunks")?;
    if total_chunks == 0 {
        return Err(malformed("total_chunks"));
    }
    let (target, iter_part) = rest.rsplit_once('_').ok_or_else(|| malformed("iteration"))?;
    let iteration = parse_tagged(name, iter_part, "iter", "iteration")?;
    Ok(StageId {
        target: TargetId::new(target)?,
        iteration,
        total_chunks,
    })
}

fn parse_marked(name: &str, core: &str, marker: &str) -> Result<(TargetId, u32), NameError> {
    let (target, iteration) = core
        .rsplit_once(marker)
        .ok_or_else(|| NameError::Unrecognized(name.to_string()))?;
    let iteration = parse_number(name, iteration, "iteration")?;
    Ok((TargetId::new(target)?, iteration))
}

fn parse_tagged(
    name: &str,
    raw: &str,
    tag: &str,
    field: &'static str,
) -> Result<u32, NameError> {
    let digits = raw.strip_prefix(tag).ok_or_else(|| NameError::MalformedField {
        name: name.to_string(),
        field,
    })?;
    parse_number(name, digits, field)
}

fn parse_number(name: &str, raw: &str, field: &'static str) -> Result<u32, NameError> {
    let malformed = || NameError::MalformedField {
        name: name.to_string(),
        field,
    };
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return Err(malformed());
    }
    raw.parse().map_err(|_| malformed())
}
