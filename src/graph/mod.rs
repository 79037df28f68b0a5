//! Task-graph generation
//!
//! A target's run is an iterated chain of stages. Each stage has
//! `total_chunks` search nodes, one merge node depending on all of them, a
//! post-process node after merge and a mask node after post-process. The mask
//! node of iteration `i` feeds every search node of iteration `i + 1`.
//!
//! Generation is a pure function of `(target, total_chunks, snr_threshold,
//! max_iterations)`; identical inputs give an identical graph and fingerprint.

mod render;

pub use render::SubmitFiles;

use crate::artifact::ArtifactId;
use crate::error::{NameError, OrchestratorError};
use crate::types::{ChunkId, RunParams, TargetId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Stage role of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Search,
    Merge,
    PostProcess,
    Mask,
}

impl NodeKind {
    fn prefix(self) -> &'static str {
        match self {
            NodeKind::Search => "search",
            NodeKind::Merge => "merge",
            NodeKind::PostProcess => "postprocess",
            NodeKind::Mask => "mask",
        }
    }

    fn from_prefix(prefix: &str) -> Option<Self> {
        match prefix {
            "search" => Some(NodeKind::Search),
            "merge" => Some(NodeKind::Merge),
            "postprocess" => Some(NodeKind::PostProcess),
            "mask" => Some(NodeKind::Mask),
            _ => None,
        }
    }
}

/// Identity of one graph node. Search nodes carry a chunk index.
///
/// Names: `search_<target>_<chunk>_<total>_iter<i>` for search nodes and
/// `<kind>_<target>_iter<i>_N<total>` for stage-level nodes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId {
    pub kind: NodeKind,
    pub target: TargetId,
    pub iteration: u32,
    pub chunk_index: Option<u32>,
    pub total_chunks: u32,
}

impl NodeId {
    pub fn name(&self) -> String {
        match self.chunk_index {
            Some(chunk) => format!(
                "{}_{}_{}_{}_iter{}",
                self.kind.prefix(),
                self.target,
                chunk,
                self.total_chunks,
                self.iteration
            ),
            None => format!(
                "{}_{}_iter{}_N{}",
                self.kind.prefix(),
                self.target,
                self.iteration,
                self.total_chunks
            ),
        }
    }

    pub fn parse(name: &str) -> Result<Self, NameError> {
        let (prefix, rest) = name
            .split_once('_')
            .ok_or_else(|| NameError::Unrecognized(name.to_string()))?;
        let kind =
            NodeKind::from_prefix(prefix).ok_or_else(|| NameError::Unrecognized(name.to_string()))?;
        // Node names reuse the artifact grammar for their identity part.
        let parsed = match kind {
            NodeKind::Search => {
                let id = ArtifactId::parse(&format!("{rest}.log"))?;
                let ArtifactId::ChunkLog(chunk) = id else {
                    return Err(NameError::Unrecognized(name.to_string()));
                };
                NodeId {
                    kind,
                    target: chunk.target,
                    iteration: chunk.iteration,
                    chunk_index: Some(chunk.chunk_index),
                    total_chunks: chunk.total_chunks,
                }
            }
            _ => {
                let id = ArtifactId::parse(&format!("{rest}.dag"))?;
                let ArtifactId::StageGraph(stage) = id else {
                    return Err(NameError::Unrecognized(name.to_string()));
                };
                NodeId {
                    kind,
                    target: stage.target,
                    iteration: stage.iteration,
                    chunk_index: None,
                    total_chunks: stage.total_chunks,
                }
            }
        };
        Ok(parsed)
    }

    pub fn chunk(&self) -> Option<ChunkId> {
        self.chunk_index.map(|chunk_index| ChunkId {
            target: self.target.clone(),
            iteration: self.iteration,
            chunk_index,
            total_chunks: self.total_chunks,
        })
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

/// A dependency group: every child waits for every parent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dependency {
    pub parents: Vec<NodeId>,
    pub children: Vec<NodeId>,
}

/// The generated dependency structure for one target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskGraph {
    pub target: TargetId,
    pub params: RunParams,
    /// Iterations covered by this graph, ascending.
    pub iterations: Vec<u32>,
    pub nodes: Vec<NodeId>,
    pub dependencies: Vec<Dependency>,
}

/// Generate the full multi-iteration graph.
pub fn generate(
    target: &TargetId,
    total_chunks: u32,
    snr_threshold: f64,
    max_iterations: u32,
) -> Result<TaskGraph, OrchestratorError> {
    let params = RunParams::new(total_chunks, snr_threshold, max_iterations)?;
    Ok(TaskGraph::for_run(target, &params))
}

impl TaskGraph {
    /// Build the full graph for already-validated parameters.
    pub fn for_run(target: &TargetId, params: &RunParams) -> Self {
        let iterations: Vec<u32> = (0..params.max_iterations).collect();
        let mut nodes = Vec::new();
        let mut dependencies = Vec::new();
        let mut previous_mask: Option<NodeId> = None;

        for &iteration in &iterations {
            let stage_node = |kind| NodeId {
                kind,
                target: target.clone(),
                iteration,
                chunk_index: None,
                total_chunks: params.total_chunks,
            };
            let searches: Vec<NodeId> = (0..params.total_chunks)
                .map(|chunk| NodeId {
                    kind: NodeKind::Search,
                    target: target.clone(),
                    iteration,
                    chunk_index: Some(chunk),
                    total_chunks: params.total_chunks,
                })
                .collect();
            let merge = stage_node(NodeKind::Merge);
            let post = stage_node(NodeKind::PostProcess);
            let mask = stage_node(NodeKind::Mask);

            if let Some(prev) = previous_mask.take() {
                dependencies.push(Dependency {
                    parents: vec![prev],
                    children: searches.clone(),
                });
            }
            dependencies.push(Dependency {
                parents: searches.clone(),
                children: vec![merge.clone()],
            });
            dependencies.push(Dependency {
                parents: vec![merge.clone()],
                children: vec![post.clone()],
            });
            dependencies.push(Dependency {
                parents: vec![post.clone()],
                children: vec![mask.clone()],
            });

            nodes.extend(searches);
            nodes.push(merge);
            nodes.push(post);
            nodes.push(mask.clone());
            previous_mask = Some(mask);
        }

        Self {
            target: target.clone(),
            params: *params,
            iterations,
            nodes,
            dependencies,
        }
    }

    /// The single-iteration slice submitted for `iteration`.
    pub fn stage(&self, iteration: u32) -> Result<TaskGraph, OrchestratorError> {
        if !self.iterations.contains(&iteration) {
            return Err(OrchestratorError::InvalidParameters(format!(
                "iteration {} outside 0..{} for {}",
                iteration, self.params.max_iterations, self.target
            )));
        }
        let in_stage = |n: &NodeId| n.iteration == iteration;
        let nodes = self.nodes.iter().filter(|n| in_stage(n)).cloned().collect();
        let dependencies = self
            .dependencies
            .iter()
            .filter(|d| d.parents.iter().all(in_stage) && d.children.iter().all(in_stage))
            .cloned()
            .collect();
        Ok(Self {
            target: self.target.clone(),
            params: self.params,
            iterations: vec![iteration],
            nodes,
            dependencies,
        })
    }

    pub fn search_nodes(&self) -> impl Iterator<Item = &NodeId> {
        self.nodes.iter().filter(|n| n.kind == NodeKind::Search)
    }

    /// Parents of `node` across all dependency groups.
    pub fn parents_of(&self, node: &NodeId) -> Vec<&NodeId> {
        self.dependencies
            .iter()
            .filter(|d| d.children.contains(node))
            .flat_map(|d| d.parents.iter())
            .collect()
    }

    /// Stable content hash of the graph structure (blake3, hex).
    pub fn fingerprint(&self) -> String {
        // Serializing plain data to a Vec cannot fail.
        let bytes = serde_json::to_vec(self).unwrap_or_default();
        hex::encode(blake3::hash(&bytes).as_bytes())
    }

    /// Render the engine-facing graph description.
    pub fn render(&self, files: &SubmitFiles) -> String {
        render::render(self, files)
    }
}

/// One `target,chunk_index,total_chunks[,iteration]` line per chunk.
pub fn joblist(target: &TargetId, total_chunks: u32, iteration: Option<u32>) -> String {
    let mut out = String::new();
    for chunk in 0..total_chunks {
        match iteration {
            Some(i) => out.push_str(&format!("{target},{chunk},{total_chunks},{i}\n")),
            None => out.push_str(&format!("{target},{chunk},{total_chunks}\n")),
        }
    }
    out
}
