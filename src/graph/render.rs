//! DAG description rendering.
//!
//! Output follows the DAGMan layout: `JOB`, `VARS`, `PARENT ... CHILD` and,
//! for multi-iteration graphs, `ABORT-DAG-ON` so a mask node exiting with 1
//! (no significant peak left) ends the run early.

use super::{NodeId, NodeKind, TaskGraph};
use serde::{Deserialize, Serialize};
use std::fmt::Write;

/// Submit descriptions for each node kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitFiles {
    #[serde(default = "default_search_submit")]
    pub search: String,
    #[serde(default = "default_merge_submit")]
    pub merge: String,
    #[serde(default = "default_postprocess_submit")]
    pub postprocess: String,
    #[serde(default = "default_mask_submit")]
    pub mask: String,
}

fn default_search_submit() -> String {
    "pbls_chunk.sub".to_string()
}

fn default_merge_submit() -> String {
    "pbls_merge.sub".to_string()
}

fn default_postprocess_submit() -> String {
    "pbls_postprocess.sub".to_string()
}

fn default_mask_submit() -> String {
    "pbls_mask.sub".to_string()
}

impl Default for SubmitFiles {
    fn default() -> Self {
        Self {
            search: default_search_submit(),
            merge: default_merge_submit(),
            postprocess: default_postprocess_submit(),
            mask: default_mask_submit(),
        }
    }
}

impl SubmitFiles {
    fn for_kind(&self, kind: NodeKind) -> &str {
        match kind {
            NodeKind::Search => &self.search,
            NodeKind::Merge => &self.merge,
            NodeKind::PostProcess => &self.postprocess,
            NodeKind::Mask => &self.mask,
        }
    }
}

pub(super) fn render(graph: &TaskGraph, files: &SubmitFiles) -> String {
    let mut out = String::new();
    let params = &graph.params;
    // Writing into a String never fails.
    let _ = writeln!(out, "# pblsflow task graph");
    let _ = writeln!(
        out,
        "# target={} total_chunks={} snr_threshold={} max_iterations={} iterations={}",
        graph.target,
        params.total_chunks,
        params.snr_threshold,
        params.max_iterations,
        graph
            .iterations
            .iter()
            .map(u32::to_string)
            .collect::<Vec<_>>()
            .join(",")
    );

    for node in &graph.nodes {
        let name = node.name();
        let _ = writeln!(out, "JOB {} {}", name, files.for_kind(node.kind));
        let _ = writeln!(out, "VARS {} {}", name, vars(node, graph));
    }

    for dep in &graph.dependencies {
        let _ = writeln!(
            out,
            "PARENT {} CHILD {}",
            join_names(&dep.parents),
            join_names(&dep.children)
        );
    }

    if graph.iterations.len() > 1 {
        for node in graph.nodes.iter().filter(|n| n.kind == NodeKind::Mask) {
            let _ = writeln!(out, "ABORT-DAG-ON {} 1 RETURN 0", node.name());
        }
    }
    out
}

fn vars(node: &NodeId, graph: &TaskGraph) -> String {
    match node.chunk_index {
        Some(chunk) => format!(
            "star_id=\"{}\" chunk=\"{}\" total_chunks=\"{}\" iteration=\"{}\"",
            node.target, chunk, node.total_chunks, node.iteration
        ),
        None => format!(
            "star_id=\"{}\" iteration=\"{}\" snr_threshold=\"{}\" max_iterations=\"{}\"",
            node.target, node.iteration, graph.params.snr_threshold, graph.params.max_iterations
        ),
    }
}

fn join_names(nodes: &[NodeId]) -> String {
    nodes
        .iter()
        .map(NodeId::name)
        .collect::<Vec<_>>()
        .join(" ")
}
