use crate::types::{CodeGraph, CodeNode, EdgeKind};
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::HashMap;
use std::sync::Arc;

/// Read-only petgraph view over a snapshot.
///
/// Node weights index into `graph.nodes`, edge weights into `graph.edges`.
/// Built once per snapshot and shared between concurrent readers.
#[derive(Debug, Clone)]
pub struct GraphIndex {
    pub(crate) graph: Arc<CodeGraph>,
    pub(crate) topology: DiGraph<usize, usize>,
    pub(crate) by_id: HashMap<String, NodeIndex>,
    /// Node position -> community position
    pub(crate) community_of: HashMap<usize, usize>,
    /// Node position -> positions of flows containing it
    pub(crate) flows_of: HashMap<usize, Vec<usize>>,
}

impl GraphIndex {
    pub fn new(graph: Arc<CodeGraph>) -> Self {
        let mut topology = DiGraph::with_capacity(graph.nodes.len(), graph.edges.len());
        let mut by_id = HashMap::with_capacity(graph.nodes.len());
        for (pos, node) in graph.nodes.iter().enumerate() {
            let idx = topology.add_node(pos);
            by_id.insert(node.id.clone(), idx);
        }

        for (pos, edge) in graph.edges.iter().enumerate() {
            match (by_id.get(&edge.source), by_id.get(&edge.target)) {
                (Some(&source), Some(&target)) => {
                    topology.add_edge(source, target, pos);
                }
                _ => log::warn!("Skipping dangling edge {}", edge.id),
            }
        }

        let mut community_of = HashMap::new();
        for (pos, community) in graph.communities.iter().enumerate() {
            for member in &community.member_ids {
                if let Some(&idx) = by_id.get(member) {
                    community_of.entry(topology[idx]).or_insert(pos);
                }
            }
        }

        let mut flows_of: HashMap<usize, Vec<usize>> = HashMap::new();
        for (pos, flow) in graph.processes.iter().enumerate() {
            for step in &flow.steps {
                if let Some(&idx) = by_id.get(step) {
                    flows_of.entry(topology[idx]).or_default().push(pos);
                }
            }
        }

        Self {
            graph,
            topology,
            by_id,
            community_of,
            flows_of,
        }
    }

    #[must_use]
    pub fn graph(&self) -> &CodeGraph {
        &self.graph
    }

    /// Shared handle to the underlying snapshot
    #[must_use]
    pub fn snapshot(&self) -> Arc<CodeGraph> {
        Arc::clone(&self.graph)
    }

    #[must_use]
    pub fn node(&self, id: &str) -> Option<&CodeNode> {
        self.by_id
            .get(id)
            .map(|&idx| &self.graph.nodes[self.topology[idx]])
    }

    pub(crate) fn node_at(&self, idx: NodeIndex) -> &CodeNode {
        &self.graph.nodes[self.topology[idx]]
    }

    pub(crate) fn edge_kind(&self, edge_pos: usize) -> EdgeKind {
        self.graph.edges[edge_pos].kind
    }
}
