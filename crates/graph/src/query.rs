use crate::error::{GraphError, Result};
use crate::index::GraphIndex;
use crate::types::{ConnectedNode, EdgeKind, ImpactReport, NodeContext};
use petgraph::graph::NodeIndex;
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use std::collections::{HashSet, VecDeque};

/// Deepest bucket an impact report carries
pub const MAX_IMPACT_DEPTH: usize = 3;

impl GraphIndex {
    /// Callers, callees, community and flows of `node_id`
    pub fn node_context(&self, node_id: &str) -> Result<NodeContext> {
        let &idx = self
            .by_id
            .get(node_id)
            .ok_or_else(|| GraphError::NodeNotFound(node_id.to_string()))?;
        let pos = self.topology[idx];

        let community = self
            .community_of
            .get(&pos)
            .map(|&community| self.graph.communities[community].clone());
        let processes = self
            .flows_of
            .get(&pos)
            .map(|flows| {
                flows
                    .iter()
                    .map(|&flow| self.graph.processes[flow].clone())
                    .collect()
            })
            .unwrap_or_default();

        Ok(NodeContext {
            node: self.node_at(idx).clone(),
            callers: self.call_neighbours(idx, Direction::Incoming),
            callees: self.call_neighbours(idx, Direction::Outgoing),
            community,
            processes,
        })
    }

    /// Nodes joined to `idx` by a `calls` edge, strongest first
    fn call_neighbours(&self, idx: NodeIndex, direction: Direction) -> Vec<ConnectedNode> {
        let mut connected: Vec<ConnectedNode> = self
            .topology
            .edges_directed(idx, direction)
            .filter(|edge| self.edge_kind(*edge.weight()) == EdgeKind::Calls)
            .map(|edge| {
                let other = match direction {
                    Direction::Incoming => edge.source(),
                    Direction::Outgoing => edge.target(),
                };
                ConnectedNode {
                    node: self.node_at(other).clone(),
                    confidence: self.graph.edges[*edge.weight()].weight,
                }
            })
            .collect();

        connected.sort_by(|a, b| {
            b.confidence
                .total_cmp(&a.confidence)
                .then_with(|| a.node.id.cmp(&b.node.id))
        });
        connected
    }

    /// Breadth-first blast radius over the undirected union of `calls` and `imports` edges.
    ///
    /// `max_depth` is clamped to `1..=3`. Seeds absent from the graph are skipped; the call
    /// fails only when none of them exist. Seeds sit at distance 0 and never land in a bucket.
    pub fn impact_analysis<S: AsRef<str>>(
        &self,
        seed_ids: &[S],
        max_depth: usize,
    ) -> Result<ImpactReport> {
        if seed_ids.is_empty() {
            return Err(GraphError::InvalidInput(
                "impact analysis needs at least one seed".to_string(),
            ));
        }

        let depth_limit = max_depth.clamp(1, MAX_IMPACT_DEPTH);
        let mut seeds: Vec<NodeIndex> = Vec::with_capacity(seed_ids.len());
        for seed in seed_ids {
            match self.by_id.get(seed.as_ref()) {
                Some(&idx) => seeds.push(idx),
                None => log::debug!("Impact seed {} is not in the graph", seed.as_ref()),
            }
        }
        if seeds.is_empty() {
            let missing: Vec<&str> = seed_ids.iter().map(|seed| seed.as_ref()).collect();
            return Err(GraphError::NodeNotFound(missing.join(", ")));
        }
        seeds.sort_by(|a, b| self.node_at(*a).id.cmp(&self.node_at(*b).id));
        seeds.dedup();

        let mut visited: HashSet<NodeIndex> = seeds.iter().copied().collect();
        let mut queue: VecDeque<(NodeIndex, usize)> =
            seeds.into_iter().map(|seed| (seed, 0)).collect();
        let mut report = ImpactReport::default();

        while let Some((current, depth)) = queue.pop_front() {
            if depth >= depth_limit {
                continue;
            }
            for neighbour in self.impact_neighbours(current) {
                if !visited.insert(neighbour) {
                    continue;
                }
                if let Some(bucket) = report.bucket_mut(depth + 1) {
                    bucket.insert(self.node_at(neighbour).id.clone());
                }
                queue.push_back((neighbour, depth + 1));
            }
        }

        Ok(report)
    }

    fn impact_neighbours(&self, idx: NodeIndex) -> impl Iterator<Item = NodeIndex> + '_ {
        let spreads = move |edge_pos: usize| {
            matches!(self.edge_kind(edge_pos), EdgeKind::Calls | EdgeKind::Imports)
        };
        let outgoing = self
            .topology
            .edges_directed(idx, Direction::Outgoing)
            .filter(move |edge| spreads(*edge.weight()))
            .map(|edge| edge.target());
        let incoming = self
            .topology
            .edges_directed(idx, Direction::Incoming)
            .filter(move |edge| spreads(*edge.weight()))
            .map(|edge| edge.source());
        outgoing.chain(incoming)
    }
}
