//! Community detection
//!
//! Modularity-driven clustering over the undirected, weighted view of the graph:
//!
//! Q = Σc [ Lc / m − (dc / 2m)² ]
//!
//! where `Lc` is the internal edge weight of community `c`, `dc` the summed degree
//! of its members and `m` the total edge weight.
//!
//! 1. **Seed**: one community per directory
//! 2. **Local moving**: visit nodes in id order, move each to the neighbouring
//!    community with the best gain when it beats staying by more than epsilon
//! 3. **Split**: break communities into their connected components
//! 4. **Merge**: greedily join adjacent communities while the gain is positive
//!
//! Phases repeat until none of them changes the partition.

use crate::text::{is_stop_term, split_words, title_case};
use crate::types::{CodeGraph, CodeNode, Community};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommunityConfig {
    /// Minimum modularity gain for a move or merge
    pub epsilon: f64,
    /// Upper bound on seed → move → split → merge rounds
    pub max_iterations: usize,
    /// Smaller clusters dissolve and their nodes stay unassigned
    pub min_size: usize,
    pub keyword_count: usize,
}

impl Default for CommunityConfig {
    fn default() -> Self {
        Self {
            epsilon: 1e-6,
            max_iterations: 20,
            min_size: 2,
            keyword_count: 5,
        }
    }
}

/// Undirected weighted adjacency in canonical (id-sorted) node order
struct WeightedGraph {
    /// Canonical position -> index into `CodeGraph::nodes`
    order: Vec<usize>,
    adjacency: Vec<Vec<(usize, f64)>>,
    degree: Vec<f64>,
    /// Sum of all edge weights
    total: f64,
}

impl WeightedGraph {
    fn new(graph: &CodeGraph) -> Self {
        let mut order: Vec<usize> = (0..graph.nodes.len()).collect();
        order.sort_by(|&a, &b| graph.nodes[a].id.cmp(&graph.nodes[b].id));

        let rank: HashMap<&str, usize> = order
            .iter()
            .enumerate()
            .map(|(rank, &pos)| (graph.nodes[pos].id.as_str(), rank))
            .collect();

        // parallel edges of different kinds add up
        let mut pairs: BTreeMap<(usize, usize), f64> = BTreeMap::new();
        for edge in &graph.edges {
            let (Some(&a), Some(&b)) = (rank.get(edge.source.as_str()), rank.get(edge.target.as_str()))
            else {
                continue;
            };
            if a == b {
                continue;
            }
            *pairs.entry((a.min(b), a.max(b))).or_default() += f64::from(edge.weight);
        }

        let n = order.len();
        let mut adjacency = vec![Vec::new(); n];
        let mut degree = vec![0.0; n];
        let mut total = 0.0;
        for (&(a, b), &weight) in &pairs {
            adjacency[a].push((b, weight));
            adjacency[b].push((a, weight));
            degree[a] += weight;
            degree[b] += weight;
            total += weight;
        }
        for neighbours in &mut adjacency {
            neighbours.sort_by_key(|&(neighbour, _)| neighbour);
        }

        Self {
            order,
            adjacency,
            degree,
            total,
        }
    }

    fn len(&self) -> usize {
        self.order.len()
    }

    /// Modularity gain of joining two groups connected by `between` weight
    fn join_gain(&self, between: f64, degree_a: f64, degree_b: f64) -> f64 {
        between / self.total - degree_a * degree_b / (2.0 * self.total * self.total)
    }
}

/// Partitions a graph into non-overlapping communities
pub struct CommunityDetector {
    config: CommunityConfig,
}

impl Default for CommunityDetector {
    fn default() -> Self {
        Self::new(CommunityConfig::default())
    }
}

impl CommunityDetector {
    pub fn new(config: CommunityConfig) -> Self {
        Self { config }
    }

    /// Detect communities, ordered by size descending then smallest member id
    pub fn detect(&self, graph: &CodeGraph) -> Vec<Community> {
        let weighted = WeightedGraph::new(graph);
        if weighted.total <= 0.0 {
            return Vec::new();
        }

        let mut labels = directory_seed(graph, &weighted);
        let mut totals = label_totals(&weighted, &labels);

        for round in 0..self.config.max_iterations.max(1) {
            let moved = self.local_moving(&weighted, &mut labels, &mut totals);
            let split = split_disconnected(&weighted, &mut labels);
            if split {
                totals = label_totals(&weighted, &labels);
            }
            let merged = self.merge_adjacent(&weighted, &mut labels, &mut totals);

            if !(moved || split || merged) {
                log::debug!("Community detection converged after {} rounds", round + 1);
                break;
            }
        }

        self.summarize(graph, &weighted, &labels)
    }

    fn local_moving(
        &self,
        weighted: &WeightedGraph,
        labels: &mut [usize],
        totals: &mut [f64],
    ) -> bool {
        let mut moved_any = false;

        for _ in 0..self.config.max_iterations.max(1) {
            let mut moved = false;

            for node in 0..weighted.len() {
                let degree = weighted.degree[node];
                if degree <= 0.0 {
                    continue;
                }
                let current = labels[node];

                let mut links: BTreeMap<usize, f64> = BTreeMap::new();
                for &(neighbour, weight) in &weighted.adjacency[node] {
                    *links.entry(labels[neighbour]).or_default() += weight;
                }

                totals[current] -= degree;
                let stay = weighted.join_gain(
                    links.get(&current).copied().unwrap_or(0.0),
                    degree,
                    totals[current],
                );

                let mut best = current;
                let mut best_gain = f64::NEG_INFINITY;
                for (&label, &weight) in &links {
                    if label == current {
                        continue;
                    }
                    let gain = weighted.join_gain(weight, degree, totals[label]);
                    if gain > best_gain {
                        best = label;
                        best_gain = gain;
                    }
                }

                if best != current && best_gain > stay + self.config.epsilon {
                    labels[node] = best;
                    moved = true;
                } else {
                    best = current;
                }
                totals[best] += degree;
            }

            if !moved {
                break;
            }
            moved_any = true;
        }

        moved_any
    }

    /// Merge rounds: every community joins at most one partner per round, best gains first
    fn merge_adjacent(
        &self,
        weighted: &WeightedGraph,
        labels: &mut [usize],
        totals: &mut [f64],
    ) -> bool {
        let mut merged_any = false;

        loop {
            let mut between: BTreeMap<(usize, usize), f64> = BTreeMap::new();
            for node in 0..weighted.len() {
                for &(neighbour, weight) in &weighted.adjacency[node] {
                    let (a, b) = (labels[node], labels[neighbour]);
                    if node < neighbour && a != b {
                        *between.entry((a.min(b), a.max(b))).or_default() += weight;
                    }
                }
            }

            let mut candidates: Vec<(f64, usize, usize)> = between
                .iter()
                .map(|(&(a, b), &weight)| (weighted.join_gain(weight, totals[a], totals[b]), a, b))
                .filter(|&(gain, _, _)| gain > self.config.epsilon)
                .collect();
            if candidates.is_empty() {
                break;
            }
            candidates.sort_by(|x, y| y.0.total_cmp(&x.0).then((x.1, x.2).cmp(&(y.1, y.2))));

            let mut touched: HashSet<usize> = HashSet::new();
            let mut remap: HashMap<usize, usize> = HashMap::new();
            for (_, a, b) in candidates {
                if touched.contains(&a) || touched.contains(&b) {
                    continue;
                }
                touched.insert(a);
                touched.insert(b);
                remap.insert(b, a);
            }

            for label in labels.iter_mut() {
                if let Some(&into) = remap.get(label) {
                    *label = into;
                }
            }
            for (&from, &into) in &remap {
                totals[into] += totals[from];
                totals[from] = 0.0;
            }
            merged_any = true;
        }

        merged_any
    }

    fn summarize(
        &self,
        graph: &CodeGraph,
        weighted: &WeightedGraph,
        labels: &[usize],
    ) -> Vec<Community> {
        let mut groups: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        for node in 0..weighted.len() {
            if weighted.degree[node] > 0.0 {
                groups.entry(labels[node]).or_default().push(node);
            }
        }

        // canonical order is id order, so members are already sorted by id
        let mut groups: Vec<Vec<usize>> = groups
            .into_values()
            .filter(|members| members.len() >= self.config.min_size.max(1))
            .collect();
        groups.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a[0].cmp(&b[0])));

        let mut used_names: HashMap<String, usize> = HashMap::new();
        groups
            .iter()
            .enumerate()
            .map(|(position, members)| {
                let nodes: Vec<&CodeNode> = members
                    .iter()
                    .map(|&node| &graph.nodes[weighted.order[node]])
                    .collect();
                let keywords = self.keywords(&nodes);
                let base_name = community_name(&nodes, &keywords);
                let seen = used_names.entry(base_name.clone()).or_insert(0);
                *seen += 1;
                let name = if *seen == 1 {
                    base_name
                } else {
                    format!("{base_name} {seen}")
                };

                Community {
                    id: format!("community:{}", position + 1),
                    name,
                    keywords,
                    cohesion: cohesion(weighted, labels, members),
                    symbol_count: members.len(),
                    member_ids: nodes.iter().map(|node| node.id.clone()).collect(),
                }
            })
            .collect()
    }

    /// Most frequent label words, ties alphabetical
    fn keywords(&self, nodes: &[&CodeNode]) -> Vec<String> {
        let mut counts: BTreeMap<String, usize> = BTreeMap::new();
        for node in nodes {
            let label = if node.is_file() {
                node.label
                    .rsplit_once('.')
                    .map_or(node.label.as_str(), |(stem, _)| stem)
            } else {
                node.label.as_str()
            };
            for word in split_words(label) {
                if !is_stop_term(&word) {
                    *counts.entry(word).or_default() += 1;
                }
            }
        }

        let mut ranked: Vec<(String, usize)> = counts.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        ranked
            .into_iter()
            .take(self.config.keyword_count)
            .map(|(word, _)| word)
            .collect()
    }
}

/// Initial partition: one label per directory, numbered in directory order
fn directory_seed(graph: &CodeGraph, weighted: &WeightedGraph) -> Vec<usize> {
    let directories: Vec<&str> = weighted
        .order
        .iter()
        .map(|&pos| graph.nodes[pos].directory.as_str())
        .collect();
    let mut distinct: Vec<&str> = directories.clone();
    distinct.sort_unstable();
    distinct.dedup();
    let label_of: HashMap<&str, usize> = distinct
        .iter()
        .enumerate()
        .map(|(label, dir)| (*dir, label))
        .collect();

    directories.iter().map(|dir| label_of[dir]).collect()
}

fn label_totals(weighted: &WeightedGraph, labels: &[usize]) -> Vec<f64> {
    // labels never exceed the node count
    let mut totals = vec![0.0; weighted.len().max(1)];
    for (node, &label) in labels.iter().enumerate() {
        totals[label] += weighted.degree[node];
    }
    totals
}

/// Relabel every connected component of a community after the first with a free label
fn split_disconnected(weighted: &WeightedGraph, labels: &mut [usize]) -> bool {
    let n = weighted.len();
    let mut used: Vec<bool> = vec![false; n];
    let mut claimed: HashSet<usize> = HashSet::new();
    let mut visited = vec![false; n];
    let mut components: Vec<(usize, Vec<usize>)> = Vec::new();

    for start in 0..n {
        if visited[start] || weighted.degree[start] <= 0.0 {
            continue;
        }
        let label = labels[start];
        let mut component = vec![start];
        let mut queue = VecDeque::from([start]);
        visited[start] = true;
        while let Some(node) = queue.pop_front() {
            for &(neighbour, _) in &weighted.adjacency[node] {
                if !visited[neighbour] && labels[neighbour] == label {
                    visited[neighbour] = true;
                    component.push(neighbour);
                    queue.push_back(neighbour);
                }
            }
        }
        components.push((label, component));
    }

    for &label in labels.iter() {
        used[label] = true;
    }

    let mut next_free = 0;
    let mut changed = false;
    for (label, component) in components {
        if claimed.insert(label) {
            continue;
        }
        while used[next_free] {
            next_free += 1;
        }
        used[next_free] = true;
        for node in component {
            labels[node] = next_free;
        }
        changed = true;
    }
    changed
}

/// Internal weight over all weight touching the community
#[allow(clippy::cast_possible_truncation)]
fn cohesion(weighted: &WeightedGraph, labels: &[usize], members: &[usize]) -> f32 {
    let label = labels[members[0]];
    let mut internal = 0.0;
    let mut boundary = 0.0;
    for &node in members {
        for &(neighbour, weight) in &weighted.adjacency[node] {
            if labels[neighbour] == label {
                internal += weight / 2.0;
            } else {
                boundary += weight;
            }
        }
    }

    let touching = internal + boundary;
    if touching > 0.0 {
        (internal / touching) as f32
    } else {
        0.0
    }
}

/// Dominant directory when it holds the majority of members, else the top keyword
fn community_name(nodes: &[&CodeNode], keywords: &[String]) -> String {
    let mut by_directory: BTreeMap<&str, usize> = BTreeMap::new();
    for node in nodes {
        *by_directory.entry(node.directory.as_str()).or_default() += 1;
    }
    let dominant = by_directory
        .iter()
        .max_by(|a, b| a.1.cmp(b.1).then_with(|| b.0.cmp(a.0)));

    if let Some((directory, &count)) = dominant {
        if count * 2 > nodes.len() {
            let segment = directory.rsplit('/').next().unwrap_or_default();
            let name = title_case(segment);
            return if name.is_empty() { "Root".to_string() } else { name };
        }
    }

    keywords
        .first()
        .map(|keyword| title_case(keyword))
        .unwrap_or_else(|| "Cluster".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CodeEdge, EdgeKind, NodeKind};
    use codemap_parser::Language;

    fn node(id: &str, label: &str, directory: &str) -> CodeNode {
        CodeNode {
            id: id.to_string(),
            kind: NodeKind::Function,
            label: label.to_string(),
            file_path: format!("{directory}/x.ts"),
            directory: directory.to_string(),
            language: Language::TypeScript,
            line_start: Some(1),
        }
    }

    fn two_clusters() -> CodeGraph {
        let mut graph = CodeGraph::new("o", "r", "main");
        graph.nodes = vec![
            node("a1", "authLogin", "auth"),
            node("a2", "authToken", "auth"),
            node("a3", "verifyToken", "auth"),
            node("p1", "chargeCard", "billing"),
            node("p2", "refundCard", "billing"),
            node("lonely", "unused", "misc"),
        ];
        graph.edges = vec![
            CodeEdge::new("a1", "a2", EdgeKind::Calls, 1.0),
            CodeEdge::new("a2", "a3", EdgeKind::Calls, 1.0),
            CodeEdge::new("a1", "a3", EdgeKind::Calls, 1.0),
            CodeEdge::new("p1", "p2", EdgeKind::Calls, 1.0),
            CodeEdge::new("a3", "p1", EdgeKind::Calls, 0.4),
        ];
        graph
    }

    #[test]
    fn separates_dense_clusters_and_leaves_isolated_nodes_out() {
        let communities = CommunityDetector::default().detect(&two_clusters());

        assert_eq!(communities.len(), 2);
        assert_eq!(communities[0].id, "community:1");
        assert_eq!(communities[0].member_ids, vec!["a1", "a2", "a3"]);
        assert_eq!(communities[0].name, "Auth");
        assert_eq!(communities[1].member_ids, vec!["p1", "p2"]);
        assert_eq!(communities[1].name, "Billing");
        assert!(communities
            .iter()
            .all(|community| !community.member_ids.contains(&"lonely".to_string())));
    }

    #[test]
    fn cohesion_is_internal_over_touching_weight() {
        let communities = CommunityDetector::default().detect(&two_clusters());
        let billing = &communities[1];

        let expected = 1.0 / 1.4;
        assert!((billing.cohesion - expected).abs() < 1e-5);
        assert!(communities
            .iter()
            .all(|community| (0.0..=1.0).contains(&community.cohesion)));
    }

    #[test]
    fn keywords_rank_by_frequency_then_alphabetically() {
        let communities = CommunityDetector::default().detect(&two_clusters());

        assert_eq!(communities[0].keywords, vec!["auth", "token", "login", "verify"]);
        assert_eq!(communities[1].keywords, vec!["card", "charge", "refund"]);
    }

    #[test]
    fn detection_is_deterministic() {
        let first = CommunityDetector::default().detect(&two_clusters());
        let mut shuffled = two_clusters();
        shuffled.nodes.reverse();
        shuffled.edges.reverse();
        let second = CommunityDetector::default().detect(&shuffled);

        assert_eq!(first, second);
    }

    #[test]
    fn edgeless_graphs_have_no_communities() {
        let mut graph = two_clusters();
        graph.edges.clear();
        assert!(CommunityDetector::default().detect(&graph).is_empty());
    }
}
