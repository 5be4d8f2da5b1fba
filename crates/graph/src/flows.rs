use crate::types::{CodeGraph, Community, EdgeKind, ProcessFlow};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowConfig {
    /// Flows kept for the whole graph
    pub max_flows: usize,
    /// Longest path in steps
    pub max_depth: usize,
    pub max_flows_per_entry: usize,
    /// Paths explored from one entry before giving up on it
    pub max_paths_per_entry: usize,
    /// Labels treated as entry points even when something calls them
    pub entry_names: Vec<String>,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            max_flows: 30,
            max_depth: 10,
            max_flows_per_entry: 3,
            max_paths_per_entry: 64,
            entry_names: ["main", "run", "start", "handler", "serve"]
                .iter()
                .map(ToString::to_string)
                .collect(),
        }
    }
}

/// `calls` subgraph with nodes in id order
struct CallGraph {
    /// Rank -> index into `CodeGraph::nodes`
    order: Vec<usize>,
    successors: Vec<Vec<usize>>,
    in_degree: Vec<usize>,
}

impl CallGraph {
    fn new(graph: &CodeGraph) -> Self {
        let mut order: Vec<usize> = (0..graph.nodes.len()).collect();
        order.sort_by(|&a, &b| graph.nodes[a].id.cmp(&graph.nodes[b].id));
        let rank: HashMap<&str, usize> = order
            .iter()
            .enumerate()
            .map(|(rank, &pos)| (graph.nodes[pos].id.as_str(), rank))
            .collect();

        let mut successors: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); order.len()];
        for edge in graph.edges_of_kind(EdgeKind::Calls) {
            if let (Some(&from), Some(&to)) = (
                rank.get(edge.source.as_str()),
                rank.get(edge.target.as_str()),
            ) {
                if from != to {
                    successors[from].insert(to);
                }
            }
        }

        let mut in_degree = vec![0; order.len()];
        for targets in &successors {
            for &target in targets {
                in_degree[target] += 1;
            }
        }

        Self {
            order,
            successors: successors
                .into_iter()
                .map(|targets| targets.into_iter().collect())
                .collect(),
            in_degree,
        }
    }
}

/// Enumerates representative entry-to-terminal call paths
pub struct FlowExtractor {
    config: FlowConfig,
}

impl Default for FlowExtractor {
    fn default() -> Self {
        Self::new(FlowConfig::default())
    }
}

impl FlowExtractor {
    pub fn new(config: FlowConfig) -> Self {
        Self { config }
    }

    pub fn extract(&self, graph: &CodeGraph, communities: &[Community]) -> Vec<ProcessFlow> {
        let calls = CallGraph::new(graph);
        let label = |rank: usize| graph.nodes[calls.order[rank]].label.as_str();

        let entries: Vec<usize> = (0..calls.order.len())
            .filter(|&rank| !calls.successors[rank].is_empty())
            .filter(|&rank| {
                calls.in_degree[rank] == 0
                    || self.config.entry_names.iter().any(|name| name == label(rank))
            })
            .collect();

        let mut candidates: Vec<Vec<usize>> = Vec::new();
        for &entry in &entries {
            let mut found = Vec::new();
            self.walk(&calls, &mut vec![entry], &mut found);
            candidates.extend(found.into_iter().filter(|steps| steps.len() >= 2));
        }

        // ranks follow id order, so comparing rank sequences compares id sequences
        candidates.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
        candidates.dedup();

        let mut selected: Vec<Vec<usize>> = Vec::new();
        let mut per_entry: HashMap<usize, usize> = HashMap::new();
        for steps in candidates {
            if selected.len() >= self.config.max_flows {
                break;
            }
            let taken = per_entry.entry(steps[0]).or_insert(0);
            if *taken >= self.config.max_flows_per_entry {
                continue;
            }
            let covered = selected
                .iter()
                .any(|kept| kept.windows(steps.len()).any(|window| window == steps.as_slice()));
            if covered {
                continue;
            }
            *taken += 1;
            selected.push(steps);
        }

        let community_of: HashMap<&str, usize> = communities
            .iter()
            .enumerate()
            .flat_map(|(pos, community)| {
                community
                    .member_ids
                    .iter()
                    .map(move |member| (member.as_str(), pos))
            })
            .collect();

        let flows: Vec<ProcessFlow> = selected
            .into_iter()
            .enumerate()
            .map(|(position, ranks)| {
                let steps: Vec<String> = ranks
                    .iter()
                    .map(|&rank| graph.nodes[calls.order[rank]].id.clone())
                    .collect();
                let touched: BTreeSet<usize> = steps
                    .iter()
                    .filter_map(|step| community_of.get(step.as_str()).copied())
                    .collect();
                let entry = ranks[0];
                let terminal = ranks[ranks.len() - 1];

                ProcessFlow {
                    id: format!("process:{}", position + 1),
                    name: format!("{} → {}", label(entry), label(terminal)),
                    entry_point: steps[0].clone(),
                    terminal_point: steps[steps.len() - 1].clone(),
                    step_count: steps.len(),
                    cross_community: touched.len() > 1,
                    steps,
                }
            })
            .collect();

        log::debug!(
            "Extracted {} process flows from {} entry points",
            flows.len(),
            entries.len()
        );
        flows
    }

    /// Depth-first enumeration with an on-path cycle guard
    fn walk(&self, calls: &CallGraph, path: &mut Vec<usize>, found: &mut Vec<Vec<usize>>) {
        if found.len() >= self.config.max_paths_per_entry {
            return;
        }
        let Some(&current) = path.last() else {
            return;
        };

        let next: Vec<usize> = calls.successors[current]
            .iter()
            .copied()
            .filter(|successor| !path.contains(successor))
            .collect();

        if next.is_empty() || path.len() >= self.config.max_depth.max(2) {
            found.push(path.clone());
            return;
        }

        for successor in next {
            path.push(successor);
            self.walk(calls, path, found);
            path.pop();
            if found.len() >= self.config.max_paths_per_entry {
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CodeEdge, CodeNode, NodeKind};
    use codemap_parser::Language;

    fn function(id: &str) -> CodeNode {
        CodeNode {
            id: id.to_string(),
            kind: NodeKind::Function,
            label: id.to_string(),
            file_path: "app.ts".to_string(),
            directory: String::new(),
            language: Language::TypeScript,
            line_start: Some(1),
        }
    }

    fn call_graph(ids: &[&str], calls: &[(&str, &str)]) -> CodeGraph {
        let mut graph = CodeGraph::new("o", "r", "main");
        graph.nodes = ids.iter().map(|id| function(id)).collect();
        graph.edges = calls
            .iter()
            .map(|(from, to)| CodeEdge::new(from, to, EdgeKind::Calls, 1.0))
            .collect();
        graph
    }

    fn steps(flows: &[ProcessFlow]) -> Vec<Vec<&str>> {
        flows
            .iter()
            .map(|flow| flow.steps.iter().map(String::as_str).collect())
            .collect()
    }

    #[test]
    fn longest_paths_first_and_sub_paths_skipped() {
        let graph = call_graph(
            &["a", "b", "c", "d", "e"],
            &[("a", "b"), ("b", "c"), ("c", "d"), ("a", "e"), ("e", "d")],
        );
        let flows = FlowExtractor::default().extract(&graph, &[]);

        assert_eq!(steps(&flows), vec![vec!["a", "b", "c", "d"], vec!["a", "e", "d"]]);
        assert_eq!(flows[0].id, "process:1");
        assert_eq!(flows[0].name, "a → d");
        assert_eq!(flows[0].entry_point, "a");
        assert_eq!(flows[0].terminal_point, "d");
        assert_eq!(flows[0].step_count, 4);
    }

    #[test]
    fn cycles_end_the_path_instead_of_looping() {
        let graph = call_graph(
            &["main", "loop_a", "loop_b"],
            &[("main", "loop_a"), ("loop_a", "loop_b"), ("loop_b", "loop_a")],
        );
        let flows = FlowExtractor::default().extract(&graph, &[]);

        assert_eq!(steps(&flows), vec![vec!["main", "loop_a", "loop_b"]]);
    }

    #[test]
    fn named_entries_count_even_when_called() {
        let graph = call_graph(
            &["boot", "run", "work"],
            &[("boot", "run"), ("run", "work")],
        );
        let config = FlowConfig {
            max_flows_per_entry: 1,
            ..FlowConfig::default()
        };
        let flows = FlowExtractor::new(config).extract(&graph, &[]);

        // `run → work` is a sub-path of `boot → run → work`
        assert_eq!(steps(&flows), vec![vec!["boot", "run", "work"]]);
    }

    #[test]
    fn depth_and_count_limits_apply() {
        let graph = call_graph(
            &["a", "b", "c", "d"],
            &[("a", "b"), ("b", "c"), ("c", "d")],
        );
        let config = FlowConfig {
            max_depth: 2,
            ..FlowConfig::default()
        };
        let flows = FlowExtractor::new(config).extract(&graph, &[]);
        assert_eq!(steps(&flows), vec![vec!["a", "b"]]);

        let config = FlowConfig {
            max_flows: 0,
            ..FlowConfig::default()
        };
        assert!(FlowExtractor::new(config).extract(&graph, &[]).is_empty());
    }

    #[test]
    fn cross_community_flags_paths_spanning_clusters() {
        let graph = call_graph(&["a", "b", "c"], &[("a", "b"), ("b", "c")]);
        let community = |id: &str, members: &[&str]| Community {
            id: id.to_string(),
            name: id.to_string(),
            keywords: Vec::new(),
            cohesion: 1.0,
            symbol_count: members.len(),
            member_ids: members.iter().map(ToString::to_string).collect(),
        };

        let same = [community("community:1", &["a", "b", "c"])];
        assert!(!FlowExtractor::default().extract(&graph, &same)[0].cross_community);

        let split = [
            community("community:1", &["a", "b"]),
            community("community:2", &["c"]),
        ];
        assert!(FlowExtractor::default().extract(&graph, &split)[0].cross_community);
    }
}
