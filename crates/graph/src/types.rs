use chrono::{DateTime, Utc};
use codemap_parser::{DeclKind, Language};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Kind of a graph node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    File,
    Function,
    Class,
    Interface,
    Type,
    Variable,
}

impl NodeKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::File => "file",
            Self::Function => "function",
            Self::Class => "class",
            Self::Interface => "interface",
            Self::Type => "type",
            Self::Variable => "variable",
        }
    }

    /// Symbols that can be the target of a call
    pub const fn is_callable(self) -> bool {
        matches!(self, Self::Function | Self::Class)
    }
}

impl From<DeclKind> for NodeKind {
    fn from(kind: DeclKind) -> Self {
        match kind {
            DeclKind::Function => Self::Function,
            DeclKind::Class => Self::Class,
            DeclKind::Interface => Self::Interface,
            DeclKind::Type => Self::Type,
            DeclKind::Variable => Self::Variable,
        }
    }
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A symbol in the code graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeNode {
    pub id: String,
    pub kind: NodeKind,
    pub label: String,
    pub file_path: String,
    pub directory: String,
    pub language: Language,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_start: Option<u32>,
}

impl CodeNode {
    pub fn is_file(&self) -> bool {
        self.kind == NodeKind::File
    }
}

/// Relation carried by an edge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    Imports,
    Calls,
    DefinedIn,
}

impl EdgeKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Imports => "imports",
            Self::Calls => "calls",
            Self::DefinedIn => "defined_in",
        }
    }
}

impl std::fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A directed, typed, weighted relation between two nodes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeEdge {
    pub id: String,
    pub source: String,
    pub target: String,
    #[serde(rename = "type")]
    pub kind: EdgeKind,
    /// Resolution confidence in `[0, 1]`
    pub weight: f32,
}

impl CodeEdge {
    pub fn new(source: &str, target: &str, kind: EdgeKind, weight: f32) -> Self {
        Self {
            id: edge_id(source, kind, target),
            source: source.to_string(),
            target: target.to_string(),
            kind,
            weight: weight.clamp(0.0, 1.0),
        }
    }
}

/// Deterministic edge id: `edge:{source}->{type}:{target}`
pub fn edge_id(source: &str, kind: EdgeKind, target: &str) -> String {
    format!("edge:{source}->{}:{target}", kind.as_str())
}

/// A cluster of related nodes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Community {
    pub id: String,
    pub name: String,
    pub keywords: Vec<String>,
    pub cohesion: f32,
    pub symbol_count: usize,
    pub member_ids: Vec<String>,
}

/// A representative acyclic call path from an entry symbol to a terminal symbol
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessFlow {
    pub id: String,
    pub name: String,
    pub entry_point: String,
    pub terminal_point: String,
    pub steps: Vec<String>,
    pub step_count: usize,
    pub cross_community: bool,
}

/// Immutable snapshot of one repository branch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeGraph {
    pub repo_owner: String,
    pub repo_name: String,
    pub branch: String,
    pub fetched_at: DateTime<Utc>,
    pub nodes: Vec<CodeNode>,
    pub edges: Vec<CodeEdge>,
    pub communities: Vec<Community>,
    pub processes: Vec<ProcessFlow>,
}

impl CodeGraph {
    pub fn new(
        repo_owner: impl Into<String>,
        repo_name: impl Into<String>,
        branch: impl Into<String>,
    ) -> Self {
        Self {
            repo_owner: repo_owner.into(),
            repo_name: repo_name.into(),
            branch: branch.into(),
            fetched_at: Utc::now(),
            nodes: Vec::new(),
            edges: Vec::new(),
            communities: Vec::new(),
            processes: Vec::new(),
        }
    }

    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Linear lookup; use [`crate::GraphIndex`] for repeated queries
    #[must_use]
    pub fn node(&self, id: &str) -> Option<&CodeNode> {
        self.nodes.iter().find(|node| node.id == id)
    }

    pub fn edges_of_kind(&self, kind: EdgeKind) -> impl Iterator<Item = &CodeEdge> {
        self.edges.iter().filter(move |edge| edge.kind == kind)
    }
}

/// A neighbour reached over a `calls` edge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectedNode {
    pub node: CodeNode,
    pub confidence: f32,
}

/// Callers, callees, community and flows around one node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeContext {
    pub node: CodeNode,
    pub callers: Vec<ConnectedNode>,
    pub callees: Vec<ConnectedNode>,
    pub community: Option<Community>,
    pub processes: Vec<ProcessFlow>,
}

/// Nodes bucketed by hop distance from the seed set
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImpactReport {
    pub depth1: BTreeSet<String>,
    pub depth2: BTreeSet<String>,
    pub depth3: BTreeSet<String>,
}

impl ImpactReport {
    /// Bucket for hop distance `depth` (1-based)
    pub fn bucket_mut(&mut self, depth: usize) -> Option<&mut BTreeSet<String>> {
        match depth {
            1 => Some(&mut self.depth1),
            2 => Some(&mut self.depth2),
            3 => Some(&mut self.depth3),
            _ => None,
        }
    }
}
