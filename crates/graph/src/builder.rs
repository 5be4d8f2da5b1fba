use crate::error::{GraphError, Result};
use crate::resolver::{file_name, normalize_path, parent_dir, FileTable, SymbolTable};
use crate::types::{CodeEdge, CodeGraph, CodeNode, EdgeKind, NodeKind};
use codemap_parser::{parse_source, Language, Mention, ParseFailure, ParsedFile};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Weight of the edge from every symbol to its enclosing file
pub const DEFINED_IN_WEIGHT: f32 = 0.3;

/// One file of a repository snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFile {
    pub path: String,
    pub language: Language,
    pub content: String,
}

impl SourceFile {
    pub fn new(path: impl Into<String>, language: Language, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            language,
            content: content.into(),
        }
    }

    /// Language from the host's tag when recognised, else from the extension
    pub fn detect(path: impl Into<String>, tag: &str, content: impl Into<String>) -> Self {
        let path = path.into();
        let language = Language::detect(tag, &path);
        Self::new(path, language, content)
    }
}

/// Import edge confidence by resolution strategy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportWeights {
    /// Specifier names an existing path literally
    pub exact: f32,
    /// Extension or index file appended
    pub completed: f32,
    /// Dotted or `::` module path mapped onto a file
    pub module: f32,
    pub alias_unique: f32,
    pub alias_ambiguous: f32,
}

impl Default for ImportWeights {
    fn default() -> Self {
        Self {
            exact: 1.0,
            completed: 0.9,
            module: 0.8,
            alias_unique: 0.6,
            alias_ambiguous: 0.4,
        }
    }
}

/// Call edge confidence by lookup distance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CallWeights {
    pub same_file: f32,
    pub same_directory: f32,
    pub global_unique: f32,
    pub global_ambiguous: f32,
}

impl Default for CallWeights {
    fn default() -> Self {
        Self {
            same_file: 1.0,
            same_directory: 0.8,
            global_unique: 0.6,
            global_ambiguous: 0.4,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuilderConfig {
    pub imports: ImportWeights,
    pub calls: CallWeights,
}

/// Summary of one build
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildReport {
    pub files: usize,
    pub nodes: usize,
    pub edges: usize,
    pub parse_failures: Vec<ParseFailure>,
    /// Mentions that resolved to no node
    pub dropped_mentions: usize,
    pub duration_ms: u64,
}

/// Node indices created for one file during collection
struct FileEntry {
    node: usize,
    /// Indexed like the file's declarations
    decls: Vec<usize>,
}

/// Two-phase graph builder: parallel collection, then single-threaded resolution
pub struct GraphBuilder {
    config: BuilderConfig,
    cancel: Arc<AtomicBool>,
}

impl Default for GraphBuilder {
    fn default() -> Self {
        Self::new(BuilderConfig::default())
    }
}

impl GraphBuilder {
    pub fn new(config: BuilderConfig) -> Self {
        Self {
            config,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Share a cancellation flag; setting it aborts the build between files
    #[must_use]
    pub fn with_cancel_flag(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = cancel;
        self
    }

    fn check_cancelled(&self) -> Result<()> {
        if self.cancel.load(Ordering::Relaxed) {
            Err(GraphError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Build the node and edge sets of a snapshot. Communities and processes are left empty.
    pub fn build(
        &self,
        repo_owner: &str,
        repo_name: &str,
        branch: &str,
        files: Vec<SourceFile>,
    ) -> Result<(CodeGraph, BuildReport)> {
        let started = Instant::now();
        let files = canonical_files(files);

        // Phase 1: parse every file independently
        let parsed = files
            .par_iter()
            .map(|file| {
                self.check_cancelled()?;
                Ok(parse_source(&file.path, file.language, &file.content))
            })
            .collect::<Result<Vec<ParsedFile>>>()?;

        let parse_failures: Vec<ParseFailure> = parsed
            .iter()
            .filter_map(|file| file.failure.clone())
            .collect();
        for failure in &parse_failures {
            log::warn!("{failure}");
        }

        let (nodes, entries) = collect_nodes(&parsed);
        self.check_cancelled()?;

        // Phase 2: resolve mentions against the complete node set
        let (edges, dropped_mentions) = self.resolve(&parsed, &nodes, &entries);

        let mut graph = CodeGraph::new(repo_owner, repo_name, branch);
        graph.nodes = nodes;
        graph.edges = edges;

        let report = BuildReport {
            files: parsed.len(),
            nodes: graph.node_count(),
            edges: graph.edge_count(),
            parse_failures,
            dropped_mentions,
            duration_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        };

        log::info!(
            "Built code graph for {repo_owner}/{repo_name}@{branch}: {} files, {} nodes, {} edges, {} dropped mentions in {}ms",
            report.files,
            report.nodes,
            report.edges,
            report.dropped_mentions,
            report.duration_ms
        );

        Ok((graph, report))
    }

    fn resolve(
        &self,
        parsed: &[ParsedFile],
        nodes: &[CodeNode],
        entries: &[FileEntry],
    ) -> (Vec<CodeEdge>, usize) {
        let files = FileTable::new(
            parsed
                .iter()
                .zip(entries)
                .map(|(file, entry)| (file.path.as_str(), entry.node)),
        );
        let symbols = SymbolTable::new(nodes);

        let mut edges = EdgeSet::default();
        let mut dropped = 0usize;

        for (file, entry) in parsed.iter().zip(entries) {
            let file_id = nodes[entry.node].id.as_str();

            for &decl in &entry.decls {
                edges.insert(CodeEdge::new(
                    &nodes[decl].id,
                    file_id,
                    EdgeKind::DefinedIn,
                    DEFINED_IN_WEIGHT,
                ));
            }

            for mention in &file.mentions {
                let resolved = match mention {
                    Mention::Import { target, style, .. } => files
                        .resolve(&file.path, file.language, target, *style, &self.config.imports)
                        .map(|found| (entry.node, found, EdgeKind::Imports)),
                    Mention::Call { name, scope, .. } => {
                        let origin = scope
                            .and_then(|idx| entry.decls.get(idx).copied())
                            .unwrap_or(entry.node);
                        symbols
                            .resolve(nodes, origin, name, &self.config.calls)
                            .map(|found| (origin, found, EdgeKind::Calls))
                    }
                };

                match resolved {
                    Some((origin, found, kind)) => edges.insert(CodeEdge::new(
                        &nodes[origin].id,
                        &nodes[found.node].id,
                        kind,
                        found.weight,
                    )),
                    None => dropped += 1,
                }
            }
        }

        (edges.into_sorted(), dropped)
    }
}

/// Normalise paths, order by path and keep the first of any duplicates
fn canonical_files(files: Vec<SourceFile>) -> Vec<SourceFile> {
    let mut files: Vec<SourceFile> = files
        .into_iter()
        .map(|mut file| {
            file.path = normalize_path(&file.path);
            file
        })
        .filter(|file| !file.path.is_empty())
        .collect();
    files.sort_by(|a, b| a.path.cmp(&b.path));
    files.dedup_by(|later, first| later.path == first.path);
    files
}

/// Phase 1 output: nodes ordered by file path then source order
fn collect_nodes(parsed: &[ParsedFile]) -> (Vec<CodeNode>, Vec<FileEntry>) {
    let mut nodes = Vec::new();
    let mut entries = Vec::with_capacity(parsed.len());

    for file in parsed {
        let directory = parent_dir(&file.path).to_string();
        let file_node = nodes.len();
        nodes.push(CodeNode {
            id: format!("{}:{}", NodeKind::File, file.path),
            kind: NodeKind::File,
            label: file_name(&file.path).to_string(),
            file_path: file.path.clone(),
            directory: directory.clone(),
            language: file.language,
            line_start: None,
        });

        let mut seen: HashMap<String, usize> = HashMap::new();
        let mut decls = Vec::with_capacity(file.declarations.len());
        for decl in &file.declarations {
            let kind = NodeKind::from(decl.kind);
            let base_id = format!("{kind}:{}:{}", file.path, decl.qualified_name());
            let occurrence = seen.entry(base_id.clone()).or_insert(0);
            *occurrence += 1;
            let id = if *occurrence == 1 {
                base_id
            } else {
                format!("{base_id}#{occurrence}")
            };

            decls.push(nodes.len());
            nodes.push(CodeNode {
                id,
                kind,
                label: decl.name.clone(),
                file_path: file.path.clone(),
                directory: directory.clone(),
                language: file.language,
                line_start: Some(decl.line),
            });
        }

        entries.push(FileEntry {
            node: file_node,
            decls,
        });
    }

    (nodes, entries)
}

/// Edges keyed by deterministic id; a repeated edge keeps its highest weight
#[derive(Default)]
struct EdgeSet {
    edges: BTreeMap<String, CodeEdge>,
}

impl EdgeSet {
    fn insert(&mut self, edge: CodeEdge) {
        match self.edges.get_mut(&edge.id) {
            Some(existing) => existing.weight = existing.weight.max(edge.weight),
            None => {
                self.edges.insert(edge.id.clone(), edge);
            }
        }
    }

    fn into_sorted(self) -> Vec<CodeEdge> {
        self.edges.into_values().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(path: &str, content: &str) -> SourceFile {
        SourceFile::new(path, Language::TypeScript, content)
    }

    fn edge_ids(graph: &CodeGraph) -> Vec<&str> {
        graph.edges.iter().map(|edge| edge.id.as_str()).collect()
    }

    #[test]
    fn repeated_symbols_get_occurrence_suffixes() {
        let files = vec![ts(
            "a.ts",
            "function f() {}\nfunction f() {}\nfunction f() {}\n",
        )];
        let (graph, _) = GraphBuilder::default().build("o", "r", "main", files).unwrap();

        let ids: Vec<&str> = graph.nodes.iter().map(|node| node.id.as_str()).collect();
        assert_eq!(
            ids,
            vec![
                "file:a.ts",
                "function:a.ts:f",
                "function:a.ts:f#2",
                "function:a.ts:f#3"
            ]
        );
    }

    #[test]
    fn calls_prefer_the_same_file_then_directory() {
        let files = vec![
            ts("src/a.ts", "export function main() { helper(); util(); remote(); }\nfunction helper() {}\n"),
            ts("src/b.ts", "export function helper() {}\nexport function util() {}\n"),
            ts("lib/c.ts", "export function util() {}\nexport function remote() {}\n"),
        ];
        let (graph, _) = GraphBuilder::default().build("o", "r", "main", files).unwrap();

        let weight = |target: &str| {
            graph
                .edges
                .iter()
                .find(|edge| edge.kind == EdgeKind::Calls && edge.target == target)
                .map(|edge| edge.weight)
        };
        assert_eq!(weight("function:src/a.ts:helper"), Some(1.0));
        assert_eq!(weight("function:src/b.ts:helper"), None);
        assert_eq!(weight("function:src/b.ts:util"), Some(0.8));
        assert_eq!(weight("function:lib/c.ts:remote"), Some(0.6));
    }

    #[test]
    fn recursion_and_unresolved_calls_are_dropped() {
        let files = vec![ts("a.ts", "function walk() { walk(); missing(); }\n")];
        let (graph, report) = GraphBuilder::default().build("o", "r", "main", files).unwrap();

        assert_eq!(
            edge_ids(&graph),
            vec!["edge:function:a.ts:walk->defined_in:file:a.ts"]
        );
        assert_eq!(report.dropped_mentions, 2);
    }

    #[test]
    fn duplicate_paths_keep_the_first_file() {
        let files = vec![
            ts("./src/a.ts", "function first() {}"),
            ts("src/a.ts", "function second() {}"),
        ];
        let (graph, report) = GraphBuilder::default().build("o", "r", "main", files).unwrap();

        assert_eq!(report.files, 1);
        assert!(graph.node("function:src/a.ts:first").is_some());
        assert!(graph.node("function:src/a.ts:second").is_none());
    }

    #[test]
    fn cancelled_builds_return_an_error() {
        let cancel = Arc::new(AtomicBool::new(true));
        let builder = GraphBuilder::default().with_cancel_flag(cancel);
        let result = builder.build("o", "r", "main", vec![ts("a.ts", "function f() {}")]);

        assert_eq!(result.unwrap_err(), GraphError::Cancelled);
    }
}
