use crate::error::Result;
use crate::fusion::{fuse, SearchSource};
use crate::lexical::LexicalIndex;
use codemap_graph::{CodeGraph, NodeKind};
use codemap_vector_store::VectorStore;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub lexical_weight: f32,
    pub semantic_weight: f32,
    /// Cap used when the caller gives no limit; unset returns every hit
    pub limit: Option<usize>,
    /// Cosine similarity below which the semantic channel stays silent
    pub min_semantic_score: f32,
    /// Normalised fuzzy score below which a label match is ignored
    pub min_fuzzy_score: f32,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            lexical_weight: 0.5,
            semantic_weight: 0.5,
            limit: None,
            min_semantic_score: 0.2,
            min_fuzzy_score: 0.35,
        }
    }
}

/// One ranked node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    pub node_id: String,
    #[serde(rename = "type")]
    pub kind: NodeKind,
    pub label: String,
    pub file_path: String,
    pub score: f32,
    pub sources: BTreeSet<SearchSource>,
}

/// Lexical and semantic channels over one graph snapshot.
///
/// Read-only after construction; queries share it without locking.
#[derive(Debug, Clone)]
pub struct HybridSearch {
    graph: Arc<CodeGraph>,
    lexical: LexicalIndex,
    vectors: Option<Arc<VectorStore>>,
    positions: HashMap<String, usize>,
    config: SearchConfig,
}

impl HybridSearch {
    pub fn new(graph: Arc<CodeGraph>, vectors: Option<Arc<VectorStore>>, config: SearchConfig) -> Self {
        let lexical = LexicalIndex::new(&graph.nodes);
        let positions = graph
            .nodes
            .iter()
            .enumerate()
            .map(|(pos, node)| (node.id.clone(), pos))
            .collect();
        Self {
            graph,
            lexical,
            vectors,
            positions,
            config,
        }
    }

    #[must_use]
    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// Whether node vectors exist for the semantic channel
    #[must_use]
    pub fn has_semantic(&self) -> bool {
        self.vectors.as_ref().is_some_and(|vectors| !vectors.is_empty())
    }

    /// Lexical channel alone, keyed by node position
    pub fn lexical_scores(&self, query: &str) -> Vec<(usize, f32)> {
        self.lexical.scores(query, self.config.min_fuzzy_score)
    }

    /// Semantic channel alone; empty without node vectors
    pub fn semantic_scores(&self, query_embedding: &[f32]) -> Result<Vec<(usize, f32)>> {
        let Some(vectors) = &self.vectors else {
            return Ok(Vec::new());
        };
        let ranked = vectors.search(query_embedding, self.config.min_semantic_score)?;
        Ok(ranked
            .into_iter()
            .filter_map(|(id, score)| self.positions.get(&id).map(|&pos| (pos, score)))
            .collect())
    }

    /// Fused ranking. A blank query, or one neither channel matches, gives an empty list.
    ///
    /// Without `query_embedding` only the lexical channel runs. With no limit from the
    /// caller or the config, every node either channel surfaced is returned.
    pub fn search(
        &self,
        query: &str,
        query_embedding: Option<&[f32]>,
        limit: Option<usize>,
    ) -> Result<Vec<SearchResult>> {
        if query.trim().is_empty() {
            return Ok(Vec::new());
        }
        let limit = limit.or(self.config.limit);

        let lexical = self.lexical_scores(query);
        let semantic = match query_embedding {
            Some(embedding) => self.semantic_scores(embedding)?,
            None => Vec::new(),
        };
        log::debug!(
            "Search '{query}': lexical={} semantic={}",
            lexical.len(),
            semantic.len()
        );

        let mut fused = fuse(
            lexical,
            semantic,
            self.config.lexical_weight,
            self.config.semantic_weight,
        );
        fused.sort_by(|a, b| {
            b.score.total_cmp(&a.score).then_with(|| {
                self.graph.nodes[a.node]
                    .id
                    .cmp(&self.graph.nodes[b.node].id)
            })
        });
        if let Some(limit) = limit {
            fused.truncate(limit);
        }

        Ok(fused
            .into_iter()
            .map(|hit| {
                let node = &self.graph.nodes[hit.node];
                SearchResult {
                    node_id: node.id.clone(),
                    kind: node.kind,
                    label: node.label.clone(),
                    file_path: node.file_path.clone(),
                    score: hit.score,
                    sources: hit.sources,
                }
            })
            .collect())
    }
}
