use crate::embedder::Embedder;
use crate::error::{EmbeddingError, Result};
use crate::templates::EmbeddingTemplates;
use codemap_graph::CodeNode;
use ndarray::{Array1, ArrayView1};
use std::collections::HashMap;

/// Node id -> unit-length embedding
#[derive(Debug, Clone, Default)]
pub struct VectorStore {
    dimension: usize,
    vectors: HashMap<String, Array1<f32>>,
}

impl VectorStore {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            vectors: HashMap::new(),
        }
    }

    /// Embed every node of a graph, `batch_size` texts per request
    pub async fn embed_nodes(
        embedder: &dyn Embedder,
        templates: &EmbeddingTemplates,
        nodes: &[CodeNode],
        batch_size: usize,
    ) -> Result<Self> {
        let mut store = Self::new(embedder.dimension());
        for chunk in nodes.chunks(batch_size.max(1)) {
            let texts = chunk
                .iter()
                .map(|node| templates.render_node(node))
                .collect::<Result<Vec<String>>>()?;
            let vectors = embedder.embed_batch(&texts).await?;
            for (node, vector) in chunk.iter().zip(vectors) {
                store.insert(&node.id, vector)?;
            }
        }
        log::debug!(
            "Embedded {} nodes with {} ({} dimensions)",
            store.len(),
            embedder.name(),
            store.dimension
        );
        Ok(store)
    }

    pub fn insert(&mut self, id: &str, vector: Vec<f32>) -> Result<()> {
        if vector.len() != self.dimension {
            return Err(EmbeddingError::DimensionMismatch {
                expected: self.dimension,
                actual: vector.len(),
            });
        }
        self.vectors
            .insert(id.to_string(), normalized(Array1::from(vector)));
        Ok(())
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<ArrayView1<'_, f32>> {
        self.vectors.get(id).map(|vector| vector.view())
    }

    #[must_use]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    /// Cosine similarity of every stored vector at or above `min_score`, best first
    pub fn search(&self, query: &[f32], min_score: f32) -> Result<Vec<(String, f32)>> {
        if query.len() != self.dimension {
            return Err(EmbeddingError::DimensionMismatch {
                expected: self.dimension,
                actual: query.len(),
            });
        }
        let query = normalized(Array1::from(query.to_vec()));
        if query.iter().all(|v| *v == 0.0) {
            return Ok(Vec::new());
        }

        let mut scored: Vec<(String, f32)> = self
            .vectors
            .iter()
            .map(|(id, vector)| (id.clone(), vector.dot(&query)))
            .filter(|(_, score)| score.is_finite() && *score >= min_score)
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        Ok(scored)
    }
}

fn normalized(vector: Array1<f32>) -> Array1<f32> {
    let norm = vector.dot(&vector).sqrt();
    if norm > 0.0 && norm.is_finite() {
        vector / norm
    } else {
        vector
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedder::HashingEmbedder;
    use codemap_graph::{Language, NodeKind};
    use pretty_assertions::assert_eq;

    fn node(id: &str, label: &str) -> CodeNode {
        CodeNode {
            id: id.to_string(),
            kind: NodeKind::Function,
            label: label.to_string(),
            file_path: "src/app.ts".to_string(),
            directory: "src".to_string(),
            language: Language::TypeScript,
            line_start: Some(1),
        }
    }

    #[test]
    fn search_ranks_by_cosine() {
        let mut store = VectorStore::new(2);
        store.insert("a", vec![1.0, 0.0]).unwrap();
        store.insert("b", vec![1.0, 1.0]).unwrap();
        store.insert("c", vec![0.0, 3.0]).unwrap();

        let ranked = store.search(&[2.0, 0.0], 0.5).unwrap();
        let ids: Vec<&str> = ranked.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert!((ranked[0].1 - 1.0).abs() < 1e-6);
    }

    #[test]
    fn dimension_is_enforced() {
        let mut store = VectorStore::new(3);
        assert_eq!(
            store.insert("a", vec![1.0]),
            Err(EmbeddingError::DimensionMismatch {
                expected: 3,
                actual: 1
            })
        );
        assert!(store.search(&[1.0, 0.0], 0.0).is_err());
        assert!(store.search(&[0.0, 0.0, 0.0], 0.0).unwrap().is_empty());
    }

    #[tokio::test]
    async fn embeds_every_node_in_batches() {
        let nodes = vec![
            node("function:src/app.ts:verifyToken", "verifyToken"),
            node("function:src/app.ts:renderInvoice", "renderInvoice"),
            node("function:src/app.ts:chargeCard", "chargeCard"),
        ];
        let embedder = HashingEmbedder::new(128);
        let store =
            VectorStore::embed_nodes(&embedder, &EmbeddingTemplates::default(), &nodes, 2)
                .await
                .unwrap();

        assert_eq!(store.len(), 3);
        let query = embedder.embed_text("verify token");
        let ranked = store.search(&query, 0.0).unwrap();
        assert_eq!(ranked[0].0, "function:src/app.ts:verifyToken");
    }
}
