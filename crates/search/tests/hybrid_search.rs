use codemap_graph::{CodeGraph, GraphBuilder, Language, SourceFile};
use codemap_search::{HybridSearch, SearchConfig, SearchSource};
use codemap_vector_store::{EmbeddingTemplates, HashingEmbedder, VectorStore};
use pretty_assertions::assert_eq;
use std::collections::HashSet;
use std::sync::Arc;

fn graph() -> Arc<CodeGraph> {
    let files = vec![
        SourceFile::new(
            "src/auth/token.ts",
            Language::TypeScript,
            "export function verifyToken(raw: string) {\n    return decodeToken(raw);\n}\n\nfunction decodeToken(raw: string) {\n    return raw;\n}\n",
        ),
        SourceFile::new(
            "src/billing/invoice.ts",
            Language::TypeScript,
            "export class InvoiceRenderer {\n    render() {\n        return log('render');\n    }\n}\n\nexport function log(message: string) {\n    return message;\n}\n",
        ),
        SourceFile::new(
            "src/util/log.ts",
            Language::TypeScript,
            "export function log(message: string) {\n    return message;\n}\n",
        ),
    ];
    let (graph, _) = GraphBuilder::default()
        .build("acme", "shop", "main", files)
        .expect("build succeeds");
    Arc::new(graph)
}

async fn semantic_index(graph: &Arc<CodeGraph>) -> (HybridSearch, HashingEmbedder) {
    let embedder = HashingEmbedder::default();
    let vectors = VectorStore::embed_nodes(&embedder, &EmbeddingTemplates::default(), &graph.nodes, 16)
        .await
        .expect("hashing never fails");
    let search = HybridSearch::new(Arc::clone(graph), Some(Arc::new(vectors)), SearchConfig::default());
    (search, embedder)
}

#[tokio::test]
async fn fusion_keeps_every_channel_hit() {
    let graph = graph();
    let (search, embedder) = semantic_index(&graph).await;
    assert!(search.has_semantic());

    for query in ["token", "verify auth", "invoice render", "log"] {
        let embedding = embedder.embed_text(query);
        let lexical: HashSet<&str> = search
            .lexical_scores(query)
            .into_iter()
            .map(|(pos, _)| graph.nodes[pos].id.as_str())
            .collect();
        let semantic: HashSet<&str> = search
            .semantic_scores(&embedding)
            .unwrap()
            .into_iter()
            .map(|(pos, _)| graph.nodes[pos].id.as_str())
            .collect();

        let fused = search.search(query, Some(embedding.as_slice()), None).unwrap();
        assert!(!fused.is_empty(), "{query} found nothing");

        for id in &lexical {
            let hit = fused.iter().find(|r| r.node_id == *id).expect("lexical hit kept");
            assert!(hit.sources.contains(&SearchSource::Lexical));
        }
        for id in &semantic {
            let hit = fused.iter().find(|r| r.node_id == *id).expect("semantic hit kept");
            assert!(hit.sources.contains(&SearchSource::Semantic));
        }
        assert_eq!(fused.len(), lexical.union(&semantic).count());
    }
}

#[tokio::test]
async fn results_are_sorted_with_id_tie_break() {
    let graph = graph();
    let (search, embedder) = semantic_index(&graph).await;
    let embedding = embedder.embed_text("verifyToken");

    let results = search.search("verifyToken", Some(embedding.as_slice()), None).unwrap();
    assert_eq!(results[0].node_id, "function:src/auth/token.ts:verifyToken");
    for pair in results.windows(2) {
        assert!(
            pair[0].score > pair[1].score
                || (pair[0].score == pair[1].score && pair[0].node_id < pair[1].node_id)
        );
    }
}

#[test]
fn lexical_only_without_vectors() {
    let files = ["src/a.ts", "src/b.ts"]
        .into_iter()
        .map(|path| {
            SourceFile::new(path, Language::TypeScript, "export function helper() {\n    return 1;\n}\n")
        })
        .collect();
    let (graph, _) = GraphBuilder::default()
        .build("acme", "shop", "main", files)
        .expect("build succeeds");
    let search = HybridSearch::new(Arc::new(graph), None, SearchConfig::default());
    assert!(!search.has_semantic());

    let results = search.search("helper", None, None).unwrap();
    let ids: Vec<&str> = results.iter().map(|r| r.node_id.as_str()).collect();
    // equal scores fall back to node id order
    assert_eq!(ids, vec!["function:src/a.ts:helper", "function:src/b.ts:helper"]);
    assert_eq!(results[0].score, results[1].score);
    assert!(results
        .iter()
        .all(|r| r.sources == [SearchSource::Lexical].into_iter().collect()));
}

#[test]
fn limit_truncates() {
    let graph = graph();
    let search = HybridSearch::new(Arc::clone(&graph), None, SearchConfig::default());

    let all = search.search("src", None, Some(100)).unwrap();
    let two = search.search("src", None, Some(2)).unwrap();
    assert!(all.len() > 2);
    assert_eq!(two, all[..2].to_vec());
}

#[tokio::test]
async fn empty_and_unmatched_queries_return_nothing() {
    let graph = graph();
    let (search, embedder) = semantic_index(&graph).await;

    assert!(search.search("   ", Some(embedder.embed_text("x").as_slice()), None).unwrap().is_empty());
    assert!(search.search("qqqxyz", None, None).unwrap().is_empty());
}

#[test]
fn mismatched_query_embedding_is_an_error() {
    let graph = graph();
    let mut store = VectorStore::new(4);
    store.insert(&graph.nodes[0].id, vec![1.0, 0.0, 0.0, 0.0]).unwrap();
    let search = HybridSearch::new(Arc::clone(&graph), Some(Arc::new(store)), SearchConfig::default());

    assert!(search.search("token", Some(&[1.0f32, 0.0][..]), None).is_err());
}

#[test]
fn default_search_keeps_every_lexical_hit() {
    let files = (0..30)
        .map(|i| {
            SourceFile::new(
                format!("src/token{i}.ts"),
                Language::TypeScript,
                format!("export function token{i}() {{\n    return {i};\n}}\n"),
            )
        })
        .collect();
    let (graph, _) = GraphBuilder::default()
        .build("acme", "shop", "main", files)
        .expect("build succeeds");
    let graph = Arc::new(graph);
    let search = HybridSearch::new(Arc::clone(&graph), None, SearchConfig::default());

    let lexical = search.lexical_scores("token");
    assert!(lexical.len() > 20);

    let fused = search.search("token", None, None).unwrap();
    assert_eq!(fused.len(), lexical.len());

    let capped = HybridSearch::new(
        graph,
        None,
        SearchConfig {
            limit: Some(5),
            ..SearchConfig::default()
        },
    );
    assert_eq!(capped.search("token", None, None).unwrap().len(), 5);
    assert_eq!(search.search("token", None, Some(7)).unwrap().len(), 7);
}
