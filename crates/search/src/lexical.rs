use codemap_graph::{text::split_words, CodeNode};
use nucleo_matcher::pattern::{CaseMatching, Normalization, Pattern};
use nucleo_matcher::{Matcher, Utf32Str};
use std::collections::{BTreeSet, HashMap};

const LABEL_WEIGHT: f32 = 3.0;
const KIND_WEIGHT: f32 = 1.0;
const PATH_WEIGHT: f32 = 1.0;

/// Weighted term frequencies per node plus document frequencies
#[derive(Debug, Clone)]
pub struct LexicalIndex {
    documents: Vec<HashMap<String, f32>>,
    document_frequency: HashMap<String, usize>,
    labels: Vec<String>,
    lower_labels: Vec<String>,
}

impl LexicalIndex {
    pub fn new(nodes: &[CodeNode]) -> Self {
        let mut documents = Vec::with_capacity(nodes.len());
        let mut document_frequency: HashMap<String, usize> = HashMap::new();

        for node in nodes {
            let mut terms: HashMap<String, f32> = HashMap::new();
            for word in split_words(&node.label) {
                *terms.entry(word).or_default() += LABEL_WEIGHT;
            }
            *terms.entry(node.kind.as_str().to_string()).or_default() += KIND_WEIGHT;
            for word in split_words(&node.file_path) {
                *terms.entry(word).or_default() += PATH_WEIGHT;
            }
            for term in terms.keys() {
                *document_frequency.entry(term.clone()).or_default() += 1;
            }
            documents.push(terms);
        }

        Self {
            documents,
            document_frequency,
            labels: nodes.iter().map(|node| node.label.clone()).collect(),
            lower_labels: nodes.iter().map(|node| node.label.to_lowercase()).collect(),
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn idf(&self, term: &str) -> f32 {
        let total = self.documents.len() as f32;
        let df = self.document_frequency.get(term).copied().unwrap_or(0) as f32;
        ((total + 1.0) / (df + 1.0)).ln() + 1.0
    }

    /// TF-IDF over label, kind and path terms; nodes sharing no term are absent
    pub fn term_scores(&self, query: &str) -> Vec<(usize, f32)> {
        let terms: BTreeSet<String> = split_words(query).into_iter().collect();
        if terms.is_empty() {
            return Vec::new();
        }
        let weighted: Vec<(&String, f32)> = terms
            .iter()
            .filter(|term| self.document_frequency.contains_key(*term))
            .map(|term| (term, self.idf(term)))
            .collect();

        self.documents
            .iter()
            .enumerate()
            .filter_map(|(idx, document)| {
                let score: f32 = weighted
                    .iter()
                    .filter_map(|(term, idf)| document.get(*term).map(|tf| tf * idf))
                    .sum();
                (score > 0.0).then_some((idx, score))
            })
            .collect()
    }

    /// Fuzzy label match normalised to the best hit; exact labels score 1.0
    #[allow(clippy::cast_precision_loss)]
    pub fn fuzzy_scores(&self, query: &str, min_score: f32) -> Vec<(usize, f32)> {
        let query = query.trim();
        if query.is_empty() {
            return Vec::new();
        }
        let pattern = Pattern::parse(query, CaseMatching::Smart, Normalization::Smart);
        let mut matcher = Matcher::new(nucleo_matcher::Config::DEFAULT);
        let exact = query.to_lowercase();
        let mut buf = Vec::new();

        let scored: Vec<(usize, u32, bool)> = self
            .labels
            .iter()
            .enumerate()
            .filter_map(|(idx, label)| {
                let score = pattern.score(Utf32Str::new(label, &mut buf), &mut matcher)?;
                Some((idx, score, self.lower_labels[idx] == exact))
            })
            .collect();

        let max_score = scored
            .iter()
            .map(|(_, score, _)| *score as f32)
            .fold(0.0f32, f32::max);

        scored
            .into_iter()
            .map(|(idx, score, exact_label)| {
                let normalized = if exact_label {
                    1.0
                } else if max_score > 0.0 {
                    score as f32 / max_score
                } else {
                    0.0
                };
                (idx, normalized)
            })
            .filter(|(_, score)| *score >= min_score)
            .collect()
    }

    /// Lexical channel: term score plus fuzzy bonus, keyed by node position
    pub fn scores(&self, query: &str, min_fuzzy_score: f32) -> Vec<(usize, f32)> {
        let mut combined: HashMap<usize, f32> = self.term_scores(query).into_iter().collect();
        for (idx, fuzzy) in self.fuzzy_scores(query, min_fuzzy_score) {
            *combined.entry(idx).or_default() += fuzzy;
        }
        let mut scores: Vec<(usize, f32)> = combined.into_iter().collect();
        scores.sort_by_key(|(idx, _)| *idx);
        scores
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use codemap_graph::{Language, NodeKind};

    fn node(kind: NodeKind, label: &str, path: &str) -> CodeNode {
        CodeNode {
            id: format!("{kind}:{path}:{label}"),
            kind,
            label: label.to_string(),
            file_path: path.to_string(),
            directory: String::new(),
            language: Language::TypeScript,
            line_start: Some(1),
        }
    }

    fn nodes() -> Vec<CodeNode> {
        vec![
            node(NodeKind::Function, "verifyToken", "src/auth/token.ts"),
            node(NodeKind::Function, "renderInvoice", "src/billing/invoice.ts"),
            node(NodeKind::Class, "TokenCache", "src/cache/store.ts"),
            node(NodeKind::Function, "loadStore", "src/auth/loader.ts"),
        ]
    }

    #[test]
    fn label_terms_outrank_path_terms() {
        let index = LexicalIndex::new(&nodes());
        let mut scores = index.term_scores("auth token");
        scores.sort_by(|a, b| b.1.total_cmp(&a.1));

        let order: Vec<usize> = scores.iter().map(|(idx, _)| *idx).collect();
        // verifyToken: label + path hit; TokenCache: label; loadStore: path only
        assert_eq!(order, vec![0, 2, 3]);
    }

    #[test]
    fn kind_is_searchable() {
        let index = LexicalIndex::new(&nodes());
        let scores = index.term_scores("class");
        assert_eq!(scores.len(), 1);
        assert_eq!(scores[0].0, 2);
    }

    #[test]
    fn fuzzy_tolerates_partial_names() {
        let index = LexicalIndex::new(&nodes());
        let scores = index.fuzzy_scores("rndrInv", 0.0);
        assert_eq!(scores.len(), 1);
        assert_eq!(scores[0], (1, 1.0));

        let exact = index.fuzzy_scores("tokencache", 0.0);
        assert!(exact.contains(&(2, 1.0)));
    }

    #[test]
    fn unmatched_queries_score_nothing() {
        let index = LexicalIndex::new(&nodes());
        assert!(index.scores("qqqxyz", 0.0).is_empty());
        assert!(index.scores("   ", 0.0).is_empty());
    }
}
