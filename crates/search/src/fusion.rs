use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Ranking channel that surfaced a result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchSource {
    Lexical,
    Semantic,
}

impl SearchSource {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Lexical => "lexical",
            Self::Semantic => "semantic",
        }
    }
}

/// Scores closer than this count as equal
const MIN_DELTA: f32 = 1e-6;

/// Min-max normalise `(node, score)` pairs into `[0, 1]`.
///
/// A single candidate, or candidates with equal scores, normalise to 1.0.
/// Non-finite scores drop to the bottom of the range.
pub fn normalize_scores(scores: &mut [(usize, f32)]) {
    if scores.is_empty() {
        return;
    }

    let mut min_score = f32::MAX;
    let mut max_score = f32::MIN;
    let mut had_invalid = false;
    for (_, score) in scores.iter() {
        if score.is_finite() {
            min_score = min_score.min(*score);
            max_score = max_score.max(*score);
        } else {
            had_invalid = true;
        }
    }

    if !min_score.is_finite() || !max_score.is_finite() || min_score > max_score {
        for (_, score) in scores.iter_mut() {
            *score = 0.0;
        }
        return;
    }

    if had_invalid && (max_score - min_score).abs() < f32::EPSILON {
        for (_, score) in scores.iter_mut() {
            *score = if score.is_finite() { 1.0 } else { 0.0 };
        }
        return;
    }

    if (max_score - min_score).abs() < MIN_DELTA {
        for (_, score) in scores.iter_mut() {
            *score = 1.0;
        }
        return;
    }

    let range = max_score - min_score;
    for (node, score) in scores.iter_mut() {
        if !score.is_finite() {
            log::warn!("Invalid score for node #{node}, resetting to min");
            *score = min_score;
        }
        *score = (*score - min_score) / range;
    }
}

/// One node after fusion
#[derive(Debug, Clone, PartialEq)]
pub struct Fused {
    pub node: usize,
    pub score: f32,
    pub sources: BTreeSet<SearchSource>,
}

/// Weighted sum of the normalised channels.
///
/// Every node either channel returned comes out exactly once, tagged with the channels
/// that returned it. Output is ordered by node position; ranking is the caller's job.
pub fn fuse(
    mut lexical: Vec<(usize, f32)>,
    mut semantic: Vec<(usize, f32)>,
    lexical_weight: f32,
    semantic_weight: f32,
) -> Vec<Fused> {
    normalize_scores(&mut lexical);
    normalize_scores(&mut semantic);

    let mut fused: BTreeMap<usize, Fused> = BTreeMap::new();
    let channels = [
        (SearchSource::Lexical, lexical, lexical_weight),
        (SearchSource::Semantic, semantic, semantic_weight),
    ];
    for (source, scores, weight) in channels {
        for (node, score) in scores {
            let entry = fused.entry(node).or_insert_with(|| Fused {
                node,
                score: 0.0,
                sources: BTreeSet::new(),
            });
            entry.score += weight * score;
            entry.sources.insert(source);
        }
    }
    fused.into_values().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn normalizes_to_unit_range() {
        let mut scores = vec![(0, 2.0), (1, 4.0), (2, 3.0)];
        normalize_scores(&mut scores);
        assert_eq!(scores, vec![(0, 0.0), (1, 1.0), (2, 0.5)]);
    }

    #[test]
    fn fusion_tags_sources_and_weights_channels() {
        let lexical = vec![(0, 3.0), (1, 1.0)];
        let semantic = vec![(1, 0.9), (2, 0.3)];

        let fused = fuse(lexical, semantic, 0.5, 0.5);

        let summary: Vec<(usize, Vec<SearchSource>)> = fused
            .iter()
            .map(|f| (f.node, f.sources.iter().copied().collect()))
            .collect();
        assert_eq!(
            summary,
            vec![
                (0, vec![SearchSource::Lexical]),
                (1, vec![SearchSource::Lexical, SearchSource::Semantic]),
                (2, vec![SearchSource::Semantic]),
            ]
        );
        // node 1: lexical min (0.0) + semantic max (1.0)
        assert!((fused[1].score - 0.5).abs() < 1e-6);
        assert!((fused[0].score - 0.5).abs() < 1e-6);
        assert!(fused[2].score.abs() < 1e-6);
    }

    #[test]
    fn empty_channels_fuse_to_nothing() {
        assert!(fuse(Vec::new(), Vec::new(), 0.5, 0.5).is_empty());
    }
}
