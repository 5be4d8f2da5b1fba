//! # Hybrid Search
//!
//! Ranked node retrieval over a graph snapshot.
//!
//! ```text
//! query ──┬──> lexical: TF-IDF (label ×3, kind, path) + fuzzy label match
//!         └──> semantic: cosine(query embedding, node vectors)
//!                 │
//!                 └──> min-max per channel ──> weighted sum ──> sort (score, node id)
//! ```

mod error;
mod fusion;
mod hybrid;
mod lexical;

pub use error::{Result, SearchError};
pub use fusion::{fuse, normalize_scores, Fused, SearchSource};
pub use hybrid::{HybridSearch, SearchConfig, SearchResult};
pub use lexical::LexicalIndex;
