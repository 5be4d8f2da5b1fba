//! Code graph engine
//!
//! Turns repository branches into queryable code graphs:
//!
//! ```text
//! RepositorySource::fetch -> GraphBuilder -> CommunityDetector -> FlowExtractor
//!     -> GraphStore::put -> embed nodes -> Snapshot (GraphIndex + HybridSearch)
//! ```
//!
//! At most one build runs per `owner/repo@branch`; concurrent requests join it.
//! Queries run against the active snapshot of a repository and never block builds.

mod config;
mod engine;
mod error;
mod key;
mod source;
mod store;

pub use config::EngineConfig;
pub use engine::{CodeGraphEngine, Snapshot};
pub use error::{EngineError, RepoAccessError, Result, StoreError};
pub use key::RepoKey;
pub use source::{LocalRepositorySource, RepoMetadata, RepositorySource, Visibility, FALLBACK_BRANCH};
pub use store::{GraphStore, JsonGraphStore, MemoryGraphStore};

pub use codemap_graph::{CodeGraph, ImpactReport, NodeContext};
pub use codemap_search::SearchResult;
