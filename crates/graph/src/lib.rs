//! # Code Graph
//!
//! Symbol-level dependency graph of one repository snapshot.
//!
//! ## Pipeline
//!
//! ```text
//! SourceFile[]
//!     │
//!     ├──> Graph Builder
//!     │      ├─ Collection: parse files in parallel, assign node ids
//!     │      └─ Resolution: imports, calls, defined_in edges
//!     │
//!     ├──> Community Detector (modularity clustering)
//!     ├──> Flow Extractor (entry → terminal call paths)
//!     │
//!     └──> CodeGraph snapshot (immutable)
//!            └─ GraphIndex: node context, impact analysis
//! ```

mod builder;
mod community;
mod error;
mod flows;
mod index;
mod query;
mod resolver;
pub mod text;
mod types;

pub use builder::{
    BuildReport, BuilderConfig, CallWeights, GraphBuilder, ImportWeights, SourceFile,
    DEFINED_IN_WEIGHT,
};
pub use community::{CommunityConfig, CommunityDetector};
pub use error::{GraphError, Result};
pub use flows::{FlowConfig, FlowExtractor};
pub use index::GraphIndex;
pub use query::MAX_IMPACT_DEPTH;
pub use types::{
    edge_id, CodeEdge, CodeGraph, CodeNode, Community, ConnectedNode, EdgeKind, ImpactReport,
    NodeContext, NodeKind, ProcessFlow,
};

pub use codemap_parser::{FailureReason, Language, ParseFailure};
