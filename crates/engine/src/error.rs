use crate::key::RepoKey;
use codemap_graph::GraphError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, EngineError>;

/// Failure reported by a repository collaborator
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RepoAccessError {
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("rate limited")]
    RateLimited { retry_after_ms: Option<u64> },

    #[error("io error: {0}")]
    Io(String),
}

impl From<std::io::Error> for RepoAccessError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound(err.to_string()),
            std::io::ErrorKind::PermissionDenied => Self::Unauthorized(err.to_string()),
            _ => Self::Io(err.to_string()),
        }
    }
}

/// Failure reported by a graph store
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct StoreError(pub String);

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        Self(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self(err.to_string())
    }
}

/// Errors surfaced to engine callers.
///
/// `Clone` so one in-flight build result can be handed to every joined caller.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("Repository access failed for {key}: {source}")]
    RepoAccess {
        key: String,
        source: RepoAccessError,
    },

    #[error("{operation} for {key} exceeded its {budget_ms}ms budget")]
    Timeout {
        operation: String,
        key: String,
        budget_ms: u64,
    },

    #[error("Node {node_id} not found in {key}")]
    NodeNotFound { key: String, node_id: String },

    #[error("Graph store failed for {key}: {message}")]
    Store { key: String, message: String },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Internal(String),
}

impl EngineError {
    pub(crate) fn graph(err: GraphError, key: &RepoKey) -> Self {
        match err {
            GraphError::NodeNotFound(node_id) => Self::NodeNotFound {
                key: key.to_string(),
                node_id,
            },
            GraphError::InvalidInput(message) => Self::InvalidInput(message),
            GraphError::Cancelled => Self::Internal(format!("build for {key} was cancelled")),
        }
    }

    pub(crate) fn store(err: StoreError, key: &RepoKey) -> Self {
        Self::Store {
            key: key.to_string(),
            message: err.0,
        }
    }
}
