use thiserror::Error;

pub type Result<T> = std::result::Result<T, GraphError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("Node not found: {0}")]
    NodeNotFound(String),

    #[error("Graph build cancelled")]
    Cancelled,

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}
