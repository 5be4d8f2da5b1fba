use codemap_vector_store::EmbeddingError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, SearchError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SearchError {
    #[error("Semantic channel error: {0}")]
    Embedding(#[from] EmbeddingError),
}
