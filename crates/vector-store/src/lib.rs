//! # Vector Store
//!
//! Per-node embeddings for the semantic search channel.
//!
//! - [`Embedder`] is the embedding collaborator: [`HashingEmbedder`] works offline,
//!   [`OllamaEmbedder`] calls a local Ollama server
//! - [`EmbeddingTemplates`] render node and query text before embedding
//! - [`VectorStore`] keeps one unit vector per node id and ranks by cosine similarity

mod config;
mod embedder;
mod error;
mod store;
mod templates;

pub use config::{EmbeddingConfig, EmbeddingProvider};
pub use embedder::{Embedder, HashingEmbedder, OllamaEmbedder};
pub use error::{EmbeddingError, Result};
pub use store::VectorStore;
pub use templates::EmbeddingTemplates;
