use crate::embedder::{Embedder, HashingEmbedder, OllamaEmbedder};
use crate::error::Result;
use crate::templates::EmbeddingTemplates;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    /// Lexical search only
    None,
    #[default]
    Hash,
    Ollama,
}

impl std::str::FromStr for EmbeddingProvider {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" | "off" => Ok(Self::None),
            "hash" | "hashing" => Ok(Self::Hash),
            "ollama" => Ok(Self::Ollama),
            other => Err(format!("unknown embedding provider '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub provider: EmbeddingProvider,
    pub url: String,
    pub model: String,
    pub dimension: usize,
    pub batch_size: usize,
    pub templates: EmbeddingTemplates,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProvider::default(),
            url: "http://localhost:11434".to_string(),
            model: "nomic-embed-text".to_string(),
            dimension: HashingEmbedder::DEFAULT_DIMENSION,
            batch_size: 32,
            templates: EmbeddingTemplates::default(),
        }
    }
}

impl EmbeddingConfig {
    /// Embedder for the configured provider; `None` disables the semantic channel
    pub fn create_embedder(&self, timeout: Duration) -> Result<Option<Arc<dyn Embedder>>> {
        self.templates.validate()?;
        let embedder: Arc<dyn Embedder> = match self.provider {
            EmbeddingProvider::None => return Ok(None),
            EmbeddingProvider::Hash => Arc::new(HashingEmbedder::new(self.dimension)),
            EmbeddingProvider::Ollama => Arc::new(OllamaEmbedder::new(
                &self.url,
                self.model.clone(),
                self.dimension,
                self.batch_size,
                timeout,
            )?),
        };
        Ok(Some(embedder))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn providers_parse_case_insensitively() {
        assert_eq!("Ollama".parse::<EmbeddingProvider>(), Ok(EmbeddingProvider::Ollama));
        assert_eq!("none".parse::<EmbeddingProvider>(), Ok(EmbeddingProvider::None));
        assert!("bert".parse::<EmbeddingProvider>().is_err());
    }

    #[test]
    fn none_disables_embeddings() {
        let config = EmbeddingConfig {
            provider: EmbeddingProvider::None,
            ..EmbeddingConfig::default()
        };
        assert!(config
            .create_embedder(Duration::from_secs(1))
            .unwrap()
            .is_none());

        let hashing = EmbeddingConfig::default()
            .create_embedder(Duration::from_secs(1))
            .unwrap()
            .unwrap();
        assert_eq!(hashing.name(), "hash");
        assert_eq!(hashing.dimension(), 256);
    }
}
