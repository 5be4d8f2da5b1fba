use crate::error::{EmbeddingError, Result};
use crate::templates::utf8_prefix;
use async_trait::async_trait;
use codemap_graph::text::split_words;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Text to fixed-length vector
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Provider name used in logs
    fn name(&self) -> &str;

    fn dimension(&self) -> usize;

    /// One vector per input, in input order
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_batch(&[text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| EmbeddingError::Http("no embedding returned".to_string()))
    }
}

/// Offline embedder: signed feature hashing of words and character trigrams.
///
/// Deterministic across runs and machines; shares vocabulary, not meaning.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimension: usize,
}

impl HashingEmbedder {
    pub const DEFAULT_DIMENSION: usize = 256;

    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    fn add_feature(&self, vector: &mut [f32], feature: &str, weight: f32) {
        let digest = blake3::hash(feature.as_bytes());
        let bytes = digest.as_bytes();
        let bucket = u64::from_le_bytes([
            bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
        ]);
        #[allow(clippy::cast_possible_truncation)]
        let slot = (bucket % self.dimension as u64) as usize;
        let sign = if bytes[8] & 1 == 0 { 1.0 } else { -1.0 };
        vector[slot] += sign * weight;
    }

    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];
        for word in split_words(text) {
            self.add_feature(&mut vector, &word, 1.0);
            let padded: Vec<char> = format!("^{word}$").chars().collect();
            for trigram in padded.windows(3) {
                let gram: String = trigram.iter().collect();
                self.add_feature(&mut vector, &format!("#{gram}"), 0.5);
            }
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(Self::DEFAULT_DIMENSION)
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    fn name(&self) -> &str {
        "hash"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|text| self.embed_text(text)).collect())
    }
}

/// Longest input sent to the embedding API
const MAX_EMBED_CHARS: usize = 3_000;

#[derive(Serialize)]
struct OllamaEmbedRequest<'a> {
    model: &'a str,
    input: Vec<&'a str>,
    truncate: bool,
}

#[derive(Deserialize)]
struct OllamaEmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

/// Ollama `/api/embed` client
#[derive(Debug, Clone)]
pub struct OllamaEmbedder {
    client: reqwest::Client,
    url: String,
    model: String,
    dimension: usize,
    batch_size: usize,
}

impl OllamaEmbedder {
    pub fn new(
        base_url: &str,
        model: impl Into<String>,
        dimension: usize,
        batch_size: usize,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| EmbeddingError::Unavailable(err.to_string()))?;
        Ok(Self {
            client,
            url: format!("{}/api/embed", base_url.trim_end_matches('/')),
            model: model.into(),
            dimension,
            batch_size: batch_size.max(1),
        })
    }

    async fn embed_chunk(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let request = OllamaEmbedRequest {
            model: &self.model,
            input: texts
                .iter()
                .map(|text| utf8_prefix(text, MAX_EMBED_CHARS))
                .collect(),
            truncate: true,
        };

        let response = self.client.post(&self.url).json(&request).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EmbeddingError::Http(format!(
                "{} returned {status}: {body}",
                self.url
            )));
        }

        let body: OllamaEmbedResponse = response.json().await?;
        if body.embeddings.len() != texts.len() {
            return Err(EmbeddingError::Http(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                body.embeddings.len()
            )));
        }
        for vector in &body.embeddings {
            if vector.len() != self.dimension {
                return Err(EmbeddingError::DimensionMismatch {
                    expected: self.dimension,
                    actual: vector.len(),
                });
            }
        }
        Ok(body.embeddings)
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    fn name(&self) -> &str {
        "ollama"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut embeddings = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(self.batch_size) {
            embeddings.extend(self.embed_chunk(chunk).await?);
        }
        log::debug!(
            "Embedded {} texts with {} via {}",
            texts.len(),
            self.model,
            self.url
        );
        Ok(embeddings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cosine(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b).map(|(x, y)| x * y).sum()
    }

    #[tokio::test]
    async fn hashing_is_deterministic_and_normalised() {
        let embedder = HashingEmbedder::new(64);
        let first = embedder.embed("verifyToken").await.unwrap();
        let second = embedder.embed("verifyToken").await.unwrap();

        assert_eq!(first, second);
        assert_eq!(first.len(), 64);
        assert!((cosine(&first, &first) - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn shared_words_score_higher() {
        let embedder = HashingEmbedder::default();
        let vectors = embedder
            .embed_batch(&[
                "verify token".to_string(),
                "verifyToken".to_string(),
                "render invoice table".to_string(),
            ])
            .await
            .unwrap();

        assert!(cosine(&vectors[0], &vectors[1]) > cosine(&vectors[0], &vectors[2]));
    }

    #[tokio::test]
    async fn blank_text_embeds_to_zero() {
        let vector = HashingEmbedder::new(8).embed("  ").await.unwrap();
        assert!(vector.iter().all(|v| *v == 0.0));
    }

    #[tokio::test]
    async fn unreachable_ollama_is_unavailable() {
        let embedder = OllamaEmbedder::new(
            "http://127.0.0.1:9",
            "nomic-embed-text",
            768,
            8,
            Duration::from_millis(500),
        )
        .unwrap();

        let err = embedder.embed("hello").await.unwrap_err();
        assert!(matches!(err, EmbeddingError::Unavailable(_)), "{err:?}");
    }
}
