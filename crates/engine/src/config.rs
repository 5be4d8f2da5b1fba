use crate::error::{EngineError, Result};
use codemap_graph::{BuilderConfig, CommunityConfig, FlowConfig};
use codemap_search::SearchConfig;
use codemap_vector_store::EmbeddingConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Engine settings: TOML file, then `CODEMAP_*` environment overrides
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub build_timeout_ms: u64,
    pub query_timeout_ms: u64,
    pub embedding_timeout_ms: u64,
    /// Files larger than this are not fetched
    pub max_file_bytes: u64,
    pub builder: BuilderConfig,
    pub communities: CommunityConfig,
    pub flows: FlowConfig,
    pub search: SearchConfig,
    pub embedding: EmbeddingConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            build_timeout_ms: 120_000,
            query_timeout_ms: 10_000,
            embedding_timeout_ms: 30_000,
            max_file_bytes: 1_000_000,
            builder: BuilderConfig::default(),
            communities: CommunityConfig::default(),
            flows: FlowConfig::default(),
            search: SearchConfig::default(),
            embedding: EmbeddingConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Defaults, then the optional TOML file, then the process environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path).map_err(|err| {
                    EngineError::Config(format!("cannot read {}: {err}", path.display()))
                })?;
                Self::from_toml(&raw)?
            }
            None => Self::default(),
        };
        config.apply_env_from(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    pub fn from_toml(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(|err| EngineError::Config(err.to_string()))
    }

    /// Apply `CODEMAP_*` overrides read through `lookup`
    pub fn apply_env_from(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        override_with(&lookup, "CODEMAP_BUILD_TIMEOUT_MS", &mut self.build_timeout_ms)?;
        override_with(&lookup, "CODEMAP_QUERY_TIMEOUT_MS", &mut self.query_timeout_ms)?;
        override_with(
            &lookup,
            "CODEMAP_EMBEDDING_TIMEOUT_MS",
            &mut self.embedding_timeout_ms,
        )?;
        override_with(&lookup, "CODEMAP_MAX_FILE_BYTES", &mut self.max_file_bytes)?;
        override_with(&lookup, "CODEMAP_MAX_FLOWS", &mut self.flows.max_flows)?;
        override_with(&lookup, "CODEMAP_EMBEDDING_URL", &mut self.embedding.url)?;
        override_with(&lookup, "CODEMAP_EMBEDDING_MODEL", &mut self.embedding.model)?;
        override_with(
            &lookup,
            "CODEMAP_EMBEDDINGS",
            &mut self.embedding.provider,
        )?;
        Ok(())
    }

    pub fn build_timeout(&self) -> Duration {
        Duration::from_millis(self.build_timeout_ms)
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }

    pub fn embedding_timeout(&self) -> Duration {
        Duration::from_millis(self.embedding_timeout_ms)
    }
}

fn override_with<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
    slot: &mut T,
) -> Result<()>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let Some(raw) = lookup(name) else {
        return Ok(());
    };
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(());
    }
    *slot = raw
        .parse()
        .map_err(|err| EngineError::Config(format!("{name}={raw}: {err}")))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use codemap_vector_store::EmbeddingProvider;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = EngineConfig::from_toml(
            r#"
query_timeout_ms = 500

[flows]
max_depth = 4

[search]
lexical_weight = 0.7

[embedding]
provider = "none"
"#,
        )
        .unwrap();

        assert_eq!(config.query_timeout_ms, 500);
        assert_eq!(config.build_timeout_ms, 120_000);
        assert_eq!(config.flows.max_depth, 4);
        assert_eq!(config.flows.max_flows, 30);
        assert_eq!(config.search.lexical_weight, 0.7);
        assert_eq!(config.search.semantic_weight, 0.5);
        assert_eq!(config.embedding.provider, EmbeddingProvider::None);
        assert_eq!(config.communities, CommunityConfig::default());
    }

    #[test]
    fn environment_overrides_file_values() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("CODEMAP_BUILD_TIMEOUT_MS", "2500"),
            ("CODEMAP_MAX_FLOWS", "5"),
            ("CODEMAP_EMBEDDING_MODEL", "all-minilm"),
            ("CODEMAP_EMBEDDINGS", "ollama"),
            ("CODEMAP_QUERY_TIMEOUT_MS", "  "),
        ]);
        let mut config = EngineConfig::default();
        config
            .apply_env_from(|name| env.get(name).map(ToString::to_string))
            .unwrap();

        assert_eq!(config.build_timeout(), Duration::from_millis(2500));
        assert_eq!(config.query_timeout_ms, 10_000);
        assert_eq!(config.flows.max_flows, 5);
        assert_eq!(config.embedding.model, "all-minilm");
        assert_eq!(config.embedding.provider, EmbeddingProvider::Ollama);
    }

    #[test]
    fn malformed_values_are_config_errors() {
        let mut config = EngineConfig::default();
        let err = config
            .apply_env_from(|name| (name == "CODEMAP_MAX_FILE_BYTES").then(|| "lots".to_string()))
            .unwrap_err();
        assert!(matches!(err, EngineError::Config(message) if message.contains("CODEMAP_MAX_FILE_BYTES")));

        assert!(matches!(
            EngineConfig::from_toml("build_timeout_ms = \"soon\""),
            Err(EngineError::Config(_))
        ));
    }

    #[test]
    fn load_reads_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("codemap.toml");
        std::fs::write(&path, "max_file_bytes = 42\n").unwrap();

        let config = EngineConfig::load(Some(&path)).unwrap();
        assert_eq!(config.max_file_bytes, 42);
        assert!(matches!(
            EngineConfig::load(Some(&dir.path().join("missing.toml"))),
            Err(EngineError::Config(_))
        ));
    }
}
