use crate::error::StoreError;
use crate::key::RepoKey;
use async_trait::async_trait;
use codemap_graph::CodeGraph;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Most recent graph per repository key; get/put only
#[async_trait]
pub trait GraphStore: Send + Sync {
    async fn get(&self, key: &RepoKey) -> Result<Option<CodeGraph>, StoreError>;

    async fn put(&self, key: &RepoKey, graph: &CodeGraph) -> Result<(), StoreError>;
}

#[derive(Default)]
pub struct MemoryGraphStore {
    graphs: RwLock<HashMap<RepoKey, CodeGraph>>,
}

impl MemoryGraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.graphs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.graphs.read().is_empty()
    }
}

#[async_trait]
impl GraphStore for MemoryGraphStore {
    async fn get(&self, key: &RepoKey) -> Result<Option<CodeGraph>, StoreError> {
        Ok(self.graphs.read().get(key).cloned())
    }

    async fn put(&self, key: &RepoKey, graph: &CodeGraph) -> Result<(), StoreError> {
        self.graphs.write().insert(key.clone(), graph.clone());
        Ok(())
    }
}

#[derive(Serialize, Deserialize)]
struct PersistedGraph {
    key: RepoKey,
    graph: CodeGraph,
}

/// One JSON document per key under `dir`
pub struct JsonGraphStore {
    dir: PathBuf,
}

impl JsonGraphStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// `<blake3 of owner/repo@branch>.json`
    pub fn path_for(&self, key: &RepoKey) -> PathBuf {
        let digest = blake3::hash(key.to_string().as_bytes());
        self.dir.join(format!("{}.json", digest.to_hex()))
    }
}

#[async_trait]
impl GraphStore for JsonGraphStore {
    async fn get(&self, key: &RepoKey) -> Result<Option<CodeGraph>, StoreError> {
        let path = self.path_for(key);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let persisted: PersistedGraph = serde_json::from_slice(&bytes)?;
        if persisted.key != *key {
            log::warn!(
                "{} holds {} instead of {key}; ignoring it",
                path.display(),
                persisted.key
            );
            return Ok(None);
        }
        Ok(Some(persisted.graph))
    }

    async fn put(&self, key: &RepoKey, graph: &CodeGraph) -> Result<(), StoreError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.path_for(key);

        let bytes = serde_json::to_vec(&PersistedGraph {
            key: key.clone(),
            graph: graph.clone(),
        })?;
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &path).await?;
        log::debug!("Stored graph for {key} at {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use codemap_graph::{GraphBuilder, Language, SourceFile};
    use pretty_assertions::assert_eq;

    fn sample(key: &RepoKey) -> CodeGraph {
        let files = vec![SourceFile::new(
            "src/lib.rs",
            Language::Rust,
            "pub fn alpha() { beta(); }\nfn beta() {}\n",
        )];
        GraphBuilder::default()
            .build(&key.owner, &key.repo, &key.branch, files)
            .unwrap()
            .0
    }

    #[tokio::test]
    async fn json_store_round_trips_per_key() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonGraphStore::new(dir.path().join("graphs"));
        let main = RepoKey::new("acme", "shop", "main");
        let dev = RepoKey::new("acme", "shop", "dev");

        assert_eq!(store.get(&main).await.unwrap(), None);

        let graph = sample(&main);
        store.put(&main, &graph).await.unwrap();

        assert_eq!(store.get(&main).await.unwrap(), Some(graph));
        assert_eq!(store.get(&dev).await.unwrap(), None);
        assert!(!store.path_for(&main).with_extension("json.tmp").exists());
    }

    #[tokio::test]
    async fn corrupt_documents_are_errors() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonGraphStore::new(dir.path());
        let key = RepoKey::new("acme", "shop", "main");
        std::fs::write(store.path_for(&key), b"{ not json").unwrap();

        assert!(store.get(&key).await.is_err());
    }

    #[tokio::test]
    async fn memory_store_replaces_older_graphs() {
        let store = MemoryGraphStore::new();
        let key = RepoKey::new("acme", "shop", "main");
        assert!(store.is_empty());

        store.put(&key, &CodeGraph::new("acme", "shop", "main")).await.unwrap();
        let graph = sample(&key);
        store.put(&key, &graph).await.unwrap();

        assert_eq!(store.len(), 1);
        assert_eq!(store.get(&key).await.unwrap(), Some(graph));
    }
}
