use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::key::RepoKey;
use crate::source::RepositorySource;
use crate::store::GraphStore;
use codemap_graph::{
    CodeGraph, CommunityDetector, FlowExtractor, GraphBuilder, GraphIndex, ImpactReport,
    NodeContext,
};
use codemap_search::{HybridSearch, SearchResult};
use codemap_vector_store::{Embedder, VectorStore};
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::fmt::Display;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// A built graph with its query structures
#[derive(Debug)]
pub struct Snapshot {
    pub key: RepoKey,
    pub index: GraphIndex,
    pub search: HybridSearch,
}

impl Snapshot {
    pub fn graph(&self) -> Arc<CodeGraph> {
        self.index.snapshot()
    }
}

type BuildFuture = Shared<BoxFuture<'static, Result<Arc<Snapshot>>>>;

/// How an in-flight entry produces its snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Load {
    /// Fetch and build a fresh graph
    Build,
    /// Stored graph when present, else a fresh build
    Restore,
}

impl Load {
    fn operation(self) -> &'static str {
        match self {
            Self::Build => "build",
            Self::Restore => "restore",
        }
    }
}

struct Inner {
    config: EngineConfig,
    source: Arc<dyn RepositorySource>,
    store: Arc<dyn GraphStore>,
    embedder: Option<Arc<dyn Embedder>>,
    /// Builds and restores in progress; joined by later requests for the same key
    in_flight: Mutex<HashMap<(RepoKey, Load), BuildFuture>>,
    /// Snapshot queries run against, per (owner, repo)
    active: RwLock<HashMap<(String, String), Arc<Snapshot>>>,
}

/// Builds, caches and queries code graphs.
///
/// Cheap to clone; clones share builds and snapshots.
#[derive(Clone)]
pub struct CodeGraphEngine {
    inner: Arc<Inner>,
}

impl CodeGraphEngine {
    /// Engine using the embedder described by `config.embedding`
    pub fn new(
        config: EngineConfig,
        source: Arc<dyn RepositorySource>,
        store: Arc<dyn GraphStore>,
    ) -> Result<Self> {
        let embedder = config
            .embedding
            .create_embedder(config.embedding_timeout())
            .map_err(|err| EngineError::Config(err.to_string()))?;
        Ok(Self::with_embedder(config, source, store, embedder))
    }

    pub fn with_embedder(
        config: EngineConfig,
        source: Arc<dyn RepositorySource>,
        store: Arc<dyn GraphStore>,
        embedder: Option<Arc<dyn Embedder>>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                source,
                store,
                embedder,
                in_flight: Mutex::new(HashMap::new()),
                active: RwLock::new(HashMap::new()),
            }),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    /// Fetch, build, persist and activate a fresh graph for one branch.
    ///
    /// Concurrent calls for the same key share one build.
    pub async fn build_graph(&self, owner: &str, repo: &str, branch: &str) -> Result<Arc<CodeGraph>> {
        let key = RepoKey::new(owner, repo, branch);
        Ok(self.shared_load(key, Load::Build).await?.graph())
    }

    /// Active snapshot, else the store, else a fresh build
    pub async fn graph(&self, owner: &str, repo: &str, branch: &str) -> Result<Arc<CodeGraph>> {
        let key = RepoKey::new(owner, repo, branch);
        Ok(self.snapshot_for(key).await?.graph())
    }

    /// Snapshot currently serving queries for `owner/repo`
    pub fn active_snapshot(&self, owner: &str, repo: &str) -> Option<Arc<Snapshot>> {
        self.inner
            .active
            .read()
            .get(&(owner.to_string(), repo.to_string()))
            .cloned()
    }

    pub async fn search(
        &self,
        query: &str,
        owner: &str,
        repo: &str,
        limit: Option<usize>,
    ) -> Result<Vec<SearchResult>> {
        let snapshot = self.query_snapshot(owner, repo).await?;
        let key = snapshot.key.clone();
        let inner = Arc::clone(&self.inner);
        let query = query.to_string();

        let work = async move {
            let embedding = inner.embed_query(&snapshot, &query).await;
            let key = snapshot.key.clone();
            blocking(&key, move || {
                match snapshot.search.search(&query, embedding.as_deref(), limit) {
                    Ok(results) => Ok(results),
                    Err(err) => {
                        log::warn!(
                            "Semantic search for {} failed, searching lexically: {err}",
                            snapshot.key
                        );
                        snapshot
                            .search
                            .search(&query, None, limit)
                            .map_err(|err| EngineError::Internal(err.to_string()))
                    }
                }
            })
            .await
        };
        self.within_query_budget("search", &key, work).await
    }

    pub async fn node_context(&self, node_id: &str, owner: &str, repo: &str) -> Result<NodeContext> {
        let snapshot = self.query_snapshot(owner, repo).await?;
        let key = snapshot.key.clone();
        let node_id = node_id.to_string();

        self.within_query_budget(
            "node context",
            &key,
            blocking(&key, move || {
                snapshot
                    .index
                    .node_context(&node_id)
                    .map_err(|err| EngineError::graph(err, &snapshot.key))
            }),
        )
        .await
    }

    /// Blast radius of `node_ids`; `max_depth` is clamped to 1..=3
    pub async fn impact_analysis(
        &self,
        node_ids: &[String],
        owner: &str,
        repo: &str,
        max_depth: usize,
    ) -> Result<ImpactReport> {
        if node_ids.is_empty() {
            return Err(EngineError::InvalidInput(
                "impact analysis needs at least one node id".to_string(),
            ));
        }
        let snapshot = self.query_snapshot(owner, repo).await?;
        let key = snapshot.key.clone();
        let node_ids = node_ids.to_vec();

        self.within_query_budget(
            "impact analysis",
            &key,
            blocking(&key, move || {
                snapshot
                    .index
                    .impact_analysis(&node_ids, max_depth)
                    .map_err(|err| EngineError::graph(err, &snapshot.key))
            }),
        )
        .await
    }

    fn shared_load(&self, key: RepoKey, load: Load) -> BuildFuture {
        let mut in_flight = self.inner.in_flight.lock();
        let slot = (key, load);
        if let Some(existing) = in_flight.get(&slot) {
            log::debug!("Joining in-flight {} for {}", load.operation(), slot.0);
            return existing.clone();
        }

        let inner = Arc::clone(&self.inner);
        let task_slot = slot.clone();
        let future = async move {
            let result =
                Inner::load_within_budget(Arc::clone(&inner), task_slot.0.clone(), task_slot.1)
                    .await;
            inner.in_flight.lock().remove(&task_slot);
            result
        }
        .boxed()
        .shared();
        in_flight.insert(slot, future.clone());
        future
    }

    async fn snapshot_for(&self, key: RepoKey) -> Result<Arc<Snapshot>> {
        if let Some(snapshot) = self.active_snapshot(&key.owner, &key.repo) {
            if snapshot.key == key {
                return Ok(snapshot);
            }
        }

        self.shared_load(key, Load::Restore).await
    }

    /// Active snapshot for `owner/repo`, else the default branch's graph
    async fn query_snapshot(&self, owner: &str, repo: &str) -> Result<Arc<Snapshot>> {
        if let Some(snapshot) = self.active_snapshot(owner, repo) {
            return Ok(snapshot);
        }
        let repo_ref = format!("{owner}/{repo}");
        let lookup = async {
            self.inner
                .source
                .metadata(owner, repo)
                .await
                .map_err(|source| EngineError::RepoAccess {
                    key: repo_ref.clone(),
                    source,
                })
        };
        let metadata = self
            .within_query_budget("default branch lookup", &repo_ref, lookup)
            .await?;
        log::debug!(
            "No active graph for {owner}/{repo}; using default branch {}",
            metadata.default_branch
        );
        self.snapshot_for(RepoKey::new(owner, repo, metadata.default_branch))
            .await
    }

    async fn within_query_budget<T>(
        &self,
        operation: &str,
        key: &impl Display,
        work: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        let budget = self.inner.config.query_timeout();
        match tokio::time::timeout(budget, work).await {
            Ok(result) => result,
            Err(_) => {
                log::warn!("{operation} for {key} exceeded {}ms", budget.as_millis());
                Err(EngineError::Timeout {
                    operation: operation.to_string(),
                    key: key.to_string(),
                    budget_ms: self.inner.config.query_timeout_ms,
                })
            }
        }
    }
}

impl Inner {
    /// Runs `load` in its own task, abandoned once the build budget is spent
    async fn load_within_budget(inner: Arc<Self>, key: RepoKey, load: Load) -> Result<Arc<Snapshot>> {
        let cancel = Arc::new(AtomicBool::new(false));
        let budget = inner.config.build_timeout();
        let mut task = tokio::spawn(Self::load(
            Arc::clone(&inner),
            key.clone(),
            Arc::clone(&cancel),
            load,
        ));

        match tokio::time::timeout(budget, &mut task).await {
            Ok(Ok(result)) => result,
            Ok(Err(err)) => Err(EngineError::Internal(format!(
                "{} task for {key} failed: {err}",
                load.operation()
            ))),
            Err(_) => {
                cancel.store(true, Ordering::Relaxed);
                task.abort();
                log::warn!(
                    "Abandoned {} of {key} after {}ms",
                    load.operation(),
                    budget.as_millis()
                );
                Err(EngineError::Timeout {
                    operation: load.operation().to_string(),
                    key: key.to_string(),
                    budget_ms: inner.config.build_timeout_ms,
                })
            }
        }
    }

    async fn load(
        self: Arc<Self>,
        key: RepoKey,
        cancel: Arc<AtomicBool>,
        load: Load,
    ) -> Result<Arc<Snapshot>> {
        if load == Load::Restore {
            let stored = self
                .store
                .get(&key)
                .await
                .map_err(|err| EngineError::store(err, &key))?;
            if let Some(graph) = stored {
                log::debug!("Loaded {key} from the graph store");
                let snapshot = self.assemble(key, graph).await;
                self.activate(Arc::clone(&snapshot));
                return Ok(snapshot);
            }
        }
        self.build(key, cancel).await
    }

    async fn build(self: Arc<Self>, key: RepoKey, cancel: Arc<AtomicBool>) -> Result<Arc<Snapshot>> {
        log::info!("Building code graph for {key}");
        let started = Instant::now();

        let files = self
            .source
            .fetch(&key)
            .await
            .map_err(|source| EngineError::RepoAccess {
                key: key.to_string(),
                source,
            })?;

        let builder = GraphBuilder::new(self.config.builder.clone()).with_cancel_flag(cancel);
        let detector = CommunityDetector::new(self.config.communities.clone());
        let extractor = FlowExtractor::new(self.config.flows.clone());
        let build_key = key.clone();
        let graph = tokio::task::spawn_blocking(move || -> Result<CodeGraph> {
            let (mut graph, _report) = builder
                .build(&build_key.owner, &build_key.repo, &build_key.branch, files)
                .map_err(|err| EngineError::graph(err, &build_key))?;
            graph.communities = detector.detect(&graph);
            let processes = extractor.extract(&graph, &graph.communities);
            graph.processes = processes;
            Ok(graph)
        })
        .await
        .map_err(|err| EngineError::Internal(format!("graph build for {key} failed: {err}")))??;

        self.store
            .put(&key, &graph)
            .await
            .map_err(|err| EngineError::store(err, &key))?;

        let (nodes, edges) = (graph.node_count(), graph.edge_count());
        let (communities, processes) = (graph.communities.len(), graph.processes.len());
        let snapshot = self.assemble(key, graph).await;
        self.activate(Arc::clone(&snapshot));

        log::info!(
            "Code graph for {} ready: {nodes} nodes, {edges} edges, {communities} communities, {processes} flows in {}ms",
            snapshot.key,
            started.elapsed().as_millis()
        );
        Ok(snapshot)
    }

    async fn assemble(&self, key: RepoKey, graph: CodeGraph) -> Arc<Snapshot> {
        let graph = Arc::new(graph);
        let vectors = self.embed_nodes(&key, &graph).await;
        let index = GraphIndex::new(Arc::clone(&graph));
        let search = HybridSearch::new(graph, vectors, self.config.search.clone());
        Arc::new(Snapshot { key, index, search })
    }

    fn activate(&self, snapshot: Arc<Snapshot>) {
        self.active
            .write()
            .insert(snapshot.key.repo_ref(), snapshot);
    }

    /// Node vectors, or `None` when the semantic channel is off or failed
    async fn embed_nodes(&self, key: &RepoKey, graph: &CodeGraph) -> Option<Arc<VectorStore>> {
        let embedder = self.embedder.as_ref()?;
        let settings = &self.config.embedding;
        match VectorStore::embed_nodes(
            embedder.as_ref(),
            &settings.templates,
            &graph.nodes,
            settings.batch_size,
        )
        .await
        {
            Ok(vectors) => Some(Arc::new(vectors)),
            Err(err) => {
                log::warn!(
                    "Embedding nodes of {key} with {} failed, search is lexical-only: {err}",
                    embedder.name()
                );
                None
            }
        }
    }

    async fn embed_query(&self, snapshot: &Snapshot, query: &str) -> Option<Vec<f32>> {
        if !snapshot.search.has_semantic() || query.trim().is_empty() {
            return None;
        }
        let embedder = self.embedder.as_ref()?;
        let key = &snapshot.key;
        let text = match self.config.embedding.templates.render_query(query) {
            Ok(text) => text,
            Err(err) => {
                log::warn!("Cannot render query for {key}, searching lexically: {err}");
                return None;
            }
        };

        match tokio::time::timeout(self.config.embedding_timeout(), embedder.embed(&text)).await {
            Ok(Ok(embedding)) => Some(embedding),
            Ok(Err(err)) => {
                log::warn!("Query embedding for {key} failed, searching lexically: {err}");
                None
            }
            Err(_) => {
                log::warn!(
                    "Query embedding for {key} exceeded {}ms, searching lexically",
                    self.config.embedding_timeout_ms
                );
                None
            }
        }
    }
}

/// CPU-bound query work off the async workers
async fn blocking<T, F>(key: &RepoKey, work: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|err| EngineError::Internal(format!("query task for {key} failed: {err}")))?
}
