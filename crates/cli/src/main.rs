//! codemap: code knowledge graphs for local checkouts
//!
//! ```text
//! codemap --path ../shop build
//! codemap --path ../shop search "verify token"
//! codemap --path ../shop context function:src/auth.ts:verifyToken
//! codemap --path ../shop impact function:src/auth.ts:verifyToken --depth 2
//! ```
//!
//! Every command prints pretty JSON on stdout. Logs go to stderr (`RUST_LOG`, default `warn`).

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use codemap_engine::{
    CodeGraphEngine, EngineConfig, GraphStore, JsonGraphStore, LocalRepositorySource,
    MemoryGraphStore, RepositorySource,
};
use codemap_vector_store::EmbeddingProvider;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Owner every local checkout is registered under
const LOCAL_OWNER: &str = "local";

#[derive(Parser)]
#[command(name = "codemap", version, about = "Code knowledge graphs for local checkouts")]
struct Cli {
    /// Repository checkout
    #[arg(short, long, global = true, default_value = ".")]
    path: PathBuf,

    /// TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Persist graphs as JSON under this directory (default: in memory)
    #[arg(long, global = true)]
    store: Option<PathBuf>,

    /// Embedding provider: none, hash or ollama
    #[arg(long, global = true)]
    embeddings: Option<EmbeddingProvider>,

    /// Branch to use instead of the checked-out one
    #[arg(long, global = true)]
    branch: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Build the graph and print a summary
    Build {
        /// Print the whole graph instead of a summary
        #[arg(long)]
        full: bool,
    },

    /// Hybrid lexical and semantic search
    Search {
        query: String,

        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Callers, callees, community and flows of a node
    Context { node_id: String },

    /// Nodes within N hops of the given nodes
    Impact {
        #[arg(required = true)]
        node_ids: Vec<String>,

        #[arg(short, long, default_value_t = 3)]
        depth: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
        .target(env_logger::Target::Stderr)
        .init();

    run(Cli::parse()).await
}

async fn run(cli: Cli) -> Result<()> {
    let root = cli
        .path
        .canonicalize()
        .with_context(|| format!("cannot open checkout {}", cli.path.display()))?;
    let repo = repo_name(&root);

    let mut config = EngineConfig::load(cli.config.as_deref()).context("invalid configuration")?;
    if let Some(provider) = cli.embeddings {
        config.embedding.provider = provider;
    }

    let source = Arc::new(LocalRepositorySource::new(config.max_file_bytes));
    source.register(LOCAL_OWNER, &repo, &root);
    let store: Arc<dyn GraphStore> = match &cli.store {
        Some(dir) => Arc::new(JsonGraphStore::new(dir)),
        None => Arc::new(MemoryGraphStore::new()),
    };
    let engine = CodeGraphEngine::new(config, source.clone(), store)?;

    let branch = match cli.branch {
        Some(branch) => branch,
        None => {
            source
                .metadata(LOCAL_OWNER, &repo)
                .await
                .with_context(|| format!("cannot read {}", root.display()))?
                .default_branch
        }
    };
    log::debug!("Using {LOCAL_OWNER}/{repo}@{branch} at {}", root.display());

    let output = match cli.command {
        Command::Build { full } => {
            let graph = engine.build_graph(LOCAL_OWNER, &repo, &branch).await?;
            if full {
                serde_json::to_value(graph.as_ref())?
            } else {
                json!({
                    "repo": format!("{}/{}", graph.repo_owner, graph.repo_name),
                    "branch": graph.branch,
                    "fetchedAt": graph.fetched_at,
                    "nodes": graph.node_count(),
                    "edges": graph.edge_count(),
                    "communities": graph.communities.len(),
                    "processes": graph.processes.len(),
                })
            }
        }
        Command::Search { query, limit } => {
            engine.graph(LOCAL_OWNER, &repo, &branch).await?;
            let results = engine.search(&query, LOCAL_OWNER, &repo, limit).await?;
            serde_json::to_value(results)?
        }
        Command::Context { node_id } => {
            engine.graph(LOCAL_OWNER, &repo, &branch).await?;
            let context = engine.node_context(&node_id, LOCAL_OWNER, &repo).await?;
            serde_json::to_value(context)?
        }
        Command::Impact { node_ids, depth } => {
            engine.graph(LOCAL_OWNER, &repo, &branch).await?;
            let report = engine
                .impact_analysis(&node_ids, LOCAL_OWNER, &repo, depth)
                .await?;
            serde_json::to_value(report)?
        }
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn repo_name(root: &Path) -> String {
    root.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "root".to_string())
}
