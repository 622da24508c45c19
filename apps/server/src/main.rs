mod rpc_loop;
mod watch_task;

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use clap::Parser;
use doc_config::{watch_config, ConfigStore, EngineConfig};
use doc_embeddings::endpoint::default_sidecar_endpoint;
use doc_embeddings::EmbeddingClient;
use doc_queue::DeferredQueue;
use doc_rpc::Dispatcher;
use doc_storage::DocumentStore;
use tracing::warn;
use tracing_subscriber::EnvFilter;

/// Directory (relative to the activated repository root) where authored
/// docs, schemas, and engine-managed state live (§6.3).
const STATE_DIR_NAME: &str = ".csharp-compounding-docs";
const CONFIG_FILE_NAME: &str = "config.json";
const DB_FILE_NAME: &str = "index.db";

/// stdio JSON-RPC server for the compounding docs engine. One process serves
/// one repository root for its lifetime; `activate_project` (over the RPC
/// channel) binds the tenant and triggers reconciliation.
#[derive(Debug, Parser)]
struct Args {
    /// Absolute path to the repository this process serves.
    #[arg(long)]
    repo_path: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let state_dir = args.repo_path.join(STATE_DIR_NAME);
    std::fs::create_dir_all(&state_dir)?;

    let config_path = state_dir.join(CONFIG_FILE_NAME);
    let config = if config_path.exists() {
        EngineConfig::load(&config_path)?
    } else {
        EngineConfig::parse(&format!(r#"{{"project_name":"{}"}}"#, default_project_name(&args.repo_path)))?
    };
    config.validate()?;
    let config_store = Arc::new(ConfigStore::new(config));

    let snapshot = config_store.current();
    let store = Arc::new(DocumentStore::open(&state_dir.join(DB_FILE_NAME), snapshot.embedding.dimension)?);
    let sidecar_endpoint = default_sidecar_endpoint();
    let embeddings = Arc::new(EmbeddingClient::new(
        sidecar_endpoint.clone(),
        snapshot.embedding.embedding_model.clone(),
        snapshot.embedding.generation_model.clone(),
        snapshot.embedding.dimension,
        snapshot.embedding.concurrency,
    ));

    // §4.3 startup validator: a non-responsive sidecar is logged, not fatal —
    // the deferred queue absorbs indexing failures until it comes up.
    if !embeddings.health_check().await {
        warn!(
            endpoint = %sidecar_endpoint,
            platform = %format!("{}/{}", std::env::consts::OS, std::env::consts::ARCH),
            "inference sidecar did not respond to startup health check"
        );
    }

    let queue = Arc::new(Mutex::new(DeferredQueue::new(
        snapshot.queue.capacity,
        snapshot.queue.overflow_policy.into(),
    )));

    let dispatcher = Arc::new(Dispatcher::new(store, embeddings, config_store.clone(), queue));

    tokio::spawn(watch_config(config_path, config_store));
    tokio::spawn(watch_task::run(dispatcher.clone(), args.repo_path.clone()));

    rpc_loop::serve(dispatcher).await
}

fn default_project_name(repo_path: &std::path::Path) -> String {
    repo_path
        .file_name()
        .and_then(|name| name.to_str())
        .map(|name| name.to_ascii_lowercase().replace(['_', ' '], "-"))
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "project".to_string())
}
