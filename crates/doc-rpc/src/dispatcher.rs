use std::path::PathBuf;
use std::sync::{Arc, Mutex, RwLock};

use doc_config::ConfigStore;
use doc_core::model::PromotionLevel;
use doc_core::schema::SchemaRegistry;
use doc_core::tenant::{self, TenantContext, TenantKey};
use doc_embeddings::EmbeddingClient;
use doc_pipeline::{index_file, reconcile, PipelineOutcome};
use doc_queue::DeferredQueue;
use doc_retrieval::{rag_query as run_rag_query, semantic_search as run_semantic_search};
use doc_storage::DocumentStore;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::error::DispatchError;

/// Authored docs live under this directory of the activated repository
/// (§6.3); schemas live one level below it.
const DOCS_DIR_NAME: &str = "csharp-compounding-docs";
const SCHEMAS_DIR_NAME: &str = "schemas";

/// External-docs tools scope results to a configured root path, which the
/// storage layer doesn't know how to filter on. A result set is over-fetched
/// to this size before the root-path filter runs, so that filter doesn't
/// starve the caller's requested `limit`.
const OVER_FETCH_LIMIT: usize = 50;

pub const TOOL_NAMES: &[&str] = &[
    "activate_project",
    "rag_query",
    "semantic_search",
    "index_document",
    "list_doc_types",
    "delete_documents",
    "update_promotion_level",
    "search_external_docs",
    "rag_query_external",
];

struct ActiveTenant {
    context: TenantContext,
    schemas: Arc<SchemaRegistry>,
    docs_root: PathBuf,
}

/// Routes tool calls (§4.9) to the underlying crates, coercing/validating
/// parameters and translating every failure into the application error
/// envelope (§6.2) rather than letting it escape to the transport.
pub struct Dispatcher {
    store: Arc<DocumentStore>,
    embeddings: Arc<EmbeddingClient>,
    config_store: Arc<ConfigStore>,
    queue: Arc<Mutex<DeferredQueue>>,
    active: RwLock<Option<ActiveTenant>>,
}

impl Dispatcher {
    pub fn new(
        store: Arc<DocumentStore>,
        embeddings: Arc<EmbeddingClient>,
        config_store: Arc<ConfigStore>,
        queue: Arc<Mutex<DeferredQueue>>,
    ) -> Self {
        Self {
            store,
            embeddings,
            config_store,
            queue,
            active: RwLock::new(None),
        }
    }

    pub fn is_known_tool(method: &str) -> bool {
        TOOL_NAMES.contains(&method)
    }

    pub fn queue(&self) -> Arc<Mutex<DeferredQueue>> {
        self.queue.clone()
    }

    pub fn store(&self) -> Arc<DocumentStore> {
        self.store.clone()
    }

    pub fn embeddings(&self) -> Arc<EmbeddingClient> {
        self.embeddings.clone()
    }

    /// Active tenant's key, schema registry, and docs root, or
    /// [`DispatchError::ProjectNotActivated`] if `activate_project` hasn't run
    /// yet (§4.9).
    pub fn active_tenant(&self) -> Option<TenantContext> {
        self.active.read().expect("dispatcher lock poisoned").as_ref().map(|a| a.context.clone())
    }

    pub async fn dispatch(&self, method: &str, params: Value) -> Result<Value, DispatchError> {
        match method {
            "activate_project" => self.activate_project(params).await,
            "rag_query" => self.rag_query(params).await,
            "semantic_search" => self.semantic_search(params).await,
            "index_document" => self.index_document(params).await,
            "list_doc_types" => self.list_doc_types(params),
            "delete_documents" => self.delete_documents(params),
            "update_promotion_level" => self.update_promotion_level(params),
            "search_external_docs" => self.search_external_docs(params).await,
            "rag_query_external" => self.rag_query_external(params).await,
            other => Err(DispatchError::Internal(format!("unrecognized tool `{other}`"))),
        }
    }

    /// Active tenant's key, schema registry, and docs root. Used both by the
    /// tool handlers below and by the caller to wire a file watcher once a
    /// project has been activated.
    pub fn active_snapshot(&self) -> Result<(TenantKey, Arc<SchemaRegistry>, PathBuf), DispatchError> {
        let guard = self.active.read().expect("dispatcher lock poisoned");
        let active = guard.as_ref().ok_or(DispatchError::ProjectNotActivated)?;
        Ok((active.context.key.clone(), active.schemas.clone(), active.docs_root.clone()))
    }

    async fn activate_project(&self, params: Value) -> Result<Value, DispatchError> {
        let params: ActivateProjectParams = parse_params(params)?;
        let absolute_path = PathBuf::from(&params.absolute_path);
        let context = TenantContext::activate(&params.project_name, &params.branch_name, &absolute_path)?;
        tenant::set_current(context.clone());

        let docs_root = absolute_path.join(DOCS_DIR_NAME);
        let schemas = SchemaRegistry::load_from_dir(&docs_root.join(SCHEMAS_DIR_NAME))
            .map_err(|err| DispatchError::Internal(err.to_string()))?;
        let schemas = Arc::new(schemas);

        // `self.active` is only published after reconciliation finishes, so
        // `active_snapshot` (and the watcher that waits on it) can't observe
        // this tenant as active while reconciliation is still mutating the
        // store (§4.7: watcher events are suppressed during reconciliation).
        let report = reconcile(&self.store, &self.embeddings, &schemas, &context.key, &docs_root, |phase, i, total| {
            info!(?phase, progress = i, total, "reconciling");
        })
        .await?;

        *self.active.write().expect("dispatcher lock poisoned") = Some(ActiveTenant {
            context: context.clone(),
            schemas: schemas.clone(),
            docs_root: docs_root.clone(),
        });

        Ok(json!({
            "status": "ok",
            "project_name": context.project_name(),
            "branch_name": context.branch_name(),
            "reconciliation": {
                "indexed": report.indexed.len(),
                "updated": report.updated.len(),
                "unchanged": report.unchanged.len(),
                "deleted": report.deleted.len(),
                "errors": report.errors.len(),
            },
        }))
    }

    async fn rag_query(&self, params: Value) -> Result<Value, DispatchError> {
        let params: RagQueryParams = parse_params(params)?;
        let (tenant_key, _schemas, _root) = self.active_snapshot()?;
        let min_promotion_level = parse_promotion_level(&params.min_promotion_level)?;

        let answer = run_rag_query(
            &self.store,
            &self.embeddings,
            &tenant_key,
            &params.query,
            Some(params.max_sources),
            params.doc_types.unwrap_or_default(),
            Some(params.min_relevance_score),
            Some(min_promotion_level),
            params.include_critical,
        )
        .await?;

        Ok(json!({
            "status": "ok",
            "answer": answer.answer,
            "sources": answer.sources,
            "linked_docs": answer.linked_docs,
        }))
    }

    async fn semantic_search(&self, params: Value) -> Result<Value, DispatchError> {
        let params: SemanticSearchParams = parse_params(params)?;
        let (tenant_key, _schemas, _root) = self.active_snapshot()?;

        let hits = run_semantic_search(
            &self.store,
            &self.embeddings,
            &tenant_key,
            &params.query,
            Some(params.limit),
            params.doc_types.unwrap_or_default(),
            Some(params.min_relevance_score),
            None,
        )
        .await?;

        Ok(json!({ "status": "ok", "hits": hits }))
    }

    async fn index_document(&self, params: Value) -> Result<Value, DispatchError> {
        let params: IndexDocumentParams = parse_params(params)?;
        let (tenant_key, schemas, docs_root) = self.active_snapshot()?;

        match index_file(&self.store, &self.embeddings, &schemas, &tenant_key, &docs_root, &params.path).await {
            Ok(PipelineOutcome::Unchanged) => Ok(json!({ "status": "ok", "outcome": "unchanged" })),
            Ok(PipelineOutcome::Indexed { chunk_count }) => {
                Ok(json!({ "status": "ok", "outcome": "indexed", "chunk_count": chunk_count }))
            }
            Err(err) if err.is_transient() => {
                self.queue.lock().expect("deferred queue lock poisoned").push(params.path.clone());
                warn!(path = %params.path, "inference sidecar unavailable, deferred index_document");
                Ok(json!({ "status": "deferred", "path": params.path }))
            }
            Err(err) => Err(err.into()),
        }
    }

    fn list_doc_types(&self, _params: Value) -> Result<Value, DispatchError> {
        let (tenant_key, _schemas, _root) = self.active_snapshot()?;
        let doc_types = self.store.get_doc_types(&tenant_key)?;
        Ok(json!({ "status": "ok", "doc_types": doc_types }))
    }

    fn delete_documents(&self, params: Value) -> Result<Value, DispatchError> {
        let params: DeleteDocumentsParams = parse_params(params)?;
        let (relative_paths, deleted_chunks) = self.store.delete_by_scope(
            &params.project_name,
            params.branch_name.as_deref(),
            params.path_hash.as_deref(),
            params.dry_run,
        )?;
        let status = if params.dry_run { "preview" } else { "deleted" };
        Ok(json!({
            "status": status,
            "deleted_count": relative_paths.len(),
            "deleted_chunks": deleted_chunks,
            "relative_paths": relative_paths,
        }))
    }

    fn update_promotion_level(&self, params: Value) -> Result<Value, DispatchError> {
        let params: UpdatePromotionLevelParams = parse_params(params)?;
        let (tenant_key, _schemas, _root) = self.active_snapshot()?;
        let level = parse_promotion_level(&params.level)?;

        let changed = self.store.update_promotion_level(&tenant_key, &params.path, level)?;
        if !changed {
            return Err(DispatchError::DocumentNotFound { relative_path: params.path });
        }
        Ok(json!({ "status": "ok", "path": params.path, "level": params.level }))
    }

    async fn search_external_docs(&self, params: Value) -> Result<Value, DispatchError> {
        let params: SearchExternalDocsParams = parse_params(params)?;
        let (tenant_key, _schemas, _root) = self.active_snapshot()?;
        let roots = self.config_store.current().external_docs.roots.clone();
        if roots.is_empty() {
            return Ok(json!({ "status": "ok", "hits": Vec::<Value>::new() }));
        }

        let hits = run_semantic_search(
            &self.store,
            &self.embeddings,
            &tenant_key,
            &params.query,
            Some(OVER_FETCH_LIMIT),
            Vec::new(),
            None,
            None,
        )
        .await?;

        let filtered: Vec<_> = hits
            .into_iter()
            .filter(|h| is_under_any_root(&h.relative_path, &roots))
            .take(params.limit)
            .collect();

        Ok(json!({ "status": "ok", "hits": filtered }))
    }

    async fn rag_query_external(&self, params: Value) -> Result<Value, DispatchError> {
        let params: RagQueryExternalParams = parse_params(params)?;
        let (tenant_key, _schemas, _root) = self.active_snapshot()?;
        let roots = self.config_store.current().external_docs.roots.clone();
        if roots.is_empty() {
            return Ok(json!({ "status": "ok", "answer": "", "sources": Vec::<Value>::new(), "linked_docs": Vec::<Value>::new() }));
        }

        let answer = run_rag_query(
            &self.store,
            &self.embeddings,
            &tenant_key,
            &params.query,
            Some(OVER_FETCH_LIMIT),
            Vec::new(),
            None,
            None,
            false,
        )
        .await?;

        let sources: Vec<_> = answer
            .sources
            .into_iter()
            .filter(|s| is_under_any_root(&s.relative_path, &roots))
            .take(params.max_sources)
            .collect();
        let linked_docs: Vec<_> = answer
            .linked_docs
            .into_iter()
            .filter(|d| is_under_any_root(&d.relative_path, &roots))
            .collect();

        Ok(json!({ "status": "ok", "answer": answer.answer, "sources": sources, "linked_docs": linked_docs }))
    }
}

fn parse_params<T: serde::de::DeserializeOwned>(params: Value) -> Result<T, DispatchError> {
    serde_json::from_value(params).map_err(|err| DispatchError::InvalidParams(err.to_string()))
}

fn parse_promotion_level(raw: &str) -> Result<PromotionLevel, DispatchError> {
    PromotionLevel::parse(raw).ok_or_else(|| DispatchError::InvalidParams(format!("unknown promotion level `{raw}`")))
}

fn is_under_any_root(relative_path: &str, roots: &[String]) -> bool {
    roots.iter().any(|root| relative_path.starts_with(root.trim_end_matches('/')))
}

#[derive(Debug, Deserialize)]
struct ActivateProjectParams {
    project_name: String,
    branch_name: String,
    absolute_path: String,
}

#[derive(Debug, Deserialize)]
struct RagQueryParams {
    query: String,
    #[serde(default)]
    doc_types: Option<Vec<String>>,
    #[serde(default = "default_rag_max_sources")]
    max_sources: usize,
    #[serde(default = "default_rag_min_relevance")]
    min_relevance_score: f32,
    #[serde(default = "default_min_promotion_level")]
    min_promotion_level: String,
    #[serde(default = "default_true")]
    include_critical: bool,
}

#[derive(Debug, Deserialize)]
struct SemanticSearchParams {
    query: String,
    #[serde(default)]
    doc_types: Option<Vec<String>>,
    #[serde(default = "default_search_limit")]
    limit: usize,
    #[serde(default = "default_search_min_relevance")]
    min_relevance_score: f32,
}

#[derive(Debug, Deserialize)]
struct IndexDocumentParams {
    path: String,
}

#[derive(Debug, Deserialize)]
struct DeleteDocumentsParams {
    project_name: String,
    #[serde(default)]
    branch_name: Option<String>,
    #[serde(default)]
    path_hash: Option<String>,
    #[serde(default)]
    dry_run: bool,
}

#[derive(Debug, Deserialize)]
struct UpdatePromotionLevelParams {
    path: String,
    level: String,
}

#[derive(Debug, Deserialize)]
struct SearchExternalDocsParams {
    query: String,
    #[serde(default = "default_search_limit")]
    limit: usize,
}

#[derive(Debug, Deserialize)]
struct RagQueryExternalParams {
    query: String,
    #[serde(default = "default_rag_max_sources")]
    max_sources: usize,
}

fn default_rag_max_sources() -> usize {
    3
}
fn default_rag_min_relevance() -> f32 {
    0.7
}
fn default_min_promotion_level() -> String {
    "standard".to_string()
}
fn default_true() -> bool {
    true
}
fn default_search_limit() -> usize {
    10
}
fn default_search_min_relevance() -> f32 {
    0.5
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn is_under_any_root_matches_prefix() {
        assert!(is_under_any_root("vendor/lib/readme.md", &["vendor".to_string()]));
        assert!(!is_under_any_root("src/lib.rs", &["vendor".to_string()]));
    }

    #[test]
    fn unknown_tool_is_reported_via_is_known_tool() {
        assert!(!Dispatcher::is_known_tool("delete_everything"));
        assert!(Dispatcher::is_known_tool("rag_query"));
    }
}
