use std::collections::HashSet;
use std::path::Path;

use doc_core::schema::SchemaRegistry;
use doc_core::tenant::TenantKey;
use doc_embeddings::EmbeddingClient;
use doc_storage::DocumentStore;
use walkdir::WalkDir;

use crate::error::PipelineError;
use crate::pipeline::{index_file, PipelineOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcilePhase {
    Index,
    Update,
    Delete,
}

#[derive(Debug, Default)]
pub struct ReconciliationReport {
    pub indexed: Vec<String>,
    pub updated: Vec<String>,
    pub unchanged: Vec<String>,
    pub deleted: Vec<String>,
    /// `(relative_path, message)`; reconciliation keeps going past individual
    /// failures rather than aborting the whole pass (§4.5).
    pub errors: Vec<(String, String)>,
}

const DEFAULT_EXCLUDES: &[&str] = &["node_modules", ".git"];

/// Disk-authoritative reconciliation: walks `absolute_root` for markdown
/// files, diffs against the store, and brings the store back in sync in
/// three phases (index new, update changed, delete vanished).
pub async fn reconcile(
    store: &DocumentStore,
    embeddings: &EmbeddingClient,
    schemas: &SchemaRegistry,
    tenant: &TenantKey,
    absolute_root: &Path,
    mut on_progress: impl FnMut(ReconcilePhase, usize, usize),
) -> Result<ReconciliationReport, PipelineError> {
    let disk_paths = discover_markdown_files(absolute_root);
    let disk_set: HashSet<&str> = disk_paths.iter().map(String::as_str).collect();

    let stored = store.list_all(tenant)?;
    let stored_paths: HashSet<String> = stored.iter().map(|d| d.relative_path.clone()).collect();

    let mut report = ReconciliationReport::default();

    let to_delete: Vec<String> = stored_paths
        .iter()
        .filter(|path| !disk_set.contains(path.as_str()))
        .cloned()
        .collect();
    for (i, path) in to_delete.iter().enumerate() {
        on_progress(ReconcilePhase::Delete, i + 1, to_delete.len());
        match store.delete_document(tenant, path) {
            Ok(_) => report.deleted.push(path.clone()),
            Err(err) => report.errors.push((path.clone(), err.to_string())),
        }
    }

    let total = disk_paths.len();
    for (i, path) in disk_paths.iter().enumerate() {
        let phase = if stored_paths.contains(path) {
            ReconcilePhase::Update
        } else {
            ReconcilePhase::Index
        };
        on_progress(phase, i + 1, total);

        match index_file(store, embeddings, schemas, tenant, absolute_root, path).await {
            Ok(PipelineOutcome::Unchanged) => report.unchanged.push(path.clone()),
            Ok(PipelineOutcome::Indexed { .. }) => match phase {
                ReconcilePhase::Index => report.indexed.push(path.clone()),
                _ => report.updated.push(path.clone()),
            },
            Err(err) => report.errors.push((path.clone(), err.to_string())),
        }
    }

    Ok(report)
}

fn discover_markdown_files(absolute_root: &Path) -> Vec<String> {
    let mut paths = Vec::new();
    for entry in WalkDir::new(absolute_root)
        .into_iter()
        .filter_entry(|e| !is_excluded(e.path()))
        .filter_map(|e| e.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }
        if entry.path().extension().and_then(|e| e.to_str()) != Some("md") {
            continue;
        }
        if let Ok(relative) = entry.path().strip_prefix(absolute_root) {
            paths.push(relative.to_string_lossy().replace('\\', "/"));
        }
    }
    paths.sort();
    paths
}

fn is_excluded(path: &Path) -> bool {
    path.components().any(|c| {
        DEFAULT_EXCLUDES
            .iter()
            .any(|excluded| c.as_os_str() == *excluded)
    })
}
