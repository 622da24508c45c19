use std::path::Path;

use chrono::Utc;
use doc_core::chunking::{chunk_body, needs_chunking};
use doc_core::frontmatter::{embedding_surface, parse_document};
use doc_core::hashing::content_hash;
use doc_core::model::{Chunk, Document};
use doc_core::schema::SchemaRegistry;
use doc_core::tenant::TenantKey;
use doc_embeddings::EmbeddingClient;
use doc_storage::DocumentStore;
use uuid::Uuid;

use crate::error::PipelineError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineOutcome {
    /// Content hash matched the stored document; nothing re-indexed.
    Unchanged,
    Indexed { chunk_count: usize },
}

/// Reads, hashes, validates, embeds, chunks, and upserts one markdown file.
/// Shared by the watcher, reconciliation, and deferred-queue drainer so every
/// ingestion path goes through identical logic (§4.5).
pub async fn index_file(
    store: &DocumentStore,
    embeddings: &EmbeddingClient,
    schemas: &SchemaRegistry,
    tenant: &TenantKey,
    absolute_root: &Path,
    relative_path: &str,
) -> Result<PipelineOutcome, PipelineError> {
    let absolute_path = absolute_root.join(relative_path);
    let source = tokio::fs::read_to_string(&absolute_path)
        .await
        .map_err(|source| PipelineError::Io {
            path: relative_path.to_string(),
            source,
        })?;

    let hash = content_hash(&source);
    if let Some(existing) = store.get_by_path(tenant, relative_path)? {
        if existing.content_hash == hash {
            return Ok(PipelineOutcome::Unchanged);
        }
    }

    let parsed = parse_document(&source);
    if let Some(doc_type) = &parsed.frontmatter.doc_type {
        if let Err(errors) = schemas.validate(doc_type, &parsed.frontmatter_raw) {
            return Err(PipelineError::SchemaValidation {
                doc_type: doc_type.clone(),
                errors,
            });
        }
    }

    let surface = embedding_surface(&parsed);
    let document_embedding = embeddings.embed(&surface).await?;

    let now = Utc::now();
    let document_id = Uuid::new_v4();

    let chunks = if needs_chunking(&parsed.body) {
        let mut chunks = Vec::new();
        for (index, span) in chunk_body(&parsed.body).into_iter().enumerate() {
            let chunk_embedding = embeddings.embed(&span.content).await?;
            chunks.push(Chunk {
                id: Uuid::new_v4(),
                parent_id: document_id,
                tenant: tenant.clone(),
                chunk_index: index as u32,
                start_line: span.start_line,
                end_line: span.end_line,
                content: span.content,
                embedding: Some(chunk_embedding),
            });
        }
        chunks
    } else {
        Vec::new()
    };

    let document = Document {
        id: document_id,
        tenant: tenant.clone(),
        relative_path: relative_path.to_string(),
        content_hash: hash,
        frontmatter: parsed.frontmatter,
        body: parsed.body.clone(),
        embedding: Some(document_embedding),
        created_at: now,
        updated_at: now,
    };

    let chunk_count = chunks.len();
    store.upsert_document(tenant, &document, &chunks)?;

    Ok(PipelineOutcome::Indexed { chunk_count })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenameOutcome {
    /// Content unchanged: the document row was updated in place, no re-embedding.
    PathUpdated,
    /// Content changed under the rename: treated as a full reindex at the new
    /// path (old path's stale row, if any, is removed).
    Reindexed { chunk_count: usize },
}

/// Handles a watcher rename event (§4.6): if the file's content hash is
/// unchanged, moves the stored document to `new_relative_path` without
/// touching its embedding; otherwise treats it as a content change at the new
/// path and drops whatever stale row existed at the old path.
pub async fn rename_file(
    store: &DocumentStore,
    embeddings: &EmbeddingClient,
    schemas: &SchemaRegistry,
    tenant: &TenantKey,
    absolute_root: &Path,
    old_relative_path: &str,
    new_relative_path: &str,
) -> Result<RenameOutcome, PipelineError> {
    let absolute_path = absolute_root.join(new_relative_path);
    let source = tokio::fs::read_to_string(&absolute_path)
        .await
        .map_err(|source| PipelineError::Io {
            path: new_relative_path.to_string(),
            source,
        })?;
    let hash = content_hash(&source);

    let existing = store.get_by_path(tenant, old_relative_path)?;
    if let Some(existing) = &existing {
        if existing.content_hash == hash {
            store.rename_document(tenant, old_relative_path, new_relative_path)?;
            return Ok(RenameOutcome::PathUpdated);
        }
    }

    let outcome = index_file(store, embeddings, schemas, tenant, absolute_root, new_relative_path).await?;
    if existing.is_some() {
        store.delete_document(tenant, old_relative_path)?;
    }
    let chunk_count = match outcome {
        PipelineOutcome::Unchanged => 0,
        PipelineOutcome::Indexed { chunk_count } => chunk_count,
    };
    Ok(RenameOutcome::Reindexed { chunk_count })
}
