use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use doc_core::model::{Chunk, Document, DocumentLite, Frontmatter, Hit, PromotionLevel};
use doc_core::tenant::TenantKey;
use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use crate::error::StorageError;
use crate::migrations;
use crate::sqlite_ext;
use crate::vector::embedding_to_blob;

#[derive(Debug, Clone, Default)]
pub struct SearchFilters {
    /// Empty means unfiltered; otherwise a document's `doc_type` must be one of these.
    pub doc_types: Vec<String>,
    /// Tier floor: a document's promotion level must be >= this (§4.8 `min_promotion_level`).
    pub min_promotion_level: Option<PromotionLevel>,
    /// Cosine-similarity floor in [0,1] (§4.8 `min_relevance_score`).
    pub min_score: Option<f32>,
}

#[derive(Debug, Clone, Default)]
pub struct DeleteFilter {
    pub relative_path: Option<String>,
    pub doc_type: Option<String>,
    pub promotion_level: Option<PromotionLevel>,
}

/// Tenant-scoped SQLite + `sqlite-vec` store. One `DocumentStore` per open
/// database file; tenant isolation is enforced in every query's `WHERE`
/// clause, never by opening separate files (§4.2).
pub struct DocumentStore {
    conn: Mutex<Connection>,
    embedding_dim: usize,
}

impl DocumentStore {
    pub fn open(db_path: &Path, embedding_dim: usize) -> Result<Self, StorageError> {
        sqlite_ext::register_auto_extension().map_err(|err| StorageError::ExtensionInit(err.to_string()))?;

        let conn = Connection::open(db_path)?;
        conn.pragma_update(None, "foreign_keys", 1)?;
        migrations::run(&conn, embedding_dim)?;

        Ok(Self {
            conn: Mutex::new(conn),
            embedding_dim,
        })
    }

    pub fn embedding_dim(&self) -> usize {
        self.embedding_dim
    }

    fn check_dim(&self, embedding: &[f32]) -> Result<(), StorageError> {
        if embedding.len() != self.embedding_dim {
            return Err(StorageError::EmbeddingDimensionMismatch {
                expected: self.embedding_dim,
                got: embedding.len(),
            });
        }
        Ok(())
    }

    /// Deletes any existing row at `relative_path` (cascading to chunks and
    /// vectors) and inserts the fresh document + chunks in one transaction
    /// (invariant: disk and store stay in sync; chunk cascade-delete).
    pub fn upsert_document(
        &self,
        tenant: &TenantKey,
        document: &Document,
        chunks: &[Chunk],
    ) -> Result<(), StorageError> {
        if let Some(embedding) = &document.embedding {
            self.check_dim(embedding)?;
        }
        for chunk in chunks {
            if let Some(embedding) = &chunk.embedding {
                self.check_dim(embedding)?;
            }
        }

        let mut conn = self.conn.lock().expect("doc-storage connection poisoned");
        let tx = conn.transaction()?;

        if let Some(existing_rowid) = find_document_rowid(&tx, tenant, &document.relative_path)? {
            delete_document_rows(&tx, existing_rowid)?;
        }

        let frontmatter_json = serde_json::to_string(&document.frontmatter)
            .expect("Frontmatter always serializes");

        tx.execute(
            "INSERT INTO documents (
                id, project_name, branch_name, path_hash, relative_path, content_hash,
                doc_type, title, frontmatter_json, body, promotion_level, has_embedding,
                created_at, updated_at
            ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14)",
            params![
                document.id.to_string(),
                tenant.project_name,
                tenant.branch_name,
                tenant.path_hash,
                document.relative_path,
                document.content_hash,
                document.frontmatter.doc_type,
                document.frontmatter.title,
                frontmatter_json,
                document.body,
                document.promotion_level().as_str(),
                document.embedding.is_some() as i64,
                document.created_at.to_rfc3339(),
                document.updated_at.to_rfc3339(),
            ],
        )?;
        let doc_rowid = tx.last_insert_rowid();

        if let Some(embedding) = &document.embedding {
            tx.execute(
                "INSERT INTO document_vectors (rowid, embedding) VALUES (?1, ?2)",
                params![doc_rowid, embedding_to_blob(embedding)],
            )?;
        }

        for chunk in chunks {
            tx.execute(
                "INSERT INTO chunks (
                    id, parent_id, project_name, branch_name, path_hash,
                    chunk_index, start_line, end_line, content
                ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9)",
                params![
                    chunk.id.to_string(),
                    document.id.to_string(),
                    tenant.project_name,
                    tenant.branch_name,
                    tenant.path_hash,
                    chunk.chunk_index,
                    chunk.start_line,
                    chunk.end_line,
                    chunk.content,
                ],
            )?;
            let chunk_rowid = tx.last_insert_rowid();

            if let Some(embedding) = &chunk.embedding {
                tx.execute(
                    "INSERT INTO chunk_vectors (rowid, embedding) VALUES (?1, ?2)",
                    params![chunk_rowid, embedding_to_blob(embedding)],
                )?;
            }
        }

        tx.commit()?;
        Ok(())
    }

    /// Returns `(docs_deleted, chunks_deleted)`: `(0, 0)` when no document
    /// matched (absent document is a no-op success, §4.6).
    /// Updates `relative_path` in place without touching `content_hash` or
    /// embeddings (§4.6 rename-without-content-change: zero re-embeddings).
    /// Returns `false` if no document existed at `old_path`.
    pub fn rename_document(
        &self,
        tenant: &TenantKey,
        old_path: &str,
        new_path: &str,
    ) -> Result<bool, StorageError> {
        let conn = self.conn.lock().expect("doc-storage connection poisoned");
        let updated = conn.execute(
            "UPDATE documents SET relative_path = ?1, updated_at = ?2
             WHERE project_name=?3 AND branch_name=?4 AND path_hash=?5 AND relative_path=?6",
            params![
                new_path,
                Utc::now().to_rfc3339(),
                tenant.project_name,
                tenant.branch_name,
                tenant.path_hash,
                old_path,
            ],
        )?;
        Ok(updated > 0)
    }

    pub fn delete_document(&self, tenant: &TenantKey, relative_path: &str) -> Result<(usize, usize), StorageError> {
        let mut conn = self.conn.lock().expect("doc-storage connection poisoned");
        let tx = conn.transaction()?;
        let Some(rowid) = find_document_rowid(&tx, tenant, relative_path)? else {
            return Ok((0, 0));
        };
        let chunks_deleted = delete_document_rows(&tx, rowid)?;
        tx.commit()?;
        Ok((1, chunks_deleted))
    }

    /// Lists (or, unless `dry_run`, deletes) every document matching `filter`
    /// within the tenant. Returns `(relative_paths, chunks_deleted)`: the
    /// chunk count is computed (not just deleted) so it is accurate even
    /// under `dry_run=true` (§4.2, §8 dry-run scenario).
    pub fn delete_by_filter(
        &self,
        tenant: &TenantKey,
        filter: &DeleteFilter,
        dry_run: bool,
    ) -> Result<(Vec<String>, usize), StorageError> {
        let (matches, rowids) = {
            let conn = self.conn.lock().expect("doc-storage connection poisoned");
            let mut sql = String::from(
                "SELECT rowid_pk, relative_path FROM documents WHERE project_name=?1 AND branch_name=?2 AND path_hash=?3",
            );
            let mut bound: Vec<Box<dyn rusqlite::ToSql>> = vec![
                Box::new(tenant.project_name.clone()),
                Box::new(tenant.branch_name.clone()),
                Box::new(tenant.path_hash.clone()),
            ];
            if let Some(path) = &filter.relative_path {
                sql.push_str(&format!(" AND relative_path = ?{}", bound.len() + 1));
                bound.push(Box::new(path.clone()));
            }
            if let Some(doc_type) = &filter.doc_type {
                sql.push_str(&format!(" AND doc_type = ?{}", bound.len() + 1));
                bound.push(Box::new(doc_type.clone()));
            }
            if let Some(level) = &filter.promotion_level {
                sql.push_str(&format!(" AND promotion_level = ?{}", bound.len() + 1));
                bound.push(Box::new(level.as_str().to_string()));
            }

            let mut stmt = conn.prepare(&sql)?;
            let params: Vec<&dyn rusqlite::ToSql> = bound.iter().map(|b| b.as_ref()).collect();
            let rows = stmt.query_map(params.as_slice(), |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)))?;
            let rows = rows.collect::<Result<Vec<_>, _>>()?;
            let rowids: Vec<i64> = rows.iter().map(|(rowid, _)| *rowid).collect();
            let paths: Vec<String> = rows.into_iter().map(|(_, path)| path).collect();
            (paths, rowids)
        };

        let conn = self.conn.lock().expect("doc-storage connection poisoned");
        let chunks_total: usize = rowids
            .iter()
            .map(|rowid| count_chunks_for_document(&conn, *rowid))
            .collect::<Result<Vec<_>, _>>()?
            .into_iter()
            .sum();
        drop(conn);

        if !dry_run {
            for path in &matches {
                self.delete_document(tenant, path)?;
            }
        }

        Ok((matches, chunks_total))
    }

    /// Cross-tenant-partition delete for `delete_documents` (§4.9): scopes by
    /// `project_name` alone, or narrowed by `branch_name`/`path_hash`, unlike
    /// [`Self::delete_by_filter`] which operates within one fixed tenant.
    /// Returns `(relative_paths, chunks_deleted)`.
    pub fn delete_by_scope(
        &self,
        project_name: &str,
        branch_name: Option<&str>,
        path_hash: Option<&str>,
        dry_run: bool,
    ) -> Result<(Vec<String>, usize), StorageError> {
        let matches = {
            let conn = self.conn.lock().expect("doc-storage connection poisoned");
            let mut sql = String::from(
                "SELECT rowid_pk, project_name, branch_name, path_hash, relative_path FROM documents WHERE project_name=?1",
            );
            let mut bound: Vec<Box<dyn rusqlite::ToSql>> = vec![Box::new(project_name.to_string())];
            if let Some(branch) = branch_name {
                sql.push_str(&format!(" AND branch_name = ?{}", bound.len() + 1));
                bound.push(Box::new(branch.to_string()));
            }
            if let Some(hash) = path_hash {
                sql.push_str(&format!(" AND path_hash = ?{}", bound.len() + 1));
                bound.push(Box::new(hash.to_string()));
            }

            let mut stmt = conn.prepare(&sql)?;
            let params: Vec<&dyn rusqlite::ToSql> = bound.iter().map(|b| b.as_ref()).collect();
            let rows = stmt.query_map(params.as_slice(), |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                ))
            })?;
            rows.collect::<Result<Vec<_>, _>>()?
        };

        let relative_paths: Vec<String> = matches.iter().map(|(_, _, _, _, path)| path.clone()).collect();

        let chunks_total = {
            let conn = self.conn.lock().expect("doc-storage connection poisoned");
            matches
                .iter()
                .map(|(rowid, ..)| count_chunks_for_document(&conn, *rowid))
                .collect::<Result<Vec<_>, _>>()?
                .into_iter()
                .sum()
        };

        if !dry_run {
            let mut conn = self.conn.lock().expect("doc-storage connection poisoned");
            let tx = conn.transaction()?;
            for (rowid, ..) in &matches {
                delete_document_rows(&tx, *rowid)?;
            }
            tx.commit()?;
        }

        Ok((relative_paths, chunks_total))
    }

    /// Mutates a document's promotion tier in place (`update_promotion_level`,
    /// §4.9). Does not touch chunks or embeddings; only the tier changes.
    pub fn update_promotion_level(
        &self,
        tenant: &TenantKey,
        relative_path: &str,
        level: PromotionLevel,
    ) -> Result<bool, StorageError> {
        let conn = self.conn.lock().expect("doc-storage connection poisoned");
        let updated = conn.execute(
            "UPDATE documents SET promotion_level = ?1, updated_at = ?2
             WHERE project_name=?3 AND branch_name=?4 AND path_hash=?5 AND relative_path=?6",
            params![
                level.as_str(),
                Utc::now().to_rfc3339(),
                tenant.project_name,
                tenant.branch_name,
                tenant.path_hash,
                relative_path,
            ],
        )?;
        Ok(updated > 0)
    }

    pub fn get_by_path(&self, tenant: &TenantKey, relative_path: &str) -> Result<Option<Document>, StorageError> {
        let conn = self.conn.lock().expect("doc-storage connection poisoned");
        conn.query_row(
            &format!("{SELECT_DOCUMENT_WITH_VECTOR} WHERE d.project_name=?1 AND d.branch_name=?2 AND d.path_hash=?3 AND d.relative_path=?4"),
            params![tenant.project_name, tenant.branch_name, tenant.path_hash, relative_path],
            |row| row_to_document(row, tenant),
        )
        .optional()
        .map_err(StorageError::from)
    }

    pub fn get_by_promotion_level(
        &self,
        tenant: &TenantKey,
        level: PromotionLevel,
    ) -> Result<Vec<Document>, StorageError> {
        let conn = self.conn.lock().expect("doc-storage connection poisoned");
        let mut stmt = conn.prepare(&format!(
            "{SELECT_DOCUMENT_WITH_VECTOR} WHERE d.project_name=?1 AND d.branch_name=?2 AND d.path_hash=?3 AND d.promotion_level=?4 ORDER BY d.updated_at DESC"
        ))?;
        let rows = stmt.query_map(
            params![tenant.project_name, tenant.branch_name, tenant.path_hash, level.as_str()],
            |row| row_to_document(row, tenant),
        )?;
        rows.collect::<Result<Vec<_>, _>>().map_err(StorageError::from)
    }

    pub fn list_all(&self, tenant: &TenantKey) -> Result<Vec<DocumentLite>, StorageError> {
        let conn = self.conn.lock().expect("doc-storage connection poisoned");
        let mut stmt = conn.prepare(
            "SELECT id, relative_path, doc_type, title, promotion_level, updated_at
             FROM documents
             WHERE project_name=?1 AND branch_name=?2 AND path_hash=?3
             ORDER BY relative_path ASC",
        )?;
        let rows = stmt.query_map(
            params![tenant.project_name, tenant.branch_name, tenant.path_hash],
            |row| {
                Ok(DocumentLite {
                    id: parse_uuid(row, 0)?,
                    relative_path: row.get(1)?,
                    doc_type: row.get(2)?,
                    title: row.get(3)?,
                    promotion_level: PromotionLevel::parse(&row.get::<_, String>(4)?).unwrap_or_default(),
                    updated_at: parse_datetime(row, 5)?,
                })
            },
        )?;
        rows.collect::<Result<Vec<_>, _>>().map_err(StorageError::from)
    }

    pub fn get_doc_types(&self, tenant: &TenantKey) -> Result<Vec<String>, StorageError> {
        let conn = self.conn.lock().expect("doc-storage connection poisoned");
        let mut stmt = conn.prepare(
            "SELECT DISTINCT doc_type FROM documents
             WHERE project_name=?1 AND branch_name=?2 AND path_hash=?3 AND doc_type IS NOT NULL
             ORDER BY doc_type ASC",
        )?;
        let rows = stmt.query_map(
            params![tenant.project_name, tenant.branch_name, tenant.path_hash],
            |row| row.get::<_, String>(0),
        )?;
        rows.collect::<Result<Vec<_>, _>>().map_err(StorageError::from)
    }

    /// Cosine-similarity search over `vec_distance_cosine`, with tie-break by
    /// `updated_at DESC, id ASC` (§4.3, §8).
    pub fn search_similar(
        &self,
        tenant: &TenantKey,
        query_embedding: &[f32],
        k: usize,
        filters: &SearchFilters,
    ) -> Result<Vec<Hit>, StorageError> {
        self.check_dim(query_embedding)?;

        let conn = self.conn.lock().expect("doc-storage connection poisoned");
        let mut inner = String::from(
            "SELECT d.rowid_pk, d.id, d.relative_path, d.content_hash, d.frontmatter_json, d.body,
                    d.promotion_level, d.created_at, d.updated_at,
                    vec_distance_cosine(v.embedding, ?1) AS distance
             FROM document_vectors v
             JOIN documents d ON d.rowid_pk = v.rowid
             WHERE d.project_name=?2 AND d.branch_name=?3 AND d.path_hash=?4",
        );
        let mut bound: Vec<Box<dyn rusqlite::ToSql>> = vec![
            Box::new(embedding_to_blob(query_embedding)),
            Box::new(tenant.project_name.clone()),
            Box::new(tenant.branch_name.clone()),
            Box::new(tenant.path_hash.clone()),
        ];
        if !filters.doc_types.is_empty() {
            let placeholders: Vec<String> = filters
                .doc_types
                .iter()
                .map(|doc_type| {
                    bound.push(Box::new(doc_type.clone()));
                    format!("?{}", bound.len())
                })
                .collect();
            inner.push_str(&format!(" AND d.doc_type IN ({})", placeholders.join(", ")));
        }
        if let Some(min_level) = filters.min_promotion_level {
            let tiers: Vec<&'static str> = [PromotionLevel::Standard, PromotionLevel::Important, PromotionLevel::Critical]
                .into_iter()
                .filter(|level| *level >= min_level)
                .map(|level| level.as_str())
                .collect();
            let placeholders: Vec<String> = tiers
                .iter()
                .map(|tier| {
                    bound.push(Box::new(tier.to_string()));
                    format!("?{}", bound.len())
                })
                .collect();
            inner.push_str(&format!(" AND d.promotion_level IN ({})", placeholders.join(", ")));
        }

        // `distance` is a SELECT-list alias; SQLite can't filter on it directly in the
        // same scope as its WHERE clause, so the min-score floor is applied by wrapping
        // the query rather than referencing the alias inline.
        let mut sql = format!("SELECT * FROM ({inner}) WHERE 1=1");
        if let Some(min_score) = filters.min_score {
            let max_distance = (1.0 - min_score as f64).max(0.0);
            sql.push_str(&format!(" AND distance <= ?{}", bound.len() + 1));
            bound.push(Box::new(max_distance));
        }
        sql.push_str(&format!(
            " ORDER BY distance ASC, updated_at DESC, id ASC LIMIT ?{}",
            bound.len() + 1
        ));
        bound.push(Box::new(k as i64));

        let mut stmt = conn.prepare(&sql)?;
        let params: Vec<&dyn rusqlite::ToSql> = bound.iter().map(|b| b.as_ref()).collect();
        let rows = stmt.query_map(params.as_slice(), |row| {
            let distance: f64 = row.get(9)?;
            let frontmatter: Frontmatter =
                serde_json::from_str(&row.get::<_, String>(4)?).unwrap_or_default();
            Ok(Hit {
                document: Document {
                    id: parse_uuid(row, 1)?,
                    tenant: tenant.clone(),
                    relative_path: row.get(2)?,
                    content_hash: row.get(3)?,
                    frontmatter,
                    body: row.get(5)?,
                    embedding: None,
                    created_at: parse_datetime(row, 7)?,
                    updated_at: parse_datetime(row, 8)?,
                },
                score: (1.0 - distance).max(0.0) as f32,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(StorageError::from)
    }
}

const SELECT_DOCUMENT_WITH_VECTOR: &str = "SELECT d.id, d.relative_path, d.content_hash, d.frontmatter_json, d.body, d.created_at, d.updated_at FROM documents d";

fn row_to_document(row: &Row, tenant: &TenantKey) -> rusqlite::Result<Document> {
    let frontmatter: Frontmatter =
        serde_json::from_str(&row.get::<_, String>(3)?).unwrap_or_default();
    Ok(Document {
        id: parse_uuid(row, 0)?,
        tenant: tenant.clone(),
        relative_path: row.get(1)?,
        content_hash: row.get(2)?,
        frontmatter,
        body: row.get(4)?,
        embedding: None,
        created_at: parse_datetime(row, 5)?,
        updated_at: parse_datetime(row, 6)?,
    })
}

fn parse_uuid(row: &Row, idx: usize) -> rusqlite::Result<Uuid> {
    let raw: String = row.get(idx)?;
    Uuid::parse_str(&raw).map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e)))
}

fn parse_datetime(row: &Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e)))
}

fn find_document_rowid(
    conn: &Connection,
    tenant: &TenantKey,
    relative_path: &str,
) -> Result<Option<i64>, StorageError> {
    conn.query_row(
        "SELECT rowid_pk FROM documents WHERE project_name=?1 AND branch_name=?2 AND path_hash=?3 AND relative_path=?4",
        params![tenant.project_name, tenant.branch_name, tenant.path_hash, relative_path],
        |row| row.get(0),
    )
    .optional()
    .map_err(StorageError::from)
}

/// Deletes a document row and every dependent chunk/vector row. Chunks cascade
/// via `ON DELETE CASCADE`; `vec0` tables don't participate in FK cascades so
/// their rows are deleted explicitly first (invariant: cascade delete).
/// Returns the number of chunks deleted.
fn delete_document_rows(conn: &Connection, doc_rowid: i64) -> Result<usize, StorageError> {
    let chunk_rowids: Vec<i64> = {
        let mut stmt = conn.prepare("SELECT rowid_pk FROM chunks WHERE parent_id = (SELECT id FROM documents WHERE rowid_pk = ?1)")?;
        let rows = stmt.query_map(params![doc_rowid], |row| row.get(0))?;
        rows.collect::<Result<Vec<_>, _>>()?
    };
    let chunk_count = chunk_rowids.len();

    for rowid in &chunk_rowids {
        conn.execute("DELETE FROM chunk_vectors WHERE rowid = ?1", params![rowid])?;
    }
    conn.execute("DELETE FROM document_vectors WHERE rowid = ?1", params![doc_rowid])?;
    conn.execute("DELETE FROM documents WHERE rowid_pk = ?1", params![doc_rowid])?;
    Ok(chunk_count)
}

/// Counts chunks for a document without deleting anything (dry-run support).
fn count_chunks_for_document(conn: &Connection, doc_rowid: i64) -> Result<usize, StorageError> {
    conn.query_row(
        "SELECT COUNT(*) FROM chunks WHERE parent_id = (SELECT id FROM documents WHERE rowid_pk = ?1)",
        params![doc_rowid],
        |row| row.get::<_, i64>(0),
    )
    .map(|n| n as usize)
    .map_err(StorageError::from)
}
