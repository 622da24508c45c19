use rusqlite::Connection;

use crate::error::StorageError;

/// Creates the document/chunk tables and their paired `vec0` vector tables.
/// `embedding_dim` is fixed for the lifetime of the database file; a later
/// mismatch surfaces as [`StorageError::EmbeddingDimensionMismatch`].
pub fn run(conn: &Connection, embedding_dim: usize) -> Result<(), StorageError> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS documents (
            rowid_pk        INTEGER PRIMARY KEY AUTOINCREMENT,
            id              TEXT NOT NULL UNIQUE,
            project_name    TEXT NOT NULL,
            branch_name     TEXT NOT NULL,
            path_hash       TEXT NOT NULL,
            relative_path   TEXT NOT NULL,
            content_hash    TEXT NOT NULL,
            doc_type        TEXT,
            title           TEXT,
            frontmatter_json TEXT NOT NULL,
            body            TEXT NOT NULL,
            promotion_level TEXT NOT NULL DEFAULT 'standard',
            has_embedding   INTEGER NOT NULL DEFAULT 0,
            created_at      TEXT NOT NULL,
            updated_at      TEXT NOT NULL,
            UNIQUE(project_name, branch_name, path_hash, relative_path)
        );

        CREATE INDEX IF NOT EXISTS idx_documents_tenant
            ON documents(project_name, branch_name, path_hash);

        CREATE TABLE IF NOT EXISTS chunks (
            rowid_pk        INTEGER PRIMARY KEY AUTOINCREMENT,
            id              TEXT NOT NULL UNIQUE,
            parent_id       TEXT NOT NULL REFERENCES documents(id) ON DELETE CASCADE,
            project_name    TEXT NOT NULL,
            branch_name     TEXT NOT NULL,
            path_hash       TEXT NOT NULL,
            chunk_index     INTEGER NOT NULL,
            start_line      INTEGER NOT NULL,
            end_line        INTEGER NOT NULL,
            content         TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_chunks_parent ON chunks(parent_id);
        ",
    )?;

    conn.execute_batch(&format!(
        "CREATE VIRTUAL TABLE IF NOT EXISTS document_vectors
            USING vec0(embedding float[{embedding_dim}]);
         CREATE VIRTUAL TABLE IF NOT EXISTS chunk_vectors
            USING vec0(embedding float[{embedding_dim}]);"
    ))?;

    Ok(())
}
