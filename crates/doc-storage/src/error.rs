use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage operation failed: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("embedding dimension mismatch: expected {expected}, got {got}")]
    EmbeddingDimensionMismatch { expected: usize, got: usize },

    #[error("document at `{relative_path}` was modified concurrently")]
    Conflict { relative_path: String },

    #[error("no document found at `{relative_path}`")]
    NotFound { relative_path: String },

    #[error("failed to initialize sqlite-vec extension: {0}")]
    ExtensionInit(String),
}

impl StorageError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Sqlite(_) => "STORAGE_ERROR",
            Self::EmbeddingDimensionMismatch { .. } => "EMBEDDING_DIMENSION_MISMATCH",
            Self::Conflict { .. } => "CONFLICT",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::ExtensionInit(_) => "EXTENSION_INIT_FAILED",
        }
    }
}
