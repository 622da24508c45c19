use doc_core::schema::FieldError;
use doc_embeddings::EmbeddingError;
use doc_storage::StorageError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("frontmatter for doc_type `{doc_type}` failed schema validation")]
    SchemaValidation { doc_type: String, errors: Vec<FieldError> },

    #[error(transparent)]
    Embedding(#[from] EmbeddingError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl PipelineError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Io { .. } => "IO_ERROR",
            Self::SchemaValidation { .. } => "SCHEMA_VALIDATION_FAILED",
            Self::Embedding(err) => err.code(),
            Self::Storage(err) => err.code(),
        }
    }

    /// Transient failures should be deferred rather than surfaced as a hard
    /// indexing failure (§4.4).
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Embedding(err) if err.is_transient())
    }
}
