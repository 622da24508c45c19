use doc_embeddings::EmbeddingError;
use doc_storage::StorageError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("query must not be empty")]
    EmptyQuery,

    #[error("limit must be between 1 and {max}, got {got}")]
    InvalidLimit { max: usize, got: usize },

    #[error(transparent)]
    Embedding(#[from] EmbeddingError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl RetrievalError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::EmptyQuery => "INVALID_QUERY",
            Self::InvalidLimit { .. } => "INVALID_LIMIT",
            Self::Embedding(err) => err.code(),
            Self::Storage(err) => err.code(),
        }
    }
}
