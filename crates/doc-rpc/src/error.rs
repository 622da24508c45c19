use doc_core::schema::FieldError;
use doc_core::tenant::TenantError;
use doc_core::CoreError;
use doc_embeddings::EmbeddingError;
use doc_pipeline::PipelineError;
use doc_retrieval::RetrievalError;
use doc_storage::StorageError;
use thiserror::Error;

/// Application-level failure, translated into the `{error:true, code, …}`
/// envelope (§6.2) rather than a JSON-RPC protocol error. `Internal` is the
/// one variant the dispatcher instead surfaces as JSON-RPC `-32603`: it means
/// something escaped classification, not a recognized application failure.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("no project is currently activated")]
    ProjectNotActivated,

    #[error("invalid project: {0}")]
    InvalidProject(String),

    #[error("invalid parameters: {0}")]
    InvalidParams(String),

    #[error("unknown doc_type `{0}`")]
    InvalidDocType(String),

    #[error("document not found: {relative_path}")]
    DocumentNotFound { relative_path: String },

    #[error("embedding service error: {0}")]
    EmbeddingServiceError(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("inference sidecar is not running")]
    OllamaNotRunning,

    #[error("schema validation failed for doc_type `{doc_type}`")]
    SchemaValidationFailed { doc_type: String, errors: Vec<FieldError> },

    #[error("requested tenant does not match the active tenant")]
    TenantMismatch,

    #[error("internal error: {0}")]
    Internal(String),
}

impl DispatchError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::ProjectNotActivated => "PROJECT_NOT_ACTIVATED",
            Self::InvalidProject(_) => "INVALID_PROJECT",
            Self::InvalidParams(_) => "INVALID_PARAMS",
            Self::InvalidDocType(_) => "INVALID_DOC_TYPE",
            Self::DocumentNotFound { .. } => "DOCUMENT_NOT_FOUND",
            Self::EmbeddingServiceError(_) => "EMBEDDING_SERVICE_ERROR",
            Self::Database(_) => "DATABASE_ERROR",
            Self::OllamaNotRunning => "OLLAMA_NOT_RUNNING",
            Self::SchemaValidationFailed { .. } => "SCHEMA_VALIDATION_FAIL",
            Self::TenantMismatch => "TENANT_MISMATCH",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Field-level detail for the envelope's `details`, when there is any
    /// beyond the human message.
    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            Self::SchemaValidationFailed { errors, .. } => Some(serde_json::json!(errors
                .iter()
                .map(|e| serde_json::json!({"field": e.field, "message": e.message}))
                .collect::<Vec<_>>())),
            Self::DocumentNotFound { relative_path } => {
                Some(serde_json::json!({ "relative_path": relative_path }))
            }
            _ => None,
        }
    }
}

impl From<TenantError> for DispatchError {
    fn from(error: TenantError) -> Self {
        match error {
            TenantError::TenantMismatch => Self::TenantMismatch,
            TenantError::InvalidTenant { field, reason } => {
                Self::InvalidProject(format!("{field}: {reason}"))
            }
            TenantError::AlreadyInitialized => Self::Internal(error.to_string()),
        }
    }
}

impl From<CoreError> for DispatchError {
    fn from(error: CoreError) -> Self {
        match error {
            CoreError::Tenant(inner) => inner.into(),
            CoreError::SchemaValidation { doc_type, errors } => {
                Self::SchemaValidationFailed { doc_type, errors }
            }
            CoreError::UnknownDocType(doc_type) => Self::InvalidDocType(doc_type),
            CoreError::Schema(inner) => Self::Internal(inner.to_string()),
        }
    }
}

impl From<StorageError> for DispatchError {
    fn from(error: StorageError) -> Self {
        match error {
            StorageError::NotFound { relative_path } => Self::DocumentNotFound { relative_path },
            StorageError::EmbeddingDimensionMismatch { .. } => {
                Self::EmbeddingServiceError(error.to_string())
            }
            StorageError::Sqlite(_) | StorageError::Conflict { .. } | StorageError::ExtensionInit(_) => {
                Self::Database(error.to_string())
            }
        }
    }
}

impl From<EmbeddingError> for DispatchError {
    fn from(error: EmbeddingError) -> Self {
        match error {
            EmbeddingError::Unavailable | EmbeddingError::CircuitOpen => Self::OllamaNotRunning,
            EmbeddingError::PermitTimeout
            | EmbeddingError::RequestFailed { .. }
            | EmbeddingError::DimensionMismatch { .. }
            | EmbeddingError::DegenerateVector => Self::EmbeddingServiceError(error.to_string()),
        }
    }
}

impl From<PipelineError> for DispatchError {
    fn from(error: PipelineError) -> Self {
        match error {
            PipelineError::SchemaValidation { doc_type, errors } => {
                Self::SchemaValidationFailed { doc_type, errors }
            }
            PipelineError::Embedding(inner) => inner.into(),
            PipelineError::Storage(inner) => inner.into(),
            PipelineError::Io { .. } => Self::Internal(error.to_string()),
        }
    }
}

impl From<RetrievalError> for DispatchError {
    fn from(error: RetrievalError) -> Self {
        match error {
            RetrievalError::EmptyQuery | RetrievalError::InvalidLimit { .. } => {
                Self::InvalidParams(error.to_string())
            }
            RetrievalError::Embedding(inner) => inner.into(),
            RetrievalError::Storage(inner) => inner.into(),
        }
    }
}

impl From<anyhow::Error> for DispatchError {
    fn from(error: anyhow::Error) -> Self {
        Self::Internal(error.to_string())
    }
}
