use thiserror::Error;

use crate::schema::FieldError;
use crate::tenant::TenantError;

/// Errors shared across crates for tenant/model/schema concerns. Each variant
/// maps to one UPPER_SNAKE application error code (§6.2, §7).
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Tenant(#[from] TenantError),

    #[error("document frontmatter failed schema validation for doc_type `{doc_type}`")]
    SchemaValidation {
        doc_type: String,
        errors: Vec<FieldError>,
    },

    #[error("doc_type `{0}` has no registered schema")]
    UnknownDocType(String),

    #[error(transparent)]
    Schema(#[from] crate::schema::SchemaError),
}

impl CoreError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Tenant(TenantError::AlreadyInitialized) => "TENANT_ALREADY_ACTIVE",
            Self::Tenant(TenantError::InvalidTenant { .. }) => "INVALID_TENANT",
            Self::Tenant(TenantError::TenantMismatch) => "PROJECT_NOT_ACTIVATED",
            Self::SchemaValidation { .. } => "SCHEMA_VALIDATION_FAILED",
            Self::UnknownDocType(_) => "UNKNOWN_DOC_TYPE",
            Self::Schema(_) => "SCHEMA_LOAD_FAILED",
        }
    }
}
