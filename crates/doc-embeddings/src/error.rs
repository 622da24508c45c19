use thiserror::Error;

#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("inference sidecar is unavailable")]
    Unavailable,

    #[error("timed out waiting for a concurrency permit")]
    PermitTimeout,

    #[error("circuit breaker is open; embedding requests are suspended")]
    CircuitOpen,

    #[error("embedding request failed after {attempts} attempts: {source}")]
    RequestFailed {
        attempts: u32,
        #[source]
        source: anyhow::Error,
    },

    #[error("sidecar returned an embedding of dimension {got}, expected {expected}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("sidecar returned an embedding with zero or non-finite norm")]
    DegenerateVector,
}

impl EmbeddingError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Unavailable => "SIDECAR_UNAVAILABLE",
            Self::PermitTimeout => "PERMIT_TIMEOUT",
            Self::CircuitOpen => "CIRCUIT_OPEN",
            Self::RequestFailed { .. } => "EMBEDDING_REQUEST_FAILED",
            Self::DimensionMismatch { .. } => "EMBEDDING_DIMENSION_MISMATCH",
            Self::DegenerateVector => "EMBEDDING_DEGENERATE_VECTOR",
        }
    }

    /// Transient failures are worth retrying/queueing; permanent ones are not
    /// (§5 retry policy, §4.4 deferred queue only enqueues transient misses).
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Unavailable | Self::PermitTimeout | Self::CircuitOpen | Self::RequestFailed { .. }
        )
    }
}
