use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read { path: String, source: std::io::Error },

    #[error("config file is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("invalid config field `{field}`: {reason}")]
    InvalidField { field: String, reason: String },
}

impl ConfigError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Read { .. } => "CONFIG_READ_FAILED",
            Self::InvalidJson(_) => "CONFIG_INVALID_JSON",
            Self::InvalidField { .. } => "CONFIG_INVALID_FIELD",
        }
    }
}
