use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeEvent {
    Created(String),
    Changed(String),
    Deleted(String),
    Renamed { from: String, to: String },
}

impl ChangeEvent {
    pub fn relative_path(&self) -> &str {
        match self {
            Self::Created(path) | Self::Changed(path) | Self::Deleted(path) => path,
            Self::Renamed { to, .. } => to,
        }
    }
}

#[derive(Debug, Clone)]
pub struct WatchConfig {
    pub debounce: Duration,
    /// Only files whose relative path ends in one of these suffixes are
    /// watched. Default: markdown only (§4.6).
    pub include_suffixes: Vec<String>,
    /// Path components that exclude a file/directory from being watched.
    pub exclude_components: Vec<String>,
    pub recursive: bool,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(500),
            include_suffixes: vec![".md".to_string()],
            exclude_components: vec!["node_modules".to_string(), ".git".to_string()],
            recursive: true,
        }
    }
}

impl WatchConfig {
    pub fn is_watched(&self, relative_path: &str) -> bool {
        let matches_suffix = self
            .include_suffixes
            .iter()
            .any(|suffix| relative_path.ends_with(suffix.as_str()));
        let excluded = relative_path
            .split('/')
            .any(|component| self.exclude_components.iter().any(|ex| ex == component));
        matches_suffix && !excluded
    }
}

#[derive(Debug, Error)]
pub enum WatchError {
    #[error("watch root does not exist: {0}")]
    RootNotFound(String),
    #[error("watch root is not a directory: {0}")]
    RootNotDirectory(String),
    #[error("failed to canonicalize watch root {path}: {source}")]
    Canonicalize { path: String, source: std::io::Error },
    #[error("failed to initialize watcher: {0}")]
    WatcherInit(#[from] notify::Error),
    #[error("failed to watch path {path}: {source}")]
    WatchPath { path: String, source: notify::Error },
    #[error("worker thread join failed")]
    WorkerJoin,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_watches_markdown_outside_node_modules() {
        let config = WatchConfig::default();
        assert!(config.is_watched("docs/readme.md"));
        assert!(!config.is_watched("vendor/node_modules/pkg/readme.md"));
        assert!(!config.is_watched("docs/readme.txt"));
    }
}
