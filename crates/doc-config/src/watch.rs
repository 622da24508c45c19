use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};
use tracing::{error, info, warn};

use crate::config::EngineConfig;

const DEBOUNCE: Duration = Duration::from_millis(300);

/// Holds the live config snapshot behind a lock; readers clone the `Arc` and
/// never block a writer mid-read (§9 hot-reload design).
pub struct ConfigStore {
    snapshot: RwLock<Arc<EngineConfig>>,
}

impl ConfigStore {
    pub fn new(initial: EngineConfig) -> Self {
        Self {
            snapshot: RwLock::new(Arc::new(initial)),
        }
    }

    pub fn current(&self) -> Arc<EngineConfig> {
        self.snapshot.read().expect("config lock poisoned").clone()
    }

    fn replace(&self, config: EngineConfig) {
        *self.snapshot.write().expect("config lock poisoned") = Arc::new(config);
    }
}

/// Watches `path` for changes and reloads `store` on each debounced write.
/// A reload that fails validation is logged and the previous snapshot is
/// kept in place rather than poisoning the running engine.
pub async fn watch_config(path: PathBuf, store: Arc<ConfigStore>) -> Result<(), notify::Error> {
    let (tx, mut rx) = unbounded_channel();
    let watch_path = path.clone();

    let mut watcher = RecommendedWatcher::new(
        move |result: notify::Result<notify::Event>| {
            if result.is_ok() {
                let _ = tx.send(());
            }
        },
        notify::Config::default(),
    )?;
    watcher.watch(
        path.parent().unwrap_or_else(|| Path::new(".")),
        RecursiveMode::NonRecursive,
    )?;

    reload_loop(&watch_path, store, &mut rx).await;
    drop(watcher);
    Ok(())
}

async fn reload_loop(path: &Path, store: Arc<ConfigStore>, rx: &mut UnboundedReceiver<()>) {
    while rx.recv().await.is_some() {
        tokio::time::sleep(DEBOUNCE).await;
        while rx.try_recv().is_ok() {}

        match EngineConfig::load(path) {
            Ok(config) => {
                info!(path = %path.display(), "reloaded config");
                store.replace(config);
            }
            Err(err) => {
                warn!(path = %path.display(), error = %err, "rejected invalid config reload, keeping previous snapshot");
            }
        }
    }
    error!("config watch channel closed unexpectedly");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_returns_the_initial_snapshot() {
        let config = EngineConfig::parse(r#"{"project_name": "demo"}"#).unwrap();
        let store = ConfigStore::new(config);
        assert_eq!(store.current().project_name, "demo");
    }

    #[test]
    fn replace_swaps_the_snapshot() {
        let config = EngineConfig::parse(r#"{"project_name": "demo"}"#).unwrap();
        let store = ConfigStore::new(config);
        let next = EngineConfig::parse(r#"{"project_name": "other"}"#).unwrap();
        store.replace(next);
        assert_eq!(store.current().project_name, "other");
    }
}
