use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Sender};
use std::thread::JoinHandle;

use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};

use crate::types::{ChangeEvent, WatchConfig, WatchError};
use crate::worker::{spawn_worker, WorkerMessage};

/// Handle to a running per-path debounced watcher. Dropping it stops the
/// watcher and joins the worker thread.
pub struct WatcherHandle {
    watcher: Option<RecommendedWatcher>,
    worker_tx: Option<Sender<WorkerMessage>>,
    worker_thread: Option<JoinHandle<()>>,
    stopped: bool,
}

impl WatcherHandle {
    /// Signals that `relative_path` has finished processing, allowing the
    /// per-path state machine to return to `Idle` (or replay immediately if
    /// a change arrived mid-processing).
    pub fn ack(&self, relative_path: String) {
        if let Some(tx) = &self.worker_tx {
            let _ = tx.send(WorkerMessage::Ack(relative_path));
        }
    }

    pub fn stop(mut self) -> Result<(), WatchError> {
        self.stop_inner()
    }

    fn stop_inner(&mut self) -> Result<(), WatchError> {
        if self.stopped {
            return Ok(());
        }
        self.watcher.take();
        if let Some(tx) = self.worker_tx.take() {
            let _ = tx.send(WorkerMessage::Stop);
        }
        if let Some(handle) = self.worker_thread.take() {
            handle.join().map_err(|_| WatchError::WorkerJoin)?;
        }
        self.stopped = true;
        Ok(())
    }
}

impl Drop for WatcherHandle {
    fn drop(&mut self) {
        let _ = self.stop_inner();
    }
}

/// Starts watching `root` for markdown changes. Returns the handle plus a
/// receiver of debounced [`ChangeEvent`]s; callers must call
/// [`WatcherHandle::ack`] once they finish acting on each event.
pub fn start_watch(
    root: impl AsRef<Path>,
    config: WatchConfig,
) -> Result<(WatcherHandle, UnboundedReceiver<ChangeEvent>), WatchError> {
    let root = canonicalize_root(root.as_ref())?;
    let (worker_tx, worker_rx) = mpsc::channel();
    let (events_tx, events_rx) = unbounded_channel();

    let worker_thread = spawn_worker(root.clone(), config.clone(), worker_rx, events_tx);

    let callback_tx = worker_tx.clone();
    let mut watcher = RecommendedWatcher::new(
        move |result: notify::Result<notify::Event>| {
            if let Ok(event) = result {
                let _ = callback_tx.send(WorkerMessage::RawEvent(event));
            }
        },
        notify::Config::default(),
    )?;

    let recursive_mode = if config.recursive {
        RecursiveMode::Recursive
    } else {
        RecursiveMode::NonRecursive
    };

    if let Err(source) = watcher.watch(&root, recursive_mode) {
        let _ = worker_tx.send(WorkerMessage::Stop);
        let _ = worker_thread.join();
        return Err(WatchError::WatchPath {
            path: root.display().to_string(),
            source,
        });
    }

    Ok((
        WatcherHandle {
            watcher: Some(watcher),
            worker_tx: Some(worker_tx),
            worker_thread: Some(worker_thread),
            stopped: false,
        },
        events_rx,
    ))
}

fn canonicalize_root(root: &Path) -> Result<PathBuf, WatchError> {
    if !root.exists() {
        return Err(WatchError::RootNotFound(root.display().to_string()));
    }
    if !root.is_dir() {
        return Err(WatchError::RootNotDirectory(root.display().to_string()));
    }
    std::fs::canonicalize(root).map_err(|source| WatchError::Canonicalize {
        path: root.display().to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn emits_relative_paths_for_changes_inside_watched_root() {
        let dir = tempfile::tempdir().unwrap();
        let config = WatchConfig {
            debounce: Duration::from_millis(50),
            ..WatchConfig::default()
        };
        let (handle, mut events) = start_watch(dir.path(), config).unwrap();

        std::fs::write(dir.path().join("note.md"), "# hello").unwrap();

        let event = tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .expect("event within timeout")
            .expect("channel open");
        assert_eq!(event.relative_path(), "note.md");
        handle.ack(event.relative_path().to_string());
        handle.stop().unwrap();
    }

    #[tokio::test]
    async fn non_markdown_files_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let config = WatchConfig {
            debounce: Duration::from_millis(50),
            ..WatchConfig::default()
        };
        let (handle, mut events) = start_watch(dir.path(), config).unwrap();

        std::fs::write(dir.path().join("note.txt"), "hello").unwrap();
        let result = tokio::time::timeout(Duration::from_millis(500), events.recv()).await;
        assert!(result.is_err(), "no event expected for non-markdown file");
        handle.stop().unwrap();
    }
}
