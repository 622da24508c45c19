use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use doc_core::schema::SchemaRegistry;
use doc_core::tenant::TenantKey;
use doc_embeddings::EmbeddingClient;
use doc_pipeline::{index_file, rename_file};
use doc_queue::drainer::{DEFAULT_BATCH_SIZE, DEFAULT_INTER_BATCH_DELAY, DEFAULT_MAX_RETRIES};
use doc_queue::HealthService;
use doc_rpc::Dispatcher;
use doc_storage::DocumentStore;
use doc_watch::{start_watch, ChangeEvent, WatchConfig};
use tracing::{error, info, warn};

/// Waits for `activate_project` to bind a tenant, then watches its docs root
/// for changes and re-runs the indexing pipeline on each debounced event
/// (§4.6), deferring to the queue on a transient sidecar failure and running
/// the health-triggered drain (§4.4) alongside it.
pub async fn run(dispatcher: Arc<Dispatcher>, repo_path: PathBuf) {
    let (tenant_key, schemas, docs_root) = loop {
        match dispatcher.active_snapshot() {
            Ok(snapshot) => break snapshot,
            Err(_) => tokio::time::sleep(Duration::from_millis(200)).await,
        }
    };

    let (handle, mut events) = match start_watch(&docs_root, WatchConfig::default()) {
        Ok(pair) => pair,
        Err(err) => {
            error!(path = %docs_root.display(), error = %err, "failed to start file watcher");
            return;
        }
    };
    info!(repo = %repo_path.display(), docs_root = %docs_root.display(), "watching for changes");

    let health = Arc::new(HealthService::new(dispatcher.embeddings()));
    let drain_dispatcher = dispatcher.clone();
    let (drain_tx, mut drain_rx) = tokio::sync::mpsc::channel(1);
    let health_task = tokio::spawn({
        let health = health.clone();
        let queue = dispatcher.queue();
        async move {
            health
                .run(
                    drain_tx,
                    || queue.lock().expect("deferred queue lock poisoned").is_empty(),
                    || false,
                )
                .await;
        }
    });

    let drainer_task = tokio::spawn(async move {
        // `DeferredQueue` sits behind a `std::sync::Mutex`, so the lock is
        // never held across an `.await`: each batch is popped, processed
        // with the lock released, then requeued under a fresh lock.
        while drain_rx.recv().await.is_some() {
            let store = drain_dispatcher.store();
            let embeddings = drain_dispatcher.embeddings();
            drain_queue(
                &drain_dispatcher,
                &store,
                &embeddings,
                &schemas,
                &tenant_key,
                &docs_root,
            )
            .await;
        }
    });

    while let Some(event) = events.recv().await {
        let relative_path = event.relative_path().to_string();
        match &event {
            ChangeEvent::Deleted(_) => {
                dispatcher.queue().lock().expect("deferred queue lock poisoned").try_remove(&relative_path);
                if let Ok((tenant_key, _, _)) = dispatcher.active_snapshot() {
                    if let Err(err) = dispatcher.store().delete_document(&tenant_key, &relative_path) {
                        warn!(path = %relative_path, error = %err, "failed to delete removed document");
                    }
                }
            }
            ChangeEvent::Created(_) | ChangeEvent::Changed(_) => {
                if let Ok((tenant_key, schemas, docs_root)) = dispatcher.active_snapshot() {
                    let outcome = index_file(
                        &dispatcher.store(),
                        &dispatcher.embeddings(),
                        &schemas,
                        &tenant_key,
                        &docs_root,
                        &relative_path,
                    )
                    .await;
                    match outcome {
                        Ok(_) => {}
                        Err(err) if err.is_transient() => {
                            dispatcher.queue().lock().expect("deferred queue lock poisoned").push(relative_path.clone());
                            warn!(path = %relative_path, "deferred watch-triggered index after sidecar failure");
                        }
                        Err(err) => {
                            warn!(path = %relative_path, error = %err, "failed to index changed document");
                        }
                    }
                }
            }
            ChangeEvent::Renamed { from, to } => {
                if let Ok((tenant_key, schemas, docs_root)) = dispatcher.active_snapshot() {
                    let outcome = rename_file(&dispatcher.store(), &dispatcher.embeddings(), &schemas, &tenant_key, &docs_root, from, to).await;
                    match outcome {
                        Ok(_) => {}
                        Err(err) if err.is_transient() => {
                            dispatcher.queue().lock().expect("deferred queue lock poisoned").push(to.clone());
                            warn!(path = %to, "deferred watch-triggered rename-reindex after sidecar failure");
                        }
                        Err(err) => {
                            warn!(path = %to, error = %err, "failed to process renamed document");
                        }
                    }
                }
            }
        }
        handle.ack(relative_path);
    }

    health_task.abort();
    drainer_task.abort();
}

/// Drains the deferred queue to empty, re-running the pipeline for each
/// entry. The queue's `std::sync::Mutex` is only ever held for the
/// synchronous `pop_batch`/`requeue` calls, never across the `index_file`
/// await, so this can run inside a spawned task.
async fn drain_queue(
    dispatcher: &Dispatcher,
    store: &Arc<DocumentStore>,
    embeddings: &Arc<EmbeddingClient>,
    schemas: &Arc<SchemaRegistry>,
    tenant_key: &TenantKey,
    docs_root: &Path,
) {
    loop {
        let batch = dispatcher.queue().lock().expect("deferred queue lock poisoned").pop_batch(DEFAULT_BATCH_SIZE);
        if batch.is_empty() {
            return;
        }

        for entry in batch {
            match index_file(store, embeddings, schemas, tenant_key, docs_root, &entry.relative_path).await {
                Ok(_) => info!(path = %entry.relative_path, "drained deferred document"),
                Err(err) if err.is_transient() => {
                    let requeued = dispatcher
                        .queue()
                        .lock()
                        .expect("deferred queue lock poisoned")
                        .requeue(entry.clone(), DEFAULT_MAX_RETRIES);
                    if !requeued {
                        warn!(path = %entry.relative_path, "dropping deferred document after exceeding max retries");
                    }
                }
                Err(err) => {
                    warn!(path = %entry.relative_path, error = %err, "skipping stale deferred document");
                }
            }
        }

        if dispatcher.queue().lock().expect("deferred queue lock poisoned").is_empty() {
            return;
        }
        tokio::time::sleep(DEFAULT_INTER_BATCH_DELAY).await;
    }
}
