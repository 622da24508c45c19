use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use notify::event::{CreateKind, ModifyKind, RemoveKind, RenameMode};
use notify::{Event, EventKind};
use tokio::sync::mpsc::UnboundedSender;
use tracing::warn;

use crate::types::{ChangeEvent, WatchConfig};

pub enum WorkerMessage {
    RawEvent(Event),
    Ack(String),
    Stop,
}

/// Per-path debounce state (§4.6): a change lands in `Pending` and only
/// fires once the debounce window elapses with no further change; firing
/// moves the path to `Processing` until the consumer acks it, at which
/// point a change that arrived mid-processing replays immediately.
enum PathState {
    Pending { deadline: Instant, kind: PendingKind },
    Processing { dirty: Option<PendingKind> },
}

#[derive(Clone)]
enum PendingKind {
    Created,
    Changed,
    Deleted,
    Renamed { from: String },
}

/// A `RenameMode::From` half waiting to be paired with the next `To` half.
/// Most platforms deliver a rename as two separate notify events rather than
/// one event carrying both paths, so the halves are matched FIFO here; an
/// unmatched candidate expires into a plain delete once `debounce` elapses
/// with no match, the same way the teacher's `vault-watch` normalizer
/// coalesces split rename events.
struct RenameFromCandidate {
    relative_path: String,
    seen_at: Instant,
}

pub fn spawn_worker(
    watch_root: PathBuf,
    config: WatchConfig,
    raw_rx: Receiver<WorkerMessage>,
    events_tx: UnboundedSender<ChangeEvent>,
) -> JoinHandle<()> {
    std::thread::spawn(move || run_worker(watch_root, config, raw_rx, events_tx))
}

fn run_worker(
    watch_root: PathBuf,
    config: WatchConfig,
    raw_rx: Receiver<WorkerMessage>,
    events_tx: UnboundedSender<ChangeEvent>,
) {
    let mut states: HashMap<String, PathState> = HashMap::new();
    let mut rename_from: VecDeque<RenameFromCandidate> = VecDeque::new();

    loop {
        let timeout = next_timeout(&states, &rename_from, config.debounce);
        match raw_rx.recv_timeout(timeout) {
            Ok(WorkerMessage::RawEvent(event)) => {
                handle_raw_event(&watch_root, &config, &mut states, &mut rename_from, event);
            }
            Ok(WorkerMessage::Ack(path)) => {
                handle_ack(&config, &mut states, &events_tx, path);
            }
            Ok(WorkerMessage::Stop) => return,
            Err(RecvTimeoutError::Timeout) => {
                expire_stale_rename_from(&mut rename_from, &mut states, config.debounce);
                fire_due_paths(&mut states, &events_tx);
            }
            Err(RecvTimeoutError::Disconnected) => return,
        }
    }
}

fn next_timeout(
    states: &HashMap<String, PathState>,
    rename_from: &VecDeque<RenameFromCandidate>,
    debounce: Duration,
) -> Duration {
    let now = Instant::now();
    let pending_deadlines = states.values().filter_map(|state| match state {
        PathState::Pending { deadline, .. } => Some(deadline.saturating_duration_since(now)),
        PathState::Processing { .. } => None,
    });
    let rename_deadline = rename_from
        .front()
        .map(|candidate| (candidate.seen_at + debounce).saturating_duration_since(now));

    pending_deadlines
        .chain(rename_deadline)
        .min()
        .unwrap_or(Duration::from_millis(250))
}

fn handle_raw_event(
    watch_root: &Path,
    config: &WatchConfig,
    states: &mut HashMap<String, PathState>,
    rename_from: &mut VecDeque<RenameFromCandidate>,
    event: Event,
) {
    if let EventKind::Modify(ModifyKind::Name(mode)) = event.kind {
        handle_rename_event(watch_root, config, states, rename_from, mode, &event);
        return;
    }

    let kind = match event.kind {
        EventKind::Create(CreateKind::File) | EventKind::Create(CreateKind::Any) => PendingKind::Created,
        EventKind::Modify(ModifyKind::Data(_)) | EventKind::Modify(ModifyKind::Any) => PendingKind::Changed,
        EventKind::Remove(RemoveKind::File) | EventKind::Remove(RemoveKind::Any) => PendingKind::Deleted,
        _ => return,
    };

    for path in &event.paths {
        let Some(relative) = relativize(watch_root, path) else {
            continue;
        };
        if !config.is_watched(&relative) {
            continue;
        }
        mark_pending(states, relative, kind.clone(), config.debounce);
    }
}

/// Handles a `ModifyKind::Name` event. `Both`/`Any` with two paths carry
/// `[from, to]` directly; `From`/`To` arrive as separate events and are
/// coalesced through `rename_from`.
fn handle_rename_event(
    watch_root: &Path,
    config: &WatchConfig,
    states: &mut HashMap<String, PathState>,
    rename_from: &mut VecDeque<RenameFromCandidate>,
    mode: RenameMode,
    event: &Event,
) {
    match mode {
        RenameMode::Both | RenameMode::Any if event.paths.len() >= 2 => {
            let from = relativize(watch_root, &event.paths[0]);
            let to = relativize(watch_root, &event.paths[1]);
            if let (Some(from), Some(to)) = (from, to) {
                apply_rename(states, config, from, to, config.debounce);
            }
        }
        RenameMode::From => {
            for path in &event.paths {
                if let Some(relative) = relativize(watch_root, path) {
                    rename_from.push_back(RenameFromCandidate {
                        relative_path: relative,
                        seen_at: Instant::now(),
                    });
                }
            }
        }
        RenameMode::To => {
            for path in &event.paths {
                let Some(to) = relativize(watch_root, path) else {
                    continue;
                };
                match match_rename_from(rename_from, states, config.debounce) {
                    Some(from) => apply_rename(states, config, from, to, config.debounce),
                    None => {
                        if config.is_watched(&to) {
                            mark_pending(states, to, PendingKind::Created, config.debounce);
                        }
                    }
                }
            }
        }
        _ => {}
    }
}

/// Resolves a matched `from`/`to` pair into a path state: a no-op rename
/// (same path) is a content change; otherwise the new path gets a
/// `Renamed` pending kind so the pipeline skips re-embedding on an
/// unchanged-content move (§4.6). A rename out of the watched set is
/// surfaced as a delete of the old path.
fn apply_rename(
    states: &mut HashMap<String, PathState>,
    config: &WatchConfig,
    from: String,
    to: String,
    debounce: Duration,
) {
    if from == to {
        if config.is_watched(&to) {
            mark_pending(states, to, PendingKind::Changed, debounce);
        }
        return;
    }

    if config.is_watched(&to) {
        mark_pending(states, to, PendingKind::Renamed { from }, debounce);
    } else if config.is_watched(&from) {
        mark_pending(states, from, PendingKind::Deleted, debounce);
    }
}

/// Pops the oldest unmatched `From` candidate, first expiring any that have
/// already sat longer than `debounce` with no matching `To`.
fn match_rename_from(
    rename_from: &mut VecDeque<RenameFromCandidate>,
    states: &mut HashMap<String, PathState>,
    debounce: Duration,
) -> Option<String> {
    expire_stale_rename_from(rename_from, states, debounce);
    rename_from.pop_front().map(|candidate| candidate.relative_path)
}

/// Drops `From` candidates that never got a matching `To` within `debounce`,
/// dispatching them as deletes of the old path.
fn expire_stale_rename_from(
    rename_from: &mut VecDeque<RenameFromCandidate>,
    states: &mut HashMap<String, PathState>,
    debounce: Duration,
) {
    let now = Instant::now();
    while let Some(front) = rename_from.front() {
        if now.duration_since(front.seen_at) < debounce {
            break;
        }
        let expired = rename_from.pop_front().expect("front just checked Some");
        mark_pending(states, expired.relative_path, PendingKind::Deleted, Duration::ZERO);
    }
}

fn mark_pending(
    states: &mut HashMap<String, PathState>,
    relative: String,
    kind: PendingKind,
    debounce: Duration,
) {
    let deadline = Instant::now() + debounce;
    match states.get_mut(&relative) {
        Some(PathState::Processing { dirty }) => {
            *dirty = Some(kind);
        }
        _ => {
            states.insert(relative, PathState::Pending { deadline, kind });
        }
    }
}

fn fire_due_paths(states: &mut HashMap<String, PathState>, events_tx: &UnboundedSender<ChangeEvent>) {
    let now = Instant::now();
    let due: Vec<String> = states
        .iter()
        .filter_map(|(path, state)| match state {
            PathState::Pending { deadline, .. } if *deadline <= now => Some(path.clone()),
            _ => None,
        })
        .collect();

    for path in due {
        if let Some(PathState::Pending { kind, .. }) = states.get(&path) {
            let event = to_change_event(&path, kind.clone());
            states.insert(path, PathState::Processing { dirty: None });
            if events_tx.send(event).is_err() {
                warn!("doc-watch consumer dropped; worker will keep debouncing");
            }
        }
    }
}

fn handle_ack(
    config: &WatchConfig,
    states: &mut HashMap<String, PathState>,
    events_tx: &UnboundedSender<ChangeEvent>,
    path: String,
) {
    match states.remove(&path) {
        Some(PathState::Processing { dirty: Some(kind) }) => {
            mark_pending(states, path, kind, config.debounce);
        }
        Some(PathState::Processing { dirty: None }) => {}
        other => {
            if let Some(state) = other {
                states.insert(path, state);
            }
        }
    }
    let _ = events_tx;
}

fn to_change_event(relative_path: &str, kind: PendingKind) -> ChangeEvent {
    match kind {
        PendingKind::Created => ChangeEvent::Created(relative_path.to_string()),
        PendingKind::Changed => ChangeEvent::Changed(relative_path.to_string()),
        PendingKind::Deleted => ChangeEvent::Deleted(relative_path.to_string()),
        PendingKind::Renamed { from } => ChangeEvent::Renamed {
            from,
            to: relative_path.to_string(),
        },
    }
}

fn relativize(root: &Path, path: &Path) -> Option<String> {
    path.strip_prefix(root)
        .ok()
        .map(|p| p.to_string_lossy().replace('\\', "/"))
}
