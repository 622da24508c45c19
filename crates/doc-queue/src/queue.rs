use std::collections::{HashSet, VecDeque};
use std::time::Instant;

use tracing::warn;

pub const DEFAULT_CAPACITY: usize = 1000;
const WARNING_THRESHOLD_RATIO: f64 = 0.8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverflowPolicy {
    #[default]
    DropOldest,
    DropNewest,
    Reject,
}

#[derive(Debug, Clone)]
pub struct DeferredEntry {
    pub relative_path: String,
    pub enqueued_at: Instant,
    pub retry_count: u32,
}

/// In-memory FIFO of documents that failed to embed because the sidecar was
/// unavailable, drained once it recovers (§4.4). Paths are deduplicated: a
/// path already queued is not queued twice, matching "re-index the latest
/// version" semantics rather than replaying stale work.
pub struct DeferredQueue {
    entries: VecDeque<DeferredEntry>,
    queued_paths: HashSet<String>,
    /// Paths marked via [`Self::try_remove`]; consulted lazily on the next
    /// pop rather than scanning `entries` to remove them immediately.
    skipped: HashSet<String>,
    capacity: usize,
    overflow_policy: OverflowPolicy,
    warned_at_threshold: bool,
}

impl DeferredQueue {
    pub fn new(capacity: usize, overflow_policy: OverflowPolicy) -> Self {
        Self {
            entries: VecDeque::new(),
            queued_paths: HashSet::new(),
            skipped: HashSet::new(),
            capacity: capacity.max(1),
            overflow_policy,
            warned_at_threshold: false,
        }
    }

    pub fn with_default_capacity(overflow_policy: OverflowPolicy) -> Self {
        Self::new(DEFAULT_CAPACITY, overflow_policy)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, relative_path: &str) -> bool {
        self.queued_paths.contains(relative_path)
    }

    /// Enqueues `relative_path` unless already present. Returns `false` when
    /// the overflow policy is `Reject` and the queue is full.
    pub fn push(&mut self, relative_path: String) -> bool {
        if self.queued_paths.contains(&relative_path) {
            return true;
        }

        if self.entries.len() >= self.capacity {
            match self.overflow_policy {
                OverflowPolicy::Reject => return false,
                OverflowPolicy::DropNewest => return false,
                OverflowPolicy::DropOldest => {
                    if let Some(dropped) = self.entries.pop_front() {
                        self.queued_paths.remove(&dropped.relative_path);
                    }
                }
            }
        }

        self.entries.push_back(DeferredEntry {
            relative_path: relative_path.clone(),
            enqueued_at: Instant::now(),
            retry_count: 0,
        });
        self.queued_paths.insert(relative_path);
        self.check_capacity_warning();
        true
    }

    pub fn pop_front(&mut self) -> Option<DeferredEntry> {
        loop {
            let entry = self.entries.pop_front()?;
            if self.skipped.remove(&entry.relative_path) {
                continue;
            }
            self.queued_paths.remove(&entry.relative_path);
            self.reset_warning_if_below_threshold();
            return Some(entry);
        }
    }

    /// Marks `relative_path` for skip without scanning `entries`: the
    /// drainer pops it like any other entry, but `pop_front` discards it
    /// silently once it reaches the front. Returns whether the path was
    /// actually queued (§4.4).
    pub fn try_remove(&mut self, relative_path: &str) -> bool {
        if self.queued_paths.remove(relative_path) {
            self.skipped.insert(relative_path.to_string());
            true
        } else {
            false
        }
    }

    /// Pops up to `batch_size` entries for the drainer.
    pub fn pop_batch(&mut self, batch_size: usize) -> Vec<DeferredEntry> {
        let mut batch = Vec::with_capacity(batch_size);
        for _ in 0..batch_size {
            match self.pop_front() {
                Some(entry) => batch.push(entry),
                None => break,
            }
        }
        batch
    }

    /// Re-enqueues an entry at the back after a failed drain attempt, with an
    /// incremented retry count; drops it once `max_retries` is exceeded.
    pub fn requeue(&mut self, mut entry: DeferredEntry, max_retries: u32) -> bool {
        entry.retry_count += 1;
        if entry.retry_count > max_retries {
            return false;
        }
        self.queued_paths.insert(entry.relative_path.clone());
        self.entries.push_back(entry);
        true
    }

    fn check_capacity_warning(&mut self) {
        let ratio = self.entries.len() as f64 / self.capacity as f64;
        if ratio >= WARNING_THRESHOLD_RATIO && !self.warned_at_threshold {
            warn!(
                len = self.entries.len(),
                capacity = self.capacity,
                "deferred queue is at {:.0}% capacity",
                ratio * 100.0
            );
            self.warned_at_threshold = true;
        }
    }

    fn reset_warning_if_below_threshold(&mut self) {
        let ratio = self.entries.len() as f64 / self.capacity as f64;
        if ratio < WARNING_THRESHOLD_RATIO {
            self.warned_at_threshold = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pushing_the_same_path_twice_is_deduplicated() {
        let mut queue = DeferredQueue::new(10, OverflowPolicy::DropOldest);
        queue.push("a.md".to_string());
        queue.push("a.md".to_string());
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn drop_oldest_evicts_the_front_entry_on_overflow() {
        let mut queue = DeferredQueue::new(2, OverflowPolicy::DropOldest);
        queue.push("a.md".to_string());
        queue.push("b.md".to_string());
        queue.push("c.md".to_string());
        assert_eq!(queue.len(), 2);
        assert!(!queue.contains("a.md"));
        assert!(queue.contains("c.md"));
    }

    #[test]
    fn reject_policy_refuses_new_entries_when_full() {
        let mut queue = DeferredQueue::new(1, OverflowPolicy::Reject);
        assert!(queue.push("a.md".to_string()));
        assert!(!queue.push("b.md".to_string()));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn requeue_past_max_retries_drops_the_entry() {
        let mut queue = DeferredQueue::new(10, OverflowPolicy::DropOldest);
        queue.push("a.md".to_string());
        let entry = queue.pop_front().unwrap();
        assert!(!queue.requeue(entry.clone(), 0));

        queue.push("b.md".to_string());
        let entry = queue.pop_front().unwrap();
        assert!(queue.requeue(entry, 3));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn try_remove_drops_a_queued_path_before_it_is_drained() {
        let mut queue = DeferredQueue::new(10, OverflowPolicy::DropOldest);
        queue.push("a.md".to_string());
        queue.push("b.md".to_string());

        assert!(queue.try_remove("a.md"));
        assert!(!queue.contains("a.md"));
        assert!(!queue.try_remove("a.md"));

        let entry = queue.pop_front().unwrap();
        assert_eq!(entry.relative_path, "b.md");
        assert!(queue.is_empty());
    }

    #[test]
    fn pop_batch_returns_at_most_the_requested_size() {
        let mut queue = DeferredQueue::new(10, OverflowPolicy::DropOldest);
        for i in 0..5 {
            queue.push(format!("{i}.md"));
        }
        let batch = queue.pop_batch(3);
        assert_eq!(batch.len(), 3);
        assert_eq!(queue.len(), 2);
    }
}
