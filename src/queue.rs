// src/queue.rs

use std::collections::VecDeque;

use std::sync::Arc;

use tokio::sync::Mutex;

use crate::models::{FileDescriptor, ItemStatus, Outcome, ProgressSnapshot, QueueItem};
use crate::ports::BatchObserver;
use crate::remap::RemapTable;

/// Work queue and result accumulator for one `process` run.
///
/// Items are claimed first-available in input order. All mutation goes
/// through a single lock so a snapshot always sees a consistent item set.
/// `on_progress` is delivered before that lock is released, so observers see
/// snapshots in transition order even when workers run on several threads.
pub struct BatchQueue {
    inner: Mutex<QueueState>,
    observer: Arc<dyn BatchObserver>,
}

#[derive(Debug)]
struct QueueState {
    items: Vec<QueueItem>,
    pending: VecDeque<usize>,
    outcomes: Vec<Outcome>,
    current_file: Option<String>,
}

/// Handle to an item a worker has claimed.
#[derive(Debug, Clone)]
pub struct ClaimedItem {
    pub index: usize,
    pub descriptor: FileDescriptor,
    pub destination: String,
}

impl BatchQueue {
    /// Builds one pending item per file, resolving destinations through `remap`.
    pub fn new(
        files: &[FileDescriptor],
        remap: &RemapTable,
        observer: Arc<dyn BatchObserver>,
    ) -> Self {
        let items: Vec<QueueItem> = files
            .iter()
            .map(|f| QueueItem::new(f.clone(), remap.destination_for(&f.path).to_string()))
            .collect();
        let pending = (0..items.len()).collect();
        Self {
            inner: Mutex::new(QueueState {
                items,
                pending,
                outcomes: Vec::new(),
                current_file: None,
            }),
            observer,
        }
    }

    /// Claims the next pending item and moves it to `Downloading`.
    pub async fn claim(&self) -> Option<(ClaimedItem, ProgressSnapshot)> {
        let mut state = self.inner.lock().await;
        let index = state.pending.pop_front()?;
        let item = &mut state.items[index];
        item.status = ItemStatus::Downloading;
        let claimed = ClaimedItem {
            index,
            descriptor: item.descriptor.clone(),
            destination: item.destination.clone(),
        };
        state.current_file = Some(claimed.descriptor.path.clone());
        let snapshot = self.publish(&state);
        Some((claimed, snapshot))
    }

    /// Moves a claimed item to `Uploading`.
    pub async fn mark_uploading(&self, index: usize) -> ProgressSnapshot {
        let mut state = self.inner.lock().await;
        state.transition(index, ItemStatus::Uploading, None);
        self.publish(&state)
    }

    /// Moves a claimed item to `Completed` and records its outcome.
    pub async fn mark_completed(&self, index: usize, skipped: bool) -> ProgressSnapshot {
        let mut state = self.inner.lock().await;
        state.transition(index, ItemStatus::Completed, None);
        let outcome = Outcome::completed(state.items[index].descriptor.clone(), skipped);
        state.outcomes.push(outcome);
        self.publish(&state)
    }

    /// Moves a claimed item to `Error` and records its outcome.
    pub async fn mark_failed(&self, index: usize, message: String) -> ProgressSnapshot {
        let mut state = self.inner.lock().await;
        state.transition(index, ItemStatus::Error, Some(message.clone()));
        let outcome = Outcome::failed(state.items[index].descriptor.clone(), message);
        state.outcomes.push(outcome);
        self.publish(&state)
    }

    // Called with the lock held.
    fn publish(&self, state: &QueueState) -> ProgressSnapshot {
        let snapshot = state.snapshot();
        self.observer.on_progress(&snapshot);
        snapshot
    }

    pub async fn status(&self, index: usize) -> Option<ItemStatus> {
        self.inner.lock().await.items.get(index).map(|i| i.status)
    }

    /// Drains the recorded outcomes, in completion order.
    pub async fn take_outcomes(&self) -> Vec<Outcome> {
        std::mem::take(&mut self.inner.lock().await.outcomes)
    }
}

impl QueueState {
    fn transition(&mut self, index: usize, status: ItemStatus, error: Option<String>) {
        let item = &mut self.items[index];
        debug_assert!(!item.status.is_terminal(), "item {index} already terminal");
        item.status = status;
        item.error_message = error;
    }

    fn snapshot(&self) -> ProgressSnapshot {
        let mut snapshot = ProgressSnapshot {
            total_files: self.items.len(),
            current_file: self.current_file.clone(),
            ..Default::default()
        };
        for item in &self.items {
            match item.status {
                ItemStatus::Completed => snapshot.completed_files += 1,
                ItemStatus::Error => snapshot.failed_files += 1,
                _ => {}
            }
        }
        snapshot
    }
}
