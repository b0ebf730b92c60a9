use crate::{Task, TaskState};
use chrono::Utc;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::time::Duration;

/// Number of tracked tasks per state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StateCounts {
    pub queued: usize,
    pub running: usize,
    pub done: usize,
    pub failed: usize,
}

/// Latest published snapshot of every task, keyed by task ID.
///
/// One lock covers both map membership and entry contents, so readers only
/// ever observe whole snapshots.
#[derive(Debug, Default)]
pub struct StateStore {
    tasks: Mutex<HashMap<String, Task>>,
}

impl StateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the snapshot for `task.id`.
    pub fn publish(&self, task: &Task) {
        let mut tasks = self.tasks.lock();
        tasks.insert(task.id.clone(), task.clone());
    }

    /// Run `send` under the store lock and record the task as queued only if
    /// it succeeds.
    ///
    /// Holding the lock across the hand-off guarantees the Queued record is
    /// written before any worker can publish Running for the same task.
    /// `send` must not block.
    pub fn admit<F, E>(&self, mut task: Task, send: F) -> Result<(), E>
    where
        F: FnOnce(Task) -> Result<(), E>,
    {
        task.state = TaskState::Queued;
        task.updated_at = Utc::now();
        let snapshot = task.clone();

        let mut tasks = self.tasks.lock();
        send(task)?;
        tasks.insert(snapshot.id.clone(), snapshot);
        Ok(())
    }

    /// Get the last published snapshot
    pub fn get(&self, id: &str) -> Option<Task> {
        let tasks = self.tasks.lock();
        tasks.get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.tasks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn count_by_state(&self) -> StateCounts {
        let tasks = self.tasks.lock();
        let mut counts = StateCounts::default();

        for task in tasks.values() {
            match task.state {
                TaskState::Queued => counts.queued += 1,
                TaskState::Running => counts.running += 1,
                TaskState::Done => counts.done += 1,
                TaskState::Failed => counts.failed += 1,
            }
        }

        counts
    }

    /// Drop terminal snapshots last updated more than `older_than` ago.
    /// Returns the number of entries removed.
    pub fn prune_terminal(&self, older_than: Duration) -> usize {
        let cutoff = chrono::Duration::from_std(older_than)
            .ok()
            .and_then(|age| Utc::now().checked_sub_signed(age));

        let mut tasks = self.tasks.lock();
        let before = tasks.len();
        tasks.retain(|_, task| {
            !task.is_terminal() || cutoff.map_or(true, |cutoff| task.updated_at > cutoff)
        });
        before - tasks.len()
    }
}
