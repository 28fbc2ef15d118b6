//! Registry of running background operations.
//!
//! Plays the role of a progress manager: it lists what is running, lets a
//! user-facing layer (progress dialog, Ctrl-C handler) cancel everything, and
//! lets callers wait until some operation has started.

use super::task::{TaskProgress, TaskState};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Tracks the operations started by a [`BackgroundExecutor`](super::BackgroundExecutor).
#[derive(Debug)]
pub struct TaskManager {
    tasks: Mutex<BTreeMap<u64, Arc<TaskState>>>,
}

impl TaskManager {
    /// Creates an empty manager.
    #[must_use]
    pub fn new() -> Self {
        Self {
            tasks: Mutex::new(BTreeMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<u64, Arc<TaskState>>> {
        // A poisoned map is still structurally valid.
        self.tasks
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    pub(crate) fn register(&self, state: Arc<TaskState>) {
        self.lock().insert(state.id(), state);
    }

    pub(crate) fn unregister(&self, id: u64) {
        self.lock().remove(&id);
    }

    /// Number of operations currently running.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.lock().len()
    }

    /// Progress snapshots of all running operations, oldest first.
    #[must_use]
    pub fn running(&self) -> Vec<TaskProgress> {
        self.lock().values().map(|state| state.snapshot()).collect()
    }

    /// Requests cancellation of every running operation.
    ///
    /// Returns how many operations were signaled.
    pub fn cancel_all(&self) -> usize {
        let tasks = self.lock();
        for state in tasks.values() {
            state.cancel();
        }
        if !tasks.is_empty() {
            tracing::info!(count = tasks.len(), "Canceling running operations");
        }
        tasks.len()
    }

    /// Requests cancellation of one operation by id.
    ///
    /// Returns false if no such operation is running.
    pub fn cancel(&self, id: u64) -> bool {
        self.lock().get(&id).is_some_and(|state| {
            state.cancel();
            true
        })
    }

    /// Blocks until at least one operation is running or the timeout elapses.
    ///
    /// Returns true if an operation was observed running.
    #[must_use]
    pub fn wait_until_active(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.active_count() > 0 {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
    }
}

impl Default for TaskManager {
    fn default() -> Self {
        Self::new()
    }
}
