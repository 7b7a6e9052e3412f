//! Pending-migration queue

use parking_lot::Mutex;
use std::collections::VecDeque;

use crate::models::MigrationTask;

/// Unbounded FIFO of pending migrations.
///
/// Synchronized independently from the registry so the executor's slow
/// migration steps never block classification. No priority, no dedup, no
/// bound; a dequeued task is never returned to the queue.
#[derive(Default)]
pub struct MigrationQueue {
    inner: Mutex<VecDeque<MigrationTask>>,
}

impl MigrationQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, task: MigrationTask) {
        self.inner.lock().push_back(task);
    }

    pub fn try_pop(&self) -> Option<MigrationTask> {
        self.inner.lock().pop_front()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}
