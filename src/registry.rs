//! Shared host registry
//!
//! The single piece of state shared between the monitor and any reader. One
//! mutex guards the whole map, and the monitor's queue push happens inside
//! that critical section, so a reader can never observe a status change
//! without the corresponding migration having been scheduled. The backing
//! map is never exposed.

use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};

use crate::models::{MigrationTask, Node};
use crate::queue::MigrationQueue;

#[derive(Default)]
pub struct HostRegistry {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    nodes: HashMap<String, Node>,
    /// Hosts with a migration scheduled but not yet finished. Guards
    /// against re-enqueueing a host on every overloaded cycle.
    pending: HashSet<String>,
}

impl HostRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, host_id: &str) -> Option<Node> {
        self.inner.lock().nodes.get(host_id).cloned()
    }

    /// Consistent copy of every node, ordered by host id.
    pub fn snapshot_all(&self) -> Vec<Node> {
        let guard = self.inner.lock();
        let mut nodes: Vec<Node> = guard.nodes.values().cloned().collect();
        nodes.sort_by(|a, b| a.host_id.cmp(&b.host_id));
        nodes
    }

    pub fn host_count(&self) -> usize {
        self.inner.lock().nodes.len()
    }

    pub fn pending_count(&self) -> usize {
        self.inner.lock().pending.len()
    }

    pub fn migration_pending(&self, host_id: &str) -> bool {
        self.inner.lock().pending.contains(host_id)
    }

    /// Replaces the host's node and, when a candidate is given and no
    /// migration is already pending for that host, pushes it onto the queue
    /// and marks the host pending -- all under one lock, so record and
    /// enqueue are a single atomic unit per host.
    ///
    /// Returns whether the candidate was scheduled.
    pub fn record(
        &self,
        node: Node,
        candidate: Option<MigrationTask>,
        queue: &MigrationQueue,
    ) -> bool {
        let mut guard = self.inner.lock();
        let host_id = node.host_id.clone();
        guard.nodes.insert(host_id.clone(), node);
        match candidate {
            Some(task) if !guard.pending.contains(&host_id) => {
                queue.push(task);
                guard.pending.insert(host_id);
                true
            }
            _ => false,
        }
    }

    /// Called by the executor once a migration reaches a terminal outcome,
    /// so the next overload can schedule again.
    pub fn clear_pending(&self, host_id: &str) {
        self.inner.lock().pending.remove(host_id);
    }
}
