//! Controller health counters

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::queue::MigrationQueue;
use crate::registry::HostRegistry;

#[derive(Debug, Serialize)]
pub struct BalancerHealth {
    pub uptime_seconds: u64,
    pub monitor_cycles: u64,
    pub hosts_tracked: u32,
    pub migrations_pending: u32,
    pub queue_depth: u32,
    pub migrations_completed: u64,
    pub migrations_failed: u64,
}

/// Cheap shared counters bumped by the monitor and executor loops.
#[derive(Clone)]
pub struct HealthTracker {
    start_time: Instant,
    monitor_cycles: Arc<AtomicU64>,
    migrations_completed: Arc<AtomicU64>,
    migrations_failed: Arc<AtomicU64>,
}

impl HealthTracker {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            monitor_cycles: Arc::new(AtomicU64::new(0)),
            migrations_completed: Arc::new(AtomicU64::new(0)),
            migrations_failed: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn mark_cycle(&self) {
        self.monitor_cycles.fetch_add(1, Ordering::Relaxed);
    }

    pub fn mark_migration_completed(&self) {
        self.migrations_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn mark_migration_failed(&self) {
        self.migrations_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn migrations_failed(&self) -> u64 {
        self.migrations_failed.load(Ordering::Relaxed)
    }

    pub fn get_health(&self, registry: &HostRegistry, queue: &MigrationQueue) -> BalancerHealth {
        BalancerHealth {
            uptime_seconds: self.start_time.elapsed().as_secs(),
            monitor_cycles: self.monitor_cycles.load(Ordering::Relaxed),
            hosts_tracked: registry.host_count() as u32,
            migrations_pending: registry.pending_count() as u32,
            queue_depth: queue.len() as u32,
            migrations_completed: self.migrations_completed.load(Ordering::Relaxed),
            migrations_failed: self.migrations_failed.load(Ordering::Relaxed),
        }
    }
}

impl Default for HealthTracker {
    fn default() -> Self {
        Self::new()
    }
}
