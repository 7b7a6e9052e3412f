//! End-to-end tests for the consolidation controller, driven against a mock
//! workload runtime.

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use host_balancer::config::{MigrationConf, MonitorConf, Thresholds};
use host_balancer::executor::{MigrationExecutor, MigrationOutcome, MigrationStep};
use host_balancer::health::HealthTracker;
use host_balancer::models::{LoadStatus, MigrationTask, Node};
use host_balancer::monitor::HostMonitor;
use host_balancer::queue::MigrationQueue;
use host_balancer::registry::HostRegistry;
use host_balancer::runtime::{
    ImageRef, RuntimeError, Workload, WorkloadFilter, WorkloadRuntime, WorkloadStats,
};

#[derive(Default)]
struct MockRuntime {
    workloads: Mutex<Vec<Workload>>,
    stats: Mutex<HashMap<String, WorkloadStats>>,
    stopped: Mutex<Vec<String>>,
    started: Mutex<Vec<String>>,
    launched: Mutex<Vec<String>>,
    snapshot_calls: AtomicU32,
    fail_stop: AtomicBool,
    fail_snapshot: AtomicBool,
    unavailable: AtomicBool,
}

impl MockRuntime {
    fn add(&self, workload: Workload, stats: WorkloadStats) {
        self.stats.lock().insert(workload.id.clone(), stats);
        self.workloads.lock().push(workload);
    }
}

#[async_trait]
impl WorkloadRuntime for MockRuntime {
    async fn list_workloads(&self, _filter: &WorkloadFilter) -> Result<Vec<Workload>, RuntimeError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(RuntimeError::Unavailable("connection refused".into()));
        }
        Ok(self.workloads.lock().clone())
    }

    async fn stats(&self, workload: &Workload) -> Result<WorkloadStats, RuntimeError> {
        Ok(self.stats.lock().get(&workload.id).cloned().unwrap_or_default())
    }

    async fn stop(&self, workload: &Workload) -> Result<(), RuntimeError> {
        if self.fail_stop.load(Ordering::SeqCst) {
            return Err(RuntimeError::Api { status: 500, message: "cannot stop".into() });
        }
        self.stopped.lock().push(workload.id.clone());
        Ok(())
    }

    async fn snapshot(&self, _workload: &Workload, image_name: &str) -> Result<ImageRef, RuntimeError> {
        self.snapshot_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_snapshot.load(Ordering::SeqCst) {
            return Err(RuntimeError::Api { status: 500, message: "commit failed".into() });
        }
        Ok(ImageRef(format!("sha256:{image_name}")))
    }

    async fn launch(
        &self,
        _image: &ImageRef,
        name: &str,
        host_hint: Option<&str>,
    ) -> Result<Workload, RuntimeError> {
        self.launched.lock().push(name.to_string());
        Ok(Workload {
            id: format!("new-{name}"),
            name: name.to_string(),
            host_id: host_hint.unwrap_or_default().to_string(),
        })
    }

    async fn start(&self, workload: &Workload) -> Result<(), RuntimeError> {
        self.started.lock().push(workload.id.clone());
        Ok(())
    }
}

/// Counters that `sample` maps back to the given whole percentages.
fn stats_for(cpu_pct: u64, mem_pct: u64) -> WorkloadStats {
    WorkloadStats {
        cpu_total_usage: 1_000_000 + cpu_pct * 1_000,
        precpu_total_usage: Some(1_000_000),
        system_cpu_usage: Some(2_100_000),
        pre_system_cpu_usage: Some(2_000_000),
        online_cpus: Some(1),
        mem_usage: Some(mem_pct * 1_000),
        mem_limit: Some(100_000),
    }
}

fn workload(id: &str, host: &str) -> Workload {
    Workload { id: id.into(), name: format!("vm-{id}"), host_id: host.into() }
}

struct Harness {
    runtime: Arc<MockRuntime>,
    registry: Arc<HostRegistry>,
    queue: Arc<MigrationQueue>,
    health: HealthTracker,
}

impl Harness {
    fn new() -> Self {
        Self {
            runtime: Arc::new(MockRuntime::default()),
            registry: Arc::new(HostRegistry::new()),
            queue: Arc::new(MigrationQueue::new()),
            health: HealthTracker::new(),
        }
    }

    fn monitor(&self, conf: MonitorConf) -> HostMonitor {
        HostMonitor::new(
            self.runtime.clone(),
            self.registry.clone(),
            self.queue.clone(),
            self.health.clone(),
            Thresholds::default(),
            conf,
        )
    }

    fn executor(&self, conf: MigrationConf) -> MigrationExecutor {
        MigrationExecutor::new(
            self.runtime.clone(),
            self.registry.clone(),
            self.queue.clone(),
            self.health.clone(),
            conf,
        )
    }
}

fn fast_migration() -> MigrationConf {
    MigrationConf { backoff_base_ms: 1, ..Default::default() }
}

#[tokio::test]
async fn overloaded_host_records_node_and_queues_heaviest_workload() {
    let harness = Harness::new();
    harness.runtime.add(workload("a", "h1"), stats_for(60, 10));
    harness.runtime.add(workload("b", "h1"), stats_for(70, 10));
    harness.runtime.add(workload("c", "h1"), stats_for(80, 10));

    let mut monitor = harness.monitor(MonitorConf::default());
    monitor.scan().await;

    let node = harness.registry.get("h1").expect("node recorded");
    assert_eq!(node.status, LoadStatus::Overloaded);
    assert!((node.avg_cpu - 70.0).abs() < 1e-9);

    assert_eq!(harness.queue.len(), 1, "exactly one migration scheduled");
    let task = harness.queue.try_pop().unwrap();
    assert_eq!(task.workload.name, "vm-c");
    assert_eq!(task.source_host, "h1");
}

#[tokio::test]
async fn repeated_overload_does_not_duplicate_pending_migration() {
    let harness = Harness::new();
    harness.runtime.add(workload("a", "h1"), stats_for(90, 10));

    let mut monitor = harness.monitor(MonitorConf::default());
    monitor.scan().await;
    monitor.scan().await;
    monitor.scan().await;

    assert_eq!(harness.queue.len(), 1, "pending guard suppresses re-enqueue");
    assert!(harness.registry.migration_pending("h1"));
}

#[tokio::test]
async fn normal_and_underloaded_hosts_schedule_nothing() {
    let harness = Harness::new();
    harness.runtime.add(workload("a", "h1"), stats_for(30, 30));
    harness.runtime.add(workload("b", "h2"), stats_for(10, 10));

    let mut monitor = harness.monitor(MonitorConf::default());
    monitor.scan().await;

    assert_eq!(harness.registry.get("h1").unwrap().status, LoadStatus::Normal);
    assert_eq!(harness.registry.get("h2").unwrap().status, LoadStatus::Underloaded);
    assert!(harness.queue.is_empty());
}

#[tokio::test]
async fn unavailable_runtime_skips_scan_without_state_change() {
    let harness = Harness::new();
    harness.runtime.add(workload("a", "h1"), stats_for(90, 10));
    harness.runtime.unavailable.store(true, Ordering::SeqCst);

    let mut monitor = harness.monitor(MonitorConf::default());
    monitor.scan().await;

    assert!(harness.registry.get("h1").is_none());
    assert!(harness.queue.is_empty());
}

#[tokio::test]
async fn confirm_cycles_defers_scheduling_until_streak_reached() {
    let harness = Harness::new();
    harness.runtime.add(workload("a", "h1"), stats_for(90, 10));

    let conf = MonitorConf { confirm_cycles: 2, ..Default::default() };
    let mut monitor = harness.monitor(conf);

    monitor.scan().await;
    assert!(harness.queue.is_empty(), "first overloaded reading is not enough");
    monitor.scan().await;
    assert_eq!(harness.queue.len(), 1, "second consecutive reading schedules");
}

#[tokio::test]
async fn executor_runs_stop_snapshot_relaunch_in_order() {
    let harness = Harness::new();
    let source = workload("a", "h1");
    let node = Node {
        host_id: "h1".into(),
        avg_cpu: 70.0,
        avg_mem: 10.0,
        status: LoadStatus::Overloaded,
        sampled_at: Utc::now(),
    };
    harness.registry.record(
        node,
        Some(MigrationTask::new(source.clone(), "h1")),
        &harness.queue,
    );

    let executor = harness.executor(fast_migration());
    let outcome = executor.drain_one().await.expect("one task to drain");

    assert!(matches!(outcome, MigrationOutcome::Success { .. }));
    assert_eq!(*harness.runtime.stopped.lock(), vec!["a".to_string()]);
    assert_eq!(*harness.runtime.launched.lock(), vec!["migrated-vm-a".to_string()]);
    assert!(
        !harness.registry.migration_pending("h1"),
        "terminal outcome clears the pending mark"
    );
    assert!(harness.queue.is_empty());
}

#[tokio::test]
async fn snapshot_failure_leaves_workload_stopped_and_unlaunched() {
    let harness = Harness::new();
    harness.runtime.fail_snapshot.store(true, Ordering::SeqCst);
    harness.queue.push(MigrationTask::new(workload("a", "h1"), "h1"));

    let executor = harness.executor(fast_migration());
    let outcome = executor.drain_one().await.expect("one task to drain");

    match outcome {
        MigrationOutcome::Failed { step, .. } => assert_eq!(step, MigrationStep::Snapshot),
        other => panic!("expected snapshot failure, got {other:?}"),
    }
    assert_eq!(*harness.runtime.stopped.lock(), vec!["a".to_string()]);
    assert!(harness.runtime.launched.lock().is_empty(), "nothing launched");
    assert!(harness.runtime.started.lock().is_empty(), "no recovery by default");
    assert_eq!(harness.health.migrations_failed(), 1);
}

#[tokio::test]
async fn stop_failure_reports_the_failing_step() {
    let harness = Harness::new();
    harness.runtime.fail_stop.store(true, Ordering::SeqCst);
    harness.queue.push(MigrationTask::new(workload("a", "h1"), "h1"));

    let executor = harness.executor(fast_migration());
    let outcome = executor.drain_one().await.expect("one task to drain");

    match outcome {
        MigrationOutcome::Failed { step, .. } => assert_eq!(step, MigrationStep::Stop),
        other => panic!("expected stop failure, got {other:?}"),
    }
    assert_eq!(harness.runtime.snapshot_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn retry_policy_runs_exactly_max_attempts() {
    let harness = Harness::new();
    harness.runtime.fail_snapshot.store(true, Ordering::SeqCst);
    harness.queue.push(MigrationTask::new(workload("a", "h1"), "h1"));

    let conf = MigrationConf { max_attempts: 3, backoff_base_ms: 1, ..Default::default() };
    let executor = harness.executor(conf);
    let outcome = executor.drain_one().await.expect("one task to drain");

    assert!(matches!(outcome, MigrationOutcome::Failed { .. }));
    assert_eq!(harness.runtime.snapshot_calls.load(Ordering::SeqCst), 3);
    assert_eq!(harness.health.migrations_failed(), 1, "one terminal failure, not three");
}

#[tokio::test]
async fn recover_source_restarts_the_stopped_workload() {
    let harness = Harness::new();
    harness.runtime.fail_snapshot.store(true, Ordering::SeqCst);
    harness.queue.push(MigrationTask::new(workload("a", "h1"), "h1"));

    let conf = MigrationConf { recover_source: true, backoff_base_ms: 1, ..Default::default() };
    let executor = harness.executor(conf);
    executor.drain_one().await.expect("one task to drain");

    assert_eq!(*harness.runtime.started.lock(), vec!["a".to_string()]);
}

#[test]
fn registry_reads_never_mix_figures_across_cycles() {
    let registry = Arc::new(HostRegistry::new());
    let queue = Arc::new(MigrationQueue::new());

    let writer = {
        let registry = registry.clone();
        let queue = queue.clone();
        std::thread::spawn(move || {
            for i in 0..2_000u32 {
                let node = Node {
                    host_id: "h1".into(),
                    avg_cpu: f64::from(i),
                    avg_mem: f64::from(i),
                    status: LoadStatus::Normal,
                    sampled_at: Utc::now(),
                };
                registry.record(node, None, &queue);
            }
        })
    };
    let reader = {
        let registry = registry.clone();
        std::thread::spawn(move || {
            for _ in 0..2_000 {
                if let Some(node) = registry.get("h1") {
                    assert_eq!(
                        node.avg_cpu, node.avg_mem,
                        "cpu and mem must come from the same cycle"
                    );
                }
            }
        })
    };

    writer.join().unwrap();
    reader.join().unwrap();
}

#[tokio::test]
async fn shutdown_signal_stops_both_loops() {
    let harness = Harness::new();
    let monitor = harness.monitor(MonitorConf { interval_secs: 1, ..Default::default() });
    let executor = harness.executor(MigrationConf { interval_secs: 1, ..Default::default() });

    let (tx, rx) = tokio::sync::watch::channel(false);
    let monitor_task = tokio::spawn(monitor.run(rx.clone()));
    let executor_task = tokio::spawn(executor.run(rx));

    tx.send(true).unwrap();

    tokio::time::timeout(Duration::from_secs(2), monitor_task)
        .await
        .expect("monitor loop exits on shutdown")
        .unwrap();
    tokio::time::timeout(Duration::from_secs(2), executor_task)
        .await
        .expect("executor loop exits on shutdown")
        .unwrap();
}
