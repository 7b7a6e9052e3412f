//! Host monitor loop
//!
//! Periodically enumerates every host's workloads, classifies aggregate
//! load, records the result in the registry and schedules a migration for
//! the heaviest workload of each overloaded host. All runtime I/O happens
//! outside the registry lock; the lock only spans record-and-enqueue.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::aggregator::{average_load, classify};
use crate::config::{MonitorConf, Thresholds};
use crate::health::HealthTracker;
use crate::models::{LoadStatus, MigrationTask, Node};
use crate::queue::MigrationQueue;
use crate::registry::HostRegistry;
use crate::runtime::{RuntimeError, Workload, WorkloadFilter, WorkloadRuntime};
use crate::sampler::{sample, Utilization};

pub struct HostMonitor {
    runtime: Arc<dyn WorkloadRuntime>,
    registry: Arc<HostRegistry>,
    queue: Arc<MigrationQueue>,
    health: HealthTracker,
    thresholds: Thresholds,
    conf: MonitorConf,
    /// Consecutive overloaded readings per host, for confirm_cycles.
    overload_streaks: HashMap<String, u32>,
}

impl HostMonitor {
    pub fn new(
        runtime: Arc<dyn WorkloadRuntime>,
        registry: Arc<HostRegistry>,
        queue: Arc<MigrationQueue>,
        health: HealthTracker,
        thresholds: Thresholds,
        conf: MonitorConf,
    ) -> Self {
        Self {
            runtime,
            registry,
            queue,
            health,
            thresholds,
            conf,
            overload_streaks: HashMap::new(),
        }
    }

    /// Ticked loop; runs until the shutdown signal flips.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(Duration::from_secs(self.conf.interval_secs));
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.scan().await;
                    self.health.mark_cycle();
                }
                _ = shutdown.changed() => {
                    info!("host monitor stopping");
                    return;
                }
            }
        }
    }

    /// One full pass over every host group.
    pub async fn scan(&mut self) {
        let filter = WorkloadFilter {
            name: self.conf.name_filter.clone(),
            group_label: self.conf.group_label.clone(),
        };
        let workloads = match self.runtime.list_workloads(&filter).await {
            Ok(workloads) => workloads,
            Err(RuntimeError::Unavailable(reason)) => {
                error!(%reason, "runtime unreachable, skipping scan until next tick");
                return;
            }
            Err(e) => {
                error!(error = %e, "failed to enumerate workloads, skipping scan");
                return;
            }
        };

        for (host_id, group) in group_by_host(workloads) {
            if group.is_empty() {
                warn!(host = %host_id, "host reported no workloads, skipping this cycle");
                continue;
            }

            let samples = self.sample_group(&group).await;
            let utilizations: Vec<Utilization> = samples.iter().map(|(_, u)| *u).collect();
            let avg = match average_load(&utilizations) {
                Ok(avg) => avg,
                Err(e) => {
                    warn!(host = %host_id, error = %e, "skipping host this cycle");
                    continue;
                }
            };
            let status = classify(&avg, &self.thresholds);
            let confirmed = self.confirm_overload(&host_id, status);

            let node = Node {
                host_id: host_id.clone(),
                avg_cpu: avg.cpu,
                avg_mem: avg.mem,
                status,
                sampled_at: Utc::now(),
            };
            // Victim selection reuses the samples already taken, so no
            // runtime call ever happens under the registry lock.
            let candidate = if confirmed {
                select_victim(&samples)
                    .map(|victim| MigrationTask::new(victim.clone(), host_id.as_str()))
            } else {
                None
            };
            let scheduled = self.registry.record(node, candidate, &self.queue);

            info!(
                host = %host_id,
                status = %status,
                avg_cpu = avg.cpu,
                avg_mem = avg.mem,
                "host classified"
            );
            if scheduled {
                info!(host = %host_id, "migration queued for heaviest workload");
            }
        }
    }

    /// Reads every workload's stats concurrently. A failed read degrades
    /// that workload to a zero sample instead of failing the host.
    async fn sample_group(&self, group: &[Workload]) -> Vec<(Workload, Utilization)> {
        let reads = join_all(group.iter().map(|w| self.runtime.stats(w))).await;
        group
            .iter()
            .cloned()
            .zip(reads)
            .map(|(workload, read)| {
                let util = match read {
                    Ok(stats) => sample(&stats),
                    Err(e) => {
                        debug!(workload = %workload.name, error = %e, "stats read failed, degrading to zero");
                        Utilization::default()
                    }
                };
                (workload, util)
            })
            .collect()
    }

    /// True once the host has been overloaded for `confirm_cycles`
    /// consecutive readings. Any other status resets the streak.
    fn confirm_overload(&mut self, host_id: &str, status: LoadStatus) -> bool {
        if status != LoadStatus::Overloaded {
            self.overload_streaks.remove(host_id);
            return false;
        }
        let streak = self.overload_streaks.entry(host_id.to_string()).or_insert(0);
        *streak += 1;
        *streak >= self.conf.confirm_cycles
    }
}

/// Groups workloads by their host label, deterministically ordered.
fn group_by_host(workloads: Vec<Workload>) -> BTreeMap<String, Vec<Workload>> {
    let mut groups: BTreeMap<String, Vec<Workload>> = BTreeMap::new();
    for workload in workloads {
        groups.entry(workload.host_id.clone()).or_default().push(workload);
    }
    groups
}

/// Heaviest workload by combined cpu+mem pressure. Ties keep the earliest
/// entry in enumeration order.
pub fn select_victim(samples: &[(Workload, Utilization)]) -> Option<&Workload> {
    let mut best: Option<(&Workload, f64)> = None;
    for (workload, util) in samples {
        let weight = util.weight();
        match best {
            Some((_, top)) if weight <= top => {}
            _ => best = Some((workload, weight)),
        }
    }
    best.map(|(workload, _)| workload)
}
