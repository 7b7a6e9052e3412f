use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::fs;

/// Process-wide static configuration, loaded once at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BalancerConfig {
    pub thresholds: Thresholds,
    pub monitor: MonitorConf,
    pub migration: MigrationConf,
    pub runtime: RuntimeConf,
    /// Set to null to disable the status API entirely.
    pub http: Option<HttpConf>,
    /// Event log path; the file is recreated on every start.
    pub log_file: String,
}

/// Static percentage thresholds for host load classification.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    pub max_cpu: f64,
    pub min_cpu: f64,
    pub max_mem: f64,
    pub min_mem: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConf {
    pub interval_secs: u64,
    /// Consecutive overloaded readings required before a migration is
    /// scheduled. 1 reproduces single-reading behavior.
    pub confirm_cycles: u32,
    /// Name filter passed to the engine when listing workloads.
    pub name_filter: String,
    /// Label whose value groups workloads into hosts.
    pub group_label: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MigrationConf {
    pub interval_secs: u64,
    /// Attempts per task before the migration is abandoned.
    pub max_attempts: u32,
    pub backoff_base_ms: u64,
    /// Restart the stopped source workload when a later step fails
    /// terminally. Off by default: the task is abandoned as-is.
    pub recover_source: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConf {
    pub endpoint: String,
    /// Per-call timeout so a stalled engine cannot wedge a loop.
    pub call_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConf {
    pub listen: String,
}

impl Default for BalancerConfig {
    fn default() -> Self {
        Self {
            thresholds: Thresholds::default(),
            monitor: MonitorConf::default(),
            migration: MigrationConf::default(),
            runtime: RuntimeConf::default(),
            http: Some(HttpConf { listen: "0.0.0.0:8080".into() }),
            log_file: "balancer.log".into(),
        }
    }
}

impl Default for Thresholds {
    fn default() -> Self {
        Self { max_cpu: 55.0, min_cpu: 20.0, max_mem: 55.0, min_mem: 20.0 }
    }
}

impl Default for MonitorConf {
    fn default() -> Self {
        Self {
            interval_secs: 3,
            confirm_cycles: 1,
            name_filter: "host".into(),
            group_label: "com.docker.compose.project".into(),
        }
    }
}

impl Default for MigrationConf {
    fn default() -> Self {
        Self { interval_secs: 2, max_attempts: 1, backoff_base_ms: 500, recover_source: false }
    }
}

impl Default for RuntimeConf {
    fn default() -> Self {
        Self { endpoint: "http://localhost:2375".into(), call_timeout_secs: 10 }
    }
}

pub async fn load_config() -> BalancerConfig {
    let path = std::env::var("BALANCER_CONFIG").unwrap_or_else(|_| "balancer.yaml".into());
    if Path::new(&path).exists() {
        let txt = fs::read_to_string(&path).await.unwrap_or_default();
        if txt.trim().is_empty() {
            return BalancerConfig::default();
        }
        serde_yaml::from_str(&txt).unwrap_or_else(|e| {
            eprintln!("[balancer] invalid config {path}: {e}");
            BalancerConfig::default()
        })
    } else {
        eprintln!("[balancer] no {path}, using default config");
        BalancerConfig::default()
    }
}
