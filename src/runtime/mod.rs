//! Runtime collaborator seam
//!
//! The controller never talks to the container engine directly; everything
//! goes through the [`WorkloadRuntime`] trait so the consolidation logic can
//! be driven against a mock in tests. The production adapter lives in
//! [`docker`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

pub mod docker;

pub use docker::EngineApi;

#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("runtime unreachable: {0}")]
    Unavailable(String),
    #[error("runtime API error (status {status}): {message}")]
    Api { status: u16, message: String },
    #[error("runtime response decode error: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("runtime call timed out")]
    Timeout,
}

/// Opaque handle to an engine-managed unit. The controller only holds these
/// transiently during a cycle; the engine owns the actual state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workload {
    pub id: String,
    pub name: String,
    /// Value of the host-grouping label.
    pub host_id: String,
}

/// Raw counters at two consecutive sample times. The pre-counters are absent
/// on a workload's first sample; `sample` degrades that to a zero reading.
#[derive(Debug, Clone, Default)]
pub struct WorkloadStats {
    pub cpu_total_usage: u64,
    pub precpu_total_usage: Option<u64>,
    pub system_cpu_usage: Option<u64>,
    pub pre_system_cpu_usage: Option<u64>,
    pub online_cpus: Option<u32>,
    pub mem_usage: Option<u64>,
    pub mem_limit: Option<u64>,
}

/// Selection criteria for workload enumeration.
#[derive(Debug, Clone)]
pub struct WorkloadFilter {
    /// Substring match on the workload name.
    pub name: String,
    /// Label whose value identifies the owning host.
    pub group_label: String,
}

/// Reference to a persisted, re-launchable capture of a stopped workload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRef(pub String);

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[async_trait]
pub trait WorkloadRuntime: Send + Sync {
    async fn list_workloads(&self, filter: &WorkloadFilter) -> Result<Vec<Workload>, RuntimeError>;

    async fn stats(&self, workload: &Workload) -> Result<WorkloadStats, RuntimeError>;

    async fn stop(&self, workload: &Workload) -> Result<(), RuntimeError>;

    /// Persists the stopped workload's state into a new image.
    async fn snapshot(&self, workload: &Workload, image_name: &str) -> Result<ImageRef, RuntimeError>;

    /// Creates and starts a new workload instance from an image.
    async fn launch(
        &self,
        image: &ImageRef,
        name: &str,
        host_hint: Option<&str>,
    ) -> Result<Workload, RuntimeError>;

    /// Restarts an existing stopped workload in place. Used to recover a
    /// source workload whose migration failed after the stop step.
    async fn start(&self, workload: &Workload) -> Result<(), RuntimeError>;
}
