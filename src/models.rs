use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::runtime::Workload;

/// Load classification a host can hold. The three states are mutually
/// exclusive; boundary values classify as Normal (strict comparisons).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadStatus {
    Normal,
    Overloaded,
    Underloaded,
}

impl fmt::Display for LoadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadStatus::Normal => write!(f, "normal"),
            LoadStatus::Overloaded => write!(f, "overloaded"),
            LoadStatus::Underloaded => write!(f, "underloaded"),
        }
    }
}

/// Latest observed aggregate state of one host. Replaced wholesale on each
/// monitor cycle; no history is retained.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub host_id: String,
    pub avg_cpu: f64,
    pub avg_mem: f64,
    pub status: LoadStatus,
    pub sampled_at: DateTime<Utc>,
}

/// A pending relocation of one workload off an overloaded host.
///
/// Created by the monitor, consumed exactly once by the executor. Held in
/// memory only; in-flight tasks do not survive a restart.
#[derive(Debug, Clone)]
pub struct MigrationTask {
    pub id: Uuid,
    pub workload: Workload,
    pub source_host: String,
    /// Reserved for cross-host placement; not acted on yet.
    pub target_host: Option<String>,
}

impl MigrationTask {
    pub fn new(workload: Workload, source_host: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            workload,
            source_host: source_host.into(),
            target_host: None,
        }
    }
}
