//! Container engine adapter
//!
//! Speaks the engine's HTTP API directly (list, stats, stop, commit,
//! create/start) over a `reqwest` client. Every call carries the configured
//! timeout so a stalled engine surfaces as [`RuntimeError::Timeout`] instead
//! of wedging a control loop.

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

use super::{ImageRef, RuntimeError, Workload, WorkloadFilter, WorkloadRuntime, WorkloadStats};

pub struct EngineApi {
    base: String,
    client: Client,
    group_label: String,
}

impl EngineApi {
    pub fn new(
        endpoint: &str,
        call_timeout: Duration,
        group_label: String,
    ) -> Result<Self, RuntimeError> {
        let client = Client::builder()
            .timeout(call_timeout)
            .build()
            .map_err(|e| RuntimeError::Unavailable(e.to_string()))?;
        Ok(Self {
            base: endpoint.trim_end_matches('/').to_string(),
            client,
            group_label,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }
}

fn transport_error(e: reqwest::Error) -> RuntimeError {
    if e.is_timeout() {
        RuntimeError::Timeout
    } else {
        RuntimeError::Unavailable(e.to_string())
    }
}

/// Maps a non-2xx response to an API error, keeping the engine's message.
async fn check(resp: Response) -> Result<Response, RuntimeError> {
    if resp.status().is_success() {
        return Ok(resp);
    }
    let status = resp.status().as_u16();
    let message = resp.text().await.unwrap_or_default();
    Err(RuntimeError::Api { status, message })
}

/// Decodes a JSON body, keeping malformed payloads distinct from transport
/// failures.
async fn decode<T: DeserializeOwned>(resp: Response) -> Result<T, RuntimeError> {
    let bytes = resp.bytes().await.map_err(transport_error)?;
    Ok(serde_json::from_slice(&bytes)?)
}

// Engine wire types. Only the fields the controller reads are modeled;
// everything optional mirrors what the engine actually omits (pre-counters
// on a first sample, limits on unconstrained workloads).

#[derive(Debug, Deserialize)]
struct ContainerSummary {
    #[serde(rename = "Id")]
    id: String,
    #[serde(rename = "Names", default)]
    names: Vec<String>,
    #[serde(rename = "Labels", default)]
    labels: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct StatsBody {
    #[serde(default)]
    cpu_stats: CpuStats,
    #[serde(default)]
    precpu_stats: CpuStats,
    #[serde(default)]
    memory_stats: MemoryStats,
}

#[derive(Debug, Default, Deserialize)]
struct CpuStats {
    #[serde(default)]
    cpu_usage: CpuUsage,
    system_cpu_usage: Option<u64>,
    online_cpus: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct CpuUsage {
    total_usage: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct MemoryStats {
    usage: Option<u64>,
    limit: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct IdBody {
    #[serde(rename = "Id")]
    id: String,
}

#[async_trait]
impl WorkloadRuntime for EngineApi {
    async fn list_workloads(&self, filter: &WorkloadFilter) -> Result<Vec<Workload>, RuntimeError> {
        let filters = serde_json::json!({ "name": [filter.name.as_str()] }).to_string();
        let resp = self
            .client
            .get(self.url("/containers/json"))
            .query(&[("all", "true"), ("filters", filters.as_str())])
            .send()
            .await
            .map_err(transport_error)?;
        let summaries: Vec<ContainerSummary> = decode(check(resp).await?).await?;

        let mut workloads = Vec::with_capacity(summaries.len());
        for summary in summaries {
            let Some(host_id) = summary.labels.get(&filter.group_label).cloned() else {
                debug!(id = %summary.id, "workload has no host-grouping label, ignoring");
                continue;
            };
            let name = summary
                .names
                .first()
                .map(|n| n.trim_start_matches('/').to_string())
                .unwrap_or_else(|| summary.id.clone());
            workloads.push(Workload { id: summary.id, name, host_id });
        }
        Ok(workloads)
    }

    async fn stats(&self, workload: &Workload) -> Result<WorkloadStats, RuntimeError> {
        let resp = self
            .client
            .get(self.url(&format!("/containers/{}/stats", workload.id)))
            .query(&[("stream", "false")])
            .send()
            .await
            .map_err(transport_error)?;
        let body: StatsBody = decode(check(resp).await?).await?;

        Ok(WorkloadStats {
            cpu_total_usage: body.cpu_stats.cpu_usage.total_usage.unwrap_or(0),
            precpu_total_usage: body.precpu_stats.cpu_usage.total_usage,
            system_cpu_usage: body.cpu_stats.system_cpu_usage,
            pre_system_cpu_usage: body.precpu_stats.system_cpu_usage,
            online_cpus: body.cpu_stats.online_cpus,
            mem_usage: body.memory_stats.usage,
            mem_limit: body.memory_stats.limit,
        })
    }

    async fn stop(&self, workload: &Workload) -> Result<(), RuntimeError> {
        let resp = self
            .client
            .post(self.url(&format!("/containers/{}/stop", workload.id)))
            .send()
            .await
            .map_err(transport_error)?;
        // 304: already stopped
        if resp.status() == StatusCode::NOT_MODIFIED {
            return Ok(());
        }
        check(resp).await?;
        Ok(())
    }

    async fn snapshot(&self, workload: &Workload, image_name: &str) -> Result<ImageRef, RuntimeError> {
        let resp = self
            .client
            .post(self.url("/commit"))
            .query(&[("container", workload.id.as_str()), ("repo", image_name)])
            .send()
            .await
            .map_err(transport_error)?;
        let body: IdBody = decode(check(resp).await?).await?;
        Ok(ImageRef(body.id))
    }

    async fn launch(
        &self,
        image: &ImageRef,
        name: &str,
        host_hint: Option<&str>,
    ) -> Result<Workload, RuntimeError> {
        let mut labels = HashMap::new();
        if let Some(host) = host_hint {
            // Rejoin the host group so the next monitor pass sees it.
            labels.insert(self.group_label.clone(), host.to_string());
        }
        let body = serde_json::json!({ "Image": image.0.as_str(), "Labels": labels });

        let resp = self
            .client
            .post(self.url("/containers/create"))
            .query(&[("name", name)])
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;
        let created: IdBody = decode(check(resp).await?).await?;

        let resp = self
            .client
            .post(self.url(&format!("/containers/{}/start", created.id)))
            .send()
            .await
            .map_err(transport_error)?;
        check(resp).await?;

        Ok(Workload {
            id: created.id,
            name: name.to_string(),
            host_id: host_hint.unwrap_or_default().to_string(),
        })
    }

    async fn start(&self, workload: &Workload) -> Result<(), RuntimeError> {
        let resp = self
            .client
            .post(self.url(&format!("/containers/{}/start", workload.id)))
            .send()
            .await
            .map_err(transport_error)?;
        // 304: already running
        if resp.status() == StatusCode::NOT_MODIFIED {
            return Ok(());
        }
        check(resp).await?;
        Ok(())
    }
}
