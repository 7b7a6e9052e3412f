//! Host load aggregation and classification

use crate::config::Thresholds;
use crate::models::LoadStatus;
use crate::sampler::Utilization;

#[derive(Debug, thiserror::Error)]
pub enum AggregateError {
    #[error("cannot average an empty host group")]
    EmptyHostGroup,
}

/// Arithmetic mean of per-workload samples.
///
/// An empty group is a precondition violation, not a zero reading; callers
/// must skip hosts that report no workloads.
pub fn average_load(samples: &[Utilization]) -> Result<Utilization, AggregateError> {
    if samples.is_empty() {
        return Err(AggregateError::EmptyHostGroup);
    }
    let n = samples.len() as f64;
    let (cpu, mem) = samples
        .iter()
        .fold((0.0, 0.0), |(cpu, mem), s| (cpu + s.cpu, mem + s.mem));
    Ok(Utilization { cpu: cpu / n, mem: mem / n })
}

/// Classifies a host's average load against static thresholds.
///
/// Comparisons are strict: a value exactly at a threshold classifies as
/// Normal. Overload triggers on either axis, underload requires both.
pub fn classify(load: &Utilization, thresholds: &Thresholds) -> LoadStatus {
    if load.cpu > thresholds.max_cpu || load.mem > thresholds.max_mem {
        LoadStatus::Overloaded
    } else if load.cpu < thresholds.min_cpu && load.mem < thresholds.min_mem {
        LoadStatus::Underloaded
    } else {
        LoadStatus::Normal
    }
}
