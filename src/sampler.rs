//! Utilization sampling
//!
//! Turns one raw counter read into instantaneous CPU and memory percentages.
//! Each call is a single point-in-time estimate; no smoothing or outlier
//! rejection is applied.

use serde::Serialize;

use crate::runtime::WorkloadStats;

/// Instantaneous CPU/memory utilization of one workload, in percent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Utilization {
    pub cpu: f64,
    pub mem: f64,
}

impl Utilization {
    /// Combined resource pressure, used to pick migration victims.
    pub fn weight(&self) -> f64 {
        self.cpu + self.mem
    }
}

/// Derives utilization percentages from a two-point counter read.
///
/// CPU is the workload's share of the system-wide counter delta, scaled by
/// the online CPU count. Any missing counter (the first sample has no
/// pre-read) or a non-positive delta yields a zero reading instead of an
/// error.
pub fn sample(stats: &WorkloadStats) -> Utilization {
    let cpu = match (
        stats.precpu_total_usage,
        stats.system_cpu_usage,
        stats.pre_system_cpu_usage,
        stats.online_cpus,
    ) {
        (Some(pre_total), Some(sys), Some(pre_sys), Some(cores)) => {
            let cpu_delta = stats.cpu_total_usage as i64 - pre_total as i64;
            let sys_delta = sys as i64 - pre_sys as i64;
            if sys_delta > 0 && cpu_delta > 0 {
                cpu_delta as f64 / sys_delta as f64 * cores as f64 * 100.0
            } else {
                0.0
            }
        }
        _ => 0.0,
    };

    let mem = match (stats.mem_usage, stats.mem_limit) {
        (Some(usage), Some(limit)) if limit > 0 => usage as f64 / limit as f64 * 100.0,
        _ => 0.0,
    };

    Utilization { cpu, mem }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counters(cpu_delta: u64, sys_delta: u64, cores: u32) -> WorkloadStats {
        WorkloadStats {
            cpu_total_usage: 1_000_000 + cpu_delta,
            precpu_total_usage: Some(1_000_000),
            system_cpu_usage: Some(5_000_000 + sys_delta),
            pre_system_cpu_usage: Some(5_000_000),
            online_cpus: Some(cores),
            mem_usage: None,
            mem_limit: None,
        }
    }

    #[test]
    fn test_first_sample_yields_zero_cpu() {
        // No pre-read counters yet
        let stats = WorkloadStats {
            cpu_total_usage: 123_456,
            mem_usage: Some(50),
            mem_limit: Some(100),
            ..Default::default()
        };
        let util = sample(&stats);
        assert_eq!(util.cpu, 0.0);
        assert_eq!(util.mem, 50.0);
    }

    #[test]
    fn test_cpu_share_of_system_delta() {
        // 25% of the system delta on 2 cores -> 50%
        let stats = counters(25_000, 100_000, 2);
        let util = sample(&stats);
        assert!((util.cpu - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_zero_system_delta_yields_zero() {
        let stats = counters(25_000, 0, 4);
        assert_eq!(sample(&stats).cpu, 0.0);
    }

    #[test]
    fn test_counter_regression_yields_zero() {
        let mut stats = counters(0, 100_000, 1);
        stats.cpu_total_usage = 999_000; // below the pre-read
        assert_eq!(sample(&stats).cpu, 0.0);
    }

    #[test]
    fn test_memory_requires_usage_and_limit() {
        let stats = WorkloadStats { mem_usage: Some(512), ..Default::default() };
        assert_eq!(sample(&stats).mem, 0.0);

        let stats = WorkloadStats {
            mem_usage: Some(512),
            mem_limit: Some(2_048),
            ..Default::default()
        };
        assert_eq!(sample(&stats).mem, 25.0);
    }

    #[test]
    fn test_weight_sums_both_axes() {
        let util = Utilization { cpu: 40.0, mem: 20.0 };
        assert_eq!(util.weight(), 60.0);
    }
}
