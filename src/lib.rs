//! host-balancer - threshold-driven workload consolidation controller
//!
//! Keeps a pool of container workloads balanced across a set of hosts:
//! - Samples per-workload CPU/memory utilization from the container engine
//! - Classifies each host's aggregate load against static thresholds
//! - Relocates the heaviest workload off overloaded hosts (stop, snapshot,
//!   relaunch)
//! - Exposes the latest per-host picture over a read-only status API

pub mod aggregator;
pub mod config;
pub mod executor;
pub mod health;
pub mod http;
pub mod models;
pub mod monitor;
pub mod queue;
pub mod registry;
pub mod runtime;
pub mod sampler;
