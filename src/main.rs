//! host-balancer binary
//!
//! Bootstraps the consolidation controller: config, event log, runtime
//! client, then the monitor and executor loops plus the status API. Both
//! loops check a shared shutdown signal every tick, so ctrl-c drains the
//! process out at the next iteration boundary.

use anyhow::{Context, Result};
use std::fs::File;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use host_balancer::config::load_config;
use host_balancer::executor::MigrationExecutor;
use host_balancer::health::HealthTracker;
use host_balancer::http::{build_router, AppState};
use host_balancer::monitor::HostMonitor;
use host_balancer::queue::MigrationQueue;
use host_balancer::registry::HostRegistry;
use host_balancer::runtime::{EngineApi, WorkloadRuntime};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cfg = load_config().await;

    // Event log: recreated on every start, one line per event.
    let log_file = File::create(&cfg.log_file)
        .with_context(|| format!("failed to create event log {}", cfg.log_file))?;
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(fmt::layer())
        .with(fmt::layer().with_ansi(false).with_writer(std::sync::Mutex::new(log_file)))
        .init();

    info!("host-balancer starting");

    let runtime: Arc<dyn WorkloadRuntime> = Arc::new(
        EngineApi::new(
            &cfg.runtime.endpoint,
            Duration::from_secs(cfg.runtime.call_timeout_secs),
            cfg.monitor.group_label.clone(),
        )
        .context("failed to build runtime client")?,
    );

    let registry = Arc::new(HostRegistry::new());
    let queue = Arc::new(MigrationQueue::new());
    let health = HealthTracker::new();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let monitor = HostMonitor::new(
        runtime.clone(),
        registry.clone(),
        queue.clone(),
        health.clone(),
        cfg.thresholds,
        cfg.monitor.clone(),
    );
    let executor = MigrationExecutor::new(
        runtime,
        registry.clone(),
        queue.clone(),
        health.clone(),
        cfg.migration.clone(),
    );

    let monitor_task = tokio::spawn(monitor.run(shutdown_rx.clone()));
    let executor_task = tokio::spawn(executor.run(shutdown_rx.clone()));

    if let Some(http_cfg) = cfg.http.clone() {
        let app = build_router(AppState {
            registry: registry.clone(),
            queue: queue.clone(),
            health: health.clone(),
        });
        let addr: SocketAddr = http_cfg
            .listen
            .parse()
            .with_context(|| format!("invalid http listen address {}", http_cfg.listen))?;
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind status API on {addr}"))?;
        info!(%addr, "status API listening");

        let mut http_shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            let serve = axum::serve(listener, app).with_graceful_shutdown(async move {
                let _ = http_shutdown.changed().await;
            });
            if let Err(e) = serve.await {
                error!(error = %e, "status API server error");
            }
        });
    }

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("shutdown signal received, stopping loops");
    let _ = shutdown_tx.send(true);

    let _ = monitor_task.await;
    let _ = executor_task.await;
    info!("host-balancer stopped");
    Ok(())
}
