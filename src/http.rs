//! Status API
//!
//! Read-only observation surface over the registry and health counters.
//! No mutation routes; the control loops are the only writers.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use std::sync::Arc;

use crate::health::{BalancerHealth, HealthTracker};
use crate::models::Node;
use crate::queue::MigrationQueue;
use crate::registry::HostRegistry;

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<HostRegistry>,
    pub queue: Arc<MigrationQueue>,
    pub health: HealthTracker,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/system/health", get(get_system_health))
        .route("/hosts", get(get_hosts))
        .route("/hosts/{id}", get(get_host))
        .with_state(state)
}

// GET /hosts (latest node per host)
async fn get_hosts(State(app): State<AppState>) -> Json<Vec<Node>> {
    Json(app.registry.snapshot_all())
}

// GET /hosts/:id
async fn get_host(
    State(app): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Node>, StatusCode> {
    app.registry.get(&id).map(Json).ok_or(StatusCode::NOT_FOUND)
}

// GET /system/health
async fn get_system_health(State(app): State<AppState>) -> Json<BalancerHealth> {
    Json(app.health.get_health(&app.registry, &app.queue))
}
