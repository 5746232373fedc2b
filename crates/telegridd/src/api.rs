//! Read-only HTTP surface for operability.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use tracing::error;

use telegrid_manager::Manager;
use telegrid_state::{Agent, ComputedSchema};

/// Build the daemon's router: health plus fleet/schema snapshots.
pub fn build_router(manager: Arc<Manager>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/v1/agents", get(list_agents))
        .route("/v1/schema", get(get_schema))
        .with_state(manager)
}

async fn healthz() -> &'static str {
    "ok"
}

async fn list_agents(
    State(manager): State<Arc<Manager>>,
) -> Result<Json<Vec<Agent>>, StatusCode> {
    manager.get_active_agents().map(Json).map_err(|e| {
        error!(error = %e, "listing agents failed");
        StatusCode::INTERNAL_SERVER_ERROR
    })
}

async fn get_schema(
    State(manager): State<Arc<Manager>>,
) -> Result<Json<ComputedSchema>, StatusCode> {
    manager.get_computed_schema().map(Json).map_err(|e| {
        error!(error = %e, "reading schema failed");
        StatusCode::INTERNAL_SERVER_ERROR
    })
}
