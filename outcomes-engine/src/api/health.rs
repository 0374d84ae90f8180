//! Health check endpoint
//!
//! Reports the service identity plus whether the outcomes database answers.
//! An unreachable database turns the response into 503 so load balancers
//! stop routing recomputes here.

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use outcomes_common::db::get_schema_version;
use serde::Serialize;
use tracing::warn;

use crate::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// "ok" or "degraded"
    pub status: &'static str,
    pub module: &'static str,
    pub version: &'static str,
    pub git_hash: &'static str,
    /// Applied schema version; absent when the database cannot be read
    pub schema_version: Option<i32>,
}

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let schema_version = match get_schema_version(state.engine.store().pool()).await {
        Ok(version) => Some(version),
        Err(e) => {
            warn!(error = %e, "Health check could not read the database");
            None
        }
    };

    let (code, status) = if schema_version.is_some() {
        (StatusCode::OK, "ok")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "degraded")
    };

    (
        code,
        Json(HealthResponse {
            status,
            module: "outcomes-engine",
            version: env!("CARGO_PKG_VERSION"),
            git_hash: env!("GIT_HASH"),
            schema_version,
        }),
    )
}

pub fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
