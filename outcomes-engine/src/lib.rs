//! outcomes-engine library - program outcome aggregation
//!
//! Rolls component grades up through component -> learning outcome ->
//! program outcome relations and persists one score/coverage row per
//! `(student, program outcome)`.

use axum::Router;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

pub mod aggregate;
pub mod api;
pub mod audit;
pub mod engine;
pub mod store;
pub mod weight;
pub mod writer;

pub use engine::{OfferingRecompute, OutcomeEngine, SavedOutcomes};
pub use store::{OutcomeStore, SqliteOutcomeStore};
pub use weight::Weight;

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<OutcomeEngine<SqliteOutcomeStore>>,
}

impl AppState {
    /// Create new application state
    pub fn new(pool: sqlx::SqlitePool) -> Self {
        Self {
            engine: Arc::new(OutcomeEngine::new(SqliteOutcomeStore::new(pool))),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::routing::{get, post};

    let api = Router::new()
        .route(
            "/api/students/:id/learning-outcomes",
            get(api::get_learning_outcomes),
        )
        .route(
            "/api/students/:id/program-outcomes",
            get(api::get_program_outcomes),
        )
        .route(
            "/api/students/:id/program-outcomes/recompute",
            post(api::recompute_student),
        )
        .route(
            "/api/students/:id/program-outcomes/stored",
            get(api::get_stored_program_outcomes),
        )
        .route("/api/offerings/:id/recompute", post(api::recompute_offering))
        .route("/api/offerings/:id/weight-audit", get(api::get_weight_audit));

    Router::new()
        .merge(api)
        .merge(api::health_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
