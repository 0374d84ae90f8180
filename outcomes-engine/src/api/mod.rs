//! HTTP API handlers for outcomes-engine

pub mod error;
pub mod health;
pub mod offerings;
pub mod students;

pub use error::ApiError;
pub use health::health_routes;
pub use offerings::{get_weight_audit, recompute_offering};
pub use students::{
    get_learning_outcomes, get_program_outcomes, get_stored_program_outcomes, recompute_student,
};
