//! # Outcomes Common Library
//!
//! Shared code for the outcome aggregation workspace:
//! - Error type and result alias
//! - Configuration loading and root folder resolution
//! - SQLite schema creation, migrations and row models

pub mod config;
#[cfg(feature = "sqlx")]
pub mod db;
pub mod error;

pub use error::{Error, Result};
