//! Two-level aggregation: component -> learning outcome -> program outcome

pub mod learning;
pub mod program;

pub use learning::{aggregate_learning_outcomes, LearningOutcomeScores};
pub use program::{aggregate_program_outcomes, ProgramOutcomeReport, ProgramOutcomeResult};
