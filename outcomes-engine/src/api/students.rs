//! Per-student outcome endpoints

use axum::{
    extract::{Path, State},
    Json,
};
use outcomes_common::db::{
    LearningOutcomeId, ProgramOutcomeId, RelationId, StudentId, StudentProgramOutcomeScore,
};
use serde::Serialize;

use super::ApiError;
use crate::aggregate::ProgramOutcomeReport;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct LearningOutcomeEntry {
    pub learning_outcome_id: LearningOutcomeId,
    pub score: f64,
}

#[derive(Debug, Serialize)]
pub struct LearningOutcomesResponse {
    pub student_id: StudentId,
    pub learning_outcomes: Vec<LearningOutcomeEntry>,
    pub skipped_relations: Vec<RelationId>,
}

#[derive(Debug, Serialize)]
pub struct ProgramOutcomeEntry {
    pub program_outcome_id: ProgramOutcomeId,
    pub code: String,
    pub description: String,
    pub coverage: f64,
    pub score: f64,
}

#[derive(Debug, Serialize)]
pub struct ProgramOutcomesResponse {
    pub student_id: StudentId,
    pub program_outcomes: Vec<ProgramOutcomeEntry>,
    pub skipped_relations: Vec<RelationId>,
}

impl ProgramOutcomesResponse {
    fn from_report(student_id: StudentId, report: ProgramOutcomeReport) -> Self {
        Self {
            student_id,
            program_outcomes: report
                .outcomes
                .into_iter()
                .map(|(id, result)| ProgramOutcomeEntry {
                    program_outcome_id: id,
                    code: result.code,
                    description: result.description,
                    coverage: result.coverage,
                    score: result.score,
                })
                .collect(),
            skipped_relations: report.skipped_relations,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RecomputeResponse {
    pub rows_written: usize,
    #[serde(flatten)]
    pub outcomes: ProgramOutcomesResponse,
}

#[derive(Debug, Serialize)]
pub struct StoredOutcomesResponse {
    pub student_id: StudentId,
    pub program_outcomes: Vec<StudentProgramOutcomeScore>,
}

/// GET /api/students/:id/learning-outcomes
pub async fn get_learning_outcomes(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<LearningOutcomesResponse>, ApiError> {
    let student = state.engine.student(StudentId(id)).await?;
    let scores = state.engine.compute_student_learning_outcomes(&student).await?;

    Ok(Json(LearningOutcomesResponse {
        student_id: student.id,
        learning_outcomes: scores
            .scores
            .into_iter()
            .map(|(learning_outcome_id, score)| LearningOutcomeEntry {
                learning_outcome_id,
                score,
            })
            .collect(),
        skipped_relations: scores.skipped_relations,
    }))
}

/// GET /api/students/:id/program-outcomes
///
/// Computes on the fly; nothing is persisted.
pub async fn get_program_outcomes(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<ProgramOutcomesResponse>, ApiError> {
    let student = state.engine.student(StudentId(id)).await?;
    let report = state.engine.compute_student_program_outcomes(&student).await?;

    Ok(Json(ProgramOutcomesResponse::from_report(student.id, report)))
}

/// POST /api/students/:id/program-outcomes/recompute
pub async fn recompute_student(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<RecomputeResponse>, ApiError> {
    let student = state.engine.student(StudentId(id)).await?;
    let saved = state
        .engine
        .compute_and_save_student_program_outcomes(&student)
        .await?;

    Ok(Json(RecomputeResponse {
        rows_written: saved.rows_written,
        outcomes: ProgramOutcomesResponse::from_report(student.id, saved.report),
    }))
}

/// GET /api/students/:id/program-outcomes/stored
pub async fn get_stored_program_outcomes(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<StoredOutcomesResponse>, ApiError> {
    let student = state.engine.student(StudentId(id)).await?;
    let program_outcomes = state.engine.stored_program_outcomes(&student).await?;

    Ok(Json(StoredOutcomesResponse {
        student_id: student.id,
        program_outcomes,
    }))
}
