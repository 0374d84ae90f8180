//! Persists program outcome reports
//!
//! One row per `(student, program outcome)`, created or overwritten as a
//! whole. Nothing else in the system writes these rows.

use outcomes_common::db::StudentId;
use outcomes_common::Result;
use tracing::info;

use crate::aggregate::ProgramOutcomeReport;
use crate::store::{OutcomeStore, RevisionSnapshot, ScoreWrite};

/// Upserts a student's report, guarded by a revision snapshot
pub struct ResultWriter<'a, S: OutcomeStore + ?Sized> {
    store: &'a S,
}

impl<'a, S: OutcomeStore + ?Sized> ResultWriter<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Write every outcome of `report`
    ///
    /// `snapshot` must have been taken before the report was computed. An
    /// empty report writes nothing and succeeds.
    pub async fn save(
        &self,
        student: StudentId,
        snapshot: &RevisionSnapshot,
        report: &ProgramOutcomeReport,
    ) -> Result<usize> {
        if report.is_empty() {
            info!(student_id = %student, "No program outcomes to persist");
            return Ok(0);
        }

        let rows: Vec<ScoreWrite> = report
            .outcomes
            .iter()
            .map(|(id, result)| ScoreWrite {
                program_outcome_id: *id,
                score: result.score,
                coverage: result.coverage,
            })
            .collect();

        let written = self.store.write_scores(student, snapshot, &rows).await?;

        info!(
            student_id = %student,
            rows_written = written,
            "Persisted program outcome scores"
        );

        Ok(written)
    }
}
