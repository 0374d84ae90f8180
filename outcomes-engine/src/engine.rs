//! Outcome engine entry points
//!
//! Wires the store, both aggregators and the result writer together.
//! Every call is a self-contained read-compute(-write) cycle for one
//! student; calls for different students share no state.

use outcomes_common::db::{
    EnrollmentStatus, OfferingId, Student, StudentId, StudentProgramOutcomeScore,
};
use outcomes_common::{Error, Result};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::aggregate::{
    aggregate_learning_outcomes, aggregate_program_outcomes, LearningOutcomeScores,
    ProgramOutcomeReport,
};
use crate::audit::{audit_offering_weights, OfferingWeightAudit};
use crate::store::OutcomeStore;
use crate::writer::ResultWriter;

/// Outcome of a compute-and-save cycle
#[derive(Debug, Clone, PartialEq)]
pub struct SavedOutcomes {
    pub report: ProgramOutcomeReport,
    pub rows_written: usize,
}

/// Summary of recomputing every enrolled student of an offering
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OfferingRecompute {
    pub offering_id: OfferingId,
    /// Students whose outcomes were saved
    pub students: usize,
    pub rows_written: usize,
    /// Students whose save hit a retryable error; safe to recompute again
    pub failed_students: Vec<StudentId>,
}

pub struct OutcomeEngine<S> {
    store: S,
}

impl<S: OutcomeStore> OutcomeEngine<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Resolve a student id, failing with `NotFound` if unknown
    pub async fn student(&self, id: StudentId) -> Result<Student> {
        self.store
            .find_student(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("student {}", id)))
    }

    /// Learning outcome scores of a student's ENROLLED offerings
    pub async fn compute_student_learning_outcomes(
        &self,
        student: &Student,
    ) -> Result<LearningOutcomeScores> {
        aggregate_learning_outcomes(&self.store, student).await
    }

    /// Program outcome report of a student, not persisted
    pub async fn compute_student_program_outcomes(
        &self,
        student: &Student,
    ) -> Result<ProgramOutcomeReport> {
        let learning = aggregate_learning_outcomes(&self.store, student).await?;
        aggregate_program_outcomes(&self.store, student, &learning).await
    }

    /// Compute the program outcome report and persist it
    ///
    /// The revisions of the student's stored rows are captured before any
    /// input is read. If another writer touches those rows before the
    /// write transaction, the call fails with a retryable
    /// [`Error::Conflict`] and leaves the stored rows untouched.
    pub async fn compute_and_save_student_program_outcomes(
        &self,
        student: &Student,
    ) -> Result<SavedOutcomes> {
        let snapshot = self.store.score_revisions(student.id).await?;

        let report = self.compute_student_program_outcomes(student).await?;

        let rows_written = ResultWriter::new(&self.store)
            .save(student.id, &snapshot, &report)
            .await
            .map_err(|e| {
                if e.is_retryable() {
                    warn!(student_id = %student.id, error = %e, "Program outcome save needs retry");
                }
                e
            })?;

        Ok(SavedOutcomes {
            report,
            rows_written,
        })
    }

    /// Recompute and persist every ENROLLED student of an offering
    ///
    /// A retryable failure for one student does not stop the batch; the
    /// student is listed in `failed_students`. Other errors abort.
    pub async fn recompute_offering(&self, offering_id: OfferingId) -> Result<OfferingRecompute> {
        if self.store.find_offering(offering_id).await?.is_none() {
            return Err(Error::NotFound(format!("offering {}", offering_id)));
        }

        let student_ids = self
            .store
            .students_in_offering(offering_id, EnrollmentStatus::Enrolled)
            .await?;

        let mut students = 0;
        let mut rows_written = 0;
        let mut failed_students = Vec::new();
        for student_id in student_ids {
            let Some(student) = self.store.find_student(student_id).await? else {
                debug!(student_id = %student_id, "Enrolled student vanished, skipping");
                continue;
            };

            match self.compute_and_save_student_program_outcomes(&student).await {
                Ok(saved) => {
                    students += 1;
                    rows_written += saved.rows_written;
                }
                Err(e) if e.is_retryable() => failed_students.push(student.id),
                Err(e) => return Err(e),
            }
        }

        if failed_students.is_empty() {
            info!(
                offering_id = %offering_id,
                students,
                rows_written,
                "Offering outcomes recomputed"
            );
        } else {
            warn!(
                offering_id = %offering_id,
                students,
                rows_written,
                failed = failed_students.len(),
                "Offering outcomes recomputed with retryable failures"
            );
        }

        Ok(OfferingRecompute {
            offering_id,
            students,
            rows_written,
            failed_students,
        })
    }

    /// Persisted program outcome rows of a student, without recomputing
    pub async fn stored_program_outcomes(
        &self,
        student: &Student,
    ) -> Result<Vec<StudentProgramOutcomeScore>> {
        self.store.stored_scores(student.id).await
    }

    /// Weight configuration report of an offering
    pub async fn audit_offering_weights(&self, offering_id: OfferingId) -> Result<OfferingWeightAudit> {
        let offering = self
            .store
            .find_offering(offering_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("offering {}", offering_id)))?;

        audit_offering_weights(&self.store, &offering).await
    }
}
