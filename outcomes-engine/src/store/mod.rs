//! Read access to grades and the outcome graph, plus the score sink
//!
//! The aggregation never talks to SQL directly; it goes through
//! [`OutcomeStore`]. [`SqliteOutcomeStore`] is the production
//! implementation.

use async_trait::async_trait;
use outcomes_common::db::{
    AssessmentComponent, ComponentId, CourseOffering, DepartmentId, Enrollment, EnrollmentId,
    EnrollmentStatus, LearningOutcomeId, OfferingId, ProgramOutcome, ProgramOutcomeId,
    RelationId, Student, StudentId, StudentProgramOutcomeScore,
};
use outcomes_common::Result;
use std::collections::{BTreeMap, HashMap};

use crate::weight::Weight;

mod sqlite;

pub use sqlite::SqliteOutcomeStore;

/// Scores keyed by `(enrollment, component)`; only non-NULL grades appear
pub type GradeMap = BTreeMap<(EnrollmentId, ComponentId), f64>;

/// Result of resolving one relation row
///
/// `Missing` means the relation points at an outcome row that no longer
/// exists. Callers skip it; it is distinct from a zero-weight edge.
#[derive(Debug, Clone, PartialEq)]
pub enum EdgeLookup<E> {
    Found(E),
    Missing { relation_id: RelationId },
}

/// Component -> learning outcome edge
#[derive(Debug, Clone, PartialEq)]
pub struct ComponentEdge {
    pub relation_id: RelationId,
    pub component_id: ComponentId,
    pub learning_outcome_id: LearningOutcomeId,
    pub weight: Weight,
}

/// Learning outcome -> program outcome edge
#[derive(Debug, Clone, PartialEq)]
pub struct OutcomeEdge {
    pub relation_id: RelationId,
    pub learning_outcome_id: LearningOutcomeId,
    pub program_outcome_id: ProgramOutcomeId,
    pub weight: Weight,
}

/// One freshly computed row handed to [`OutcomeStore::write_scores`]
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreWrite {
    pub program_outcome_id: ProgramOutcomeId,
    pub score: f64,
    pub coverage: f64,
}

/// Revision of each persisted row of one student, taken before computing
pub type RevisionSnapshot = HashMap<ProgramOutcomeId, i64>;

/// Repository-style access used by the engine
#[async_trait]
pub trait OutcomeStore: Send + Sync {
    async fn find_student(&self, id: StudentId) -> Result<Option<Student>>;

    async fn find_offering(&self, id: OfferingId) -> Result<Option<CourseOffering>>;

    /// Enrollments of a student with the given status, ordered by id
    async fn enrollments_for(
        &self,
        student: StudentId,
        status: EnrollmentStatus,
    ) -> Result<Vec<Enrollment>>;

    /// Students holding an enrollment with the given status in an offering
    async fn students_in_offering(
        &self,
        offering: OfferingId,
        status: EnrollmentStatus,
    ) -> Result<Vec<StudentId>>;

    /// Non-NULL grades of the given enrollments
    ///
    /// Only grades whose component belongs to the enrollment's own
    /// offering are returned.
    async fn grades_for(&self, enrollments: &[EnrollmentId]) -> Result<GradeMap>;

    async fn components_for_offering(&self, offering: OfferingId)
        -> Result<Vec<AssessmentComponent>>;

    /// Outgoing edges of one component
    async fn component_edges(&self, component: ComponentId)
        -> Result<Vec<EdgeLookup<ComponentEdge>>>;

    /// Outgoing edges of one learning outcome, restricted to program
    /// outcomes owned by one of `departments`
    async fn outcome_edges(
        &self,
        learning_outcome: LearningOutcomeId,
        departments: &[DepartmentId],
    ) -> Result<Vec<EdgeLookup<OutcomeEdge>>>;

    async fn student_departments(&self, student: StudentId) -> Result<Vec<DepartmentId>>;

    /// Program outcomes of the given departments in id order
    async fn program_outcomes_for(&self, departments: &[DepartmentId])
        -> Result<Vec<ProgramOutcome>>;

    /// Persisted rows of a student in program outcome id order
    async fn stored_scores(&self, student: StudentId) -> Result<Vec<StudentProgramOutcomeScore>>;

    async fn score_revisions(&self, student: StudentId) -> Result<RevisionSnapshot>;

    /// Upsert all rows of one student atomically
    ///
    /// Fails with [`outcomes_common::Error::Conflict`] and writes nothing
    /// when any existing row's revision differs from `snapshot`, or a row
    /// absent from `snapshot` now exists.
    async fn write_scores(
        &self,
        student: StudentId,
        snapshot: &RevisionSnapshot,
        rows: &[ScoreWrite],
    ) -> Result<usize>;
}
